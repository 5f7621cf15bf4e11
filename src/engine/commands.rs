// src/engine/commands.rs
//! Operation catalog and rejection reasons.
//!
//! A `CommandError`'s display text is exactly the `msg` of the failed
//! acknowledgment, so hosts can match on it.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Info,
    UartGatewaySet,
    BindSet,
    ValveSet,
    ThresholdSet,
    ModeSet,
    ValvePathSet,
    ValveTargetSet,
    ValvePair,
    NetCfgSet,
    NetForm,
}

impl Operation {
    pub const ALL: [Operation; 11] = [
        Operation::Info,
        Operation::UartGatewaySet,
        Operation::BindSet,
        Operation::ValveSet,
        Operation::ThresholdSet,
        Operation::ModeSet,
        Operation::ValvePathSet,
        Operation::ValveTargetSet,
        Operation::ValvePair,
        Operation::NetCfgSet,
        Operation::NetForm,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Operation::Info => "info",
            Operation::UartGatewaySet => "uart_gateway_set",
            Operation::BindSet => "bind_set",
            Operation::ValveSet => "valve_set",
            Operation::ThresholdSet => "threshold_set",
            Operation::ModeSet => "mode_set",
            Operation::ValvePathSet => "valve_path_set",
            Operation::ValveTargetSet => "valve_target_set",
            Operation::ValvePair => "valve_pair",
            Operation::NetCfgSet => "net_cfg_set",
            Operation::NetForm => "net_form",
        }
    }

    /// Exact, case-sensitive match
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("missing {0}")]
    Missing(&'static str),
    #[error("bad {0}")]
    Bad(&'static str),
    #[error("unknown op")]
    UnknownOp,
    #[error("debounced")]
    Debounced,
    #[error("rejected: AUTO mode")]
    AutoMode,
    #[error("value must be auto/manual")]
    BadMode,
    #[error("value must be open/closed")]
    BadValveValue,
    #[error("value must be auto/direct/binding")]
    BadPath,
    #[error("open_th must be < close_th")]
    ThresholdOrder,
    #[error("th too big")]
    ThresholdTooBig,
    #[error("net_form rejected")]
    NetFormRejected,
    #[error("bind_set failed")]
    BindSetFailed,
}

/// What the dispatcher does after a handler succeeds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Acknowledge success, then run the follow-up
    Ack(&'static str, FollowUp),
    /// The handler already produced its acknowledgment
    Handled,
    /// Acknowledgment comes with the transaction completion
    Deferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    None,
    Info,
    AutoControlAndData,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_names_round_trip() {
        for op in Operation::ALL {
            assert_eq!(Operation::from_name(op.name()), Some(op));
        }
        assert_eq!(Operation::from_name("Info"), None);
        assert_eq!(Operation::from_name("valve"), None);
    }

    #[test]
    fn test_rejection_reasons() {
        assert_eq!(CommandError::Missing("op").to_string(), "missing op");
        assert_eq!(CommandError::Bad("channel").to_string(), "bad channel");
        assert_eq!(CommandError::AutoMode.to_string(), "rejected: AUTO mode");
        assert_eq!(CommandError::ThresholdOrder.to_string(), "open_th must be < close_th");
    }
}
