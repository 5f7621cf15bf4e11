// src/engine/valve.rs
//! Valve Control State Machine.
//!
//! `Idle -> Pending -> Idle`. A transaction starts only from `Idle` and
//! ends only with the send-completion whose cluster and source endpoint
//! match the On/Off write. The confirmed valve state changes on a
//! successful completion and at no other time.

use serde_json::json;
use thiserror::Error;

use crate::config::{PathPolicy, ValveConfig};
use crate::engine::{ControlMode, Engine, INTERNAL_ID};
use crate::stack::{Destination, NetworkState, OnOffFrame, RadioStack, StackStatus, NULL_NODE_ID};
use crate::util::eui64::{StableId, StableIdError};
use crate::util::io::records::{hex16, Record};
use crate::{log_info, log_warn};

/// Identity of the remote valve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuatorTarget {
    pub known: bool,
    pub stable_id: StableId,
    /// `None` until configured or confirmed by a join
    pub short_address: Option<u16>,
    pub destination_endpoint: u8,
    pub binding_slot: u8,
}

impl ActuatorTarget {
    pub fn new(destination_endpoint: u8) -> Self {
        Self {
            known: false,
            stable_id: StableId::ZERO,
            short_address: None,
            destination_endpoint,
            binding_slot: 0,
        }
    }

    /// Short address as reported on the wire
    pub fn node_id(&self) -> u16 {
        self.short_address.unwrap_or(NULL_NODE_ID)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub close_above: u16,
    pub open_below: u16,
}

/// The single outstanding write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValveTransaction {
    pub correlation_id: u32,
    pub desired_open: bool,
    pub destination: Destination,
}

#[derive(Debug, Clone)]
pub struct ValveControl {
    pub target: ActuatorTarget,
    pub path: PathPolicy,
    pub thresholds: Thresholds,
    pub confirmed_open: bool,
    pub pending: Option<ValveTransaction>,
}

impl ValveControl {
    pub fn new(config: &ValveConfig) -> Self {
        Self {
            target: ActuatorTarget::new(config.default_endpoint),
            path: config.path,
            thresholds: Thresholds {
                close_above: config.close_above,
                open_below: config.open_below,
            },
            confirmed_open: false,
            pending: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn state_str(&self) -> &'static str {
        if self.confirmed_open { "open" } else { "closed" }
    }

    /// Direct when forced or when a short address is known under auto
    pub fn resolve_destination(&self) -> Result<Destination, ValveError> {
        let use_direct = match self.path {
            PathPolicy::Direct => true,
            PathPolicy::Binding => false,
            PathPolicy::Auto => self.target.short_address.is_some(),
        };
        if !use_direct {
            return Ok(Destination::Binding(self.target.binding_slot));
        }
        self.target
            .short_address
            .map(Destination::Direct)
            .ok_or(ValveError::DirectRequiresNodeId)
    }

    /// Which way the hysteresis wants to drive the valve, if at all
    pub fn hysteresis_action(&self, flow: u16) -> Option<bool> {
        if self.confirmed_open && flow > self.thresholds.close_above {
            Some(false)
        } else if !self.confirmed_open && flow < self.thresholds.open_below {
            Some(true)
        } else {
            None
        }
    }
}

/// Why a valve transaction could not start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValveError {
    #[error("not joined")]
    NotJoined,
    #[error("busy: tx_pending")]
    Busy,
    #[error("direct requires valve_node_id")]
    DirectRequiresNodeId,
    #[error("send_fail_immediate:{0}")]
    SendFailed(StackStatus),
}

impl ValveError {
    /// Reason used in `ZB/valve_reject` when nobody waits for an ack
    pub fn log_reason(&self) -> &'static str {
        match self {
            ValveError::NotJoined => "not_joined",
            ValveError::Busy => "tx_pending",
            ValveError::DirectRequiresNodeId => "direct_requires_node_id",
            ValveError::SendFailed(_) => "send_fail",
        }
    }
}

fn want_str(open: bool) -> &'static str {
    if open { "open" } else { "close" }
}

impl<S: RadioStack> Engine<S> {
    /// Try to start a write. A rejection is reported here (ack for a
    /// requester, `@LOG` for internal callers); success is acknowledged
    /// only when the completion arrives.
    pub fn start_valve_transaction(&mut self, id: u32, want_open: bool) -> Result<(), ValveError> {
        let result = self.submit_valve_write(id, want_open);
        if let Err(e) = result {
            log_warn!("Valve {} rejected for id {}: {}", want_str(want_open), id, e);
            if id == INTERNAL_ID {
                let mut extra = json!({"reason": e.log_reason()});
                if let ValveError::SendFailed(status) = e {
                    extra["zstatus"] = json!(status.to_string());
                }
                self.emit(Record::log("ZB", "valve_reject", extra));
            } else {
                self.emit_ack(id, false, &e.to_string());
            }
        }
        result
    }

    fn submit_valve_write(&mut self, id: u32, want_open: bool) -> Result<(), ValveError> {
        if self.stack.network_state() != NetworkState::Joined {
            return Err(ValveError::NotJoined);
        }
        if self.state.valve.is_pending() {
            return Err(ValveError::Busy);
        }

        let destination = self.state.valve.resolve_destination()?;
        let frame = OnOffFrame {
            open: want_open,
            source_endpoint: self.config.endpoints.control,
            destination_endpoint: self.state.valve.target.destination_endpoint,
        };

        let status = self.stack.send_on_off(destination, frame, self.config.transmit);
        if !status.is_success() {
            return Err(ValveError::SendFailed(status));
        }

        self.state.valve.pending = Some(ValveTransaction {
            correlation_id: id,
            desired_open: want_open,
            destination,
        });
        self.emit(Record::log(
            "ZB",
            "valve_queued",
            json!({"id": id, "path": destination.path_name(), "want": want_str(want_open)}),
        ));
        Ok(())
    }

    /// Final delivery status of an outbound frame
    pub fn on_message_sent(&mut self, cluster_id: u16, source_endpoint: u8, status: StackStatus) {
        if cluster_id != OnOffFrame::CLUSTER_ID || source_endpoint != self.config.endpoints.control {
            return;
        }
        let Some(tx) = self.state.valve.pending.take() else {
            return;
        };

        let ok = status.is_success();
        if ok {
            self.state.valve.confirmed_open = tx.desired_open;
            log_info!("Valve confirmed {}", self.state.valve.state_str());
        }
        if tx.correlation_id != INTERNAL_ID {
            self.emit_ack_status(tx.correlation_id, ok, if ok { "done" } else { "tx_failed" }, status);
        }

        self.emit(Record::log(
            "ZB",
            if ok { "tx_done" } else { "tx_fail" },
            json!({
                "id": tx.correlation_id,
                "zstatus": status.to_string(),
                "path": tx.destination.path_name(),
                "dst": hex16(tx.destination.raw()),
                "want": want_str(tx.desired_open),
            }),
        ));

        self.emit_data();
    }

    /// Hysteresis, run after telemetry updates and mode changes
    pub fn run_auto_control(&mut self) {
        if self.state.mode != ControlMode::Auto {
            return;
        }
        if let Some(want_open) = self.state.valve.hysteresis_action(self.state.telemetry.flow) {
            // rejections are logged inside
            let _ = self.start_valve_transaction(INTERNAL_ID, want_open);
        }
    }

    /// Record a new actuator target. Nothing changes if the id is bad.
    pub fn pair_valve(
        &mut self,
        eui64: &str,
        node_id: u16,
        binding_slot: u8,
        destination_endpoint: u8,
    ) -> Result<(), StableIdError> {
        let stable_id = StableId::parse(eui64)?;

        self.state.valve.target = ActuatorTarget {
            known: true,
            stable_id,
            short_address: (node_id != NULL_NODE_ID).then_some(node_id),
            destination_endpoint,
            binding_slot,
        };
        let status = self.stack.set_binding_remote_node(binding_slot, node_id);
        log_info!(
            "Valve paired eui64={} node={} slot={} status={}",
            stable_id,
            hex16(node_id),
            binding_slot,
            status
        );
        Ok(())
    }

    /// Follow the paired valve to its new short address after a rejoin
    pub fn on_device_joined(&mut self, eui64: StableId, node_id: u16) {
        let target = self.state.valve.target;
        if !target.known || target.stable_id != eui64 {
            return;
        }

        self.state.valve.target.short_address = (node_id != NULL_NODE_ID).then_some(node_id);
        let status = self.stack.set_binding_remote_node(target.binding_slot, node_id);
        self.emit(Record::log(
            "ZB",
            "valve_nodeid_update",
            json!({"node_id": hex16(node_id), "status": status.code()}),
        ));
        self.emit_info();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn control() -> ValveControl {
        ValveControl::new(&ValveConfig::default())
    }

    #[test]
    fn test_auto_path_prefers_direct() {
        let mut valve = control();
        assert_eq!(valve.resolve_destination(), Ok(Destination::Binding(0)));
        valve.target.short_address = Some(0x1234);
        assert_eq!(valve.resolve_destination(), Ok(Destination::Direct(0x1234)));
    }

    #[test]
    fn test_forced_paths() {
        let mut valve = control();
        valve.path = PathPolicy::Direct;
        assert_eq!(valve.resolve_destination(), Err(ValveError::DirectRequiresNodeId));

        valve.path = PathPolicy::Binding;
        valve.target.short_address = Some(0x1234);
        valve.target.binding_slot = 3;
        assert_eq!(valve.resolve_destination(), Ok(Destination::Binding(3)));
    }

    #[test]
    fn test_hysteresis_band() {
        let mut valve = control();
        assert_eq!(valve.hysteresis_action(4), Some(true));
        assert_eq!(valve.hysteresis_action(5), None);
        assert_eq!(valve.hysteresis_action(100), None);

        valve.confirmed_open = true;
        assert_eq!(valve.hysteresis_action(60), None);
        assert_eq!(valve.hysteresis_action(61), Some(false));
        assert_eq!(valve.hysteresis_action(0), None);
    }

    #[test]
    fn test_reject_messages() {
        assert_eq!(ValveError::Busy.to_string(), "busy: tx_pending");
        assert_eq!(
            ValveError::SendFailed(StackStatus(0x66)).to_string(),
            "send_fail_immediate:0x66"
        );
        assert_eq!(ValveError::DirectRequiresNodeId.log_reason(), "direct_requires_node_id");
    }
}
