// src/stack/mod.rs
//! Radio stack collaborator.
//!
//! The mesh stack is external. The engine only needs a handful of
//! fire-and-forget requests, each answering with an immediate submit
//! status, and a queue of asynchronous notifications that it drains from
//! its own tick context.

pub mod simulated;

use std::fmt;

use crate::config::{NetworkConfig, TxOptions};
use crate::util::eui64::StableId;

pub use simulated::SimulatedStack;

pub const ON_OFF_CLUSTER_ID: u16 = 0x0006;
pub const POWER_CONFIG_CLUSTER_ID: u16 = 0x0001;
pub const FLOW_MEASUREMENT_CLUSTER_ID: u16 = 0x0404;

pub const ZCL_REPORT_ATTRIBUTES_COMMAND_ID: u8 = 0x0A;
pub const ZCL_DEFAULT_RESPONSE_COMMAND_ID: u8 = 0x0B;

pub const FLOW_ATTRIBUTE_ID: u16 = 0x0000;
pub const BATTERY_HALF_PERCENT_ATTRIBUTE_ID: u16 = 0x0021;

pub const ZCL_INT8U_TYPE: u8 = 0x20;
pub const ZCL_INT16U_TYPE: u8 = 0x21;

pub const NULL_NODE_ID: u16 = 0xFFFF;

/// Immediate or final status code reported by the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StackStatus(pub u8);

impl StackStatus {
    pub const SUCCESS: StackStatus = StackStatus(0x00);
    pub const DELIVERY_FAILED: StackStatus = StackStatus(0x66);
    pub const NETWORK_BUSY: StackStatus = StackStatus(0xA1);
    pub const INVALID_CALL: StackStatus = StackStatus(0x70);
    pub const NETWORK_DOWN: StackStatus = StackStatus(0x91);

    pub fn is_success(&self) -> bool {
        *self == Self::SUCCESS
    }

    pub fn code(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for StackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkState {
    NoNetwork,
    Joining,
    Joined,
    JoinedNoParent,
    Leaving,
}

impl NetworkState {
    /// Numeric code used in `@INFO.net_state`
    pub fn code(&self) -> u8 {
        match self {
            NetworkState::NoNetwork => 0,
            NetworkState::Joining => 1,
            NetworkState::Joined => 2,
            NetworkState::JoinedNoParent => 3,
            NetworkState::Leaving => 4,
        }
    }
}

/// Where a unicast write goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Direct(u16),
    Binding(u8),
}

impl Destination {
    pub fn path_name(&self) -> &'static str {
        match self {
            Destination::Direct(_) => "direct",
            Destination::Binding(_) => "binding",
        }
    }

    /// Short address or binding slot, widened for logging
    pub fn raw(&self) -> u16 {
        match self {
            Destination::Direct(node) => *node,
            Destination::Binding(slot) => *slot as u16,
        }
    }
}

/// One On/Off command frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnOffFrame {
    pub open: bool,
    pub source_endpoint: u8,
    pub destination_endpoint: u8,
}

impl OnOffFrame {
    pub const CLUSTER_ID: u16 = ON_OFF_CLUSTER_ID;

    /// ZCL command id: On opens the valve, Off closes it
    pub fn command_id(&self) -> u8 {
        if self.open { 0x01 } else { 0x00 }
    }
}

/// Unicast binding-table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingEntry {
    pub local_endpoint: u8,
    pub remote_endpoint: u8,
    pub cluster_id: u16,
    pub remote: StableId,
}

/// Network parameters as the stack reports them while joined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveNetwork {
    pub pan_id: u16,
    pub channel: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackStatusChange {
    NetworkUp,
    NetworkDown,
    Other(u8),
}

impl StackStatusChange {
    pub fn code(&self) -> u8 {
        match self {
            StackStatusChange::NetworkUp => 0x90,
            StackStatusChange::NetworkDown => 0x91,
            StackStatusChange::Other(code) => *code,
        }
    }
}

/// Asynchronous notifications, drained by the engine once per tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackEvent {
    /// Final delivery status of an outbound frame
    MessageSent {
        cluster_id: u16,
        source_endpoint: u8,
        destination: Destination,
        status: StackStatus,
    },
    StackStatus(StackStatusChange),
    NetworkFormed { pan_id: u16, channel: u8 },
    DeviceJoined { eui64: StableId, node_id: u16 },
    AttributeReport {
        cluster_id: u16,
        command_id: u8,
        source: u16,
        payload: Vec<u8>,
    },
}

/// Requests the engine makes of the radio stack. Every request returns
/// only its immediate submit status; outcomes arrive later as events.
pub trait RadioStack {
    fn network_state(&self) -> NetworkState;

    /// `None` unless joined
    fn live_network(&self) -> Option<LiveNetwork>;

    fn local_node_id(&self) -> u16;

    fn local_eui64(&self) -> StableId;

    fn send_on_off(
        &mut self,
        destination: Destination,
        frame: OnOffFrame,
        options: TxOptions,
    ) -> StackStatus;

    fn form_network(&mut self, config: NetworkConfig) -> StackStatus;

    fn leave_network(&mut self) -> StackStatus;

    fn open_for_joining(&mut self) -> StackStatus;

    fn close_for_joining(&mut self) -> StackStatus;

    fn set_binding(&mut self, index: u8, entry: BindingEntry) -> StackStatus;

    fn set_binding_remote_node(&mut self, index: u8, node_id: u16) -> StackStatus;

    /// Next pending notification; `now_ms` lets simulated stacks advance
    fn poll_event(&mut self, now_ms: u64) -> Option<StackEvent>;
}
