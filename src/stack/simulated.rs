// src/stack/simulated.rs
//! In-process stand-in for the radio stack.
//!
//! Used by the host binary when no radio is attached, and by tests. With
//! `auto_events` on, every accepted request completes on its own (form
//! brings the network up, leave takes it down, sends are delivered).
//! With it off, tests drive completions by hand.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, VecDeque};

use crate::config::{NetworkConfig, TxOptions};
use crate::log_debug;
use crate::stack::{
    BindingEntry, Destination, LiveNetwork, NetworkState, OnOffFrame, RadioStack, StackEvent,
    StackStatus, StackStatusChange, BATTERY_HALF_PERCENT_ATTRIBUTE_ID, FLOW_ATTRIBUTE_ID,
    FLOW_MEASUREMENT_CLUSTER_ID, POWER_CONFIG_CLUSTER_ID, ZCL_INT16U_TYPE, ZCL_INT8U_TYPE,
    ZCL_REPORT_ATTRIBUTES_COMMAND_ID,
};
use crate::util::eui64::StableId;

const FLOW_CEILING: u16 = 200;
/// Oldest entries of `sent` and `forms` are dropped past this
pub const HISTORY_CAP: usize = 64;

fn push_capped<T>(history: &mut Vec<T>, item: T) {
    if history.len() >= HISTORY_CAP {
        history.remove(0);
    }
    history.push(item);
}

/// `attrId(le) type value(le)` for the flow measurement cluster
pub fn flow_report_payload(flow: u16) -> Vec<u8> {
    let mut payload = FLOW_ATTRIBUTE_ID.to_le_bytes().to_vec();
    payload.push(ZCL_INT16U_TYPE);
    payload.extend_from_slice(&flow.to_le_bytes());
    payload
}

/// `attrId(le) type value` for the power configuration cluster
pub fn battery_report_payload(half_percent: u8) -> Vec<u8> {
    let mut payload = BATTERY_HALF_PERCENT_ATTRIBUTE_ID.to_le_bytes().to_vec();
    payload.push(ZCL_INT8U_TYPE);
    payload.push(half_percent);
    payload
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentFrame {
    pub destination: Destination,
    pub frame: OnOffFrame,
    pub options: TxOptions,
}

/// Remote valve the simulation pretends is out there
#[derive(Debug, Clone, Copy)]
struct SimulatedValve {
    eui64: StableId,
    node_id: u16,
    open: bool,
    flow: u16,
    battery_half: u8,
}

#[derive(Debug)]
pub struct SimulatedStack {
    state: NetworkState,
    live: Option<LiveNetwork>,
    node_id: u16,
    eui64: StableId,
    events: VecDeque<StackEvent>,
    pub auto_events: bool,

    /// Immediate statuses returned by the next requests
    pub send_status: StackStatus,
    pub form_status: StackStatus,
    pub leave_status: StackStatus,
    pub binding_status: StackStatus,

    /// Recent submissions, newest last
    pub sent: Vec<SentFrame>,
    pub forms: Vec<NetworkConfig>,
    pub leaves: usize,
    pub join_opens: usize,
    pub join_closes: usize,
    pub bindings: HashMap<u8, BindingEntry>,
    pub binding_remote_nodes: HashMap<u8, u16>,

    pending_form: Option<NetworkConfig>,
    in_flight: VecDeque<SentFrame>,

    valve: Option<SimulatedValve>,
    telemetry_interval_ms: Option<u64>,
    last_report_ms: u64,
    rng: StdRng,
}

impl Default for SimulatedStack {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedStack {
    pub fn new() -> Self {
        Self {
            state: NetworkState::NoNetwork,
            live: None,
            node_id: 0x0000,
            eui64: StableId::from_le_bytes([0x01, 0x00, 0x00, 0xFE, 0xFF, 0x6F, 0x0D, 0x00]),
            events: VecDeque::new(),
            auto_events: false,
            send_status: StackStatus::SUCCESS,
            form_status: StackStatus::SUCCESS,
            leave_status: StackStatus::SUCCESS,
            binding_status: StackStatus::SUCCESS,
            sent: Vec::new(),
            forms: Vec::new(),
            leaves: 0,
            join_opens: 0,
            join_closes: 0,
            bindings: HashMap::new(),
            binding_remote_nodes: HashMap::new(),
            pending_form: None,
            in_flight: VecDeque::new(),
            valve: None,
            telemetry_interval_ms: None,
            last_report_ms: 0,
            rng: StdRng::from_entropy(),
        }
    }

    /// Requests complete on their own
    pub fn autonomous() -> Self {
        Self {
            auto_events: true,
            ..Self::new()
        }
    }

    /// Already joined with `config`, as after a warm boot
    pub fn joined(config: NetworkConfig) -> Self {
        let mut stack = Self::new();
        stack.state = NetworkState::Joined;
        stack.live = Some(live_from(config));
        stack
    }

    /// Attach a simulated valve that joins after the network forms and
    /// reports flow/battery every `interval_ms`.
    pub fn with_valve(mut self, eui64: StableId, node_id: u16, interval_ms: u64, seed: Option<u64>) -> Self {
        self.valve = Some(SimulatedValve {
            eui64,
            node_id,
            open: false,
            flow: 20,
            battery_half: 200,
        });
        self.telemetry_interval_ms = Some(interval_ms);
        if let Some(seed) = seed {
            self.rng = StdRng::seed_from_u64(seed);
        }
        self
    }

    pub fn push_event(&mut self, event: StackEvent) {
        self.events.push_back(event);
    }

    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    pub fn last_sent(&self) -> Option<&SentFrame> {
        self.sent.last()
    }

    /// Finish the oldest in-flight send with `status`
    pub fn complete_send(&mut self, status: StackStatus) -> bool {
        let Some(sent) = self.in_flight.pop_front() else {
            return false;
        };
        if status.is_success() {
            if let Some(valve) = self.valve.as_mut() {
                valve.open = sent.frame.open;
            }
        }
        self.events.push_back(StackEvent::MessageSent {
            cluster_id: OnOffFrame::CLUSTER_ID,
            source_endpoint: sent.frame.source_endpoint,
            destination: sent.destination,
            status,
        });
        true
    }

    /// Bring up the network requested by the last accepted form
    pub fn complete_form(&mut self) -> bool {
        let Some(config) = self.pending_form.take() else {
            return false;
        };
        self.state = NetworkState::Joined;
        self.live = Some(live_from(config));
        self.events.push_back(StackEvent::StackStatus(StackStatusChange::NetworkUp));
        self.events.push_back(StackEvent::NetworkFormed {
            pan_id: config.pan_id,
            channel: config.channel,
        });
        if let Some(valve) = self.valve {
            self.events.push_back(StackEvent::DeviceJoined {
                eui64: valve.eui64,
                node_id: valve.node_id,
            });
        }
        true
    }

    /// Finish an accepted leave. Frames still in flight fail first.
    pub fn complete_leave(&mut self) -> bool {
        if self.state != NetworkState::Leaving {
            return false;
        }
        self.state = NetworkState::NoNetwork;
        self.live = None;
        while self.complete_send(StackStatus::NETWORK_DOWN) {}
        self.events.push_back(StackEvent::StackStatus(StackStatusChange::NetworkDown));
        true
    }

    fn generate_reports(&mut self, now_ms: u64) {
        let Some(interval) = self.telemetry_interval_ms else {
            return;
        };
        if self.state != NetworkState::Joined || now_ms.saturating_sub(self.last_report_ms) < interval {
            return;
        }
        let Some(valve) = self.valve.as_mut() else {
            return;
        };
        self.last_report_ms = now_ms;

        let step: u16 = self.rng.gen_range(3..12);
        valve.flow = if valve.open {
            valve.flow.saturating_add(step).min(FLOW_CEILING)
        } else {
            valve.flow.saturating_sub(step)
        };
        if self.rng.gen_bool(0.02) {
            valve.battery_half = valve.battery_half.saturating_sub(1);
        }

        log_debug!("Simulated valve report flow={} battery_half={}", valve.flow, valve.battery_half);

        let source = valve.node_id;
        self.events.push_back(StackEvent::AttributeReport {
            cluster_id: FLOW_MEASUREMENT_CLUSTER_ID,
            command_id: ZCL_REPORT_ATTRIBUTES_COMMAND_ID,
            source,
            payload: flow_report_payload(valve.flow),
        });
        self.events.push_back(StackEvent::AttributeReport {
            cluster_id: POWER_CONFIG_CLUSTER_ID,
            command_id: ZCL_REPORT_ATTRIBUTES_COMMAND_ID,
            source,
            payload: battery_report_payload(valve.battery_half),
        });
    }
}

fn live_from(config: NetworkConfig) -> LiveNetwork {
    LiveNetwork {
        pan_id: config.pan_id,
        channel: config.channel,
    }
}

impl RadioStack for SimulatedStack {
    fn network_state(&self) -> NetworkState {
        self.state
    }

    fn live_network(&self) -> Option<LiveNetwork> {
        self.live
    }

    fn local_node_id(&self) -> u16 {
        self.node_id
    }

    fn local_eui64(&self) -> StableId {
        self.eui64
    }

    fn send_on_off(&mut self, destination: Destination, frame: OnOffFrame, options: TxOptions) -> StackStatus {
        let sent = SentFrame { destination, frame, options };
        push_capped(&mut self.sent, sent);
        if !self.send_status.is_success() {
            return self.send_status;
        }
        self.in_flight.push_back(sent);
        if self.auto_events {
            self.complete_send(StackStatus::SUCCESS);
        }
        StackStatus::SUCCESS
    }

    fn form_network(&mut self, config: NetworkConfig) -> StackStatus {
        push_capped(&mut self.forms, config);
        if !self.form_status.is_success() {
            return self.form_status;
        }
        if self.state != NetworkState::NoNetwork {
            return StackStatus::INVALID_CALL;
        }
        self.state = NetworkState::Joining;
        self.pending_form = Some(config);
        if self.auto_events {
            self.complete_form();
        }
        StackStatus::SUCCESS
    }

    fn leave_network(&mut self) -> StackStatus {
        self.leaves += 1;
        if !self.leave_status.is_success() {
            return self.leave_status;
        }
        self.state = NetworkState::Leaving;
        if self.auto_events {
            self.complete_leave();
        }
        StackStatus::SUCCESS
    }

    fn open_for_joining(&mut self) -> StackStatus {
        if self.state != NetworkState::Joined {
            return StackStatus::INVALID_CALL;
        }
        self.join_opens += 1;
        StackStatus::SUCCESS
    }

    fn close_for_joining(&mut self) -> StackStatus {
        self.join_closes += 1;
        StackStatus::SUCCESS
    }

    fn set_binding(&mut self, index: u8, entry: BindingEntry) -> StackStatus {
        if self.binding_status.is_success() {
            self.bindings.insert(index, entry);
        }
        self.binding_status
    }

    fn set_binding_remote_node(&mut self, index: u8, node_id: u16) -> StackStatus {
        self.binding_remote_nodes.insert(index, node_id);
        StackStatus::SUCCESS
    }

    fn poll_event(&mut self, now_ms: u64) -> Option<StackEvent> {
        if self.events.is_empty() {
            self.generate_reports(now_ms);
        }
        self.events.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(open: bool) -> OnOffFrame {
        OnOffFrame {
            open,
            source_endpoint: 2,
            destination_endpoint: 1,
        }
    }

    #[test]
    fn test_autonomous_form_brings_network_up() {
        let mut stack = SimulatedStack::autonomous();
        assert_eq!(stack.form_network(NetworkConfig::default()), StackStatus::SUCCESS);
        assert_eq!(stack.network_state(), NetworkState::Joined);
        assert_eq!(
            stack.poll_event(0),
            Some(StackEvent::StackStatus(StackStatusChange::NetworkUp))
        );
        assert!(matches!(stack.poll_event(0), Some(StackEvent::NetworkFormed { pan_id: 0xBEEF, channel: 11 })));
        assert_eq!(stack.poll_event(0), None);
    }

    #[test]
    fn test_manual_send_completion() {
        let mut stack = SimulatedStack::joined(NetworkConfig::default());
        let status = stack.send_on_off(Destination::Direct(0x1234), frame(true), TxOptions::default());
        assert!(status.is_success());
        assert_eq!(stack.pending_events(), 0);

        assert!(stack.complete_send(StackStatus::DELIVERY_FAILED));
        match stack.poll_event(0) {
            Some(StackEvent::MessageSent { status, source_endpoint, .. }) => {
                assert_eq!(status, StackStatus::DELIVERY_FAILED);
                assert_eq!(source_endpoint, 2);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(!stack.complete_send(StackStatus::SUCCESS));
    }

    #[test]
    fn test_failed_submit_is_not_in_flight() {
        let mut stack = SimulatedStack::joined(NetworkConfig::default());
        stack.send_status = StackStatus::NETWORK_BUSY;
        let status = stack.send_on_off(Destination::Binding(0), frame(false), TxOptions::default());
        assert_eq!(status, StackStatus::NETWORK_BUSY);
        assert!(!stack.complete_send(StackStatus::SUCCESS));
        assert_eq!(stack.sent.len(), 1);
    }

    #[test]
    fn test_leave_fails_frames_in_flight() {
        let mut stack = SimulatedStack::joined(NetworkConfig::default());
        stack.send_on_off(Destination::Binding(0), frame(true), TxOptions::default());
        assert!(stack.leave_network().is_success());
        assert!(stack.complete_leave());

        match stack.poll_event(0) {
            Some(StackEvent::MessageSent { status, .. }) => assert_eq!(status, StackStatus::NETWORK_DOWN),
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(
            stack.poll_event(0),
            Some(StackEvent::StackStatus(StackStatusChange::NetworkDown))
        );
        assert!(!stack.complete_send(StackStatus::SUCCESS));
    }

    #[test]
    fn test_history_is_capped() {
        let mut stack = SimulatedStack::autonomous();
        for i in 0..(HISTORY_CAP + 10) {
            let open = i % 2 == 0;
            stack.send_on_off(Destination::Direct(i as u16), frame(open), TxOptions::default());
        }
        assert_eq!(stack.sent.len(), HISTORY_CAP);
        assert_eq!(stack.last_sent().unwrap().destination, Destination::Direct((HISTORY_CAP + 9) as u16));
        assert_eq!(stack.sent[0].destination, Destination::Direct(10));
    }

    #[test]
    fn test_simulated_valve_reports_after_interval() {
        let eui = StableId::parse("000D6FFFFE0A0B0C").unwrap();
        let mut stack = SimulatedStack::joined(NetworkConfig::default()).with_valve(eui, 0x1A2B, 1000, Some(7));
        assert_eq!(stack.poll_event(500), None);

        match stack.poll_event(1000) {
            Some(StackEvent::AttributeReport { cluster_id, payload, .. }) => {
                assert_eq!(cluster_id, FLOW_MEASUREMENT_CLUSTER_ID);
                assert_eq!(payload.len(), 5);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(matches!(
            stack.poll_event(1000),
            Some(StackEvent::AttributeReport { cluster_id: POWER_CONFIG_CLUSTER_ID, .. })
        ));
        assert_eq!(stack.poll_event(1500), None);
    }

    #[test]
    fn test_report_payload_encoding() {
        assert_eq!(flow_report_payload(0x0123), vec![0x00, 0x00, 0x21, 0x23, 0x01]);
        assert_eq!(battery_report_payload(150), vec![0x21, 0x00, 0x20, 150]);
    }
}
