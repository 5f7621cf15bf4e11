// src/engine/report.rs
//! Outbound `@ACK`, `@DATA` and `@INFO` records, plus periodic reporting.

use serde_json::{json, Value};

use crate::engine::{ControlMode, Engine};
use crate::stack::{RadioStack, StackStatus};
use crate::util::io::records::{hex16, Record, RecordKind};

/// Values carried by the last periodic `@DATA`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DataSnapshot {
    flow: u16,
    battery_percent: u8,
    valve_open: bool,
    mode: ControlMode,
}

/// Timestamps and last-sent values for periodic reports
#[derive(Debug, Clone, Default)]
pub struct ReportLedger {
    started_at: u64,
    last_data: u64,
    last_forced: u64,
    last_heartbeat: u64,
    last_sent: Option<DataSnapshot>,
}

impl ReportLedger {
    pub fn mark_started(&mut self, now_ms: u64) {
        self.started_at = now_ms;
        self.last_data = now_ms;
        self.last_forced = now_ms;
        self.last_heartbeat = now_ms;
    }

    pub fn uptime_s(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.started_at) / 1000
    }
}

impl<S: RadioStack> Engine<S> {
    fn data_snapshot(&self) -> DataSnapshot {
        DataSnapshot {
            flow: self.state.telemetry.flow,
            battery_percent: self.state.telemetry.battery_percent,
            valve_open: self.state.valve.confirmed_open,
            mode: self.state.mode,
        }
    }

    fn ack_body(&self, id: u32, ok: bool, msg: &str) -> Value {
        json!({
            "id": id,
            "ok": ok,
            "msg": msg,
            "mode": self.state.mode.as_str(),
            "valve": self.state.valve.state_str(),
        })
    }

    pub fn emit_ack(&self, id: u32, ok: bool, msg: &str) {
        self.emit(Record::new(RecordKind::Ack, self.ack_body(id, ok, msg)));
    }

    /// Completion ack, carrying the final stack status
    pub fn emit_ack_status(&self, id: u32, ok: bool, msg: &str, status: StackStatus) {
        let mut body = self.ack_body(id, ok, msg);
        body["zstatus"] = json!(status.to_string());
        body["stage"] = json!("done");
        self.emit(Record::new(RecordKind::Ack, body));
    }

    pub fn emit_data(&self) {
        let valve = &self.state.valve;
        self.emit(Record::new(
            RecordKind::Data,
            json!({
                "flow": self.state.telemetry.flow,
                "valve": valve.state_str(),
                "battery": self.state.telemetry.battery_percent,
                "mode": self.state.mode.as_str(),
                "tx_pending": valve.is_pending(),
                "valve_path": valve.path.as_str(),
                "valve_node_id": hex16(valve.target.node_id()),
                "valve_known": valve.target.known,
            }),
        ));
    }

    pub fn emit_info(&self) {
        let stored = self.state.network.config;
        let (pan_id, channel) = match self.stack.live_network() {
            Some(live) => (live.pan_id, live.channel),
            None => (stored.pan_id, stored.channel),
        };
        let target = &self.state.valve.target;

        self.emit(Record::new(
            RecordKind::Info,
            json!({
                "node_id": hex16(self.stack.local_node_id()),
                "eui64": self.stack.local_eui64().to_string(),
                "pan_id": hex16(pan_id),
                "ch": channel,
                "tx_power": stored.tx_power_dbm,
                "net_state": self.stack.network_state().code(),
                "uart_gateway": self.state.gateway_enabled,
                "mode": self.state.mode.as_str(),
                "valve_path": self.state.valve.path.as_str(),
                "valve_known": target.known,
                "valve_eui64": target.stable_id.to_string(),
                "valve_node_id": hex16(target.node_id()),
                "bind_index": target.binding_slot,
                "uptime_s": self.state.reports.uptime_s(self.now_ms),
            }),
        ));
    }

    /// Periodic `@DATA` (on change, or forced) and `@INFO` heartbeat.
    /// Both stay quiet while the gateway is off.
    pub fn tick_reports(&mut self, now_ms: u64) {
        if !self.state.gateway_enabled {
            return;
        }
        let timing = self.config.timing;

        if now_ms.saturating_sub(self.state.reports.last_data) >= timing.data_interval_ms {
            self.state.reports.last_data = now_ms;

            let snapshot = self.data_snapshot();
            let changed = self.state.reports.last_sent != Some(snapshot);
            let forced =
                now_ms.saturating_sub(self.state.reports.last_forced) >= timing.data_force_interval_ms;

            if changed || forced {
                self.emit_data();
                self.state.reports.last_sent = Some(snapshot);
                if forced {
                    self.state.reports.last_forced = now_ms;
                }
            }
        }

        if now_ms.saturating_sub(self.state.reports.last_heartbeat) >= timing.heartbeat_interval_ms {
            self.state.reports.last_heartbeat = now_ms;
            self.emit_info();
        }
    }
}
