// src/engine/telemetry.rs
//! Inbound attribute reports: flow and battery.

use serde_json::json;

use crate::engine::Engine;
use crate::stack::{
    RadioStack, BATTERY_HALF_PERCENT_ATTRIBUTE_ID, FLOW_ATTRIBUTE_ID, FLOW_MEASUREMENT_CLUSTER_ID,
    ON_OFF_CLUSTER_ID, POWER_CONFIG_CLUSTER_ID, ZCL_DEFAULT_RESPONSE_COMMAND_ID, ZCL_INT16U_TYPE,
    ZCL_INT8U_TYPE, ZCL_REPORT_ATTRIBUTES_COMMAND_ID,
};
use crate::util::io::records::{hex16, Record};
use crate::log_debug;

/// Latest values, as last reported
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TelemetryState {
    pub flow: u16,
    pub battery_percent: u8,
}

/// What one report carried
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportUpdate {
    pub flow: Option<u16>,
    pub battery_half_percent: Option<u8>,
    /// Decoding stopped at an unrecognised or truncated record
    pub desync: bool,
}

impl ReportUpdate {
    pub fn is_update(&self) -> bool {
        self.flow.is_some() || self.battery_half_percent.is_some()
    }
}

fn u16le(bytes: &[u8]) -> u16 {
    u16::from_le_bytes([bytes[0], bytes[1]])
}

/// Walk `attrId:u16le, type:u8, value` records. The first record that is
/// not recognised for this cluster, or whose value is cut short, ends the
/// walk; earlier values are kept.
pub fn decode_report(cluster_id: u16, payload: &[u8]) -> ReportUpdate {
    let mut update = ReportUpdate::default();
    let mut i = 0;

    while i + 3 <= payload.len() {
        let attribute_id = u16le(&payload[i..]);
        let data_type = payload[i + 2];
        i += 3;

        match (cluster_id, attribute_id, data_type) {
            (FLOW_MEASUREMENT_CLUSTER_ID, FLOW_ATTRIBUTE_ID, ZCL_INT16U_TYPE) => {
                if i + 2 > payload.len() {
                    update.desync = true;
                    break;
                }
                update.flow = Some(u16le(&payload[i..]));
                i += 2;
            }
            (POWER_CONFIG_CLUSTER_ID, BATTERY_HALF_PERCENT_ATTRIBUTE_ID, ZCL_INT8U_TYPE) => {
                let Some(half) = payload.get(i) else {
                    update.desync = true;
                    break;
                };
                update.battery_half_percent = Some(*half);
                i += 1;
            }
            _ => {
                update.desync = true;
                break;
            }
        }
    }
    update
}

impl<S: RadioStack> Engine<S> {
    pub fn on_attribute_report(&mut self, cluster_id: u16, command_id: u8, source: u16, payload: &[u8]) {
        if command_id == ZCL_DEFAULT_RESPONSE_COMMAND_ID && cluster_id == ON_OFF_CLUSTER_ID {
            self.emit(Record::log(
                "ZB",
                "zcl_default_rsp",
                json!({"cluster": hex16(cluster_id), "src": hex16(source)}),
            ));
            return;
        }
        if command_id != ZCL_REPORT_ATTRIBUTES_COMMAND_ID {
            return;
        }

        let update = decode_report(cluster_id, payload);
        if update.desync {
            log_debug!(
                "Stopped decoding report from {} on cluster {}",
                hex16(source),
                hex16(cluster_id)
            );
        }
        if !update.is_update() {
            return;
        }

        if let Some(flow) = update.flow {
            self.state.telemetry.flow = flow;
        }
        if let Some(half) = update.battery_half_percent {
            self.state.telemetry.battery_percent = half / 2;
        }
        self.run_auto_control();
        self.emit_data();
    }
}
