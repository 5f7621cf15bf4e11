// src/engine/dispatcher.rs
//! Command Dispatcher - one `@CMD` line in, exactly one `@ACK` out
//! (deferred for `valve_set`, none for dropped duplicates).

use serde_json::json;

use crate::config::{NetworkConfig, PathPolicy};
use crate::engine::commands::{CommandError, FollowUp, Operation, Reply};
use crate::engine::valve::Thresholds;
use crate::engine::{ControlMode, Engine};
use crate::stack::{BindingEntry, RadioStack, NULL_NODE_ID};
use crate::util::eui64::StableId;
use crate::util::io::fields::{FieldError, Fields, EUI64_CAPACITY, OP_CAPACITY, VALUE_CAPACITY};
use crate::util::io::framer::COMMAND_TAG;
use crate::util::io::records::{Record, RecordKind};
use crate::{log_debug, log_info};

/// Duplicate-id and per-operation debounce bookkeeping
#[derive(Debug, Clone, Default)]
pub struct CommandLedger {
    last_command: Option<(u32, u64)>,
    last_mode_set: Option<u64>,
    last_valve_set: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceClass {
    ModeSet,
    ValveSet,
}

impl CommandLedger {
    /// True when `id` repeats the last accepted id inside `window_ms`.
    /// Otherwise `id` becomes the new reference.
    pub fn is_duplicate(&mut self, id: u32, now_ms: u64, window_ms: u64) -> bool {
        if let Some((last_id, at)) = self.last_command {
            if last_id == id && now_ms.saturating_sub(at) < window_ms {
                return true;
            }
        }
        self.last_command = Some((id, now_ms));
        false
    }

    /// True when the class may run now; records the attempt if so
    pub fn pass_debounce(&mut self, class: DebounceClass, now_ms: u64, min_interval_ms: u64) -> bool {
        let slot = match class {
            DebounceClass::ModeSet => &mut self.last_mode_set,
            DebounceClass::ValveSet => &mut self.last_valve_set,
        };
        if let Some(at) = *slot {
            if now_ms.saturating_sub(at) < min_interval_ms {
                return false;
            }
        }
        *slot = Some(now_ms);
        true
    }
}

/// Missing keys take the default; anything present but unreadable is bad
fn optional<T>(value: Result<T, FieldError>, default: T, name: &'static str) -> Result<T, CommandError> {
    match value {
        Ok(v) => Ok(v),
        Err(FieldError::Missing(_)) => Ok(default),
        Err(_) => Err(CommandError::Bad(name)),
    }
}

/// Missing keys are reported as missing, anything else as bad
fn required<T>(value: Result<T, FieldError>, name: &'static str) -> Result<T, CommandError> {
    value.map_err(|e| match e {
        FieldError::Missing(_) => CommandError::Missing(name),
        _ => CommandError::Bad(name),
    })
}

fn narrow_u8(value: u32, name: &'static str) -> Result<u8, CommandError> {
    u8::try_from(value).map_err(|_| CommandError::Bad(name))
}

fn narrow_u16(value: u32, name: &'static str) -> Result<u16, CommandError> {
    u16::try_from(value).map_err(|_| CommandError::Bad(name))
}

impl<S: RadioStack> Engine<S> {
    /// `json <payload>` from the operator console, run as `@CMD <payload>`.
    /// Works with the gateway off, so it is the way back in.
    pub fn handle_console_json(&mut self, payload: &str, now_ms: u64) {
        if payload.is_empty() {
            self.emit(Record::log(
                "CMD",
                "cli_usage",
                json!({"msg": r#"json {"id":N,"op":"..."}"#}),
            ));
            return;
        }
        let line = format!("{} {}", COMMAND_TAG, payload);
        self.handle_line(&line, now_ms);
    }

    pub fn handle_line(&mut self, line: &str, now_ms: u64) {
        self.now_ms = now_ms;
        let Some(body) = line.strip_prefix(COMMAND_TAG) else {
            return;
        };
        let fields = Fields::new(body.trim_start());

        // 0 is what an id-less line gets
        let id = fields.uint("id").unwrap_or(0);

        if self
            .state
            .ledger
            .is_duplicate(id, now_ms, self.config.timing.dedup_window_ms)
        {
            log_debug!("Dropping duplicate command id {}", id);
            self.emit(Record::log("CMD", "duplicate", json!({"id": id, "ignored": true})));
            return;
        }

        let op = match fields.string("op", OP_CAPACITY) {
            Ok(op) => op,
            Err(_) => {
                self.emit_ack(id, false, &CommandError::Missing("op").to_string());
                return;
            }
        };

        let Some(operation) = Operation::from_name(&op) else {
            self.emit_ack(id, false, &CommandError::UnknownOp.to_string());
            return;
        };

        log_info!("Command id={} op={}", id, operation.name());

        match self.execute(operation, id, &fields, now_ms) {
            Ok(Reply::Ack(msg, follow_up)) => {
                self.emit_ack(id, true, msg);
                match follow_up {
                    FollowUp::None => {}
                    FollowUp::Info => self.emit_info(),
                    FollowUp::AutoControlAndData => {
                        self.run_auto_control();
                        self.emit_data();
                    }
                }
            }
            Ok(Reply::Handled) | Ok(Reply::Deferred) => {}
            Err(e) => self.emit_ack(id, false, &e.to_string()),
        }
    }

    fn execute(&mut self, op: Operation, id: u32, fields: &Fields, now_ms: u64) -> Result<Reply, CommandError> {
        match op {
            Operation::Info => {
                self.emit_info();
                Ok(Reply::Ack("info", FollowUp::None))
            }
            Operation::UartGatewaySet => self.cmd_uart_gateway_set(fields),
            Operation::BindSet => Ok(self.cmd_bind_set(id, fields)),
            Operation::ValveSet => self.cmd_valve_set(id, fields, now_ms),
            Operation::ThresholdSet => self.cmd_threshold_set(fields),
            Operation::ModeSet => self.cmd_mode_set(fields, now_ms),
            Operation::ValvePathSet => self.cmd_valve_path_set(fields),
            Operation::ValveTargetSet => self.cmd_valve_target_set(fields),
            Operation::ValvePair => self.cmd_valve_pair(fields),
            Operation::NetCfgSet => self.cmd_net_cfg_set(fields),
            Operation::NetForm => self.cmd_net_form(fields),
        }
    }

    fn cmd_uart_gateway_set(&mut self, fields: &Fields) -> Result<Reply, CommandError> {
        let enable = optional(fields.uint("enable"), 1, "enable")?;
        self.state.gateway_enabled = enable != 0;
        self.emit(Record::log(
            "SYS",
            "uart_gateway",
            json!({"enabled": self.state.gateway_enabled, "src": "uart"}),
        ));
        Ok(Reply::Ack("uart_gateway_set", FollowUp::None))
    }

    /// Binding acks carry the slot index instead of mode/valve
    fn cmd_bind_set(&mut self, id: u32, fields: &Fields) -> Reply {
        let (ok, index, msg) = match self.write_binding(fields) {
            Ok(index) => (true, index, "bind_set".to_string()),
            Err((index, e)) => (false, index, e.to_string()),
        };
        self.emit(Record::new(
            RecordKind::Ack,
            json!({"id": id, "ok": ok, "msg": msg, "index": index}),
        ));
        Reply::Handled
    }

    fn write_binding(&mut self, fields: &Fields) -> Result<u32, (u32, CommandError)> {
        let index = fields
            .uint("index")
            .map_err(|_| (0, CommandError::Missing("index")))?;
        let fail = |e: CommandError| (index, e);

        let src_ep = fields.uint("src_ep").map_err(|_| fail(CommandError::Missing("src_ep")))?;
        let dst_ep = fields.uint("dst_ep").map_err(|_| fail(CommandError::Missing("dst_ep")))?;

        let cluster = match fields.auto_base("cluster") {
            Ok(cluster) => narrow_u16(cluster, "cluster").map_err(fail)?,
            Err(FieldError::Missing(_)) => return Err(fail(CommandError::Missing("cluster"))),
            Err(_) => return Err(fail(CommandError::Bad("cluster"))),
        };

        let eui_text = fields
            .string("eui64", EUI64_CAPACITY)
            .map_err(|_| fail(CommandError::Missing("eui64")))?;
        let remote = StableId::parse(&eui_text).map_err(|_| fail(CommandError::Bad("eui64")))?;

        let slot = narrow_u8(index, "index").map_err(fail)?;
        let entry = BindingEntry {
            local_endpoint: narrow_u8(src_ep, "endpoint").map_err(fail)?,
            remote_endpoint: narrow_u8(dst_ep, "endpoint").map_err(fail)?,
            cluster_id: cluster,
            remote,
        };

        let status = self.stack.set_binding(slot, entry);
        self.emit(Record::log(
            "ZB",
            "bind_set",
            json!({"index": index, "cluster": format!("0x{:04X}", cluster), "zstatus": status.to_string()}),
        ));
        if status.is_success() {
            Ok(index)
        } else {
            Err(fail(CommandError::BindSetFailed))
        }
    }

    fn cmd_valve_set(&mut self, id: u32, fields: &Fields, now_ms: u64) -> Result<Reply, CommandError> {
        if !self.state.ledger.pass_debounce(DebounceClass::ValveSet, now_ms, self.config.timing.debounce_ms) {
            return Err(CommandError::Debounced);
        }
        if self.state.mode == ControlMode::Auto {
            return Err(CommandError::AutoMode);
        }

        let value = fields
            .string("value", VALUE_CAPACITY)
            .map_err(|_| CommandError::Missing("value"))?;
        let want_open = match value.as_str() {
            "open" => true,
            "closed" | "close" => false,
            _ => return Err(CommandError::BadValveValue),
        };

        // failures are acknowledged inside; success waits for completion
        let _ = self.start_valve_transaction(id, want_open);
        Ok(Reply::Deferred)
    }

    fn cmd_threshold_set(&mut self, fields: &Fields) -> Result<Reply, CommandError> {
        let close_th = match fields.uint("close_th") {
            Ok(v) => v,
            Err(FieldError::Overflow(_)) => return Err(CommandError::ThresholdTooBig),
            Err(_) => return Err(CommandError::Missing("close_th")),
        };
        let open_th = match fields.uint("open_th") {
            Ok(v) => v,
            Err(FieldError::Overflow(_)) => return Err(CommandError::ThresholdTooBig),
            Err(_) => 0,
        };

        if open_th >= close_th {
            return Err(CommandError::ThresholdOrder);
        }
        let (Ok(close_above), Ok(open_below)) = (u16::try_from(close_th), u16::try_from(open_th)) else {
            return Err(CommandError::ThresholdTooBig);
        };

        self.state.valve.thresholds = Thresholds {
            close_above,
            open_below,
        };
        Ok(Reply::Ack("threshold updated", FollowUp::AutoControlAndData))
    }

    fn cmd_mode_set(&mut self, fields: &Fields, now_ms: u64) -> Result<Reply, CommandError> {
        if !self.state.ledger.pass_debounce(DebounceClass::ModeSet, now_ms, self.config.timing.debounce_ms) {
            return Err(CommandError::Debounced);
        }
        let value = fields
            .string("value", VALUE_CAPACITY)
            .map_err(|_| CommandError::Missing("value"))?;
        self.state.mode = match value.as_str() {
            "auto" => ControlMode::Auto,
            "manual" => ControlMode::Manual,
            _ => return Err(CommandError::BadMode),
        };
        Ok(Reply::Ack("mode set", FollowUp::AutoControlAndData))
    }

    fn cmd_valve_path_set(&mut self, fields: &Fields) -> Result<Reply, CommandError> {
        let value = fields
            .string("value", VALUE_CAPACITY)
            .map_err(|_| CommandError::Missing("value"))?;
        let policy = PathPolicy::from_name(&value).ok_or(CommandError::BadPath)?;
        self.state.valve.path = policy;
        Ok(Reply::Ack("valve_path_set", FollowUp::Info))
    }

    fn cmd_valve_target_set(&mut self, fields: &Fields) -> Result<Reply, CommandError> {
        let node_id = narrow_u16(required(fields.any_uint("node_id"), "node_id")?, "node_id")?;
        let dst_ep = optional(fields.uint("dst_ep"), self.config.valve.default_endpoint as u32, "dst_ep")?;
        let dst_ep = narrow_u8(dst_ep, "dst_ep")?;

        let target = &mut self.state.valve.target;
        target.short_address = (node_id != NULL_NODE_ID).then_some(node_id);
        target.destination_endpoint = dst_ep;
        Ok(Reply::Ack("valve_target_set", FollowUp::Info))
    }

    fn cmd_valve_pair(&mut self, fields: &Fields) -> Result<Reply, CommandError> {
        let eui_text = fields
            .string("eui64", EUI64_CAPACITY)
            .map_err(|_| CommandError::Missing("eui64"))?;
        let node_id = narrow_u16(required(fields.any_uint("node_id"), "node_id")?, "node_id")?;
        let bind_index = narrow_u8(optional(fields.uint("bind_index"), 0, "bind_index")?, "bind_index")?;
        let dst_ep = optional(fields.uint("dst_ep"), self.config.valve.default_endpoint as u32, "dst_ep")?;
        let dst_ep = narrow_u8(dst_ep, "dst_ep")?;

        self.pair_valve(&eui_text, node_id, bind_index, dst_ep)
            .map_err(|_| CommandError::Bad("eui64"))?;
        Ok(Reply::Ack("valve_pair set", FollowUp::Info))
    }

    /// Reads pan/ch/power on top of the stored configuration
    fn network_fields(&self, fields: &Fields) -> Result<NetworkConfig, CommandError> {
        let current = self.state.network.config;

        let channel = optional(fields.any_uint("ch"), current.channel as u32, "channel")?;
        if !NetworkConfig::channel_valid(channel) {
            return Err(CommandError::Bad("channel"));
        }
        let pan_id = narrow_u16(optional(fields.any_uint("pan_id"), current.pan_id as u32, "pan_id")?, "pan_id")?;
        let tx_power = optional(fields.any_int("tx_power"), current.tx_power_dbm as i64, "tx_power")?;
        let tx_power_dbm = i8::try_from(tx_power).map_err(|_| CommandError::Bad("tx_power"))?;

        Ok(NetworkConfig {
            pan_id,
            channel: channel as u8,
            tx_power_dbm,
        })
    }

    fn cmd_net_cfg_set(&mut self, fields: &Fields) -> Result<Reply, CommandError> {
        let config = self.network_fields(fields)?;
        self.state.network.config = config;
        log_info!(
            "Network config updated pan=0x{:04X} ch={} pwr={}",
            config.pan_id,
            config.channel,
            config.tx_power_dbm
        );
        Ok(Reply::Ack("net cfg updated", FollowUp::None))
    }

    fn cmd_net_form(&mut self, fields: &Fields) -> Result<Reply, CommandError> {
        let config = self.network_fields(fields)?;
        let force = optional(fields.uint("force"), 0, "force")? != 0;
        if self.request_form(config, "uart", force) {
            Ok(Reply::Ack("net_form accepted", FollowUp::None))
        } else {
            Err(CommandError::NetFormRejected)
        }
    }
}
