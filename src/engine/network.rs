// src/engine/network.rs
//! Network Lifecycle Coordinator.
//!
//! A forced re-form while joined is two-phase: leave now, form later with
//! the configuration captured at request time, once the stack reports the
//! network down. Join windows close themselves after a fixed duration.

use serde_json::json;

use crate::config::NetworkConfig;
use crate::engine::Engine;
use crate::stack::{NetworkState, RadioStack, StackStatusChange};
use crate::util::io::records::{hex16, hex8, Record};
use crate::{log_info, log_warn};

/// Form request parked until the current network is gone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReform {
    pub config: NetworkConfig,
    pub source: String,
}

#[derive(Debug, Clone)]
pub struct NetworkCoordinator {
    /// Stored parameters, used by the next form request
    pub config: NetworkConfig,
    pub pending_reform: Option<PendingReform>,
    pub join_window_opened_at: Option<u64>,
}

impl NetworkCoordinator {
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            pending_reform: None,
            join_window_opened_at: None,
        }
    }

    pub fn join_window_open(&self) -> bool {
        self.join_window_opened_at.is_some()
    }

    /// True once the window has been open for at least `duration_ms`
    pub fn join_window_expired(&self, now_ms: u64, duration_ms: u64) -> bool {
        self.join_window_opened_at
            .is_some_and(|opened| now_ms.saturating_sub(opened) >= duration_ms)
    }
}

impl<S: RadioStack> Engine<S> {
    /// Returns whether the request was accepted by the stack. A forced
    /// request while joined only leaves; the form follows the down event.
    pub fn request_form(&mut self, config: NetworkConfig, source: &str, force: bool) -> bool {
        if self.stack.network_state() == NetworkState::NoNetwork {
            return self.start_form(config, source);
        }

        if !force {
            self.emit(Record::log(
                "NET",
                "form_skip",
                json!({"reason": "already_in_network", "src": source}),
            ));
            return false;
        }

        self.state.network.pending_reform = Some(PendingReform {
            config,
            source: source.to_string(),
        });
        let status = self.stack.leave_network();
        log_info!("Leaving network for re-form, requested by {}", source);
        self.emit(Record::log(
            "NET",
            "leave_req",
            json!({"zstatus": status.to_string(), "src": source}),
        ));
        if !status.is_success() {
            // no down event will follow
            self.state.network.pending_reform = None;
            log_warn!("Leave request from {} rejected with {}", source, status);
        }
        status.is_success()
    }

    fn start_form(&mut self, config: NetworkConfig, source: &str) -> bool {
        if self.stack.network_state() != NetworkState::NoNetwork {
            self.emit(Record::log(
                "NET",
                "form_skip",
                json!({"reason": "already_in_network", "src": source}),
            ));
            return false;
        }

        let status = self.stack.form_network(config);
        self.emit(Record::log(
            "NET",
            "form_start",
            json!({
                "zstatus": status.to_string(),
                "pan_id": hex16(config.pan_id),
                "ch": config.channel,
                "pwr": config.tx_power_dbm,
                "src": source,
            }),
        ));
        if !status.is_success() {
            log_warn!("Form request from {} rejected with {}", source, status);
        }
        status.is_success()
    }

    pub fn on_stack_status(&mut self, change: StackStatusChange, _now_ms: u64) {
        self.emit(Record::log(
            "NET",
            "stack_status",
            json!({"zstatus": hex8(change.code())}),
        ));

        match change {
            StackStatusChange::NetworkUp => self.emit_info(),
            StackStatusChange::NetworkDown => {
                // a window from the old network is gone with it
                self.state.network.join_window_opened_at = None;
                self.emit_info();
                if let Some(reform) = self.state.network.pending_reform.take() {
                    log_info!("Network down, forming as requested by {}", reform.source);
                    let _ = self.start_form(reform.config, &reform.source);
                }
            }
            StackStatusChange::Other(_) => {}
        }
    }

    pub fn on_network_formed(&mut self, pan_id: u16, channel: u8, now_ms: u64) {
        self.emit(Record::log(
            "NET",
            "formed",
            json!({"pan_id": hex16(pan_id), "ch": channel}),
        ));
        self.open_join_window("formed", now_ms);
        self.emit_info();
    }

    /// Permit joining and start the auto-close timer
    pub fn open_join_window(&mut self, source: &str, now_ms: u64) -> bool {
        let status = self.stack.open_for_joining();
        self.emit(Record::log(
            "NET",
            "open_join",
            json!({"zstatus": status.to_string(), "src": source}),
        ));
        if status.is_success() {
            self.state.network.join_window_opened_at = Some(now_ms);
        }
        status.is_success()
    }

    pub fn tick_join_window(&mut self, now_ms: u64) {
        let duration = self.config.timing.join_window_ms;
        if !self.state.network.join_window_expired(now_ms, duration) {
            return;
        }
        let status = self.stack.close_for_joining();
        self.emit(Record::log(
            "NET",
            "close_join",
            json!({"zstatus": status.to_string(), "after_ms": duration}),
        ));
        self.state.network.join_window_opened_at = None;
    }
}
