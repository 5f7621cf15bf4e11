// src/engine/buttons.rs
//! Operator buttons.
//!
//! Press/release notifications may come from any thread. They only set
//! atomic pending flags; the engine drains them on its next tick, so no
//! coordinator state is touched from the notifying context.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde_json::json;

use crate::engine::Engine;
use crate::stack::{NetworkState, RadioStack};
use crate::util::io::records::Record;
use crate::log_info;

const NEVER: u64 = u64::MAX;

#[derive(Debug)]
pub struct ButtonInputs {
    long_press_ms: u64,
    join_debounce_ms: u64,
    pb0_pressed_at: AtomicU64,
    pb0_short: AtomicBool,
    pb0_long: AtomicBool,
    pb1_last_trigger: AtomicU64,
    pb1_pending: AtomicBool,
}

/// Actions drained in one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ButtonActions {
    pub toggle_gateway: bool,
    pub request_form: bool,
    pub open_join: bool,
}

impl ButtonInputs {
    pub fn new(long_press_ms: u64, join_debounce_ms: u64) -> Self {
        Self {
            long_press_ms,
            join_debounce_ms,
            pb0_pressed_at: AtomicU64::new(NEVER),
            pb0_short: AtomicBool::new(false),
            pb0_long: AtomicBool::new(false),
            pb1_last_trigger: AtomicU64::new(NEVER),
            pb1_pending: AtomicBool::new(false),
        }
    }

    pub fn pb0_pressed(&self, now_ms: u64) {
        self.pb0_pressed_at.store(now_ms, Ordering::SeqCst);
    }

    /// Classifies the hold; a release without a press is ignored
    pub fn pb0_released(&self, now_ms: u64) {
        let pressed_at = self.pb0_pressed_at.swap(NEVER, Ordering::SeqCst);
        if pressed_at == NEVER {
            return;
        }
        if now_ms.saturating_sub(pressed_at) >= self.long_press_ms {
            self.pb0_long.store(true, Ordering::SeqCst);
        } else {
            self.pb0_short.store(true, Ordering::SeqCst);
        }
    }

    /// Presses inside the debounce interval are dropped here
    pub fn pb1_pressed(&self, now_ms: u64) {
        let last = self.pb1_last_trigger.load(Ordering::SeqCst);
        if last != NEVER && now_ms.saturating_sub(last) < self.join_debounce_ms {
            return;
        }
        self.pb1_last_trigger.store(now_ms, Ordering::SeqCst);
        self.pb1_pending.store(true, Ordering::SeqCst);
    }

    pub fn take(&self) -> ButtonActions {
        ButtonActions {
            toggle_gateway: self.pb0_long.swap(false, Ordering::SeqCst),
            request_form: self.pb0_short.swap(false, Ordering::SeqCst),
            open_join: self.pb1_pending.swap(false, Ordering::SeqCst),
        }
    }
}

impl<S: RadioStack> Engine<S> {
    pub fn service_buttons(&mut self, now_ms: u64) {
        let actions = self.buttons.take();

        if actions.toggle_gateway {
            self.state.gateway_enabled = !self.state.gateway_enabled;
            log_info!("Gateway toggled by button, enabled={}", self.state.gateway_enabled);
            self.emit(Record::log(
                "BTN",
                "uart_gateway",
                json!({"enabled": self.state.gateway_enabled, "src": "pb0_long"}),
            ));
        }

        if actions.request_form {
            let config = self.state.network.config;
            let _ = self.request_form(config, "pb0", false);
        }

        if actions.open_join {
            if self.stack.network_state() != NetworkState::Joined {
                self.emit(Record::log("BTN", "not_in_network", json!({"src": "pb1"})));
            } else {
                let _ = self.open_join_window("pb1", now_ms);
            }
        }
    }
}
