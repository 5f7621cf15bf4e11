// src/engine/mod.rs
//! Command & Telemetry Control Engine.
//!
//! All mutable coordinator state lives in one `EngineState`, owned by one
//! `Engine`. Every entry point (a command line, a tick, a stack event)
//! takes `&mut self` and the current millisecond clock, so nothing is
//! ever mutated concurrently. Work done by the engine is split across the
//! files of this module by concern, each adding an `impl` block.

pub mod buttons;
pub mod commands;
pub mod dispatcher;
pub mod network;
pub mod report;
pub mod telemetry;
pub mod valve;

use std::sync::Arc;

use crate::config::CoordinatorConfig;
use crate::log_debug;
use crate::stack::{RadioStack, StackEvent};
use crate::util::io::framer::{console_payload, LineFramer};
use crate::util::io::records::{Record, RecordSender};

pub use buttons::ButtonInputs;
pub use commands::{CommandError, Operation};
pub use dispatcher::CommandLedger;
pub use network::{NetworkCoordinator, PendingReform};
pub use report::ReportLedger;
pub use telemetry::{ReportUpdate, TelemetryState};
pub use valve::{ActuatorTarget, Thresholds, ValveControl, ValveError, ValveTransaction};

/// Sentinel correlation id for internally triggered actions
pub const INTERNAL_ID: u32 = 0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ControlMode {
    #[default]
    Manual,
    Auto,
}

impl ControlMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlMode::Manual => "manual",
            ControlMode::Auto => "auto",
        }
    }
}

/// Everything the coordinator knows, in one place
#[derive(Debug, Clone)]
pub struct EngineState {
    pub mode: ControlMode,
    pub gateway_enabled: bool,
    pub telemetry: TelemetryState,
    pub valve: ValveControl,
    pub network: NetworkCoordinator,
    pub ledger: CommandLedger,
    pub reports: ReportLedger,
}

impl EngineState {
    pub fn new(config: &CoordinatorConfig) -> Self {
        Self {
            mode: ControlMode::Manual,
            gateway_enabled: true,
            telemetry: TelemetryState::default(),
            valve: ValveControl::new(&config.valve),
            network: NetworkCoordinator::new(config.network),
            ledger: CommandLedger::default(),
            reports: ReportLedger::default(),
        }
    }
}

pub struct Engine<S: RadioStack> {
    config: CoordinatorConfig,
    state: EngineState,
    stack: S,
    out: RecordSender,
    framer: LineFramer,
    buttons: Arc<ButtonInputs>,
    now_ms: u64,
}

impl<S: RadioStack> Engine<S> {
    pub fn new(config: CoordinatorConfig, stack: S, out: RecordSender) -> Self {
        let state = EngineState::new(&config);
        let framer = LineFramer::new(config.port.max_line);
        let buttons = Arc::new(ButtonInputs::new(
            config.timing.long_press_ms,
            config.timing.join_button_debounce_ms,
        ));
        Self {
            config,
            state,
            stack,
            out,
            framer,
            buttons,
            now_ms: 0,
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn stack(&self) -> &S {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut S {
        &mut self.stack
    }

    /// Handle for producers outside the tick context
    pub fn buttons(&self) -> Arc<ButtonInputs> {
        self.buttons.clone()
    }

    pub fn gateway_enabled(&self) -> bool {
        self.state.gateway_enabled
    }

    /// Emit the boot-time status pair
    pub fn start(&mut self, now_ms: u64) {
        self.now_ms = now_ms;
        self.state.reports.mark_started(now_ms);
        self.emit_info();
        self.emit_data();
    }

    /// Bytes from the command port. While the gateway is off only
    /// `json <payload>` console lines get through.
    pub fn receive_bytes(&mut self, bytes: &[u8], now_ms: u64) {
        for line in self.framer.extend(bytes) {
            if let Some(payload) = console_payload(&line) {
                self.handle_console_json(payload, now_ms);
            } else if self.state.gateway_enabled {
                self.handle_line(&line, now_ms);
            } else {
                log_debug!("Gateway disabled, dropping {} byte line", line.len());
            }
        }
    }

    /// Timer work: deferred button actions, join window, periodic reports
    pub fn tick(&mut self, now_ms: u64) {
        self.now_ms = now_ms;
        self.service_buttons(now_ms);
        self.tick_join_window(now_ms);
        self.tick_reports(now_ms);
    }

    /// Drain every notification the stack has queued
    pub fn pump_stack_events(&mut self, now_ms: u64) -> usize {
        let mut handled = 0;
        while let Some(event) = self.stack.poll_event(now_ms) {
            self.handle_stack_event(event, now_ms);
            handled += 1;
        }
        handled
    }

    pub fn handle_stack_event(&mut self, event: StackEvent, now_ms: u64) {
        self.now_ms = now_ms;
        match event {
            StackEvent::MessageSent {
                cluster_id,
                source_endpoint,
                destination: _,
                status,
            } => self.on_message_sent(cluster_id, source_endpoint, status),
            StackEvent::StackStatus(change) => self.on_stack_status(change, now_ms),
            StackEvent::NetworkFormed { pan_id, channel } => {
                self.on_network_formed(pan_id, channel, now_ms)
            }
            StackEvent::DeviceJoined { eui64, node_id } => self.on_device_joined(eui64, node_id),
            StackEvent::AttributeReport {
                cluster_id,
                command_id,
                source,
                payload,
            } => self.on_attribute_report(cluster_id, command_id, source, &payload),
        }
    }

    pub(crate) fn emit(&self, record: Record) {
        log_debug!("-> {}", record);
        // receiver gone means we are shutting down
        let _ = self.out.send(record);
    }
}

impl<S: RadioStack + std::fmt::Debug> std::fmt::Debug for Engine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("state", &self.state)
            .field("stack", &self.stack)
            .field("now_ms", &self.now_ms)
            .finish()
    }
}
