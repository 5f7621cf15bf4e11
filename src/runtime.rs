// src/runtime.rs
//! Host runtime: one task owns the engine and multiplexes the command
//! port, the tick timer and the outbound record queue.

use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::time::{interval, Instant, MissedTickBehavior};

use crate::config::CoordinatorConfig;
use crate::engine::Engine;
use crate::error::Result;
use crate::stack::{RadioStack, SimulatedStack};
use crate::util::eui64::StableId;
use crate::util::io::records::record_channel;
use crate::util::io::serial::{write_record, CommandPort};
use crate::{log_debug, log_info, log_warn};

/// Identity of the valve the simulated stack brings along
pub const SIMULATED_VALVE_EUI64: StableId =
    StableId::from_le_bytes([0x0C, 0x0B, 0x0A, 0xFE, 0xFF, 0x6F, 0x0D, 0x00]);
pub const SIMULATED_VALVE_NODE_ID: u16 = 0x1A2B;

const READ_CHUNK: usize = 256;

pub struct Runtime {
    config: CoordinatorConfig,
}

impl Runtime {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self { config }
    }

    /// Stack used when no radio is attached
    pub fn simulated_stack(&self) -> SimulatedStack {
        SimulatedStack::autonomous().with_valve(
            SIMULATED_VALVE_EUI64,
            SIMULATED_VALVE_NODE_ID,
            self.config.simulation.telemetry_interval_ms,
            self.config.simulation.seed,
        )
    }

    /// Open the configured port and run until it closes or ctrl-c
    pub async fn run(self) -> Result<()> {
        let port = CommandPort::open(&self.config.port)?;
        let stack = self.simulated_stack();
        self.run_with(port, stack).await
    }

    pub async fn run_with<S: RadioStack>(self, port: CommandPort, stack: S) -> Result<()> {
        let CommandPort {
            name,
            mut reader,
            mut writer,
        } = port;
        let (tx, mut rx) = record_channel();

        let tick_ms = self.config.timing.tick_interval_ms.max(1);
        let mut engine = Engine::new(self.config, stack, tx);

        let started = Instant::now();
        let now_ms = || started.elapsed().as_millis() as u64;

        let mut ticker = interval(Duration::from_millis(tick_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        log_info!("Coordinator running on {}", name);
        engine.start(now_ms());

        let mut buf = [0u8; READ_CHUNK];
        loop {
            tokio::select! {
                read = reader.read(&mut buf) => {
                    match read {
                        Ok(0) => {
                            log_info!("Command port {} closed", name);
                            break;
                        }
                        Ok(n) => engine.receive_bytes(&buf[..n], now_ms()),
                        Err(e) => {
                            log_warn!("Read error on {}: {}", name, e);
                            return Err(e.into());
                        }
                    }
                }
                _ = ticker.tick() => {
                    let now = now_ms();
                    let handled = engine.pump_stack_events(now);
                    if handled > 0 {
                        log_debug!("Handled {} stack event(s)", handled);
                    }
                    engine.tick(now);
                }
                Some(record) = rx.recv() => {
                    write_record(&mut writer, &record).await?;
                }
                _ = tokio::signal::ctrl_c() => {
                    log_info!("Shutdown requested");
                    break;
                }
            }
        }

        // Whatever the engine produced before we stopped still goes out
        while let Ok(record) = rx.try_recv() {
            write_record(&mut writer, &record).await?;
        }
        Ok(())
    }
}
