//! SyncAgent – drives a [`SyncService`] on a fixed tick and moves its
//! messages between the simulation and the transport.
//!
//! Both ends are seams owned by the embedding server: a [`WorldSource`]
//! produces the authoritative state each tick, a [`Publisher`] delivers
//! encoded messages to clients.
//!
//! ## Message contract (inbound)
//!
//! | Channel item                       | Effect                                   |
//! |------------------------------------|------------------------------------------|
//! | `Inbound::Intent { client, .. }`   | validate, ledger, publish `sync.ack`     |
//! | `Inbound::SnapshotRequest { .. }`  | publish full state on `sync.snapshot`    |
//! | `Inbound::Disconnected { client }` | drop the client's intent ledger entry    |
//!
//! ## Message contract (outbound)
//!
//! | Subject         | Payload        |
//! |-----------------|----------------|
//! | `sync.snapshot` | [`Snapshot`]   |
//! | `sync.delta`    | [`Delta`]      |
//! | `sync.ack`      | [`Ack`]        |
//!
//! [`Snapshot`]: crate::protocol::Snapshot
//! [`Delta`]: crate::protocol::Delta
//! [`Ack`]: crate::protocol::Ack

use crate::component::EntityMap;
use crate::event::EventPacket;
use crate::protocol::subjects;
use crate::service::{IntentReceipt, Outbound, SyncService};
use anyhow::{Context, Result};
use bytes::Bytes;
use log::info;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// One tick's worth of authoritative output from the simulation.
#[derive(Debug, Clone, Default)]
pub struct WorldFrame {
    pub entities: EntityMap,
    pub events: Vec<EventPacket>,
}

/// The authoritative simulation. Called once per tick on the agent's task;
/// `None` means the simulation has finished and the agent should stop.
pub trait WorldSource: Send {
    fn step(&mut self, tick: u64) -> Option<WorldFrame>;
}

/// Where encoded messages go. `client` is `None` for a world-wide broadcast.
pub trait Publisher: Send + Sync {
    fn publish(&self, subject: &str, client: Option<&str>, payload: Bytes) -> Result<()>;
}

/// Client → server traffic, already demultiplexed by the transport.
#[derive(Debug, Clone)]
pub enum Inbound {
    Intent { client: String, payload: Bytes },
    SnapshotRequest { client: String },
    Disconnected { client: String },
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SyncAgentConfig {
    pub world_id: String,
    /// Tick rate in Hz.
    pub tick_rate_hz: f32,
}

impl Default for SyncAgentConfig {
    fn default() -> Self {
        Self {
            world_id: "default".into(),
            tick_rate_hz: 20.0,
        }
    }
}

// ---------------------------------------------------------------------------
// SyncAgent
// ---------------------------------------------------------------------------

pub struct SyncAgent<P: Publisher> {
    config: SyncAgentConfig,
    service: Arc<Mutex<SyncService>>,
    publisher: P,
    tick: u64,
}

impl<P: Publisher> SyncAgent<P> {
    pub fn new(config: SyncAgentConfig, service: Arc<Mutex<SyncService>>, publisher: P) -> Self {
        Self {
            config,
            service,
            publisher,
            tick: 0,
        }
    }

    /// Run until Ctrl-C, until the inbound channel closes, or until `source`
    /// ends.
    pub async fn run<W: WorldSource>(
        mut self,
        mut source: W,
        mut inbound: mpsc::Receiver<Inbound>,
    ) -> Result<()> {
        let period = tick_period(self.config.tick_rate_hz)?;
        info!(
            "SyncAgent active for world '{}' – ticking at {:.0}Hz",
            self.config.world_id, self.config.tick_rate_hz
        );

        let mut timer = tokio::time::interval(period);

        loop {
            tokio::select! {
                _ = timer.tick() => match source.step(self.tick + 1) {
                    Some(frame) => self.step(frame),
                    None => {
                        info!("SyncAgent world source ended after tick {}", self.tick);
                        break;
                    }
                },
                msg = inbound.recv() => match msg {
                    Some(msg) => self.handle_inbound(msg),
                    None => {
                        info!("SyncAgent inbound channel closed");
                        break;
                    }
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("SyncAgent shutting down (SIGINT)");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Advance one tick with `frame` and broadcast the result.
    pub fn step(&mut self, frame: WorldFrame) {
        let tick = self.tick + 1;
        let _span = tracing::debug_span!("tick", world = %self.config.world_id, tick).entered();

        // Hold the lock only long enough to tick, then release before publishing.
        let result = {
            let mut svc = self.service.lock();
            svc.tick(tick, now_ms(), frame.entities, frame.events)
        };

        match result {
            Ok(Outbound::Snapshot(s)) => {
                self.tick = tick;
                publish_message(&self.publisher, subjects::SNAPSHOT, None, &s);
            }
            Ok(Outbound::Delta(d)) => {
                self.tick = tick;
                publish_message(&self.publisher, subjects::DELTA, None, &d);
            }
            Err(e) => log::warn!("World tick {} error: {}", tick, e),
        }
    }

    pub fn handle_inbound(&mut self, msg: Inbound) {
        match msg {
            Inbound::Intent { client, payload } => {
                let receipt = self
                    .service
                    .lock()
                    .receive_intent_bytes(&client, &payload, now_ms());
                match receipt {
                    Ok(receipt) => {
                        if let IntentReceipt::Accepted { intent, .. } = &receipt {
                            log::debug!("intent {} ({}) from {}", intent.seq, intent.kind, client);
                        }
                        publish_message(&self.publisher, subjects::ACK, Some(&client), &receipt.ack());
                    }
                    Err(e) => log::warn!("Dropping intent from {}: {}", client, e),
                }
            }
            Inbound::SnapshotRequest { client } => {
                let snapshot = self.service.lock().full_snapshot(now_ms());
                match snapshot {
                    Some(s) => publish_message(&self.publisher, subjects::SNAPSHOT, Some(&client), &s),
                    None => log::debug!("Snapshot requested by {} before first tick", client),
                }
            }
            Inbound::Disconnected { client } => {
                self.service.lock().forget_client(&client);
                info!("Client {} disconnected", client);
            }
        }
    }

    pub fn service(&self) -> &Arc<Mutex<SyncService>> {
        &self.service
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Interval between ticks for `hz`. Rejects rates whose period is zero or
/// does not fit a [`Duration`].
fn tick_period(hz: f32) -> Result<Duration> {
    if !(hz > 0.0) {
        anyhow::bail!("tick rate must be positive, got {}", hz);
    }
    let period = Duration::try_from_secs_f32(1.0 / hz)
        .with_context(|| format!("tick rate {}Hz has no representable period", hz))?;
    if period.is_zero() {
        anyhow::bail!("tick rate {}Hz is too high", hz);
    }
    Ok(period)
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Serialise `msg` and publish it on `subject`.
///
/// Errors are logged and swallowed — a single failed publish should not stop
/// the tick loop.
fn publish_message<P: Publisher, T: Serialize>(
    publisher: &P,
    subject: &str,
    client: Option<&str>,
    msg: &T,
) {
    match serde_json::to_vec(msg) {
        Ok(payload) => {
            if let Err(e) = publisher.publish(subject, client, Bytes::from(payload)) {
                log::warn!("Failed to publish to {}: {}", subject, e);
            }
        }
        Err(e) => log::warn!("Failed to serialise message for {}: {}", subject, e),
    }
}
