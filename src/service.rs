//! SyncService – one world's sequential snapshot/delta pipeline plus the
//! per-client intent ledger.
//!
//! The authoritative simulation hands over a complete [`EntityMap`] every
//! tick; the service diffs it against the previous one and returns the
//! message to broadcast. One service per world; never share one across
//! concurrent tick loops.

use crate::component::EntityMap;
use crate::delta::compute_delta;
use crate::error::{Result, SyncError};
use crate::event::EventPacket;
use crate::protocol::{Ack, BaseIntent, Delta, Snapshot};
use crate::types::{SyncServiceConfig, SyncStats};
use crate::validate;
use log::{debug, warn};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// What to broadcast for a tick.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Snapshot(Snapshot),
    Delta(Delta),
}

impl Outbound {
    pub fn tick(&self) -> u64 {
        match self {
            Self::Snapshot(s) => s.tick,
            Self::Delta(d) => d.tick,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IntentReceipt {
    /// First time this seq was seen; hand `intent` to the game logic.
    Accepted { intent: BaseIntent, ack: Ack },
    /// Already accepted (retransmit or reordering). Re-ack, do not re-deliver.
    Duplicate { ack: Ack },
}

impl IntentReceipt {
    pub fn ack(&self) -> Ack {
        match self {
            Self::Accepted { ack, .. } | Self::Duplicate { ack } => *ack,
        }
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

pub struct SyncService {
    config: SyncServiceConfig,
    /// Last committed `(tick, state)`.
    last: Option<(u64, EntityMap)>,
    /// Tick of the last full snapshot broadcast.
    last_keyframe: Option<u64>,
    /// Highest accepted intent seq per client.
    intent_seqs: HashMap<String, u64>,
    stats: SyncStats,
}

impl SyncService {
    pub fn new(config: SyncServiceConfig) -> Self {
        Self {
            config,
            last: None,
            last_keyframe: None,
            intent_seqs: HashMap::new(),
            stats: SyncStats::default(),
        }
    }

    pub fn config(&self) -> &SyncServiceConfig {
        &self.config
    }

    pub fn last_tick(&self) -> Option<u64> {
        self.last.as_ref().map(|(t, _)| *t)
    }

    // -----------------------------------------------------------------------
    // Main tick
    // -----------------------------------------------------------------------

    /// Commit the state for `tick` and produce the message to broadcast.
    ///
    /// On error nothing is committed: the previous state stays the diff base.
    pub fn tick(
        &mut self,
        tick: u64,
        server_time_ms: u64,
        entities: EntityMap,
        events: Vec<EventPacket>,
    ) -> Result<Outbound> {
        if let Some(last_tick) = self.last_tick() {
            if tick <= last_tick {
                return Err(SyncError::NonMonotonicTick {
                    base_tick: last_tick,
                    tick,
                });
            }
        }

        let event_count = events.len() as u64;
        let out = match &self.last {
            Some((base_tick, prev)) if !self.keyframe_due(tick) => {
                Outbound::Delta(compute_delta(prev, &entities, *base_tick, tick).with_events(events))
            }
            _ => Outbound::Snapshot(
                Snapshot::new(tick, server_time_ms, entities.clone()).with_events(events),
            ),
        };

        if self.config.validate_outbound {
            match &out {
                Outbound::Snapshot(s) => validate::check_outbound(s)?,
                Outbound::Delta(d) => validate::check_outbound(d)?,
            }
        }

        match &out {
            Outbound::Snapshot(_) => {
                self.last_keyframe = Some(tick);
                self.stats.snapshots += 1;
                debug!(
                    "[{}] tick {} snapshot ({} entities)",
                    self.config.world_id,
                    tick,
                    entities.len()
                );
            }
            Outbound::Delta(d) => {
                self.stats.deltas += 1;
                debug!(
                    "[{}] tick {} delta from {} (+{} ~{} -{})",
                    self.config.world_id,
                    tick,
                    d.base_tick,
                    d.added.as_ref().map_or(0, Vec::len),
                    d.updated.as_ref().map_or(0, Vec::len),
                    d.removed.as_ref().map_or(0, Vec::len),
                );
            }
        }

        self.stats.ticks += 1;
        self.stats.events += event_count;
        self.last = Some((tick, entities));
        Ok(out)
    }

    fn keyframe_due(&self, tick: u64) -> bool {
        match (self.config.keyframe_interval, self.last_keyframe) {
            (0, _) => false,
            (_, None) => true,
            (interval, Some(k)) => tick - k >= interval,
        }
    }

    // -----------------------------------------------------------------------
    // Snapshot
    // -----------------------------------------------------------------------

    /// Full state for a client that joined late or lost its base tick.
    /// Carries no events; those were delivered with their own tick.
    pub fn full_snapshot(&self, server_time_ms: u64) -> Option<Snapshot> {
        self.last
            .as_ref()
            .map(|(tick, entities)| Snapshot::new(*tick, server_time_ms, entities.clone()))
    }

    // -----------------------------------------------------------------------
    // Intents
    // -----------------------------------------------------------------------

    /// Validate a raw intent from `client_id` and acknowledge it.
    ///
    /// A rejected message never touches the ledger.
    pub fn receive_intent(
        &mut self,
        client_id: &str,
        raw: &serde_json::Value,
        server_time_ms: u64,
    ) -> Result<IntentReceipt> {
        self.acknowledge(client_id, validate::intent(raw), server_time_ms)
    }

    /// [`receive_intent`](Self::receive_intent) for undecoded wire bytes.
    /// Bytes that are not JSON are rejected with a root `MalformedJson` issue.
    pub fn receive_intent_bytes(
        &mut self,
        client_id: &str,
        bytes: &[u8],
        server_time_ms: u64,
    ) -> Result<IntentReceipt> {
        let parsed = validate::from_slice::<BaseIntent>(bytes);
        self.acknowledge(client_id, parsed, server_time_ms)
    }

    fn acknowledge(
        &mut self,
        client_id: &str,
        parsed: std::result::Result<BaseIntent, validate::ValidationError>,
        server_time_ms: u64,
    ) -> Result<IntentReceipt> {
        let intent = match parsed {
            Ok(intent) => intent,
            Err(e) => {
                self.stats.intents_rejected += 1;
                warn!("[{}] rejected intent from {}: {}", self.config.world_id, client_id, e);
                return Err(e.into());
            }
        };

        let ack = Ack {
            seq: intent.seq,
            server_time_ms,
        };
        if self.config.validate_outbound {
            validate::check_outbound(&ack)?;
        }

        match self.intent_seqs.get(client_id) {
            Some(&last) if intent.seq <= last => {
                self.stats.intents_duplicate += 1;
                debug!(
                    "[{}] duplicate intent {} from {} (last {})",
                    self.config.world_id, intent.seq, client_id, last
                );
                Ok(IntentReceipt::Duplicate { ack })
            }
            _ => {
                self.intent_seqs.insert(client_id.to_owned(), intent.seq);
                self.stats.intents_accepted += 1;
                Ok(IntentReceipt::Accepted { intent, ack })
            }
        }
    }

    pub fn forget_client(&mut self, client_id: &str) {
        self.intent_seqs.remove(client_id);
    }

    pub fn client_count(&self) -> usize {
        self.intent_seqs.len()
    }

    // -----------------------------------------------------------------------
    // Stats
    // -----------------------------------------------------------------------

    pub fn stats(&self) -> SyncStats {
        SyncStats {
            tracked_clients: self.intent_seqs.len(),
            ..self.stats.clone()
        }
    }
}
