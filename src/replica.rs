//! `ReplicaState` — client-side mirror of the authoritative world.
//!
//! Encodes the consumer contract of the protocol: snapshots always apply,
//! deltas apply only on top of their `base_tick`. Anything else leaves the
//! replica untouched and asks the caller to request a fresh snapshot.
//!
//! Single-owner; the embedding client runtime drives it from one thread.

use crate::component::{ComponentMap, EntityMap};
use crate::delta::apply_delta;
use crate::event::EventPacket;
use crate::protocol::{Delta, Snapshot};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// The delta does not build on what this replica holds.
    ResyncRequired { held: Option<u64>, base_tick: u64 },
}

#[derive(Debug, Default)]
pub struct ReplicaState {
    entities: EntityMap,
    /// Tick of the last snapshot or delta applied.
    tick: Option<u64>,
    /// Events received but not yet drained, in arrival order.
    events: Vec<EventPacket>,
}

impl ReplicaState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick(&self) -> Option<u64> {
        self.tick
    }

    pub fn entities(&self) -> &EntityMap {
        &self.entities
    }

    pub fn entity(&self, id: &str) -> Option<&ComponentMap> {
        self.entities.get(id)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Replace all state. Snapshots are self-sufficient, so this never fails.
    pub fn apply_snapshot(&mut self, snapshot: &Snapshot) {
        self.entities = snapshot.entities.clone();
        self.tick = Some(snapshot.tick);
        self.events.extend(snapshot.events.iter().flatten().cloned());
    }

    pub fn apply_delta(&mut self, delta: &Delta) -> ApplyOutcome {
        if !delta.applies_to(self.tick) {
            log::debug!(
                "discarding delta {}→{}: replica holds {:?}",
                delta.base_tick,
                delta.tick,
                self.tick
            );
            return ApplyOutcome::ResyncRequired {
                held: self.tick,
                base_tick: delta.base_tick,
            };
        }
        apply_delta(&mut self.entities, delta);
        self.tick = Some(delta.tick);
        self.events.extend(delta.events.iter().flatten().cloned());
        ApplyOutcome::Applied
    }

    pub fn take_events(&mut self) -> Vec<EventPacket> {
        std::mem::take(&mut self.events)
    }

    /// MD5 of the canonical (id-ordered) JSON entity map, for desync checks.
    pub fn digest(&self) -> String {
        state_digest(&self.entities)
    }

    /// Reset all state (called on disconnect).
    pub fn clear(&mut self) {
        self.entities.clear();
        self.tick = None;
        self.events.clear();
    }
}

/// MD5 hex digest of `entities` serialised as JSON.
pub fn state_digest(entities: &EntityMap) -> String {
    // Id-ordered map, so the encoding is canonical.
    let bytes = serde_json::to_vec(entities).unwrap_or_default();
    format!("{:x}", md5::compute(bytes))
}
