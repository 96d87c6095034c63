//! `sync.*` wire protocol.
//!
//! This module owns **every envelope that crosses the transport boundary**
//! between the authoritative server and its clients.
//!
//! ## Channel namespaces
//!
//! | Subject             | Direction       | Payload          |
//! |---------------------|-----------------|------------------|
//! | `sync.snapshot`     | server → client | [`Snapshot`]     |
//! | `sync.delta`        | server → client | [`Delta`]        |
//! | `sync.ack`          | server → client | [`Ack`]          |
//! | `sync.intent`       | client → server | [`BaseIntent`]   |
//! | `sync.cmd.snapshot` | client → server | resync request   |
//!
//! ## Design rules
//!
//! 1. camelCase JSON; optional fields are omitted, never `null`.
//! 2. A [`Snapshot`] is self-sufficient: a client holding nothing can render it.
//! 3. A [`Delta`] is relative. A client may apply it only if its last applied
//!    tick equals `base_tick`; otherwise it must discard the delta and request
//!    a fresh snapshot. Clients enforce this (see [`crate::replica`]); the
//!    server never tracks what each client holds.
//! 4. Empty delta categories are omitted, not sent as empty lists.
//! 5. Event packets are attached unmodified and never diffed.

use crate::component::{ComponentMap, ComponentName, EntityMap};
use crate::event::EventPacket;
use crate::types::EntityId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

fn none_if_empty<T>(v: Vec<T>) -> Option<Vec<T>> {
    if v.is_empty() {
        None
    } else {
        Some(v)
    }
}

// ---------------------------------------------------------------------------
// Snapshot  (subject: sync.snapshot)
// ---------------------------------------------------------------------------

/// Complete authoritative world state at `tick`. Every entity present is
/// alive at that tick; absence means the entity does not exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", rename_all = "camelCase")]
pub struct Snapshot {
    pub tick: u64,
    pub server_time_ms: u64,
    pub entities: EntityMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<EventPacket>>,
}

impl Snapshot {
    pub fn new(tick: u64, server_time_ms: u64, entities: EntityMap) -> Self {
        Self {
            tick,
            server_time_ms,
            entities,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Vec<EventPacket>) -> Self {
        self.events = none_if_empty(events);
        self
    }
}

// ---------------------------------------------------------------------------
// Delta  (subject: sync.delta)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", rename_all = "camelCase")]
pub struct DeltaEntityUpdate {
    pub entity_id: EntityId,
    /// Components to upsert, whole values.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<ComponentMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed_components: Option<Vec<ComponentName>>,
}

/// Incremental change from the snapshot at `base_tick` to the one at `tick`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", rename_all = "camelCase")]
pub struct Delta {
    pub tick: u64,
    pub base_tick: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added: Option<Vec<DeltaEntityUpdate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<Vec<DeltaEntityUpdate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed: Option<Vec<EntityId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<EventPacket>>,
}

impl Delta {
    /// Assemble a delta, dropping empty categories.
    pub fn new(
        tick: u64,
        base_tick: u64,
        added: Vec<DeltaEntityUpdate>,
        updated: Vec<DeltaEntityUpdate>,
        removed: Vec<EntityId>,
    ) -> Self {
        Self {
            tick,
            base_tick,
            added: none_if_empty(added),
            updated: none_if_empty(updated),
            removed: none_if_empty(removed),
            events: None,
        }
    }

    pub fn with_events(mut self, events: Vec<EventPacket>) -> Self {
        self.events = none_if_empty(events);
        self
    }

    /// True when no entity state changed (events are not considered).
    pub fn is_empty(&self) -> bool {
        self.added.is_none() && self.updated.is_none() && self.removed.is_none()
    }

    /// The client-side reconciliation rule: only apply on top of `base_tick`.
    pub fn applies_to(&self, held_tick: Option<u64>) -> bool {
        held_tick == Some(self.base_tick)
    }
}

// ---------------------------------------------------------------------------
// Intents  (client → server, subject: sync.intent)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Move,
    Interact,
    Teleport,
    ViewRadius,
}

impl IntentKind {
    pub const ALL: [IntentKind; 4] = [Self::Move, Self::Interact, Self::Teleport, Self::ViewRadius];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Move => "move",
            Self::Interact => "interact",
            Self::Teleport => "teleport",
            Self::ViewRadius => "view_radius",
        }
    }
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntentKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|k| k.as_str() == s).ok_or(())
    }
}

/// Sequenced client request. `seq` increases monotonically per client and is
/// used for ordering and deduplication.
///
/// `payload` is deliberately unconstrained at the transport layer; decode it
/// per kind with [`BaseIntent::decode_payload`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", rename_all = "camelCase")]
pub struct BaseIntent {
    pub seq: u64,
    pub client_time_ms: u64,
    #[serde(rename = "type")]
    pub kind: IntentKind,
    pub payload: serde_json::Value,
}

impl BaseIntent {
    pub fn new(seq: u64, client_time_ms: u64, kind: IntentKind, payload: serde_json::Value) -> Self {
        Self {
            seq,
            client_time_ms,
            kind,
            payload,
        }
    }

    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}

/// Client indicates desired movement direction (unit vector, server resolves).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntentMove {
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
}

/// Client requests interaction with a specific entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct IntentInteract {
    pub target_id: EntityId,
    /// Optional interaction verb (e.g. "open", "attack", "talk").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verb: Option<String>,
}

/// Client requests a teleport (authorised by server).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntentTeleport {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Client advertises its view radius.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntentViewRadius {
    pub radius: f64,
}

// ---------------------------------------------------------------------------
// Ack  (server → client, subject: sync.ack)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", rename_all = "camelCase")]
pub struct Ack {
    pub seq: u64,
    pub server_time_ms: u64,
}

// ---------------------------------------------------------------------------
// Subject helpers
// ---------------------------------------------------------------------------

/// All transport subjects used by the sync protocol, as constants.
pub mod subjects {
    pub const SNAPSHOT: &str = "sync.snapshot";
    pub const DELTA: &str = "sync.delta";
    pub const ACK: &str = "sync.ack";

    pub const INTENT: &str = "sync.intent";
    pub const CMD_SNAPSHOT: &str = "sync.cmd.snapshot";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_delta_categories_are_omitted() {
        let d = Delta::new(5, 4, vec![], vec![], vec![]).with_events(vec![]);
        assert!(d.is_empty());
        assert_eq!(serde_json::to_value(&d).unwrap(), json!({ "tick": 5, "baseTick": 4 }));
    }

    #[test]
    fn delta_applies_only_on_its_base() {
        let d = Delta::new(5, 4, vec![], vec![], vec!["e1".into()]);
        assert!(d.applies_to(Some(4)));
        assert!(!d.applies_to(Some(3)));
        assert!(!d.applies_to(None));
    }

    #[test]
    fn intent_payload_decodes_per_kind() {
        let intent = BaseIntent::new(
            7,
            1000,
            IntentKind::Interact,
            json!({ "targetId": "door-1", "verb": "open" }),
        );
        let p: IntentInteract = intent.decode_payload().unwrap();
        assert_eq!(p.target_id, "door-1");
        assert_eq!(p.verb.as_deref(), Some("open"));
        assert!(intent.decode_payload::<IntentTeleport>().is_err());
    }

    #[test]
    fn intent_uses_type_tag_on_the_wire() {
        let intent = BaseIntent::new(1, 2, IntentKind::ViewRadius, json!({ "radius": 30.0 }));
        assert_eq!(
            serde_json::to_value(&intent).unwrap(),
            json!({ "seq": 1, "clientTimeMs": 2, "type": "view_radius", "payload": { "radius": 30.0 } })
        );
    }
}
