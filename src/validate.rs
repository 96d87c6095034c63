//! Strict message validation.
//!
//! Every wire message is checked against its exact shape before it is
//! trusted: missing fields, mistyped fields, unknown tags and **unrecognised
//! extra fields** are all rejected. Parsing is all-or-nothing; a message
//! either becomes a typed value or a [`ValidationError`] listing every
//! offending field path in document order.
//!
//! Call one of the per-kind entry points ([`intent`], [`ack`], [`snapshot`],
//! [`delta`], [`event_packet`]) or the generic [`parse`] / [`from_slice`] on
//! inbound data, and [`check_outbound`] on anything about to be sent.
//!
//! `BaseIntent.payload` is accepted as any JSON value; kind-specific payload
//! rules live with the intent handlers, not here.
//!
//! The message types deserialize through these same parsers
//! (`#[serde(try_from = "serde_json::Value")]`), so `serde_json::from_*`
//! accepts exactly what [`parse`] accepts.

use crate::component::{ComponentMap, ComponentName, EntityMap, Health, Transform, Visual};
use crate::event::{
    EventPacket, EventType, HitPayload, JoinPayload, LeavePayload, TransferPayload,
};
use crate::protocol::{Ack, BaseIntent, Delta, DeltaEntityUpdate, IntentKind, Snapshot};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Largest integer a double can hold exactly (2^53 - 1).
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Intent,
    Ack,
    Snapshot,
    Delta,
    DeltaEntityUpdate,
    EventPacket,
    ComponentMap,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Intent => "intent",
            Self::Ack => "ack",
            Self::Snapshot => "snapshot",
            Self::Delta => "delta",
            Self::DeltaEntityUpdate => "delta entity update",
            Self::EventPacket => "event packet",
            Self::ComponentMap => "component map",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Reason {
    #[error("required field is missing")]
    Missing,
    #[error("unrecognised field")]
    UnknownField,
    #[error("expected {0}")]
    ExpectedType(&'static str),
    #[error("expected a non-negative integer")]
    NotNonNegativeInteger,
    #[error("expected {expected} elements, found {found}")]
    WrongLength { expected: usize, found: usize },
    #[error("unknown variant '{0}'")]
    UnknownVariant(String),
    #[error("malformed JSON: {0}")]
    MalformedJson(String),
}

/// One failed field. `path` uses dots for keys and `[i]` for indices; the
/// empty path is the message root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    pub path: String,
    pub reason: Reason,
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "<root>: {}", self.reason)
        } else {
            write!(f, "{}: {}", self.path, self.reason)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind}: {}", join_issues(.issues))]
pub struct ValidationError {
    pub kind: MessageKind,
    pub issues: Vec<FieldIssue>,
}

impl ValidationError {
    /// True if some issue sits exactly at `path`.
    pub fn has_issue_at(&self, path: &str) -> bool {
        self.issues.iter().any(|i| i.path == path)
    }
}

fn join_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// A message type with a strict validator.
pub trait Validate: Sized {
    const KIND: MessageKind;

    fn from_value(value: &Value) -> Result<Self, ValidationError>;
}

pub fn parse<T: Validate>(value: &Value) -> Result<T, ValidationError> {
    T::from_value(value)
}

/// Parse raw JSON bytes, then validate.
pub fn from_slice<T: Validate>(bytes: &[u8]) -> Result<T, ValidationError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| root_error(T::KIND, e))?;
    T::from_value(&value)
}

/// Serialise `msg` and run it back through its validator before it is sent.
pub fn check_outbound<T: Validate + Serialize>(msg: &T) -> Result<(), ValidationError> {
    let value = serde_json::to_value(msg).map_err(|e| root_error(T::KIND, e))?;
    T::from_value(&value).map(|_| ())
}

pub fn intent(value: &Value) -> Result<BaseIntent, ValidationError> {
    parse(value)
}

pub fn ack(value: &Value) -> Result<Ack, ValidationError> {
    parse(value)
}

pub fn snapshot(value: &Value) -> Result<Snapshot, ValidationError> {
    parse(value)
}

pub fn delta(value: &Value) -> Result<Delta, ValidationError> {
    parse(value)
}

pub fn event_packet(value: &Value) -> Result<EventPacket, ValidationError> {
    parse(value)
}

fn root_error(kind: MessageKind, e: serde_json::Error) -> ValidationError {
    ValidationError {
        kind,
        issues: vec![FieldIssue {
            path: String::new(),
            reason: Reason::MalformedJson(e.to_string()),
        }],
    }
}

type Parser<T> = fn(&mut Checker, &str, &Value) -> Option<T>;

fn run<T>(kind: MessageKind, value: &Value, parser: Parser<T>) -> Result<T, ValidationError> {
    let mut c = Checker::default();
    let parsed = parser(&mut c, "", value);
    match parsed {
        Some(v) if c.issues.is_empty() => Ok(v),
        _ => Err(ValidationError {
            kind,
            issues: c.issues,
        }),
    }
}

macro_rules! validated {
    ($ty:ty, $kind:expr, $parser:expr) => {
        impl Validate for $ty {
            const KIND: MessageKind = $kind;

            fn from_value(value: &Value) -> Result<Self, ValidationError> {
                run(Self::KIND, value, $parser)
            }
        }

        // Backs `#[serde(try_from = "serde_json::Value")]` on the type.
        impl TryFrom<Value> for $ty {
            type Error = ValidationError;

            fn try_from(value: Value) -> Result<Self, ValidationError> {
                <$ty as Validate>::from_value(&value)
            }
        }
    };
}

validated!(BaseIntent, MessageKind::Intent, check_intent);
validated!(Ack, MessageKind::Ack, check_ack);
validated!(Snapshot, MessageKind::Snapshot, check_snapshot);
validated!(Delta, MessageKind::Delta, check_delta);
validated!(DeltaEntityUpdate, MessageKind::DeltaEntityUpdate, check_entity_update);
validated!(EventPacket, MessageKind::EventPacket, check_event_packet);
validated!(ComponentMap, MessageKind::ComponentMap, check_component_map);

// ---------------------------------------------------------------------------
// Reader machinery
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Checker {
    issues: Vec<FieldIssue>,
}

impl Checker {
    fn fail<T>(&mut self, path: &str, reason: Reason) -> Option<T> {
        self.issues.push(FieldIssue {
            path: path.to_owned(),
            reason,
        });
        None
    }
}

fn key_path(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_owned()
    } else {
        format!("{path}.{key}")
    }
}

fn index_path(path: &str, i: usize) -> String {
    format!("{path}[{i}]")
}

/// A JSON object whose unknown keys have already been reported.
struct Fields<'v> {
    path: String,
    map: &'v Map<String, Value>,
}

impl<'v> Fields<'v> {
    fn required<T>(
        &self,
        c: &mut Checker,
        key: &str,
        parse: impl FnOnce(&mut Checker, &str, &Value) -> Option<T>,
    ) -> Option<T> {
        let path = key_path(&self.path, key);
        match self.map.get(key) {
            Some(v) => parse(c, &path, v),
            None => c.fail(&path, Reason::Missing),
        }
    }

    /// Outer `None` means the field was present but invalid.
    fn optional<T>(
        &self,
        c: &mut Checker,
        key: &str,
        parse: impl FnOnce(&mut Checker, &str, &Value) -> Option<T>,
    ) -> Option<Option<T>> {
        let path = key_path(&self.path, key);
        match self.map.get(key) {
            Some(v) => parse(c, &path, v).map(Some),
            None => Some(None),
        }
    }
}

fn object<'v>(c: &mut Checker, path: &str, v: &'v Value, known: &[&str]) -> Option<Fields<'v>> {
    let Some(map) = v.as_object() else {
        return c.fail(path, Reason::ExpectedType("object"));
    };
    for key in map.keys() {
        if !known.contains(&key.as_str()) {
            c.fail::<()>(&key_path(path, key), Reason::UnknownField);
        }
    }
    Some(Fields {
        path: path.to_owned(),
        map,
    })
}

fn string(c: &mut Checker, path: &str, v: &Value) -> Option<String> {
    match v.as_str() {
        Some(s) => Some(s.to_owned()),
        None => c.fail(path, Reason::ExpectedType("string")),
    }
}

fn number(c: &mut Checker, path: &str, v: &Value) -> Option<f64> {
    match v.as_f64() {
        Some(n) => Some(n),
        None => c.fail(path, Reason::ExpectedType("number")),
    }
}

fn non_negative_int(c: &mut Checker, path: &str, v: &Value) -> Option<u64> {
    let Value::Number(n) = v else {
        return c.fail(path, Reason::ExpectedType("number"));
    };
    if let Some(u) = n.as_u64() {
        if u > MAX_SAFE_INTEGER as u64 {
            return c.fail(path, Reason::NotNonNegativeInteger);
        }
        return Some(u);
    }
    match n.as_f64() {
        Some(f) if f >= 0.0 && f.fract() == 0.0 && f <= MAX_SAFE_INTEGER => Some(f as u64),
        _ => c.fail(path, Reason::NotNonNegativeInteger),
    }
}

fn any(_: &mut Checker, _: &str, v: &Value) -> Option<Value> {
    Some(v.clone())
}

/// A string drawn from a closed set (`FromStr` decides membership).
fn tag<T: FromStr>(c: &mut Checker, path: &str, v: &Value) -> Option<T> {
    let Some(s) = v.as_str() else {
        return c.fail(path, Reason::ExpectedType("string"));
    };
    s.parse()
        .ok()
        .or_else(|| c.fail(path, Reason::UnknownVariant(s.to_owned())))
}

fn fixed<const N: usize>(c: &mut Checker, path: &str, v: &Value) -> Option<[f64; N]> {
    let Some(items) = v.as_array() else {
        return c.fail(path, Reason::ExpectedType("array"));
    };
    if items.len() != N {
        return c.fail(
            path,
            Reason::WrongLength {
                expected: N,
                found: items.len(),
            },
        );
    }
    let mut out = [0.0; N];
    let mut ok = true;
    for (i, item) in items.iter().enumerate() {
        match number(c, &index_path(path, i), item) {
            Some(n) => out[i] = n,
            None => ok = false,
        }
    }
    ok.then_some(out)
}

fn array<T>(
    c: &mut Checker,
    path: &str,
    v: &Value,
    item: impl Fn(&mut Checker, &str, &Value) -> Option<T>,
) -> Option<Vec<T>> {
    let Some(items) = v.as_array() else {
        return c.fail(path, Reason::ExpectedType("array"));
    };
    let mut out = Vec::with_capacity(items.len());
    let mut ok = true;
    for (i, raw) in items.iter().enumerate() {
        match item(c, &index_path(path, i), raw) {
            Some(parsed) => out.push(parsed),
            None => ok = false,
        }
    }
    ok.then_some(out)
}

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

fn check_transform(c: &mut Checker, path: &str, v: &Value) -> Option<Transform> {
    let f = object(c, path, v, &["position", "rotation", "scale", "velocity"])?;
    let position = f.required(c, "position", fixed::<3>);
    let rotation = f.required(c, "rotation", fixed::<4>);
    let scale = f.optional(c, "scale", fixed::<3>);
    let velocity = f.optional(c, "velocity", fixed::<3>);
    Some(Transform {
        position: position?,
        rotation: rotation?,
        scale: scale?,
        velocity: velocity?,
    })
}

fn check_visual(c: &mut Checker, path: &str, v: &Value) -> Option<Visual> {
    let f = object(c, path, v, &["model", "tint"])?;
    let model = f.optional(c, "model", string);
    let tint = f.optional(c, "tint", fixed::<3>);
    Some(Visual {
        model: model?,
        tint: tint?,
    })
}

fn check_health(c: &mut Checker, path: &str, v: &Value) -> Option<Health> {
    let f = object(c, path, v, &["current", "max"])?;
    let current = f.required(c, "current", number);
    let max = f.required(c, "max", number);
    Some(Health {
        current: current?,
        max: max?,
    })
}

fn check_component_map(c: &mut Checker, path: &str, v: &Value) -> Option<ComponentMap> {
    let known = ComponentName::ALL.map(ComponentName::as_str);
    let f = object(c, path, v, &known)?;
    let transform = f.optional(c, ComponentName::Transform.as_str(), check_transform);
    let visual = f.optional(c, ComponentName::Visual.as_str(), check_visual);
    let health = f.optional(c, ComponentName::Health.as_str(), check_health);
    Some(ComponentMap {
        transform: transform?,
        visual: visual?,
        health: health?,
    })
}

fn check_entity_map(c: &mut Checker, path: &str, v: &Value) -> Option<EntityMap> {
    let Some(map) = v.as_object() else {
        return c.fail(path, Reason::ExpectedType("object"));
    };
    let mut out = EntityMap::new();
    let mut ok = true;
    for (id, components) in map {
        match check_component_map(c, &key_path(path, id), components) {
            Some(m) => {
                out.insert(id.clone(), m);
            }
            None => ok = false,
        }
    }
    ok.then_some(out)
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

fn check_join(c: &mut Checker, path: &str, v: &Value) -> Option<JoinPayload> {
    let f = object(c, path, v, &["playerId", "worldId"])?;
    let player_id = f.required(c, "playerId", string);
    let world_id = f.required(c, "worldId", string);
    Some(JoinPayload {
        player_id: player_id?,
        world_id: world_id?,
    })
}

fn check_leave(c: &mut Checker, path: &str, v: &Value) -> Option<LeavePayload> {
    let f = object(c, path, v, &["playerId", "reason"])?;
    let player_id = f.required(c, "playerId", string);
    let reason = f.optional(c, "reason", string);
    Some(LeavePayload {
        player_id: player_id?,
        reason: reason?,
    })
}

fn check_hit(c: &mut Checker, path: &str, v: &Value) -> Option<HitPayload> {
    let f = object(c, path, v, &["attacker", "target", "amount", "damageType"])?;
    let attacker = f.required(c, "attacker", string);
    let target = f.required(c, "target", string);
    let amount = f.required(c, "amount", number);
    let damage_type = f.optional(c, "damageType", string);
    Some(HitPayload {
        attacker: attacker?,
        target: target?,
        amount: amount?,
        damage_type: damage_type?,
    })
}

fn check_transfer(c: &mut Checker, path: &str, v: &Value) -> Option<TransferPayload> {
    let f = object(c, path, v, &["from", "to", "currency", "amount", "ref"])?;
    let from = f.required(c, "from", string);
    let to = f.required(c, "to", string);
    let currency = f.required(c, "currency", string);
    let amount = f.required(c, "amount", number);
    let reference = f.optional(c, "ref", string);
    Some(TransferPayload {
        from: from?,
        to: to?,
        currency: currency?,
        amount: amount?,
        reference: reference?,
    })
}

fn check_event_packet(c: &mut Checker, path: &str, v: &Value) -> Option<EventPacket> {
    let f = object(c, path, v, &["type", "tServerMs", "payload"])?;
    let kind = f.required(c, "type", tag::<EventType>);
    let t_server_ms = f.required(c, "tServerMs", number);
    // Unknown tag: reject without looking at the payload.
    let kind = kind?;
    let packet = match kind {
        EventType::Join => {
            let payload = f.required(c, "payload", check_join);
            EventPacket::Join {
                t_server_ms: t_server_ms?,
                payload: payload?,
            }
        }
        EventType::Leave => {
            let payload = f.required(c, "payload", check_leave);
            EventPacket::Leave {
                t_server_ms: t_server_ms?,
                payload: payload?,
            }
        }
        EventType::Hit => {
            let payload = f.required(c, "payload", check_hit);
            EventPacket::Hit {
                t_server_ms: t_server_ms?,
                payload: payload?,
            }
        }
        EventType::Transfer => {
            let payload = f.required(c, "payload", check_transfer);
            EventPacket::Transfer {
                t_server_ms: t_server_ms?,
                payload: payload?,
            }
        }
    };
    Some(packet)
}

fn check_events(c: &mut Checker, path: &str, v: &Value) -> Option<Vec<EventPacket>> {
    array(c, path, v, check_event_packet)
}

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

fn check_intent(c: &mut Checker, path: &str, v: &Value) -> Option<BaseIntent> {
    let f = object(c, path, v, &["seq", "clientTimeMs", "type", "payload"])?;
    let seq = f.required(c, "seq", non_negative_int);
    let client_time_ms = f.required(c, "clientTimeMs", non_negative_int);
    let kind = f.required(c, "type", tag::<IntentKind>);
    let payload = f.optional(c, "payload", any);
    Some(BaseIntent {
        seq: seq?,
        client_time_ms: client_time_ms?,
        kind: kind?,
        payload: payload?.unwrap_or(Value::Null),
    })
}

fn check_ack(c: &mut Checker, path: &str, v: &Value) -> Option<Ack> {
    let f = object(c, path, v, &["seq", "serverTimeMs"])?;
    let seq = f.required(c, "seq", non_negative_int);
    let server_time_ms = f.required(c, "serverTimeMs", non_negative_int);
    Some(Ack {
        seq: seq?,
        server_time_ms: server_time_ms?,
    })
}

fn check_snapshot(c: &mut Checker, path: &str, v: &Value) -> Option<Snapshot> {
    let f = object(c, path, v, &["tick", "serverTimeMs", "entities", "events"])?;
    let tick = f.required(c, "tick", non_negative_int);
    let server_time_ms = f.required(c, "serverTimeMs", non_negative_int);
    let entities = f.required(c, "entities", check_entity_map);
    let events = f.optional(c, "events", check_events);
    Some(Snapshot {
        tick: tick?,
        server_time_ms: server_time_ms?,
        entities: entities?,
        events: events?,
    })
}

fn check_entity_update(c: &mut Checker, path: &str, v: &Value) -> Option<DeltaEntityUpdate> {
    let f = object(c, path, v, &["entityId", "components", "removedComponents"])?;
    let entity_id = f.required(c, "entityId", string);
    let components = f.optional(c, "components", check_component_map);
    let removed_components = f.optional(c, "removedComponents", |c, p, v| {
        array(c, p, v, tag::<ComponentName>)
    });
    Some(DeltaEntityUpdate {
        entity_id: entity_id?,
        components: components?,
        removed_components: removed_components?,
    })
}

fn check_delta(c: &mut Checker, path: &str, v: &Value) -> Option<Delta> {
    let f = object(
        c,
        path,
        v,
        &["tick", "baseTick", "added", "updated", "removed", "events"],
    )?;
    let tick = f.required(c, "tick", non_negative_int);
    let base_tick = f.required(c, "baseTick", non_negative_int);
    let added = f.optional(c, "added", |c, p, v| array(c, p, v, check_entity_update));
    let updated = f.optional(c, "updated", |c, p, v| array(c, p, v, check_entity_update));
    let removed = f.optional(c, "removed", |c, p, v| array(c, p, v, string));
    let events = f.optional(c, "events", check_events);
    Some(Delta {
        tick: tick?,
        base_tick: base_tick?,
        added: added?,
        updated: updated?,
        removed: removed?,
        events: events?,
    })
}
