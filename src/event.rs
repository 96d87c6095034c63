//! Discrete event packets.
//!
//! Events ride alongside snapshots and deltas but are never diffed. The set
//! is closed: a new kind needs a variant here, a tag in [`EventType`] and a
//! payload shape in [`crate::validate`].
//!
//! Wire shape: `{ "type": <tag>, "tServerMs": <number>, "payload": {..} }`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct JoinPayload {
    pub player_id: String,
    pub world_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LeavePayload {
    pub player_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HitPayload {
    pub attacker: String,
    pub target: String,
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damage_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TransferPayload {
    pub from: String,
    pub to: String,
    pub currency: String,
    pub amount: f64,
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

// ---------------------------------------------------------------------------
// Packet
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", tag = "type")]
pub enum EventPacket {
    #[serde(rename = "system.join")]
    Join {
        #[serde(rename = "tServerMs")]
        t_server_ms: f64,
        payload: JoinPayload,
    },
    #[serde(rename = "system.leave")]
    Leave {
        #[serde(rename = "tServerMs")]
        t_server_ms: f64,
        payload: LeavePayload,
    },
    #[serde(rename = "combat.hit")]
    Hit {
        #[serde(rename = "tServerMs")]
        t_server_ms: f64,
        payload: HitPayload,
    },
    #[serde(rename = "economy.transfer")]
    Transfer {
        #[serde(rename = "tServerMs")]
        t_server_ms: f64,
        payload: TransferPayload,
    },
}

impl EventPacket {
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Join { .. } => EventType::Join,
            Self::Leave { .. } => EventType::Leave,
            Self::Hit { .. } => EventType::Hit,
            Self::Transfer { .. } => EventType::Transfer,
        }
    }

    pub fn t_server_ms(&self) -> f64 {
        match self {
            Self::Join { t_server_ms, .. }
            | Self::Leave { t_server_ms, .. }
            | Self::Hit { t_server_ms, .. }
            | Self::Transfer { t_server_ms, .. } => *t_server_ms,
        }
    }
}

// ---------------------------------------------------------------------------
// Tags
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Join,
    Leave,
    Hit,
    Transfer,
}

impl EventType {
    pub const ALL: [EventType; 4] = [Self::Join, Self::Leave, Self::Hit, Self::Transfer];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Join => "system.join",
            Self::Leave => "system.leave",
            Self::Hit => "combat.hit",
            Self::Transfer => "economy.transfer",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|t| t.as_str() == s).ok_or(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn packet_serialises_with_tag_time_and_payload() {
        let ev = EventPacket::Transfer {
            t_server_ms: 1500.0,
            payload: TransferPayload {
                from: "p1".into(),
                to: "p2".into(),
                currency: "gold".into(),
                amount: 25.0,
                reference: Some("trade-9".into()),
            },
        };
        assert_eq!(
            serde_json::to_value(&ev).unwrap(),
            json!({
                "type": "economy.transfer",
                "tServerMs": 1500.0,
                "payload": { "from": "p1", "to": "p2", "currency": "gold", "amount": 25.0, "ref": "trade-9" }
            })
        );
        assert_eq!(ev.event_type(), EventType::Transfer);
        assert_eq!(ev.t_server_ms(), 1500.0);
    }

    #[test]
    fn tags_parse() {
        assert_eq!("combat.hit".parse::<EventType>(), Ok(EventType::Hit));
        assert!("combat.miss".parse::<EventType>().is_err());
    }
}
