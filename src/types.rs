//! Core shared types: identifiers, fixed-arity vectors, service config and stats.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identifiers & math
// ---------------------------------------------------------------------------

/// Opaque entity identifier. Unique within a world and never reused after
/// removal within the same session.
pub type EntityId = String;

/// `[x, y, z]`
pub type Vector3 = [f64; 3];

/// `[x, y, z, w]`
pub type Quaternion = [f64; 4];

/// Identity rotation.
pub const QUAT_IDENTITY: Quaternion = [0.0, 0.0, 0.0, 1.0];

// ---------------------------------------------------------------------------
// Stats & config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub ticks: u64,
    pub snapshots: u64,
    pub deltas: u64,
    pub events: u64,
    pub intents_accepted: u64,
    pub intents_duplicate: u64,
    pub intents_rejected: u64,
    pub tracked_clients: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncServiceConfig {
    /// World this pipeline belongs to (log context only).
    pub world_id: String,
    /// Emit a full snapshot every N ticks. `0` means only the first tick.
    pub keyframe_interval: u64,
    /// Run the outbound validators on every snapshot/delta/ack produced.
    pub validate_outbound: bool,
}

impl Default for SyncServiceConfig {
    fn default() -> Self {
        Self {
            world_id: "default".into(),
            keyframe_interval: 300,
            validate_outbound: true,
        }
    }
}
