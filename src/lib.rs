//! Entity Sync
//!
//! Server-authoritative entity-state synchronization: full snapshots, cheap
//! component-level deltas, validated event packets and a sequenced
//! intent/ack handshake.
//!
//! ## Architecture
//!
//! ```text
//! SyncAgent  (agent.rs)        ← tick timer, simulation + transport seams
//!   └── SyncService  (service.rs) ← per-world pipeline, intent ledger
//!         ├── compute_delta  (delta.rs)    ← pure diff engine
//!         └── validate       (validate.rs) ← strict wire schemas
//!
//! ReplicaState  (replica.rs)   ← client-side mirror, base-tick gating
//! ```
//!
//! The protocol core (everything but `agent`) performs no I/O and never
//! blocks; it is safe to call directly from a tick thread.

// Protocol core is always available (no server feature needed).
pub mod component;
pub mod delta;
pub mod error;
pub mod event;
pub mod math;
pub mod protocol;
pub mod replica;
pub mod service;
pub mod types;
pub mod validate;

// Async tick driver requires the `server` feature.
#[cfg(feature = "server")]
pub mod agent;

// Convenience re-exports
#[cfg(feature = "server")]
pub use agent::{Inbound, Publisher, SyncAgent, SyncAgentConfig, WorldFrame, WorldSource};
pub use component::{ComponentMap, ComponentName, EntityMap, Health, Transform, Visual};
pub use delta::{apply_delta, compute_delta, delta_between};
pub use error::SyncError;
pub use event::{EventPacket, EventType};
pub use protocol::{Ack, BaseIntent, Delta, DeltaEntityUpdate, IntentKind, Snapshot};
pub use replica::{ApplyOutcome, ReplicaState};
pub use service::{IntentReceipt, Outbound, SyncService};
pub use types::{EntityId, Quaternion, SyncServiceConfig, SyncStats, Vector3};
pub use validate::{FieldIssue, Reason, ValidationError};
