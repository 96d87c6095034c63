use crate::validate::ValidationError;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Caller-contract violation: ticks must strictly increase per world.
    #[error("tick {tick} does not advance past base tick {base_tick}")]
    NonMonotonicTick { base_tick: u64, tick: u64 },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}
