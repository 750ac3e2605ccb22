//! Checkpoint snapshots of execution state.
//!
//! A checkpoint is a self-describing JSON document holding a serialized
//! execution graph plus the job configs needed to resume it. Documents
//! are validated structurally on load so a truncated or hand-edited file
//! fails fast instead of resuming from garbage.

mod error;
mod snapshot;
mod store;

pub use error::{CheckpointError, CheckpointResult};
pub use snapshot::{
    deserialize, serialize, validate, CheckpointDocument, SerializedExecution, SerializedJob,
};
pub use store::CheckpointStore;
