// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod config;
pub mod dedup;
pub mod fingerprint;
pub mod generate;
pub mod metrics;
pub mod model;
pub mod policy;
pub mod publish;
pub mod queue;
pub mod scheduler;
pub mod score;
pub mod sources;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::api::create_router;
pub use crate::model::{CanonicalItem, RawItem, Region, SourceId};
pub use crate::policy::{may_post, DenyReason, PostGate, PostingWindowState};
pub use crate::queue::{EntryState, PostQueue, QueueEntry};
pub use crate::scheduler::{Engine, Scheduler, StepOutcome};
