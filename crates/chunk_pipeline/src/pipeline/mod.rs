//! Chunk Processing Pipeline
//!
//! Turns chunk generation requests into finished chunks by running them
//! through an ordered list of stages on a worker pool, with a single reactor
//! thread sequencing every position.
//!
//! ```text
//! ┌──────────────────────┐     ┌──────────┐     ┌──────────┐             ┌──────────┐
//! │ Generation or Loading├────►│ Stage 0  ├────►│ Stage 1  ├──── ... ───►│ Stage N  ├──► handle resolved
//! └──────────────────────┘     └──────────┘     └──────────┘             └──────────┘
//!                                    │                │
//!                              requirements     requirements
//!                           (own, neighbors)   (own, neighbors)
//! ```
//!
//! # Requirements
//!
//! A task at stage `i` runs only once every position it requires resolves
//! to a chunk, either:
//!
//! 1. from the finished-chunk lookup, or
//! 2. borrowed from another in-flight position that has reached stage `i`
//!    or later
//!
//! # Position lifecycle
//!
//! - `Generating` → `Stage(0)` → ... → `Stage(N-1)` → done (handle resolved)
//! - any state → cancelled (`stop_processing_at`, `shutdown`, `restart`, or
//!   the caller cancelling the handle)
//! - any state → failed (a task returned an error or panicked)

pub mod processing;
mod reactor;
pub mod record;
pub mod stage;

// Test utilities
#[cfg(test)]
pub mod test_utils;

// Re-exports
pub use processing::ChunkProcessingPipeline;
pub use record::ProcessingState;
pub use stage::{ChunkTask, Stage, TaskResult, GENERATION_STAGE_NAME};
