//! chunk_pipeline - Asynchronous, dependency-aware chunk processing
//!
//! This crate turns chunk generation requests into fully processed chunks
//! (lit, merged, meshed, ...) by running each position through an ordered
//! list of stages on a worker pool. A single reactor thread sequences every
//! position, so stage tasks may read neighboring chunks safely.
//!
//! # Features
//!
//! - **Completion-ordered executor**: a fixed rayon pool whose pending work
//!   and completions are both ordered by a caller-supplied priority
//! - **Dependency gating**: a task runs only once the chunks it requires are
//!   finished or far enough along in the pipeline
//! - **Cancellation**: per position, on shutdown, or by cancelling the
//!   returned handle
//! - **Handles**: blocking `get`, callbacks, and `std::future::Future`
//!
//! # Example
//!
//! ```ignore
//! use chunk_pipeline::{ChunkProcessingPipeline, NearestFirst, PipelineConfig, Stage};
//!
//! let pipeline = ChunkProcessingPipeline::new(
//!     PipelineConfig::default(),
//!     move |pos| ready_chunks.get(pos),
//!     NearestFirst::new(viewer_chunk),
//! )?;
//!
//! pipeline
//!     .add_stage(Stage::single("Chunk generate internal lighting", light_internal))
//!     .add_stage(Stage::multi("Light merging", merge_light, |pos| neighborhood(pos, 1)))
//!     .add_stage(Stage::inspect("Chunk ready", move |chunk| ready.push(chunk.position())));
//!
//! let handle = pipeline.invoke_generator_task(pos, move || Ok(generator.generate(pos)));
//! ```

pub mod chunk;
pub mod completion_queue;
pub mod config;
pub mod error;
pub mod executor;
pub mod handle;
pub mod metrics;
pub mod position;
pub mod priority;
mod sync;

// Pipeline facade, stages and records
pub mod pipeline;

// Re-export commonly used items
pub use chunk::{Chunk, ChunkLookup};
pub use config::PipelineConfig;
pub use error::{PipelineError, Result, TaskError};
pub use executor::{is_current_task_cancelled, CompletionExecutor, TaskHandle, TaskId};
pub use handle::ChunkFuture;
pub use metrics::MetricsSnapshot;
pub use pipeline::{ChunkProcessingPipeline, ChunkTask, ProcessingState, Stage, TaskResult};
pub use position::{neighborhood, Position, Requirements};
pub use priority::{Fifo, NearestFirst, TaskPriority};
