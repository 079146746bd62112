//! The crawl dataflow.
//!
//! Repositories move through typed channels from stage to stage: languages, manifests,
//! optional vulnerability alerts, one dependency fetch per manifest, ecosystem filtering
//! and normalization, a windowed batch, and one score lookup per batch. Each stage runs
//! one task per item and admits remote work through a shared [`Throttler`]. Failures
//! travel alongside regular items as [`StageFailure`]s and end up in the output.

mod batcher;
mod crawl;
mod item;
mod stage;
mod throttler;

pub use batcher::WindowedBatcher;
pub use crawl::{CrawlOutcome, CrawlPipeline, CrawlRecord, ManifestSummary, PipelineSettings};
pub use item::{Item, Stage, StageFailure};
pub use stage::{CHANNEL_CAPACITY, spawn_stage};
pub use throttler::Throttler;

const LOG_TARGET: &str = "  pipeline";
