//! Package scores from a secondary scoring service, looked up in batches.

mod client;

pub use client::{NpmsClient, ScoreSource, Scores};
