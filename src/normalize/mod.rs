//! Normalization of package-manager output into one record shape.
//!
//! npm and cargo write a single JSON document per command while yarn writes one JSON
//! object per line. All of them end up as a [`NormalizedRecord`], as does the flat
//! dependency listing of the GraphQL dependency graph.

mod cargo;
mod github;
mod npm;
mod postprocess;
mod record;
mod task;
mod yarn;

pub use github::{advisories_from_alerts, from_dependency_nodes};
pub use postprocess::{PostprocessedRecord, TaskEntry, TaskRow, postprocess, read_rows};
pub use record::{AdvisoryFinding, AdvisoryRecord, NormalizedRecord, PackageRecord, normalize_severity};
pub use task::{ClassifiedTask, TaskFormat, TaskOutput, normalize};
