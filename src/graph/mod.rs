//! Dependency graphs built from normalized package records.

mod builder;
mod specifier;

pub use builder::{DependencyGraph, DependencyGraphBuilder, GraphStats, Link, NodeId, PackageNode, UnresolvedEdge};
pub use specifier::DependentSpecifier;
