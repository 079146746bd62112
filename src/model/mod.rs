//! Repository, reference, and package-manager data model.

mod dependency_file;
mod git_ref;
mod package_manager;
mod repo;

pub use dependency_file::DependencyFile;
pub use git_ref::{GitRef, GitRefKind};
pub use package_manager::{DependencyFileKind, Language, PackageManager, TaskKind};
pub use repo::{ManifestCursor, RepoCrawl, RepoIdentity, RepoMetadata};
