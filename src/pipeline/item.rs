use crate::github::{CrawlError, FailureKind};
use crate::model::RepoIdentity;
use core::fmt::{Display, Formatter};
use serde::Serialize;

/// The pipeline step a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    Languages,
    Manifests,
    VulnerabilityAlerts,
    Dependencies,
    Scoring,
}

/// A failure confined to one repository, or to one manifest of a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageFailure {
    pub repo: RepoIdentity,
    pub stage: Stage,
    pub kind: FailureKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<String>,
}

impl StageFailure {
    #[must_use]
    pub fn new(repo: RepoIdentity, stage: Stage, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            repo,
            stage,
            kind,
            message: message.into(),
            manifest: None,
        }
    }

    #[must_use]
    pub fn from_crawl_error(repo: RepoIdentity, stage: Stage, error: &CrawlError) -> Self {
        Self::new(repo, stage, error.kind(), error.message())
    }

    #[must_use]
    pub fn with_manifest(mut self, manifest_id: impl Into<String>) -> Self {
        self.manifest = Some(manifest_id.into());
        self
    }
}

impl Display for StageFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} failed for {}", self.stage, self.repo)?;
        if let Some(manifest) = &self.manifest {
            write!(f, " (manifest {manifest})")?;
        }

        write!(f, ": {}: {}", self.kind, self.message)
    }
}

/// What flows between pipeline stages: a unit of work, or the failure that replaced it.
///
/// Stages only act on [`Item::Ok`] and pass failures along untouched.
#[derive(Debug, Clone)]
pub enum Item<T> {
    Ok(T),
    Failed(StageFailure),
}

impl<T> Item<T> {
    /// Converts a stage result, logging the failure once where it happens.
    pub fn from_result(result: Result<T, StageFailure>) -> Self {
        match result {
            Ok(value) => Self::Ok(value),
            Err(failure) => {
                log::warn!(target: super::LOG_TARGET, "{failure}");
                Self::Failed(failure)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_display_names_stage_and_manifest() {
        let failure = StageFailure::new(
            RepoIdentity::new("orgA", "repoA").unwrap(),
            Stage::Dependencies,
            FailureKind::NotFound,
            "gone",
        )
        .with_manifest("MDIz");

        assert_eq!(failure.to_string(), "dependencies failed for orgA/repoA (manifest MDIz): NotFound: gone");
    }

    #[test]
    fn test_from_crawl_error_keeps_kind() {
        let error = CrawlError::new(FailureKind::UpstreamNullObject, "repository resolved to null");
        let failure = StageFailure::from_crawl_error(RepoIdentity::new("o", "r").unwrap(), Stage::Languages, &error);
        assert_eq!(failure.kind, FailureKind::UpstreamNullObject);
        assert_eq!(failure.message, "repository resolved to null");
        assert_eq!(failure.manifest, None);
    }
}
