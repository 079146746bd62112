use crate::Result;
use crate::github::{DependencyNode, LanguageNode, ManifestNode, PageRequest, VulnerabilityAlertNode};
use chrono::{DateTime, Utc};
use core::fmt::{Display, Formatter};
use core::str::FromStr;
use ohno::bail;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

/// An `org/repo` pair naming a hosted repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepoIdentity {
    org: Box<str>,
    repo: Box<str>,
}

impl RepoIdentity {
    pub fn new(org: impl AsRef<str>, repo: impl AsRef<str>) -> Result<Self> {
        let org = org.as_ref().trim();
        let repo = repo.as_ref().trim().trim_end_matches(".git");

        if org.is_empty() || repo.is_empty() {
            bail!("invalid repository identity: empty owner or repo name in '{org}/{repo}'");
        }

        if org.contains('/') || repo.contains('/') {
            bail!("invalid repository identity: '{org}/{repo}'");
        }

        Ok(Self {
            org: Box::from(org),
            repo: Box::from(repo),
        })
    }

    /// Extracts the identity from a `https://github.com/org/repo` style URL.
    pub fn from_url(url: &Url) -> Result<Self> {
        if url.host_str() != Some("github.com") {
            bail!("not a GitHub URL: {url}");
        }

        let path_segments: Vec<_> = url.path_segments().map(Iterator::collect).unwrap_or_default();

        let [org, repo, ..] = path_segments.as_slice() else {
            bail!("invalid repository URL format: {url}");
        };

        Self::new(org, repo)
    }

    #[must_use]
    pub fn org(&self) -> &str {
        &self.org
    }

    #[must_use]
    pub fn repo(&self) -> &str {
        &self.repo
    }
}

impl FromStr for RepoIdentity {
    type Err = ohno::AppError;

    fn from_str(s: &str) -> Result<Self> {
        if s.starts_with("https://") || s.starts_with("http://") {
            let url = Url::parse(s)?;
            return Self::from_url(&url);
        }

        let Some((org, repo)) = s.split_once('/') else {
            bail!("expected 'org/repo', got '{s}'");
        };

        Self::new(org, repo)
    }
}

impl Display for RepoIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.org, self.repo)
    }
}

/// Repository scalars returned alongside the first page of a crawl query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoMetadata {
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub is_archived: Option<bool>,
    pub is_private: Option<bool>,
    pub is_fork: Option<bool>,
}

/// Pagination state needed to reach one manifest and its dependency page again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestCursor {
    /// The manifest page request that returned this manifest
    pub manifest_page: PageRequest,

    /// The cursor of the manifest's next dependency page, `None` for the first page
    pub dependencies_after: Option<String>,
}

/// Everything collected for one repository during a crawl.
///
/// Owned by the pipeline stage currently working on the repository. Client operations
/// replace whole entries by key, so repeating an operation never accumulates duplicates.
#[derive(Debug, Clone)]
pub struct RepoCrawl {
    identity: RepoIdentity,
    metadata: Option<RepoMetadata>,
    languages: Vec<LanguageNode>,
    dep_files: Vec<ManifestNode>,
    dep_file_cursors: HashMap<String, ManifestCursor>,
    dep_file_deps: HashMap<String, Vec<DependencyNode>>,
    vulnerability_alerts: Vec<VulnerabilityAlertNode>,
}

impl RepoCrawl {
    #[must_use]
    pub fn new(identity: RepoIdentity) -> Self {
        Self {
            identity,
            metadata: None,
            languages: Vec::new(),
            dep_files: Vec::new(),
            dep_file_cursors: HashMap::new(),
            dep_file_deps: HashMap::new(),
            vulnerability_alerts: Vec::new(),
        }
    }

    #[must_use]
    pub const fn identity(&self) -> &RepoIdentity {
        &self.identity
    }

    #[must_use]
    pub const fn metadata(&self) -> Option<&RepoMetadata> {
        self.metadata.as_ref()
    }

    #[must_use]
    pub fn languages(&self) -> &[LanguageNode] {
        &self.languages
    }

    #[must_use]
    pub fn dep_files(&self) -> &[ManifestNode] {
        &self.dep_files
    }

    #[must_use]
    pub fn dep_file(&self, manifest_id: &str) -> Option<&ManifestNode> {
        self.dep_files.iter().find(|m| m.id == manifest_id)
    }

    #[must_use]
    pub fn dep_file_cursor(&self, manifest_id: &str) -> Option<&ManifestCursor> {
        self.dep_file_cursors.get(manifest_id)
    }

    #[must_use]
    pub fn dep_file_deps(&self, manifest_id: &str) -> Option<&[DependencyNode]> {
        self.dep_file_deps.get(manifest_id).map(Vec::as_slice)
    }

    #[must_use]
    pub fn vulnerability_alerts(&self) -> &[VulnerabilityAlertNode] {
        &self.vulnerability_alerts
    }

    pub(crate) fn set_metadata(&mut self, metadata: RepoMetadata) {
        self.metadata = Some(metadata);
    }

    pub(crate) fn set_languages(&mut self, languages: Vec<LanguageNode>) {
        self.languages = languages;
    }

    /// Replaces the manifest list along with the cursors that reach each manifest.
    pub(crate) fn set_dep_files(&mut self, manifests: Vec<ManifestNode>, manifest_page: &PageRequest) {
        self.dep_file_cursors.clear();
        for manifest in &manifests {
            let _ = self.dep_file_cursors.insert(
                manifest.id.clone(),
                ManifestCursor {
                    manifest_page: manifest_page.clone(),
                    dependencies_after: None,
                },
            );
        }

        self.dep_file_deps.retain(|id, _| manifests.iter().any(|m| &m.id == id));
        self.dep_files = manifests;
    }

    pub(crate) fn set_dep_file_deps(&mut self, manifest_id: &str, dependencies: Vec<DependencyNode>) {
        let _ = self.dep_file_deps.insert(manifest_id.to_string(), dependencies);
    }

    pub(crate) fn set_vulnerability_alerts(&mut self, alerts: Vec<VulnerabilityAlertNode>) {
        self.vulnerability_alerts = alerts;
    }
}
