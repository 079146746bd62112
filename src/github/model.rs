//! Response shapes of the crawl queries.

use crate::model::RepoMetadata;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The `data` object of every crawl query.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryData {
    pub rate_limit: Option<RateLimitNode>,
    pub repository: Option<RepositoryNode>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitNode {
    pub limit: Option<u64>,
    pub cost: Option<u64>,
    pub remaining: Option<u64>,
    pub reset_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryNode {
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub is_archived: Option<bool>,
    pub is_private: Option<bool>,
    pub is_fork: Option<bool>,
    pub languages: Option<EdgeConnection<LanguageNode>>,
    pub dependency_graph_manifests: Option<EdgeConnection<ManifestNode>>,
    pub vulnerability_alerts: Option<EdgeConnection<VulnerabilityAlertNode>>,
}

impl RepositoryNode {
    /// Repository scalars, present only when the query asked for them.
    #[must_use]
    pub fn metadata(&self) -> Option<RepoMetadata> {
        if self.created_at.is_none() && self.updated_at.is_none() && self.is_archived.is_none() {
            return None;
        }

        Some(RepoMetadata {
            created_at: self.created_at,
            updated_at: self.updated_at,
            description: self.description.clone(),
            is_archived: self.is_archived,
            is_private: self.is_private,
            is_fork: self.is_fork,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeConnection<T> {
    #[serde(default)]
    pub page_info: PageInfo,
    pub total_count: Option<u64>,
    pub total_size: Option<u64>,
    #[serde(default = "Vec::new")]
    pub edges: Vec<Edge<T>>,
}

impl<T> EdgeConnection<T> {
    pub fn into_nodes(self) -> Vec<T> {
        self.edges.into_iter().map(|edge| edge.node).collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Edge<T> {
    pub node: T,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConnection<T> {
    #[serde(default)]
    pub page_info: PageInfo,
    pub total_count: Option<u64>,
    #[serde(default = "Vec::new")]
    pub nodes: Vec<T>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageNode {
    pub id: String,
    pub name: String,
}

/// A dependency manifest or lockfile known to the dependency graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestNode {
    pub id: String,
    #[serde(default)]
    pub blob_path: Option<String>,
    #[serde(default)]
    pub dependencies_count: Option<u64>,
    #[serde(default)]
    pub exceeds_max_size: bool,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub parseable: bool,

    /// Present only in manifest-scoped dependency queries
    #[serde(default, skip_serializing)]
    pub dependencies: Option<NodeConnection<DependencyNode>>,
}

#[cfg(test)]
impl ManifestNode {
    pub(crate) fn with_id(id: &str) -> Self {
        Self {
            id: id.to_string(),
            blob_path: None,
            dependencies_count: None,
            exceeds_max_size: false,
            filename: None,
            parseable: true,
            dependencies: None,
        }
    }
}

/// One dependency declared by a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyNode {
    pub package_name: String,
    #[serde(default)]
    pub package_manager: Option<String>,
    #[serde(default)]
    pub has_dependencies: bool,

    /// The requirement string, such as `= 4.17.21` or `^1.0.0`
    #[serde(default)]
    pub requirements: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VulnerabilityAlertNode {
    pub id: String,
    pub dismiss_reason: Option<String>,
    pub dismissed_at: Option<DateTime<Utc>>,
    pub dismisser: Option<Actor>,
    pub security_advisory: Option<SecurityAdvisoryNode>,
    pub vulnerable_manifest_filename: Option<String>,
    pub vulnerable_manifest_path: Option<String>,
    pub vulnerable_requirements: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityAdvisoryNode {
    pub id: String,
    pub ghsa_id: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub severity: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub withdrawn_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub identifiers: Vec<AdvisoryIdentifier>,
    #[serde(default, skip_serializing)]
    pub vulnerabilities: Option<NodeConnection<SecurityVulnerabilityNode>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisoryIdentifier {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityVulnerabilityNode {
    pub package: Option<VulnerablePackage>,
    pub severity: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
    pub vulnerable_version_range: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VulnerablePackage {
    pub name: String,
    pub ecosystem: Option<String>,
}
