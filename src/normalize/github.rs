//! Dependency graph and vulnerability alert data reported by the GraphQL API.

use crate::github::{DependencyNode, VulnerabilityAlertNode};
use crate::graph::DependencyGraphBuilder;
use crate::normalize::{AdvisoryRecord, NormalizedRecord, PackageRecord, normalize_severity};

/// Normalizes the flat dependency listing of one manifest.
///
/// The listing carries requirements rather than installed versions, so the version of
/// each record is the requirement with any leading `=` removed, and no record has
/// dependencies of its own. There is never a root.
#[must_use]
pub fn from_dependency_nodes(nodes: &[DependencyNode], ecosystem: &str) -> NormalizedRecord {
    let packages: Vec<_> = nodes
        .iter()
        .map(|node| PackageRecord {
            name: node.package_name.clone(),
            version: node.requirements.trim().trim_start_matches('=').trim_start().to_string(),
            resolved: None,
            dependencies: Vec::new(),
        })
        .collect();

    let graph = DependencyGraphBuilder::new(ecosystem.to_ascii_lowercase()).build(&packages, None);

    let mut record = NormalizedRecord {
        graph_stats: Some(graph.stats),
        ..NormalizedRecord::default()
    };
    record.set_dependencies(packages, None);
    record
}

/// Converts repository vulnerability alerts into advisory records, one per alert.
#[must_use]
pub fn advisories_from_alerts(alerts: &[VulnerabilityAlertNode]) -> Vec<AdvisoryRecord> {
    alerts
        .iter()
        .map(|alert| {
            let advisory = alert.security_advisory.as_ref();
            let identifiers = advisory.map(|a| a.identifiers.as_slice()).unwrap_or_default();
            let package_name = advisory
                .and_then(|a| a.vulnerabilities.as_ref())
                .and_then(|v| v.nodes.first())
                .and_then(|v| v.package.as_ref())
                .map(|p| p.name.clone());

            AdvisoryRecord {
                package_name,
                advisory_id: advisory.and_then(|a| a.ghsa_id.clone()),
                url: advisory
                    .and_then(|a| a.ghsa_id.as_deref())
                    .map(|ghsa| format!("https://github.com/advisories/{ghsa}")),
                severity: advisory.and_then(|a| a.severity.as_deref()).map(normalize_severity),
                cwe: Vec::new(),
                cves: identifiers
                    .iter()
                    .filter(|id| id.kind.eq_ignore_ascii_case("CVE"))
                    .map(|id| id.value.clone())
                    .collect(),
                title: advisory.and_then(|a| a.summary.clone()),
                exploitability: None,
                vulnerable_versions: alert.vulnerable_requirements.clone(),
                patched_versions: None,
                created: advisory.and_then(|a| a.published_at),
                updated: advisory.and_then(|a| a.updated_at),
                findings: Vec::new(),
            }
        })
        .collect()
}
