use crate::graph::GraphStats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One installed package and the packages it depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub name: String,
    pub version: String,

    /// Where the package was fetched from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<String>,

    /// Dependency specifiers, either `name@version` or `name@range`
    #[serde(default)]
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisoryFinding {
    pub version: Option<String>,
    #[serde(default)]
    pub paths: Vec<String>,
}

/// A security advisory reported against some dependency.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryRecord {
    pub package_name: Option<String>,
    pub advisory_id: Option<String>,
    pub url: Option<String>,
    pub severity: Option<String>,
    #[serde(default)]
    pub cwe: Vec<String>,
    #[serde(default)]
    pub cves: Vec<String>,
    pub title: Option<String>,
    pub exploitability: Option<f64>,
    pub vulnerable_versions: Option<String>,
    pub patched_versions: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub findings: Vec<AdvisoryFinding>,
}

impl AdvisoryRecord {
    /// Reads an advisory in the shape shared by `npm audit` and `yarn audit`.
    ///
    /// Unknown or mistyped fields are ignored rather than rejected.
    #[must_use]
    pub fn from_audit_advisory(value: &Value) -> Self {
        let str_field = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);
        let time_field = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc))
        };

        Self {
            package_name: str_field("module_name").or_else(|| str_field("name")),
            advisory_id: value.get("id").and_then(scalar_to_string),
            url: str_field("url"),
            severity: str_field("severity").map(|s| normalize_severity(&s)),
            cwe: strings(value.get("cwe")),
            cves: strings(value.get("cves")),
            title: str_field("title"),
            exploitability: value
                .pointer("/metadata/exploitability")
                .or_else(|| value.pointer("/cvss/score"))
                .and_then(Value::as_f64),
            vulnerable_versions: str_field("vulnerable_versions").or_else(|| str_field("range")),
            patched_versions: str_field("patched_versions"),
            created: time_field("created"),
            updated: time_field("updated"),
            findings: value
                .get("findings")
                .and_then(Value::as_array)
                .map(|findings| {
                    findings
                        .iter()
                        .map(|f| AdvisoryFinding {
                            version: f.get("version").and_then(Value::as_str).map(str::to_string),
                            paths: strings(f.get("paths")),
                        })
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

/// Lowercases a severity and folds the synonyms different feeds use.
#[must_use]
pub fn normalize_severity(severity: &str) -> String {
    let lower = severity.trim().to_ascii_lowercase();
    match lower.as_str() {
        "medium" => "moderate".to_string(),
        "informational" => "info".to_string(),
        _ => lower,
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Accepts either a single string or an array of strings.
fn strings(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

/// The unified result of normalizing one task's output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    #[serde(default)]
    pub dependencies: Vec<PackageRecord>,
    pub dependencies_count: u64,
    #[serde(default)]
    pub problems: Vec<String>,
    pub problems_count: u64,
    pub root: Option<PackageRecord>,
    pub direct_dependencies_count: Option<u64>,
    #[serde(default)]
    pub advisories: Vec<AdvisoryRecord>,
    pub vulnerabilities_count: u64,
    #[serde(default)]
    pub vulnerabilities: BTreeMap<String, u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev_dependencies_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional_dependencies_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_dependencies_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_stats: Option<GraphStats>,
}

impl NormalizedRecord {
    /// Sets the per-severity counts from a JSON object, keeping the total in step.
    ///
    /// A `total` entry, as newer npm versions emit, is not a severity and is skipped.
    pub fn set_vulnerabilities(&mut self, counts: Option<&Value>) {
        self.vulnerabilities = counts
            .and_then(Value::as_object)
            .map(|counts| {
                counts
                    .iter()
                    .filter(|(severity, _)| severity.as_str() != "total")
                    .filter_map(|(severity, count)| count.as_u64().map(|c| (normalize_severity(severity), c)))
                    .fold(BTreeMap::new(), |mut acc, (severity, count)| {
                        *acc.entry(severity).or_insert(0) += count;
                        acc
                    })
            })
            .unwrap_or_default();
        self.vulnerabilities_count = self.vulnerabilities.values().sum();
    }

    /// Sets the dependency list and the counts derived from it.
    pub fn set_dependencies(&mut self, dependencies: Vec<PackageRecord>, root: Option<PackageRecord>) {
        self.dependencies_count = dependencies.len() as u64;
        self.direct_dependencies_count = root.as_ref().map(|r| r.dependencies.len() as u64);
        self.dependencies = dependencies;
        self.root = root;
    }

    /// Sets advisories that are the only source of vulnerability counts, counting one per advisory.
    pub fn set_advisories_with_counts(&mut self, advisories: Vec<AdvisoryRecord>) {
        let mut counts = BTreeMap::new();
        for advisory in &advisories {
            let severity = advisory.severity.clone().unwrap_or_else(|| "unknown".to_string());
            *counts.entry(severity).or_insert(0) += 1;
        }

        self.vulnerabilities_count = counts.values().sum();
        self.vulnerabilities = counts;
        self.advisories = advisories;
    }

    pub fn set_problems(&mut self, problems: Vec<String>) {
        self.problems_count = problems.len() as u64;
        self.problems = problems;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_vulnerability_count_is_sum_of_map() {
        let mut record = NormalizedRecord::default();
        record.set_vulnerabilities(Some(&json!({"info": 1, "low": 2, "moderate": 0, "high": 3, "critical": 4, "total": 10})));

        assert_eq!(record.vulnerabilities_count, 10);
        assert_eq!(record.vulnerabilities_count, record.vulnerabilities.values().sum::<u64>());
        assert!(!record.vulnerabilities.contains_key("total"));
    }

    #[test]
    fn test_missing_vulnerabilities_yield_zero() {
        let mut record = NormalizedRecord::default();
        record.set_vulnerabilities(None);
        assert_eq!(record.vulnerabilities_count, 0);
        assert!(record.vulnerabilities.is_empty());
    }

    #[test]
    fn test_advisory_from_npm_shape() {
        let advisory = AdvisoryRecord::from_audit_advisory(&json!({
            "id": 118,
            "module_name": "minimatch",
            "url": "https://npmjs.com/advisories/118",
            "severity": "High",
            "cwe": "CWE-400",
            "cves": ["CVE-2016-10540"],
            "title": "Regular Expression Denial of Service",
            "vulnerable_versions": "<=3.0.1",
            "patched_versions": ">=3.0.2",
            "created": "2016-05-25T16:37:20.000Z",
            "updated": "2018-03-01T21:58:01.072Z",
            "metadata": {"exploitability": 4},
            "findings": [{"version": "0.2.14", "paths": ["mocha>glob>minimatch"]}]
        }));

        assert_eq!(advisory.package_name.as_deref(), Some("minimatch"));
        assert_eq!(advisory.advisory_id.as_deref(), Some("118"));
        assert_eq!(advisory.severity.as_deref(), Some("high"));
        assert_eq!(advisory.cwe, vec!["CWE-400".to_string()]);
        assert_eq!(advisory.cves, vec!["CVE-2016-10540".to_string()]);
        assert_eq!(advisory.exploitability, Some(4.0));
        assert_eq!(advisory.created.unwrap().timestamp(), 1_464_194_240);
        assert_eq!(advisory.findings[0].paths, vec!["mocha>glob>minimatch".to_string()]);
    }

    #[test]
    fn test_advisory_tolerates_missing_fields() {
        let advisory = AdvisoryRecord::from_audit_advisory(&json!({"title": "t", "cwe": ["CWE-1", "CWE-2"], "created": "not a date"}));
        assert_eq!(advisory.package_name, None);
        assert_eq!(advisory.cwe.len(), 2);
        assert_eq!(advisory.created, None);
    }

    #[test]
    fn test_advisory_counts_follow_severities() {
        let advisory = |severity: Option<&str>| AdvisoryRecord {
            severity: severity.map(str::to_string),
            ..AdvisoryRecord::default()
        };

        let mut record = NormalizedRecord::default();
        record.set_advisories_with_counts(vec![advisory(Some("high")), advisory(Some("high")), advisory(None)]);

        assert_eq!(record.vulnerabilities_count, 3);
        assert_eq!(record.vulnerabilities["high"], 2);
        assert_eq!(record.vulnerabilities["unknown"], 1);
    }

    #[test]
    fn test_normalize_severity() {
        assert_eq!(normalize_severity("MODERATE"), "moderate");
        assert_eq!(normalize_severity("Medium"), "moderate");
        assert_eq!(normalize_severity("critical"), "critical");
    }
}
