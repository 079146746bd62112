//! `npm list --json` and `npm audit --json` output.

use crate::graph::DependencyGraphBuilder;
use crate::normalize::{AdvisoryRecord, NormalizedRecord, PackageRecord};
use serde_json::{Map, Value};

const LOG_TARGET: &str = "       npm";

fn parse_document(stdout: &str) -> Option<Value> {
    match serde_json::from_str(stdout) {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!(target: LOG_TARGET, "Unable to parse npm output as JSON: {e}");
            None
        }
    }
}

/// Parses the nested dependency tree of `npm list --json`.
///
/// Every package in the tree becomes a record, the root last. Missing packages only
/// contribute their required range to their parent's specifiers.
pub fn parse_list(stdout: &str) -> NormalizedRecord {
    let mut record = NormalizedRecord::default();
    let Some(document) = parse_document(stdout) else {
        return record;
    };

    let mut packages = Vec::new();
    let root = package_record(
        document.get("name").and_then(Value::as_str).unwrap_or_default(),
        &document,
        true,
    );

    // depth-first over the tree with an explicit stack
    let mut stack: Vec<&Map<String, Value>> = children(&document).into_iter().collect();
    while let Some(dependencies) = stack.pop() {
        for (name, node) in dependencies {
            if let Some(package) = package_record(name, node, false) {
                packages.push(package);
            }

            if let Some(grandchildren) = children(node) {
                stack.push(grandchildren);
            }
        }
    }

    let problems = document
        .get("problems")
        .and_then(Value::as_array)
        .map(|problems| problems.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();

    let graph = DependencyGraphBuilder::new("npm").build(&packages, root.as_ref());
    record.graph_stats = Some(graph.stats);

    if let Some(root) = &root {
        packages.push(root.clone());
    }

    record.set_dependencies(packages, root);
    record.set_problems(problems);
    record.error = document.get("error").cloned();
    record
}

fn children(node: &Value) -> Option<&Map<String, Value>> {
    node.get("dependencies").and_then(Value::as_object)
}

/// Builds the record for one tree node; nodes without an installed version only exist as specifiers.
fn package_record(name: &str, node: &Value, is_root: bool) -> Option<PackageRecord> {
    let version = node.get("version").and_then(Value::as_str);
    if version.is_none() && !is_root {
        return None;
    }

    let dependencies = children(node)
        .map(|children| {
            children
                .iter()
                .filter_map(|(child_name, child)| {
                    child
                        .get("version")
                        .or_else(|| child.get("required"))
                        .and_then(Value::as_str)
                        .map(|version| format!("{child_name}@{version}"))
                })
                .collect()
        })
        .unwrap_or_default();

    Some(PackageRecord {
        name: name.to_string(),
        version: version.unwrap_or_default().to_string(),
        resolved: node.get("resolved").and_then(Value::as_str).map(str::to_string),
        dependencies,
    })
}

/// Parses `npm audit --json`, in either the advisory-keyed or the package-keyed report layout.
pub fn parse_audit(stdout: &str) -> NormalizedRecord {
    let mut record = NormalizedRecord::default();
    let Some(document) = parse_document(stdout) else {
        return record;
    };

    let metadata = document.get("metadata");
    record.set_vulnerabilities(metadata.and_then(|m| m.get("vulnerabilities")));
    record.advisories = audit_advisories(&document);

    let count = |key: &str, nested: &str| {
        metadata.and_then(|m| {
            m.get(key)
                .and_then(Value::as_u64)
                .or_else(|| m.get("dependencies").and_then(|d| d.get(nested)).and_then(Value::as_u64))
        })
    };

    record.dependencies_count = count("dependencies", "prod").unwrap_or_default();
    record.dev_dependencies_count = count("devDependencies", "dev");
    record.optional_dependencies_count = count("optionalDependencies", "optional");
    record.total_dependencies_count = count("totalDependencies", "total");
    record.error = document.get("error").cloned();
    record
}

fn audit_advisories(document: &Value) -> Vec<AdvisoryRecord> {
    if let Some(advisories) = document.get("advisories").and_then(Value::as_object) {
        return advisories.values().map(AdvisoryRecord::from_audit_advisory).collect();
    }

    // newer reports list vulnerable packages, each naming the advisories it comes from
    document
        .get("vulnerabilities")
        .and_then(Value::as_object)
        .map(|packages| {
            packages
                .values()
                .filter_map(|package| package.get("via").and_then(Value::as_array))
                .flatten()
                .filter(|via| via.is_object())
                .map(|via| {
                    let mut advisory = AdvisoryRecord::from_audit_advisory(via);
                    advisory.advisory_id = via
                        .get("source")
                        .and_then(Value::as_u64)
                        .map(|id| id.to_string())
                        .or(advisory.advisory_id);
                    advisory
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIST_OUTPUT: &str = r#"{
        "name": "app",
        "version": "1.0.0",
        "problems": ["missing: left-pad@^1.0.0, required by app@1.0.0"],
        "dependencies": {
            "express": {
                "version": "4.17.1",
                "resolved": "https://registry.npmjs.org/express/-/express-4.17.1.tgz",
                "dependencies": {
                    "debug": {"version": "2.6.9", "dependencies": {"ms": {"version": "2.0.0"}}}
                }
            },
            "ms": {"version": "2.1.2"},
            "left-pad": {"required": "^1.0.0", "missing": true}
        }
    }"#;

    #[test]
    fn test_parse_list_flattens_tree_with_root_last() {
        let record = parse_list(LIST_OUTPUT);

        let names: Vec<_> = record.dependencies.iter().map(|p| format!("{}@{}", p.name, p.version)).collect();
        assert_eq!(record.dependencies_count, 5);
        assert_eq!(names.len(), 5);
        assert_eq!(names.last().unwrap(), "app@1.0.0");
        assert!(names.contains(&"ms@2.0.0".to_string()));
        assert!(names.contains(&"ms@2.1.2".to_string()));

        let root = record.root.as_ref().unwrap();
        assert_eq!(root.dependencies, vec!["express@4.17.1", "left-pad@^1.0.0", "ms@2.1.2"]);
        assert_eq!(record.direct_dependencies_count, Some(3));
        assert_eq!(record.problems_count, 1);

        let express = record.dependencies.iter().find(|p| p.name == "express").unwrap();
        assert!(express.resolved.as_deref().unwrap().ends_with("express-4.17.1.tgz"));
    }

    #[test]
    fn test_parse_list_graph_stats() {
        let stats = parse_list(LIST_OUTPUT).graph_stats.unwrap();
        assert_eq!(stats.node_count, 5);
        // app->express, app->ms@2.1.2, express->debug, debug->ms@2.0.0
        assert_eq!(stats.edge_count, 4);
        assert_eq!(stats.unresolved_edge_count, 1);
        assert!(stats.has_root);
    }

    #[test]
    fn test_parse_list_malformed() {
        let record = parse_list("npm ERR! code ELSPROBLEMS\n{");
        assert_eq!(record, NormalizedRecord::default());
    }

    #[test]
    fn test_parse_audit_advisory_layout() {
        let record = parse_audit(
            r#"{
            "advisories": {
                "118": {"id": 118, "module_name": "minimatch", "severity": "high", "title": "ReDoS", "cves": []},
                "577": {"id": 577, "module_name": "lodash", "severity": "low", "title": "Prototype Pollution"}
            },
            "metadata": {
                "vulnerabilities": {"info": 0, "low": 1, "moderate": 0, "high": 2, "critical": 0},
                "dependencies": 120,
                "devDependencies": 30,
                "optionalDependencies": 2,
                "totalDependencies": 150
            }
        }"#,
        );

        assert_eq!(record.advisories.len(), 2);
        assert_eq!(record.vulnerabilities_count, 3);
        assert_eq!(record.vulnerabilities_count, record.vulnerabilities.values().sum::<u64>());
        assert_eq!(record.dependencies_count, 120);
        assert_eq!(record.dev_dependencies_count, Some(30));
        assert_eq!(record.total_dependencies_count, Some(150));
    }

    #[test]
    fn test_parse_audit_package_layout() {
        let record = parse_audit(
            r#"{
            "auditReportVersion": 2,
            "vulnerabilities": {
                "minimist": {
                    "name": "minimist", "severity": "critical",
                    "via": [{"source": 1179, "name": "minimist", "title": "Prototype Pollution", "severity": "critical",
                             "cwe": ["CWE-1321"], "cvss": {"score": 9.8}, "range": "<0.2.1"}]
                },
                "mkdirp": {"name": "mkdirp", "severity": "critical", "via": ["minimist"]}
            },
            "metadata": {
                "vulnerabilities": {"info": 0, "low": 0, "moderate": 0, "high": 0, "critical": 2, "total": 2},
                "dependencies": {"prod": 10, "dev": 4, "optional": 0, "total": 14}
            }
        }"#,
        );

        assert_eq!(record.advisories.len(), 1);
        let advisory = &record.advisories[0];
        assert_eq!(advisory.advisory_id.as_deref(), Some("1179"));
        assert_eq!(advisory.package_name.as_deref(), Some("minimist"));
        assert_eq!(advisory.exploitability, Some(9.8));
        assert_eq!(advisory.vulnerable_versions.as_deref(), Some("<0.2.1"));
        assert_eq!(record.vulnerabilities_count, 2);
        assert_eq!(record.dependencies_count, 10);
        assert_eq!(record.dev_dependencies_count, Some(4));
        assert_eq!(record.total_dependencies_count, Some(14));
    }

    #[test]
    fn test_parse_audit_error_document() {
        let record = parse_audit(r#"{"error": {"code": "ENOLOCK", "summary": "no lockfile"}}"#);
        assert_eq!(record.vulnerabilities_count, 0);
        assert_eq!(record.error.unwrap()["code"], "ENOLOCK");
    }
}
