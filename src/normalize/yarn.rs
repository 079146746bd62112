//! `yarn list --json` and `yarn audit --json` output, one JSON object per line.

use crate::graph::DependencyGraphBuilder;
use crate::normalize::{AdvisoryRecord, NormalizedRecord, PackageRecord};
use serde_json::Value;

const LOG_TARGET: &str = "      yarn";

/// Parses every non-blank line, or nothing at all if any line is not JSON.
fn parse_lines(stdout: &str) -> Option<Vec<Value>> {
    let mut lines = Vec::new();
    for (index, line) in stdout.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<Value>(line) {
            Ok(value) if value.is_object() => lines.push(value),
            Ok(_) => {}
            Err(e) => {
                log::warn!(target: LOG_TARGET, "Unable to parse line {} of yarn output as JSON: {e}", index + 1);
                return None;
            }
        }
    }

    Some(lines)
}

fn line_parts(line: &Value) -> (&str, Option<&Value>) {
    (line.get("type").and_then(Value::as_str).unwrap_or_default(), line.get("data"))
}

/// Parses the `tree` lines of `yarn list --json`.
///
/// yarn does not report the project itself, so the record never has a root.
pub fn parse_list(stdout: &str) -> NormalizedRecord {
    let mut record = NormalizedRecord::default();
    let Some(lines) = parse_lines(stdout) else {
        return record;
    };

    let mut packages = Vec::new();
    for line in &lines {
        match line_parts(line) {
            ("tree", Some(data)) => {
                let trees = data.get("trees").and_then(Value::as_array).map(Vec::as_slice).unwrap_or_default();
                flatten_trees(trees, &mut packages);
            }
            (line_type, _) => log::debug!(target: LOG_TARGET, "Skipping yarn list line of type '{line_type}'"),
        }
    }

    let graph = DependencyGraphBuilder::new("yarn").build(&packages, None);
    record.graph_stats = Some(graph.stats);
    record.set_dependencies(packages, None);
    record
}

/// Collects a record for every tree node that is installed at its position.
///
/// Shadow children point at a package listed elsewhere and only show up as specifiers.
fn flatten_trees(trees: &[Value], packages: &mut Vec<PackageRecord>) {
    let mut stack: Vec<&Value> = trees.iter().rev().collect();
    while let Some(tree) = stack.pop() {
        let Some(full_name) = tree.get("name").and_then(Value::as_str) else {
            continue;
        };

        let children = tree.get("children").and_then(Value::as_array).map(Vec::as_slice).unwrap_or_default();
        let (name, version) = split_name(full_name);
        packages.push(PackageRecord {
            name: name.to_string(),
            version: version.to_string(),
            resolved: None,
            dependencies: children
                .iter()
                .filter_map(|child| child.get("name").and_then(Value::as_str).map(str::to_string))
                .collect(),
        });

        stack.extend(children.iter().rev().filter(|child| !is_shadow(child)));
    }
}

fn is_shadow(tree: &Value) -> bool {
    tree.get("shadow").and_then(Value::as_bool).unwrap_or(false)
}

/// Splits `name@version`, keeping the leading `@` of scoped package names.
fn split_name(full_name: &str) -> (&str, &str) {
    match full_name.rsplit_once('@') {
        Some((name, version)) if !name.is_empty() => (name, version),
        _ => (full_name, ""),
    }
}

/// Parses the `auditAdvisory` and `auditSummary` lines of `yarn audit --json`.
pub fn parse_audit(stdout: &str) -> NormalizedRecord {
    let mut record = NormalizedRecord::default();
    let Some(lines) = parse_lines(stdout) else {
        return record;
    };

    for line in &lines {
        match line_parts(line) {
            ("auditAdvisory", Some(data)) => {
                let advisory = data.get("advisory").unwrap_or(data);
                record.advisories.push(AdvisoryRecord::from_audit_advisory(advisory));
            }
            ("auditSummary", Some(summary)) => {
                record.set_vulnerabilities(summary.get("vulnerabilities"));
                let count = |key: &str| summary.get(key).and_then(Value::as_u64);
                record.dependencies_count = count("dependencies").unwrap_or_default();
                record.dev_dependencies_count = count("devDependencies");
                record.optional_dependencies_count = count("optionalDependencies");
                record.total_dependencies_count = count("totalDependencies");
            }
            (line_type, _) => log::debug!(target: LOG_TARGET, "Skipping yarn audit line of type '{line_type}'"),
        }
    }

    record
}
