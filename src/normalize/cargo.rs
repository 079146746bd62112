//! `cargo metadata --format-version 1` output.

use crate::graph::DependencyGraphBuilder;
use crate::normalize::{NormalizedRecord, PackageRecord};
use serde_json::Value;
use std::collections::HashMap;

const LOG_TARGET: &str = "     cargo";

/// Parses the resolved dependency graph of `cargo metadata`.
///
/// Every node of `resolve.nodes` becomes a record, the root (`resolve.root`) last, with its
/// resolved dependencies as `name@version`. Without a `resolve` section, as with `--no-deps`,
/// the workspace packages are recorded with their declared requirements instead.
pub fn parse_metadata(stdout: &str) -> NormalizedRecord {
    let mut record = NormalizedRecord::default();
    let document: Value = match serde_json::from_str(stdout) {
        Ok(document) => document,
        Err(e) => {
            log::warn!(target: LOG_TARGET, "Unable to parse cargo metadata output as JSON: {e}");
            return record;
        }
    };

    if let Some(version) = document.get("version").and_then(Value::as_u64)
        && version != 1
    {
        log::debug!(target: LOG_TARGET, "Unexpected cargo metadata format version {version}");
    }

    let packages: HashMap<&str, &Value> = document
        .get("packages")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|package| Some((package.get("id")?.as_str()?, package)))
        .collect();

    let Some(nodes) = document.pointer("/resolve/nodes").and_then(Value::as_array) else {
        let mut unresolved: Vec<_> = packages.values().filter_map(|package| declared_package(package)).collect();
        unresolved.sort_by(|a, b| (&a.name, &a.version).cmp(&(&b.name, &b.version)));

        let graph = DependencyGraphBuilder::new("cargo").build(&unresolved, None);
        record.graph_stats = Some(graph.stats);
        record.set_dependencies(unresolved, None);
        return record;
    };

    let root_id = document.pointer("/resolve/root").and_then(Value::as_str);
    let mut resolved = Vec::with_capacity(nodes.len());
    let mut root = None;

    for node in nodes {
        let Some(id) = node.get("id").and_then(Value::as_str) else {
            continue;
        };
        let Some((name, version)) = name_and_version(id, &packages) else {
            log::debug!(target: LOG_TARGET, "Skipping unrecognized package id '{id}'");
            continue;
        };

        let dependencies = dependency_ids(node)
            .filter_map(|dep| name_and_version(dep, &packages))
            .map(|(name, version)| format!("{name}@{version}"))
            .collect();

        let package = PackageRecord {
            name,
            version,
            resolved: packages
                .get(id)
                .and_then(|p| p.get("source"))
                .and_then(Value::as_str)
                .map(str::to_string),
            dependencies,
        };

        if Some(id) == root_id {
            root = Some(package);
        } else {
            resolved.push(package);
        }
    }

    let graph = DependencyGraphBuilder::new("cargo").build(&resolved, root.as_ref());
    record.graph_stats = Some(graph.stats);

    if let Some(root) = &root {
        resolved.push(root.clone());
    }

    record.set_dependencies(resolved, root);
    record
}

/// Ids of a node's resolved dependencies, from `deps` or the older bare `dependencies` list.
fn dependency_ids(node: &Value) -> impl Iterator<Item = &str> {
    let deps = node.get("deps").and_then(Value::as_array);
    let ids = if deps.is_some() {
        None
    } else {
        node.get("dependencies").and_then(Value::as_array)
    };

    deps.into_iter()
        .flatten()
        .filter_map(|dep| dep.get("pkg").and_then(Value::as_str))
        .chain(ids.into_iter().flatten().filter_map(Value::as_str))
}

fn name_and_version(id: &str, packages: &HashMap<&str, &Value>) -> Option<(String, String)> {
    if let Some(package) = packages.get(id) {
        let name = package.get("name").and_then(Value::as_str)?;
        let version = package.get("version").and_then(Value::as_str)?;
        return Some((name.to_string(), version.to_string()));
    }

    parse_package_id(id)
}

/// Reads the name and version out of a package id.
///
/// Handles the `name version (source)` layout and the `source#name@version` layout,
/// where a path source may leave out the name when it matches the last path segment.
fn parse_package_id(id: &str) -> Option<(String, String)> {
    if let Some((source, fragment)) = id.rsplit_once('#') {
        return match fragment.rsplit_once('@') {
            Some((name, version)) => Some((name.to_string(), version.to_string())),
            None => {
                let name = source.trim_end_matches('/').rsplit('/').next()?;
                Some((name.to_string(), fragment.to_string()))
            }
        };
    }

    let mut parts = id.split_whitespace();
    let name = parts.next()?;
    let version = parts.next()?;
    Some((name.to_string(), version.to_string()))
}

fn declared_package(package: &Value) -> Option<PackageRecord> {
    let name = package.get("name").and_then(Value::as_str)?;
    let version = package.get("version").and_then(Value::as_str)?;

    let dependencies = package
        .get("dependencies")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|dep| {
            let dep_name = dep.get("name").and_then(Value::as_str)?;
            let req = dep.get("req").and_then(Value::as_str).unwrap_or("*");
            Some(format!("{dep_name}@{req}"))
        })
        .collect();

    Some(PackageRecord {
        name: name.to_string(),
        version: version.to_string(),
        resolved: package.get("source").and_then(Value::as_str).map(str::to_string),
        dependencies,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const REGISTRY: &str = "registry+https://github.com/rust-lang/crates.io-index";

    fn metadata() -> Value {
        json!({
            "version": 1,
            "packages": [
                {"id": "path+file:///work/app#0.1.0", "name": "app", "version": "0.1.0", "source": null,
                 "dependencies": [{"name": "serde", "req": "^1.0"}, {"name": "log", "req": "^0.4"}]},
                {"id": format!("{REGISTRY}#serde@1.0.200"), "name": "serde", "version": "1.0.200", "source": REGISTRY,
                 "dependencies": [{"name": "serde_derive", "req": "^1", "optional": true}]},
                {"id": format!("{REGISTRY}#log@0.4.21"), "name": "log", "version": "0.4.21", "source": REGISTRY,
                 "dependencies": []}
            ],
            "resolve": {
                "root": "path+file:///work/app#0.1.0",
                "nodes": [
                    {"id": "path+file:///work/app#0.1.0", "features": [],
                     "deps": [
                        {"name": "serde", "pkg": format!("{REGISTRY}#serde@1.0.200")},
                        {"name": "log", "pkg": format!("{REGISTRY}#log@0.4.21")}
                     ]},
                    {"id": format!("{REGISTRY}#log@0.4.21"), "features": ["std"], "deps": []},
                    {"id": format!("{REGISTRY}#serde@1.0.200"), "features": ["default", "std"], "deps": []}
                ]
            }
        })
    }

    #[test]
    fn test_resolved_nodes_become_records_with_root_last() {
        let record = parse_metadata(&metadata().to_string());

        let names: Vec<_> = record.dependencies.iter().map(|p| format!("{}@{}", p.name, p.version)).collect();
        assert_eq!(names, vec!["log@0.4.21", "serde@1.0.200", "app@0.1.0"]);
        assert_eq!(record.dependencies[0].resolved.as_deref(), Some(REGISTRY));

        let root = record.root.as_ref().unwrap();
        assert_eq!(root.dependencies, vec!["serde@1.0.200", "log@0.4.21"]);
        assert_eq!(record.direct_dependencies_count, Some(2));

        let stats = record.graph_stats.unwrap();
        assert_eq!(stats.node_count, 3);
        assert_eq!(stats.edge_count, 2);
        assert_eq!(stats.unresolved_edge_count, 0);
        assert_eq!(stats.root_out_degree, Some(2));
    }

    #[test]
    fn test_no_deps_output_keeps_declared_requirements() {
        let mut document = metadata();
        document["resolve"] = Value::Null;

        let record = parse_metadata(&document.to_string());
        assert!(record.root.is_none());
        assert_eq!(record.dependencies_count, 3);

        let app = record.dependencies.iter().find(|p| p.name == "app").unwrap();
        assert_eq!(app.dependencies, vec!["serde@^1.0", "log@^0.4"]);

        let stats = record.graph_stats.unwrap();
        assert_eq!(stats.edge_count, 0);
        assert_eq!(stats.unresolved_edge_count, 3);
    }

    #[test]
    fn test_package_id_layouts() {
        assert_eq!(
            parse_package_id("serde 1.0.200 (registry+https://github.com/rust-lang/crates.io-index)"),
            Some(("serde".to_string(), "1.0.200".to_string()))
        );
        assert_eq!(
            parse_package_id("registry+https://github.com/rust-lang/crates.io-index#log@0.4.21"),
            Some(("log".to_string(), "0.4.21".to_string()))
        );
        assert_eq!(
            parse_package_id("path+file:///work/my-app#0.1.0"),
            Some(("my-app".to_string(), "0.1.0".to_string()))
        );
        assert_eq!(parse_package_id("garbage"), None);
    }

    #[test]
    fn test_nodes_missing_from_packages_fall_back_to_ids() {
        let output = json!({
            "packages": [],
            "resolve": {"root": null, "nodes": [
                {"id": "a 1.0.0 (registry+x)", "dependencies": ["b 2.0.0 (registry+x)"]},
                {"id": "b 2.0.0 (registry+x)", "dependencies": []}
            ]}
        });

        let record = parse_metadata(&output.to_string());
        assert_eq!(record.dependencies_count, 2);
        assert_eq!(record.dependencies[0].dependencies, vec!["b@2.0.0"]);
        assert_eq!(record.graph_stats.unwrap().edge_count, 1);
    }

    #[test]
    fn test_truncated_output_yields_empty_record() {
        let text = metadata().to_string();
        let record = parse_metadata(&text[..text.len() / 2]);
        assert!(record.dependencies.is_empty());
        assert!(record.graph_stats.is_none());
    }
}
