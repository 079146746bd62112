//! Grouping of captured task rows into one normalized record per checkout.

use crate::Result;
use crate::model::{DependencyFile, GitRef, TaskKind};
use crate::normalize::{ClassifiedTask, NormalizedRecord, TaskOutput, normalize};
use ohno::IntoAppError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::BufRead;

const LOG_TARGET: &str = "  postproc";

/// One captured task, as written by the task runner: a JSON object per line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRow {
    pub org: String,
    pub repo: String,
    #[serde(default)]
    pub repo_url: Option<String>,
    #[serde(rename = "ref")]
    pub git_ref: GitRef,
    #[serde(default)]
    pub dependency_files: Vec<DependencyFile>,
    pub task: TaskOutput,
}

/// A captured task and whatever its output normalized to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskEntry {
    pub kind: TaskKind,
    pub command: String,
    pub exit_code: Option<i32>,
    pub name: Option<String>,
    pub relative_path: Option<String>,
    pub container_name: Option<String>,
    pub working_dir: Option<String>,
    #[serde(flatten)]
    pub normalized: Option<NormalizedRecord>,
}

/// All requested tasks run against one repository at one ref with one set of dependency files.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostprocessedRecord {
    pub org: String,
    pub repo: String,
    pub repo_url: Option<String>,
    #[serde(rename = "ref")]
    pub git_ref: GitRef,
    pub dependency_files: Vec<DependencyFile>,
    pub tasks: Vec<TaskEntry>,
}

/// Reads task rows from JSON lines, skipping blank lines and logging lines that fail to parse.
pub fn read_rows(reader: impl BufRead) -> Result<Vec<TaskRow>> {
    let mut rows = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.into_app_err("unable to read task rows")?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str(&line) {
            Ok(row) => rows.push(row),
            Err(e) => log::warn!(target: LOG_TARGET, "Skipping task row on line {}: {e}", index + 1),
        }
    }

    Ok(rows)
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct GroupKey {
    org: String,
    repo: String,
    ref_value: String,
    hashes: Vec<String>,
}

impl GroupKey {
    fn of(row: &TaskRow) -> Self {
        let mut hashes: Vec<_> = row.dependency_files.iter().map(|f| f.sha256().to_string()).collect();
        hashes.sort_unstable();
        Self {
            org: row.org.clone(),
            repo: row.repo.clone(),
            ref_value: row.git_ref.value.clone(),
            hashes,
        }
    }
}

/// Groups rows by repository, ref value, and dependency-file hashes, normalizing the tasks of the requested kinds.
///
/// Every group yields a record, even when none of its tasks were requested. The repository
/// fields of a record come from the first row of its group. Records are ordered by group key.
#[must_use]
pub fn postprocess(rows: Vec<TaskRow>, kinds: &[TaskKind]) -> Vec<PostprocessedRecord> {
    let mut groups: BTreeMap<GroupKey, Vec<TaskRow>> = BTreeMap::new();
    for row in rows {
        groups.entry(GroupKey::of(&row)).or_default().push(row);
    }

    groups.into_values().filter_map(|group| postprocess_group(group, kinds)).collect()
}

fn postprocess_group(group: Vec<TaskRow>, kinds: &[TaskKind]) -> Option<PostprocessedRecord> {
    let mut rows = group.into_iter();
    let first = rows.next()?;

    let mut dependency_files = first.dependency_files.clone();
    dependency_files.sort();

    let mut record = PostprocessedRecord {
        org: first.org.clone(),
        repo: first.repo.clone(),
        repo_url: first.repo_url.clone(),
        git_ref: first.git_ref.clone(),
        dependency_files,
        tasks: Vec::new(),
    };

    for row in core::iter::once(first).chain(rows) {
        let Some(kind) = ClassifiedTask::classify(&row.task).map(|c| c.kind) else {
            log::debug!(target: LOG_TARGET, "Skipping unrecognized task '{}' for {}/{}", row.task.command, row.org, row.repo);
            continue;
        };

        if !kinds.contains(&kind) {
            continue;
        }

        let normalized = normalize(&row.task);
        if let Some(normalized) = &normalized {
            match kind {
                TaskKind::ListMetadata => log::info!(
                    target: LOG_TARGET,
                    "Normalized {} for {}/{} at {}: {} dependencies, {} problems",
                    row.task.command,
                    record.org,
                    record.repo,
                    record.git_ref.value,
                    normalized.dependencies_count,
                    normalized.problems_count
                ),
                TaskKind::Audit => log::info!(
                    target: LOG_TARGET,
                    "Normalized {} for {}/{} at {}: {} vulnerabilities",
                    row.task.command,
                    record.org,
                    record.repo,
                    record.git_ref.value,
                    normalized.vulnerabilities_count
                ),
                TaskKind::Install => {}
            }
        }

        let task = row.task;
        record.tasks.push(TaskEntry {
            kind,
            command: task.command,
            exit_code: task.exit_code,
            name: task.name,
            relative_path: task.relative_path,
            container_name: task.container_name,
            working_dir: task.working_dir,
            normalized,
        });
    }

    Some(record)
}
