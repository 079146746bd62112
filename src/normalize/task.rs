use crate::model::{PackageManager, TaskKind};
use crate::normalize::{NormalizedRecord, cargo, npm, yarn};
use serde::{Deserialize, Serialize};

const LOG_TARGET: &str = "normalizer";

/// What a package-manager command left behind after running in its container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutput {
    #[serde(default)]
    pub name: Option<String>,
    pub command: String,
    #[serde(default)]
    pub stdout: Option<String>,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub relative_path: Option<String>,
    #[serde(default)]
    pub container_name: Option<String>,
    #[serde(default)]
    pub working_dir: Option<String>,
}

/// How a package manager lays out its JSON output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum TaskFormat {
    /// A single JSON document
    Npm,

    /// One JSON object per line
    Yarn,

    /// A single `cargo metadata` document
    Cargo,
}

/// A task whose package manager, output format, and kind have been worked out from its command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifiedTask {
    pub manager: PackageManager,
    pub kind: TaskKind,
    pub format: TaskFormat,
}

impl ClassifiedTask {
    /// Classifies a task by matching its command against the known command templates.
    ///
    /// A task name naming a [`TaskKind`] takes precedence over the kind implied by the command.
    #[must_use]
    pub fn classify(task: &TaskOutput) -> Option<Self> {
        let (manager, command_kind) = PackageManager::classify_command(&task.command)?;
        let kind = task
            .name
            .as_deref()
            .and_then(|name| name.parse::<TaskKind>().ok())
            .unwrap_or(command_kind);

        let format = match manager {
            PackageManager::Npm => TaskFormat::Npm,
            PackageManager::Yarn => TaskFormat::Yarn,
            PackageManager::Cargo => TaskFormat::Cargo,
        };

        Some(Self { manager, kind, format })
    }
}

/// Normalizes one task's output.
///
/// Returns `None` for install tasks, which produce nothing to parse, for `cargo audit`,
/// and for unrecognized commands. Malformed output yields an empty record.
#[must_use]
pub fn normalize(task: &TaskOutput) -> Option<NormalizedRecord> {
    let Some(classified) = ClassifiedTask::classify(task) else {
        log::warn!(target: LOG_TARGET, "Unrecognized task command '{}'", task.command);
        return None;
    };

    if classified.kind == TaskKind::Install {
        return None;
    }

    let stdout = task.stdout.as_deref().unwrap_or_default();
    let record = match (classified.format, classified.kind) {
        (TaskFormat::Npm, TaskKind::ListMetadata) => npm::parse_list(stdout),
        (TaskFormat::Npm, TaskKind::Audit) => npm::parse_audit(stdout),
        (TaskFormat::Yarn, TaskKind::ListMetadata) => yarn::parse_list(stdout),
        (TaskFormat::Yarn, TaskKind::Audit) => yarn::parse_audit(stdout),
        (TaskFormat::Cargo, TaskKind::ListMetadata) => cargo::parse_metadata(stdout),
        (TaskFormat::Cargo, TaskKind::Audit) => {
            log::debug!(target: LOG_TARGET, "No normalizer for {} {} output", classified.manager, classified.kind);
            return None;
        }
        (_, TaskKind::Install) => return None,
    };

    Some(record)
}
