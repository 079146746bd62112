use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Language {
    Rust,
    #[serde(rename = "nodejs")]
    #[strum(serialize = "nodejs")]
    NodeJs,
}

impl Language {
    #[must_use]
    pub const fn package_managers(self) -> &'static [PackageManager] {
        match self {
            Self::Rust => &[PackageManager::Cargo],
            Self::NodeJs => &[PackageManager::Npm, PackageManager::Yarn],
        }
    }
}

/// The kind of work a captured package-manager task performed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskKind {
    Install,
    ListMetadata,
    Audit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DependencyFileKind {
    ManifestFile,
    Lockfile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PackageManager {
    Npm,
    Yarn,
    Cargo,
}

/// Checked in order; the first template contained in a command wins.
const ALL_MANAGERS: [PackageManager; 3] = [PackageManager::Npm, PackageManager::Yarn, PackageManager::Cargo];

const ALL_TASKS: [TaskKind; 3] = [TaskKind::Install, TaskKind::ListMetadata, TaskKind::Audit];

impl PackageManager {
    /// The command line that runs `task` with this package manager.
    #[must_use]
    pub const fn command(self, task: TaskKind) -> &'static str {
        match (self, task) {
            (Self::Npm, TaskKind::Install) => "npm ci",
            (Self::Npm, TaskKind::ListMetadata) => "npm list --json",
            (Self::Npm, TaskKind::Audit) => "npm audit --json",
            (Self::Yarn, TaskKind::Install) => "yarn install --frozen-lockfile",
            (Self::Yarn, TaskKind::ListMetadata) => "yarn list --json --frozen-lockfile",
            (Self::Yarn, TaskKind::Audit) => "yarn audit --json --frozen-lockfile",
            (Self::Cargo, TaskKind::Install) => "cargo install --all-features --locked",
            (Self::Cargo, TaskKind::ListMetadata) => "cargo metadata --format-version 1 --locked",
            (Self::Cargo, TaskKind::Audit) => "cargo audit --json",
        }
    }

    #[must_use]
    pub const fn language(self) -> Language {
        match self {
            Self::Npm | Self::Yarn => Language::NodeJs,
            Self::Cargo => Language::Rust,
        }
    }

    /// Files, matched by lowercase file name, that this package manager reads.
    #[must_use]
    pub const fn dependency_files(self) -> &'static [(&'static str, DependencyFileKind)] {
        match self {
            Self::Npm => &[
                ("package.json", DependencyFileKind::ManifestFile),
                ("package-lock.json", DependencyFileKind::Lockfile),
                ("npm-shrinkwrap.json", DependencyFileKind::Lockfile),
            ],
            Self::Yarn => &[
                ("package.json", DependencyFileKind::ManifestFile),
                ("yarn.lock", DependencyFileKind::Lockfile),
            ],
            Self::Cargo => &[
                ("cargo.toml", DependencyFileKind::ManifestFile),
                ("cargo.lock", DependencyFileKind::Lockfile),
            ],
        }
    }

    /// Identifies which package manager and task produced a captured command line.
    #[must_use]
    pub fn classify_command(command: &str) -> Option<(Self, TaskKind)> {
        ALL_MANAGERS.into_iter().find_map(|manager| {
            ALL_TASKS
                .into_iter()
                .find(|task| command.contains(manager.command(*task)))
                .map(|task| (manager, task))
        })
    }

    /// Classifies a dependency file by its file name.
    #[must_use]
    pub fn classify_file(file_name: &str) -> Option<DependencyFileKind> {
        let lower = file_name.to_ascii_lowercase();
        ALL_MANAGERS
            .iter()
            .flat_map(|manager| manager.dependency_files())
            .find(|(pattern, _)| *pattern == lower)
            .map(|(_, kind)| *kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_command_by_template() {
        assert_eq!(
            PackageManager::classify_command("npm list --json"),
            Some((PackageManager::Npm, TaskKind::ListMetadata))
        );
        assert_eq!(
            PackageManager::classify_command("/bin/sh -c 'yarn audit --json --frozen-lockfile'"),
            Some((PackageManager::Yarn, TaskKind::Audit))
        );
        assert_eq!(
            PackageManager::classify_command("cargo audit --json"),
            Some((PackageManager::Cargo, TaskKind::Audit))
        );
        assert_eq!(PackageManager::classify_command("pip freeze"), None);
    }

    #[test]
    fn test_yarn_list_is_not_mistaken_for_npm() {
        assert_eq!(
            PackageManager::classify_command("yarn list --json --frozen-lockfile"),
            Some((PackageManager::Yarn, TaskKind::ListMetadata))
        );
    }

    #[test]
    fn test_classify_file() {
        assert_eq!(PackageManager::classify_file("Cargo.lock"), Some(DependencyFileKind::Lockfile));
        assert_eq!(PackageManager::classify_file("package.json"), Some(DependencyFileKind::ManifestFile));
        assert_eq!(PackageManager::classify_file("README.md"), None);
    }

    #[test]
    fn test_language_package_managers() {
        assert!(Language::NodeJs.package_managers().contains(&PackageManager::Yarn));
        assert_eq!(PackageManager::Cargo.language(), Language::Rust);
        assert_eq!(Language::NodeJs.to_string(), "nodejs");
        assert_eq!("list_metadata".parse::<TaskKind>().unwrap(), TaskKind::ListMetadata);
    }
}
