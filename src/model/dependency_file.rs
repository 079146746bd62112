use crate::Result;
use crate::model::{DependencyFileKind, PackageManager};
use camino::Utf8PathBuf;
use ohno::bail;
use serde::{Deserialize, Serialize};

/// A dependency manifest or lockfile captured from a checkout, identified by path and content hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawDependencyFile")]
pub struct DependencyFile {
    path: Utf8PathBuf,
    sha256: String,
}

#[derive(Deserialize)]
struct RawDependencyFile {
    path: Utf8PathBuf,
    sha256: String,
}

impl TryFrom<RawDependencyFile> for DependencyFile {
    type Error = ohno::AppError;

    fn try_from(raw: RawDependencyFile) -> Result<Self> {
        Self::new(raw.path, raw.sha256)
    }
}

impl DependencyFile {
    /// Creates a dependency file record, validating that `sha256` is a hex SHA-256 digest.
    pub fn new(path: impl Into<Utf8PathBuf>, sha256: impl AsRef<str>) -> Result<Self> {
        let path = path.into();
        let sha256 = sha256.as_ref().to_ascii_lowercase();

        if sha256.len() != 64 || !sha256.bytes().all(|b| b.is_ascii_hexdigit()) {
            bail!("invalid SHA-256 digest for '{path}': '{sha256}'");
        }

        Ok(Self { path, sha256 })
    }

    #[must_use]
    pub const fn path(&self) -> &Utf8PathBuf {
        &self.path
    }

    #[must_use]
    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    /// Whether this is a manifest or a lockfile, when the file name is recognized.
    #[must_use]
    pub fn kind(&self) -> Option<DependencyFileKind> {
        self.path.file_name().and_then(PackageManager::classify_file)
    }
}
