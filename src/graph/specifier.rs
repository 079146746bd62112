use core::fmt::{Display, Formatter};
use semver::Version;

/// A dependency reference as it appears in package-manager output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependentSpecifier {
    /// `name@version` with an exact version
    Resolved { name: String, version: Version },

    /// A version range, or anything else that does not pin one version
    Range { name: Option<String>, range: String },
}

impl DependentSpecifier {
    /// Parses `name@version`, where scoped names such as `@babel/core@7.0.0` keep their leading `@`.
    #[must_use]
    pub fn parse(specifier: &str) -> Self {
        let specifier = specifier.trim();

        let Some((name, rest)) = specifier.rsplit_once('@').filter(|(name, _)| !name.is_empty()) else {
            return Self::Range {
                name: None,
                range: specifier.to_string(),
            };
        };

        Version::parse(rest).map_or_else(
            |_| Self::Range {
                name: Some(name.to_string()),
                range: rest.to_string(),
            },
            |version| Self::Resolved {
                name: name.to_string(),
                version,
            },
        )
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Resolved { name, .. } => Some(name),
            Self::Range { name, .. } => name.as_deref(),
        }
    }
}

impl Display for DependentSpecifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Resolved { name, version } => write!(f, "{name}@{version}"),
            Self::Range { name: Some(name), range } => write!(f, "{name}@{range}"),
            Self::Range { name: None, range } => write!(f, "{range}"),
        }
    }
}
