use chrono::{DateTime, Utc};
use core::fmt::{Display, Formatter};
use serde::{Deserialize, Deserializer, Serialize};

/// Parsed without regard to case, written lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "lowercase", try_from = "String")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum GitRefKind {
    Branch,
    Commit,
    Tag,
}

impl TryFrom<String> for GitRefKind {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A branch, tag, or commit a repository was inspected at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GitRef {
    pub value: String,
    pub kind: GitRefKind,
    /// Accepted as RFC 3339 or as unix seconds; anything else reads as absent
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "deserialize_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Seconds(i64),
    Text(String),
}

fn deserialize_timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error> {
    let raw = Option::<RawTimestamp>::deserialize(deserializer)?;
    Ok(match raw {
        Some(RawTimestamp::Seconds(seconds)) => DateTime::from_timestamp(seconds, 0),
        Some(RawTimestamp::Text(text)) => text.trim().parse::<i64>().map_or_else(
            |_| DateTime::parse_from_rfc3339(text.trim()).ok().map(|dt| dt.with_timezone(&Utc)),
            |seconds| DateTime::from_timestamp(seconds, 0),
        ),
        None => None,
    })
}

impl GitRef {
    #[must_use]
    pub fn branch(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            kind: GitRefKind::Branch,
            timestamp: None,
        }
    }

    #[must_use]
    pub fn commit(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            kind: GitRefKind::Commit,
            timestamp: None,
        }
    }

    #[must_use]
    pub fn tag(value: impl Into<String>, timestamp: Option<DateTime<Utc>>) -> Self {
        Self {
            value: value.into(),
            kind: GitRefKind::Tag,
            timestamp,
        }
    }
}

impl Display for GitRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_ref_serializes_kind_lowercase() {
        let git_ref = GitRef::tag("v1.2.3", None);
        let value = serde_json::to_value(&git_ref).unwrap();
        assert_eq!(value, serde_json::json!({"value": "v1.2.3", "kind": "tag"}));
        assert_eq!(git_ref.to_string(), "tag:v1.2.3");
    }

    #[test]
    fn test_git_ref_round_trips_timestamp() {
        let json = r#"{"value": "abc123", "kind": "commit", "timestamp": "2020-01-02T03:04:05Z"}"#;
        let git_ref: GitRef = serde_json::from_str(json).unwrap();
        assert_eq!(git_ref.kind, GitRefKind::Commit);
        assert_eq!(git_ref.timestamp.unwrap().timestamp(), 1_577_934_245);
    }

    #[test]
    fn test_git_ref_accepts_any_kind_case() {
        let git_ref: GitRef = serde_json::from_str(r#"{"value": "v2.0.0", "kind": "TAG"}"#).unwrap();
        assert_eq!(git_ref.kind, GitRefKind::Tag);
        assert_eq!(serde_json::to_value(&git_ref).unwrap()["kind"], "tag");

        assert!(serde_json::from_str::<GitRef>(r#"{"value": "x", "kind": "remote"}"#).is_err());
    }

    #[test]
    fn test_git_ref_accepts_unix_second_timestamps() {
        let quoted: GitRef = serde_json::from_str(r#"{"value": "v1", "kind": "tag", "timestamp": "1566254446"}"#).unwrap();
        assert_eq!(quoted.timestamp.unwrap().timestamp(), 1_566_254_446);

        let number: GitRef = serde_json::from_str(r#"{"value": "v1", "kind": "tag", "timestamp": 1566254446}"#).unwrap();
        assert_eq!(number.timestamp, quoted.timestamp);

        let opaque: GitRef = serde_json::from_str(r#"{"value": "v1", "kind": "tag", "timestamp": "last tuesday"}"#).unwrap();
        assert_eq!(opaque.timestamp, None);

        let null: GitRef = serde_json::from_str(r#"{"value": "v1", "kind": "tag", "timestamp": null}"#).unwrap();
        assert_eq!(null.timestamp, None);
    }
}
