use chrono::{DateTime, Utc};
use core::fmt::{Display, Formatter};
use core::time::Duration;
use serde::Serialize;

/// How a failed query should be treated by the retry policy and by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::IntoStaticStr)]
pub enum FailureKind {
    /// The repository or object does not exist, or is not visible to the token
    NotFound,

    /// The rate limit was hit; retried once the limit resets
    RateLimited,

    /// The service reported itself unavailable (502, 503, 504)
    ServerUnavailable,

    /// Any other failure worth retrying with plain exponential backoff
    Transient,

    /// The repository resolved to null in an otherwise successful response
    UpstreamNullObject,

    /// A failure retrying cannot fix
    Other,
}

impl FailureKind {
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::RateLimited | Self::ServerUnavailable | Self::Transient)
    }
}

/// A classified failure of a GraphQL query.
#[derive(Debug, Clone)]
pub struct CrawlError {
    kind: FailureKind,
    message: String,
    retry_after: Option<Duration>,
    reset_at: Option<DateTime<Utc>>,
}

impl CrawlError {
    #[must_use]
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
            reset_at: None,
        }
    }

    #[must_use]
    pub const fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    #[must_use]
    pub const fn with_reset_at(mut self, reset_at: Option<DateTime<Utc>>) -> Self {
        self.reset_at = reset_at;
        self
    }

    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    #[must_use]
    pub const fn reset_at(&self) -> Option<DateTime<Utc>> {
        self.reset_at
    }
}

impl Display for CrawlError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl core::error::Error for CrawlError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(FailureKind::RateLimited.is_retryable());
        assert!(FailureKind::ServerUnavailable.is_retryable());
        assert!(FailureKind::Transient.is_retryable());
        assert!(!FailureKind::NotFound.is_retryable());
        assert!(!FailureKind::UpstreamNullObject.is_retryable());
        assert!(!FailureKind::Other.is_retryable());
    }

    #[test]
    fn test_display_includes_kind() {
        let error = CrawlError::new(FailureKind::NotFound, "Could not resolve to a Repository");
        assert_eq!(error.to_string(), "NotFound: Could not resolve to a Repository");
    }

    #[test]
    fn test_converts_into_app_error() {
        fn fail() -> crate::Result<()> {
            let result: Result<(), CrawlError> = Err(CrawlError::new(FailureKind::Other, "bad request"));
            result?;
            Ok(())
        }

        assert!(fail().unwrap_err().to_string().contains("bad request"));
    }
}
