use crate::github::{CrawlError, FailureKind, GraphQlQuery, RateLimitState, Transport, TransportResponse};
use chrono::{DateTime, Utc};
use core::time::Duration;
use serde_json::Value;
use std::sync::Arc;

const LOG_TARGET: &str = "  executor";

/// Attempt cap and backoff base for [`RetryingRequestExecutor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 15,
            base_delay: Duration::from_secs(60),
        }
    }
}

/// Computes how long to wait before retrying after `failure`.
///
/// `retry_index` is zero for the first retry. Rate-limit style failures honor a
/// `Retry-After` hint first, then a reset timestamp that still lies in the future,
/// and only then fall back to `2^retry_index + base_delay` seconds. Transient
/// failures always use the exponential fallback.
#[must_use]
pub fn backoff_delay(failure: &CrawlError, retry_index: u32, base_delay: Duration, now: DateTime<Utc>) -> Duration {
    let exponential = Duration::from_secs(2_u64.saturating_pow(retry_index)).saturating_add(base_delay);

    match failure.kind() {
        FailureKind::RateLimited | FailureKind::ServerUnavailable => {
            if let Some(retry_after) = failure.retry_after().filter(|d| !d.is_zero()) {
                return retry_after;
            }

            failure
                .reset_at()
                .and_then(|reset| reset.signed_duration_since(now).to_std().ok())
                .filter(|d| !d.is_zero())
                .unwrap_or(exponential)
        }
        _ => exponential,
    }
}

/// Runs GraphQL queries, retrying retryable failures with backoff.
#[derive(Debug, Clone)]
pub struct RetryingRequestExecutor {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    rate_limit: Arc<RateLimitState>,
}

impl RetryingRequestExecutor {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            rate_limit: Arc::new(RateLimitState::new()),
        }
    }

    /// The rate-limit state refreshed after every response.
    #[must_use]
    pub const fn rate_limit(&self) -> &Arc<RateLimitState> {
        &self.rate_limit
    }

    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Executes `query` and returns its `data` object.
    ///
    /// # Errors
    ///
    /// Returns the classified failure when it is terminal or when the attempt cap is reached.
    pub async fn execute(&self, query: &GraphQlQuery) -> Result<Value, CrawlError> {
        let body = query.to_body();
        let mut attempt = 0;

        loop {
            attempt += 1;

            let failure = match self.transport.post(body.clone()).await {
                Ok(response) => {
                    self.observe(&response);
                    match classify(response) {
                        Ok(data) => return Ok(data),
                        Err(failure) => failure,
                    }
                }
                Err(e) => CrawlError::new(FailureKind::Transient, format!("request failed: {e:#}")),
            };

            if !failure.kind().is_retryable() {
                log::debug!(target: LOG_TARGET, "{} failed with {failure}", query.operation());
                return Err(failure);
            }

            if attempt >= self.policy.max_attempts {
                log::warn!(target: LOG_TARGET, "{} failed after {attempt} attempts: {failure}", query.operation());
                return Err(failure);
            }

            let delay = backoff_delay(&failure, attempt - 1, self.policy.base_delay, Utc::now());
            log::info!(target: LOG_TARGET,
                "{} attempt {attempt} failed with {failure}, retrying in {:.1}s",
                query.operation(),
                delay.as_secs_f64()
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn observe(&self, response: &TransportResponse) {
        let (body_remaining, body_reset) = response
            .body
            .as_ref()
            .and_then(|body| body.pointer("/data/rateLimit"))
            .map_or((None, None), |rate_limit| {
                let remaining = rate_limit.get("remaining").and_then(Value::as_u64);
                let reset = rate_limit
                    .get("resetAt")
                    .and_then(Value::as_str)
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|dt| dt.with_timezone(&Utc));
                (remaining, reset)
            });

        self.rate_limit.update(
            response.rate_limit_remaining.or(body_remaining),
            response.rate_limit_reset.or(body_reset),
            response.retry_after,
        );
    }
}

/// Splits a response into its `data` object or a classified failure.
fn classify(response: TransportResponse) -> Result<Value, CrawlError> {
    let status = response.status;
    let hinted = |error: CrawlError| {
        error
            .with_retry_after(response.retry_after)
            .with_reset_at(response.rate_limit_reset)
    };

    match status {
        200..=299 => {}
        404 => return Err(CrawlError::new(FailureKind::NotFound, "HTTP 404")),
        403 | 429 => return Err(hinted(CrawlError::new(FailureKind::RateLimited, format!("HTTP {status}")))),
        502..=504 => return Err(hinted(CrawlError::new(FailureKind::ServerUnavailable, format!("HTTP {status}")))),
        500..=599 => return Err(CrawlError::new(FailureKind::Transient, format!("HTTP {status}"))),
        _ => return Err(CrawlError::new(FailureKind::Other, format!("HTTP {status}"))),
    }

    let Some(mut body) = response.body else {
        return Err(CrawlError::new(FailureKind::Transient, "response body is not JSON"));
    };

    if let Some(first) = body.get("errors").and_then(Value::as_array).and_then(|errors| errors.first()) {
        let error_type = first.get("type").and_then(Value::as_str).unwrap_or_default();
        let message = first.get("message").and_then(Value::as_str).unwrap_or("unknown GraphQL error");

        let error = match error_type {
            "NOT_FOUND" => CrawlError::new(FailureKind::NotFound, message),
            "RATE_LIMITED" => hinted(CrawlError::new(FailureKind::RateLimited, message)),
            "FORBIDDEN" | "UNAUTHORIZED" => CrawlError::new(FailureKind::Other, format!("{error_type}: {message}")),
            _ => CrawlError::new(FailureKind::Transient, format!("{error_type}: {message}")),
        };

        return Err(error);
    }

    match body.get_mut("data").map(Value::take) {
        Some(data) if !data.is_null() => Ok(data),
        _ => Err(CrawlError::new(FailureKind::Other, "response has neither data nor errors")),
    }
}
