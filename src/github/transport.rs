use crate::Result;
use chrono::{DateTime, Utc};
use core::fmt::Debug;
use core::time::Duration;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use serde_json::Value;
use url::Url;

const LOG_TARGET: &str = " transport";

/// Preview media type exposing the dependency graph
const DEPENDENCY_GRAPH_PREVIEW: &str = "application/vnd.github.hawkgirl-preview+json";

/// Preview media type exposing vulnerability alerts
const VULNERABILITY_ALERTS_PREVIEW: &str = "application/vnd.github.vixen-preview+json";

/// Maximum number of pooled connections kept per host
const MAX_IDLE_CONNECTIONS: usize = 4;

/// What the retry policy needs to know about one HTTP exchange.
#[derive(Debug, Clone, Default)]
pub struct TransportResponse {
    pub status: u16,
    pub retry_after: Option<Duration>,
    pub rate_limit_remaining: Option<u64>,
    pub rate_limit_reset: Option<DateTime<Utc>>,

    /// The parsed JSON body, `None` when the body was not JSON
    pub body: Option<Value>,
}

impl TransportResponse {
    #[must_use]
    pub const fn new(status: u16, body: Option<Value>) -> Self {
        Self {
            status,
            retry_after: None,
            rate_limit_remaining: None,
            rate_limit_reset: None,
            body,
        }
    }
}

/// Sends a GraphQL request body and returns the raw response.
///
/// Errors returned from [`Transport::post`] are connection-level failures; HTTP error
/// statuses are reported through [`TransportResponse::status`].
pub trait Transport: Send + Sync + Debug {
    fn post(&self, body: Value) -> BoxFuture<'_, Result<TransportResponse>>;
}

/// [`Transport`] over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: Url,
}

impl HttpTransport {
    pub fn new(token: Option<&str>, url: Url, user_agent: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let _ = headers.insert(
            ACCEPT,
            HeaderValue::from_str(&format!("{DEPENDENCY_GRAPH_PREVIEW},{VULNERABILITY_ALERTS_PREVIEW}"))?,
        );

        if let Some(t) = token {
            let mut auth_val = HeaderValue::from_str(&format!("bearer {t}"))?;
            auth_val.set_sensitive(true);
            let _ = headers.insert(AUTHORIZATION, auth_val);
        }

        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .pool_max_idle_per_host(MAX_IDLE_CONNECTIONS)
            .build()?;

        Ok(Self { client, url })
    }

    async fn send(&self, body: Value) -> Result<TransportResponse> {
        let resp = self.client.post(self.url.clone()).json(&body).send().await?;

        let status = resp.status().as_u16();
        let headers = resp.headers();
        let retry_after = header_u64(headers, "retry-after").map(Duration::from_secs);
        let rate_limit_remaining = header_u64(headers, "x-ratelimit-remaining");
        let rate_limit_reset = header_u64(headers, "x-ratelimit-reset")
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0));

        let text = resp.text().await?;
        let body = match serde_json::from_str(&text) {
            Ok(value) => Some(value),
            Err(e) => {
                log::debug!(target: LOG_TARGET, "Response with status {status} is not JSON: {e:#}");
                None
            }
        };

        Ok(TransportResponse {
            status,
            retry_after,
            rate_limit_remaining,
            rate_limit_reset,
            body,
        })
    }
}

impl Transport for HttpTransport {
    fn post(&self, body: Value) -> BoxFuture<'_, Result<TransportResponse>> {
        self.send(body).boxed()
    }
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_u64() {
        let mut headers = HeaderMap::new();
        let _ = headers.insert("retry-after", HeaderValue::from_static(" 5 "));
        let _ = headers.insert("x-ratelimit-reset", HeaderValue::from_static("soon"));

        assert_eq!(header_u64(&headers, "retry-after"), Some(5));
        assert_eq!(header_u64(&headers, "x-ratelimit-reset"), None);
        assert_eq!(header_u64(&headers, "x-ratelimit-remaining"), None);
    }

    #[test]
    fn test_http_transport_builds_with_and_without_token() {
        let url = Url::parse("https://api.github.com/graphql").unwrap();
        assert!(HttpTransport::new(Some("secret"), url.clone(), "dep-observatory").is_ok());
        assert!(HttpTransport::new(None, url, "dep-observatory").is_ok());
    }
}
