use crate::Result;
use core::fmt::Debug;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use ohno::bail;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde_json::Value;
use std::collections::BTreeMap;
use url::Url;

const LOG_TARGET: &str = "   scoring";

/// Maximum number of pooled connections kept per host
const MAX_IDLE_CONNECTIONS: usize = 4;

/// Score documents keyed by package name. Packages the service does not know are absent.
pub type Scores = BTreeMap<String, Value>;

/// Looks up scores for a batch of package names in a single request.
pub trait ScoreSource: Send + Sync + Debug {
    fn scores<'a>(&'a self, names: &'a [String]) -> BoxFuture<'a, Result<Scores>>;
}

/// [`ScoreSource`] backed by the npms.io multi-get endpoint.
#[derive(Debug, Clone)]
pub struct NpmsClient {
    client: reqwest::Client,
    url: Url,
}

impl NpmsClient {
    pub fn new(url: Url, user_agent: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let _ = headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .pool_max_idle_per_host(MAX_IDLE_CONNECTIONS)
            .build()?;

        Ok(Self { client, url })
    }

    async fn fetch(&self, names: &[String]) -> Result<Scores> {
        if names.is_empty() {
            return Ok(Scores::new());
        }

        log::debug!(target: LOG_TARGET, "Requesting scores for {} packages", names.len());
        let resp = self.client.post(self.url.clone()).json(names).send().await?;

        let status = resp.status();
        if !status.is_success() {
            bail!("score lookup for {} packages failed with HTTP status {status}", names.len());
        }

        let body: Value = resp.json().await?;
        Ok(scores_from_response(names, body))
    }
}

impl ScoreSource for NpmsClient {
    fn scores<'a>(&'a self, names: &'a [String]) -> BoxFuture<'a, Result<Scores>> {
        self.fetch(names).boxed()
    }
}

/// Accepts either an object keyed by package name or an array parallel to `names`.
fn scores_from_response(names: &[String], body: Value) -> Scores {
    match body {
        Value::Object(by_name) => by_name.into_iter().filter(|(_, score)| !score.is_null()).collect(),
        Value::Array(items) => {
            if items.len() != names.len() {
                log::warn!(target: LOG_TARGET, "Asked for {} scores but got {}", names.len(), items.len());
            }

            names
                .iter()
                .cloned()
                .zip(items)
                .filter(|(_, score)| !score.is_null())
                .collect()
        }
        other => {
            log::warn!(target: LOG_TARGET, "Ignoring score response that is neither an object nor an array: {other}");
            Scores::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_object_response() {
        let scores = scores_from_response(
            &names(&["a", "b"]),
            json!({"a": {"score": {"final": 0.5}}, "b": null}),
        );
        assert_eq!(scores.len(), 1);
        assert_eq!(scores["a"]["score"]["final"], 0.5);
    }

    #[test]
    fn test_array_response_is_zipped_with_names() {
        let scores = scores_from_response(&names(&["a", "b", "c"]), json!([{"s": 1}, null, {"s": 3}]));
        assert_eq!(scores.keys().collect::<Vec<_>>(), vec!["a", "c"]);
        assert_eq!(scores["c"]["s"], 3);
    }

    #[test]
    fn test_unexpected_response() {
        assert!(scores_from_response(&names(&["a"]), json!("nope")).is_empty());
    }
}
