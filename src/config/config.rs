use crate::Result;
use camino::{Utf8Path, Utf8PathBuf};
use core::time::Duration;
use ohno::{IntoAppError, app_err};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;

/// The default configuration YAML content, embedded from `default_config.yml`
pub const DEFAULT_CONFIG_YAML: &str = include_str!("../../default_config.yml");

/// Largest page size the GraphQL API accepts for a connection
const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_scoring_url")]
    pub scoring_url: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// File name of the cached GraphQL schema, relative to the cache directory
    #[serde(default = "default_schema_cache_file")]
    pub schema_cache_file: String,

    #[serde(default = "default_language_page_size")]
    pub language_page_size: u32,

    #[serde(default = "default_manifest_page_size")]
    pub manifest_page_size: u32,

    #[serde(default = "default_dependency_page_size")]
    pub dependency_page_size: u32,

    #[serde(default = "default_alert_page_size")]
    pub alert_page_size: u32,

    /// Upper bound on in-flight remote requests
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    #[serde(default = "default_batch_window_ms")]
    pub batch_window_ms: u64,

    #[serde(default = "default_batch_max_items")]
    pub batch_max_items: usize,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_backoff_base_delay_secs")]
    pub backoff_base_delay_secs: u64,

    /// Package manager name, as reported by the dependency graph, kept by the crawl
    #[serde(default = "default_target_ecosystem")]
    pub target_ecosystem: String,

    #[serde(default)]
    pub fetch_vulnerability_alerts: bool,
}

fn default_api_url() -> String {
    "https://api.github.com/graphql".to_string()
}

fn default_scoring_url() -> String {
    "https://api.npms.io/v2/package/mget".to_string()
}

fn default_user_agent() -> String {
    "dep-observatory".to_string()
}

fn default_schema_cache_file() -> String {
    "github_graphql_schema.json".to_string()
}

const fn default_language_page_size() -> u32 {
    50
}

const fn default_manifest_page_size() -> u32 {
    3
}

const fn default_dependency_page_size() -> u32 {
    100
}

const fn default_alert_page_size() -> u32 {
    10
}

const fn default_max_concurrent_requests() -> usize {
    4
}

const fn default_batch_window_ms() -> u64 {
    3000
}

const fn default_batch_max_items() -> usize {
    50
}

const fn default_max_attempts() -> u32 {
    15
}

const fn default_backoff_base_delay_secs() -> u64 {
    60
}

fn default_target_ecosystem() -> String {
    "NPM".to_string()
}

impl Config {
    /// Load configuration from a file or use defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn load(base_dir: &Utf8Path, config_path: Option<&Utf8PathBuf>) -> Result<(Self, Vec<String>)> {
        let (final_path, text) = if let Some(path) = config_path {
            let text = fs::read_to_string(path).into_app_err_with(|| format!("reading configuration from {path}"))?;
            (path.clone(), text)
        } else {
            let candidates = [
                base_dir.join("observatory.toml"),
                base_dir.join("observatory.yml"),
                base_dir.join("observatory.yaml"),
                base_dir.join("observatory.json"),
            ];

            let mut found = None;
            for path in &candidates {
                match fs::read_to_string(path) {
                    Ok(text) => {
                        found = Some((path.clone(), text));
                        break;
                    }
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e).into_app_err_with(|| format!("reading configuration from {path}")),
                }
            }

            let Some(result) = found else {
                return Ok((Self::default(), Vec::new()));
            };
            result
        };

        let config = Self::parse(&final_path, &text)?;

        let mut warnings = Vec::new();
        config.validate(&mut warnings);
        Ok((config, warnings))
    }

    fn parse(path: &Utf8Path, text: &str) -> Result<Self> {
        let extension = path.extension().unwrap_or_default();
        let config = match extension {
            "toml" => toml::from_str(text).into_app_err_with(|| format!("parsing TOML configuration from {path}"))?,
            "yml" | "yaml" => serde_yaml::from_str(text).into_app_err_with(|| format!("parsing YAML configuration from {path}"))?,
            "json" => serde_json::from_str(text).into_app_err_with(|| format!("parsing JSON configuration from {path}"))?,
            _ => return Err(app_err!("unsupported configuration file extension: {extension}")),
        };

        Ok(config)
    }

    /// Save configuration to a file, picking the format from the extension
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or serialization fails
    pub fn save(&self, output_path: &Utf8Path) -> Result<()> {
        let extension = output_path.extension().unwrap_or_default();
        let text = match extension {
            "toml" => toml::to_string_pretty(self)
                .into_app_err_with(|| format!("serializing configuration to TOML for saving to {output_path}"))?,
            // keep the commented template when the caller asks for YAML defaults
            "yml" | "yaml" if self.is_default() => DEFAULT_CONFIG_YAML.to_string(),
            "yml" | "yaml" => serde_yaml::to_string(self)
                .into_app_err_with(|| format!("serializing configuration to YAML for saving to {output_path}"))?,
            "json" => serde_json::to_string_pretty(self)
                .into_app_err_with(|| format!("serializing configuration to JSON for saving to {output_path}"))?,
            _ => return Err(app_err!("unsupported configuration file extension: {extension}")),
        };

        fs::write(output_path, text).into_app_err_with(|| format!("writing configuration to {output_path}"))?;
        Ok(())
    }

    fn is_default(&self) -> bool {
        serde_json::to_value(self).ok() == serde_json::to_value(Self::default()).ok()
    }

    #[must_use]
    pub const fn batch_window(&self) -> Duration {
        Duration::from_millis(self.batch_window_ms)
    }

    #[must_use]
    pub const fn backoff_base_delay(&self) -> Duration {
        Duration::from_secs(self.backoff_base_delay_secs)
    }

    fn validate(&self, warnings: &mut Vec<String>) {
        let page_sizes = [
            ("language_page_size", self.language_page_size),
            ("manifest_page_size", self.manifest_page_size),
            ("dependency_page_size", self.dependency_page_size),
            ("alert_page_size", self.alert_page_size),
        ];

        for (name, value) in page_sizes {
            if value == 0 || value > MAX_PAGE_SIZE {
                warnings.push(format!("{name} is {value}, expected a value between 1 and {MAX_PAGE_SIZE}"));
            }
        }

        if self.max_concurrent_requests == 0 {
            warnings.push("max_concurrent_requests must be at least 1".to_string());
        }

        if self.batch_max_items == 0 {
            warnings.push("batch_max_items must be at least 1".to_string());
        }

        if self.max_attempts == 0 {
            warnings.push("max_attempts must be at least 1".to_string());
        }

        if self.target_ecosystem.trim().is_empty() {
            warnings.push("target_ecosystem must not be empty".to_string());
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        serde_yaml::from_str(DEFAULT_CONFIG_YAML).expect("default_config.yml should be valid YAML that deserializes to Config")
    }
}
