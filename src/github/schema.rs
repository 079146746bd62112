use crate::Result;
use crate::github::{RetryingRequestExecutor, introspection};
use camino::{Utf8Path, Utf8PathBuf};
use ohno::{IntoAppError, bail};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};

const LOG_TARGET: &str = "    schema";

/// Type and field names of the GraphQL API, as reported by introspection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    types: HashMap<String, BTreeSet<String>>,
}

impl Schema {
    /// Builds a schema from an introspection result, either the whole `data` object or its `__schema` member.
    pub fn from_introspection(value: &Value) -> Result<Self> {
        let schema = value.get("__schema").unwrap_or(value);
        let Some(types) = schema.get("types").and_then(Value::as_array) else {
            bail!("introspection result has no 'types' array");
        };

        let types = types
            .iter()
            .filter_map(|ty| {
                let name = ty.get("name")?.as_str()?;
                let fields = ty
                    .get("fields")
                    .and_then(Value::as_array)
                    .map(|fields| {
                        fields
                            .iter()
                            .filter_map(|f| f.get("name").and_then(Value::as_str).map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default();
                Some((name.to_string(), fields))
            })
            .collect();

        Ok(Self { types })
    }

    #[must_use]
    pub fn has_type(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    #[must_use]
    pub fn has_field(&self, type_name: &str, field: &str) -> bool {
        self.types.get(type_name).is_some_and(|fields| fields.contains(field))
    }

    /// Fails unless `type_name` exposes every one of `fields`.
    pub fn require_fields(&self, type_name: &str, fields: &[&str]) -> Result<()> {
        if !self.has_type(type_name) {
            bail!("GraphQL schema has no type '{type_name}'");
        }

        let missing: Vec<_> = fields.iter().filter(|f| !self.has_field(type_name, f)).copied().collect();
        if !missing.is_empty() {
            bail!("GraphQL type '{type_name}' lacks required fields: {}", missing.join(", "));
        }

        Ok(())
    }
}

/// Loads the GraphQL schema from a file, or introspects the API and writes that file.
///
/// An existing file is trusted as-is; delete it to force a refresh.
#[derive(Debug, Clone)]
pub struct SchemaCache {
    path: Utf8PathBuf,
}

impl SchemaCache {
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Returns the cached schema, fetching and persisting it first when no cache file exists.
    ///
    /// # Errors
    ///
    /// Any failure here is fatal for the crawl: an unreadable cache, a failed introspection query,
    /// or an unwritable cache file.
    pub async fn load_or_fetch(&self, executor: &RetryingRequestExecutor) -> Result<Schema> {
        if self.path.exists() {
            let raw = load(&self.path)?;
            log::debug!(target: LOG_TARGET, "Using cached GraphQL schema from '{}'", self.path);
            return Schema::from_introspection(&raw);
        }

        log::info!(target: LOG_TARGET, "Fetching GraphQL schema");
        let data = executor
            .execute(&introspection())
            .await
            .into_app_err("unable to introspect the GraphQL schema")?;

        let schema = Schema::from_introspection(&data)?;
        save(&data, &self.path)?;
        log::debug!(target: LOG_TARGET, "Saved GraphQL schema to '{}'", self.path);
        Ok(schema)
    }
}

fn load(path: &Utf8Path) -> Result<Value> {
    let file = File::open(path).into_app_err_with(|| format!("unable to open schema file '{}'", path))?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader).into_app_err_with(|| format!("unable to parse schema file '{}'", path))
}

fn save(data: &Value, path: &Utf8Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).into_app_err_with(|| format!("unable to create directory '{}'", parent))?;
    }

    let file = File::create(path).into_app_err_with(|| format!("unable to create schema file '{}'", path))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, data).into_app_err_with(|| format!("unable to write schema file '{}'", path))?;
    writer
        .flush()
        .into_app_err_with(|| format!("unable to flush schema file '{}'", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({"__schema": {
            "queryType": {"name": "Query"},
            "types": [
                {"kind": "OBJECT", "name": "Repository", "fields": [{"name": "languages"}, {"name": "dependencyGraphManifests"}]},
                {"kind": "SCALAR", "name": "String", "fields": null}
            ]
        }})
    }

    #[test]
    fn test_from_introspection() {
        let schema = Schema::from_introspection(&sample()).unwrap();
        assert!(schema.has_type("String"));
        assert!(schema.has_field("Repository", "languages"));
        assert!(!schema.has_field("Repository", "vulnerabilityAlerts"));
        assert!(!schema.has_field("Missing", "languages"));
    }

    #[test]
    fn test_from_introspection_accepts_inner_object() {
        let inner = sample()["__schema"].clone();
        let schema = Schema::from_introspection(&inner).unwrap();
        assert!(schema.has_type("Repository"));
    }

    #[test]
    fn test_from_introspection_rejects_garbage() {
        assert!(Schema::from_introspection(&json!({"data": 1})).is_err());
    }

    #[test]
    fn test_require_fields_reports_missing() {
        let schema = Schema::from_introspection(&sample()).unwrap();
        assert!(schema.require_fields("Repository", &["languages"]).is_ok());

        let error = schema
            .require_fields("Repository", &["languages", "vulnerabilityAlerts"])
            .unwrap_err();
        assert!(error.to_string().contains("vulnerabilityAlerts"));
        assert!(schema.require_fields("Nope", &[]).is_err());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("nested").join("schema.json")).unwrap();

        save(&sample(), &path).unwrap();
        assert_eq!(load(&path).unwrap(), sample());
    }
}
