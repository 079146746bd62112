use crate::Result;
use crate::github::{
    CrawlError, DependencyNode, EdgeConnection, FailureKind, GraphQlQuery, PageRequest, QueryData, RepositoryNode, RetryingRequestExecutor,
    Schema, languages, manifest_dependencies, manifests, vulnerability_alerts,
};
use crate::model::{ManifestCursor, RepoCrawl, RepoIdentity};
use std::sync::Arc;

const LOG_TARGET: &str = "   crawler";

/// Upper bound on dependency pages followed for a single manifest
const MAX_DEPENDENCY_PAGES: usize = 50;

const REPOSITORY_FIELDS: [&str; 2] = ["languages", "dependencyGraphManifests"];
const MANIFEST_FIELDS: [&str; 1] = ["dependencies"];
const ALERT_FIELDS: [&str; 1] = ["vulnerabilityAlerts"];

/// Fetches repository languages, dependency manifests, their dependencies, and vulnerability alerts.
///
/// Every operation replaces the corresponding part of the [`RepoCrawl`] it is given, so
/// repeating an operation is harmless.
#[derive(Debug, Clone)]
pub struct CrawlClient {
    executor: RetryingRequestExecutor,
    schema: Arc<Schema>,
}

impl CrawlClient {
    /// Creates a client after checking that `schema` offers everything a crawl queries.
    ///
    /// # Errors
    ///
    /// Returns an error when the schema lacks a required type or field.
    pub fn new(executor: RetryingRequestExecutor, schema: Schema) -> Result<Self> {
        schema.require_fields("Repository", &REPOSITORY_FIELDS)?;
        schema.require_fields("DependencyGraphManifest", &MANIFEST_FIELDS)?;

        Ok(Self {
            executor,
            schema: Arc::new(schema),
        })
    }

    #[must_use]
    pub const fn executor(&self) -> &RetryingRequestExecutor {
        &self.executor
    }

    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Whether the schema exposes vulnerability alerts.
    #[must_use]
    pub fn supports_vulnerability_alerts(&self) -> bool {
        ALERT_FIELDS.iter().all(|field| self.schema.has_field("Repository", field))
    }

    /// Fetches the first page of languages.
    ///
    /// Only one page is requested, so at most `page_size` languages are observed.
    pub async fn fetch_languages(&self, repo: &mut RepoCrawl, page_size: u32) -> Result<(), CrawlError> {
        let identity = repo.identity();
        let query = languages(identity.org(), identity.repo(), &PageRequest::first(page_size));
        let repository = self.query_repository(identity, &query).await?;

        if let Some(metadata) = repository.metadata() {
            repo.set_metadata(metadata);
        }

        let connection = repository.languages;
        if connection.as_ref().is_some_and(|c| c.page_info.has_next_page) {
            log::debug!(target: LOG_TARGET, "{} has more than {page_size} languages, keeping the first page", repo.identity());
        }

        repo.set_languages(connection.map(EdgeConnection::into_nodes).unwrap_or_default());
        Ok(())
    }

    /// Fetches the first page of dependency manifests and remembers how to reach each one again.
    ///
    /// Only one page is requested, so at most `page_size` manifests are observed.
    pub async fn fetch_manifests(&self, repo: &mut RepoCrawl, page_size: u32) -> Result<(), CrawlError> {
        let identity = repo.identity();
        let page = PageRequest::first(page_size);
        let query = manifests(identity.org(), identity.repo(), &page);
        let repository = self.query_repository(identity, &query).await?;

        if let Some(metadata) = repository.metadata() {
            repo.set_metadata(metadata);
        }

        let connection = repository.dependency_graph_manifests;
        if connection.as_ref().is_some_and(|c| c.page_info.has_next_page) {
            log::debug!(target: LOG_TARGET, "{} has more than {page_size} manifests, keeping the first page", repo.identity());
        }

        repo.set_dep_files(connection.map(EdgeConnection::into_nodes).unwrap_or_default(), &page);
        Ok(())
    }

    /// Fetches every dependency of one manifest previously returned by [`Self::fetch_manifests`].
    pub async fn fetch_dependencies(&self, repo: &mut RepoCrawl, manifest_id: &str, page_size: u32) -> Result<(), CrawlError> {
        let Some(cursor) = repo.dep_file_cursor(manifest_id).cloned() else {
            return Err(CrawlError::new(
                FailureKind::Other,
                format!("manifest {manifest_id} of {} has not been fetched", repo.identity()),
            ));
        };

        let dependencies = self.query_dependencies(repo.identity(), manifest_id, &cursor, page_size).await?;
        repo.set_dep_file_deps(manifest_id, dependencies);
        Ok(())
    }

    /// Fetches every dependency of one manifest, starting from `cursor`, without touching any crawl state.
    pub async fn query_dependencies(
        &self,
        identity: &RepoIdentity,
        manifest_id: &str,
        cursor: &ManifestCursor,
        page_size: u32,
    ) -> Result<Vec<DependencyNode>, CrawlError> {
        let mut dependencies = Vec::new();
        let mut after = cursor.dependencies_after.clone();

        for _ in 0..MAX_DEPENDENCY_PAGES {
            let page = PageRequest { first: page_size, after };
            let query = manifest_dependencies(identity.org(), identity.repo(), &cursor.manifest_page, &page);
            let repository = self.query_repository(identity, &query).await?;

            let Some(manifest) = repository
                .dependency_graph_manifests
                .map(EdgeConnection::into_nodes)
                .unwrap_or_default()
                .into_iter()
                .find(|m| m.id == manifest_id)
            else {
                return Err(CrawlError::new(
                    FailureKind::NotFound,
                    format!("manifest {manifest_id} is no longer on its page in {identity}"),
                ));
            };

            let Some(connection) = manifest.dependencies else {
                return Ok(dependencies);
            };

            dependencies.extend(connection.nodes);

            match connection.page_info {
                crate::github::PageInfo {
                    has_next_page: true,
                    end_cursor: Some(next),
                } => after = Some(next),
                _ => return Ok(dependencies),
            }
        }

        log::warn!(target: LOG_TARGET,
            "Stopped following dependencies of manifest {manifest_id} in {identity} after {MAX_DEPENDENCY_PAGES} pages"
        );
        Ok(dependencies)
    }

    /// Fetches the first page of vulnerability alerts.
    pub async fn fetch_vulnerability_alerts(&self, repo: &mut RepoCrawl, page_size: u32) -> Result<(), CrawlError> {
        if !self.supports_vulnerability_alerts() {
            return Err(CrawlError::new(FailureKind::Other, "the GraphQL schema has no vulnerability alerts"));
        }

        let identity = repo.identity();
        let query = vulnerability_alerts(identity.org(), identity.repo(), &PageRequest::first(page_size));
        let repository = self.query_repository(identity, &query).await?;

        if let Some(metadata) = repository.metadata() {
            repo.set_metadata(metadata);
        }

        repo.set_vulnerability_alerts(
            repository
                .vulnerability_alerts
                .map(EdgeConnection::into_nodes)
                .unwrap_or_default(),
        );
        Ok(())
    }

    async fn query_repository(&self, identity: &RepoIdentity, query: &GraphQlQuery) -> Result<RepositoryNode, CrawlError> {
        let data = self.executor.execute(query).await?;

        let data: QueryData = serde_json::from_value(data).map_err(|e| {
            CrawlError::new(
                FailureKind::Other,
                format!("unexpected {} response for {identity}: {e}", query.operation()),
            )
        })?;

        if let Some(rate_limit) = &data.rate_limit {
            log::trace!(target: LOG_TARGET,
                "{} for {identity} cost {:?}, {:?} remaining",
                query.operation(),
                rate_limit.cost,
                rate_limit.remaining
            );
        }

        data.repository.ok_or_else(|| {
            CrawlError::new(
                FailureKind::UpstreamNullObject,
                format!("repository {identity} resolved to null"),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::{RetryPolicy, Transport, TransportResponse};
    use futures_util::FutureExt;
    use futures_util::future::BoxFuture;
    use serde_json::{Value, json};
    use std::sync::Mutex;

    /// Answers each query with a canned body picked by operation name.
    #[derive(Debug, Default)]
    struct CannedTransport {
        bodies: Vec<(&'static str, Value)>,
        seen: Mutex<Vec<Value>>,
    }

    impl Transport for CannedTransport {
        fn post(&self, body: Value) -> BoxFuture<'_, crate::Result<TransportResponse>> {
            let query = body["query"].as_str().unwrap_or_default().to_string();
            self.seen.lock().unwrap().push(body);
            let response = self
                .bodies
                .iter()
                .find(|(operation, _)| query.contains(operation))
                .map(|(_, body)| TransportResponse::new(200, Some(body.clone())))
                .unwrap_or_else(|| TransportResponse::new(404, None));
            async move { Ok(response) }.boxed()
        }
    }

    fn schema() -> Schema {
        Schema::from_introspection(&json!({"__schema": {"types": [
            {"name": "Repository", "fields": [{"name": "languages"}, {"name": "dependencyGraphManifests"}]},
            {"name": "DependencyGraphManifest", "fields": [{"name": "dependencies"}]}
        ]}}))
        .unwrap()
    }

    fn client(bodies: Vec<(&'static str, Value)>) -> (CrawlClient, Arc<CannedTransport>) {
        let transport = Arc::new(CannedTransport {
            bodies,
            seen: Mutex::new(Vec::new()),
        });
        let executor = RetryingRequestExecutor::new(Arc::clone(&transport) as Arc<dyn Transport>, RetryPolicy::default());
        (CrawlClient::new(executor, schema()).unwrap(), transport)
    }

    fn manifests_body() -> Value {
        json!({"data": {"repository": {
            "createdAt": "2019-05-01T00:00:00Z",
            "isArchived": false,
            "dependencyGraphManifests": {
                "pageInfo": {"hasNextPage": false, "endCursor": null},
                "edges": [
                    {"node": {"id": "m1", "filename": "package.json", "parseable": true}},
                    {"node": {"id": "m2", "filename": "Cargo.lock", "parseable": true}}
                ]
            }
        }}})
    }

    fn dependencies_body(page_info: &Value, nodes: &Value) -> Value {
        json!({"data": {"repository": {"dependencyGraphManifests": {
            "pageInfo": {"hasNextPage": false, "endCursor": null},
            "edges": [
                {"node": {"id": "m2", "filename": "Cargo.lock", "dependencies": {"pageInfo": {"hasNextPage": false}, "nodes": []}}},
                {"node": {"id": "m1", "filename": "package.json", "dependencies": {"pageInfo": page_info, "nodes": nodes}}}
            ]
        }}}})
    }

    fn repo() -> RepoCrawl {
        RepoCrawl::new(RepoIdentity::new("orgA", "repoA").unwrap())
    }

    #[test]
    fn test_new_rejects_incomplete_schema() {
        let transport = Arc::new(CannedTransport::default());
        let executor = RetryingRequestExecutor::new(transport, RetryPolicy::default());
        let schema = Schema::from_introspection(&json!({"types": [{"name": "Repository", "fields": [{"name": "languages"}]}]})).unwrap();

        assert!(CrawlClient::new(executor, schema).is_err());
    }

    #[tokio::test]
    async fn test_fetch_manifests_records_cursors_and_metadata() {
        let (client, _) = client(vec![("RepoManifests", manifests_body())]);
        let mut repo = repo();

        client.fetch_manifests(&mut repo, 3).await.unwrap();

        assert_eq!(repo.dep_files().len(), 2);
        let cursor = repo.dep_file_cursor("m2").unwrap();
        assert_eq!(cursor.manifest_page, PageRequest::first(3));
        assert_eq!(cursor.dependencies_after, None);
        assert_eq!(repo.metadata().unwrap().is_archived, Some(false));
    }

    #[tokio::test]
    async fn test_fetch_dependencies_matches_manifest_by_id_and_overwrites() {
        let nodes = json!([
            {"packageName": "a", "packageManager": "NPM", "requirements": "= 1.0.0"},
            {"packageName": "b", "packageManager": "NPM", "requirements": "= 2.0.0"}
        ]);
        let (client, transport) = client(vec![
            ("RepoManifests", manifests_body()),
            ("ManifestDependencies", dependencies_body(&json!({"hasNextPage": false}), &nodes)),
        ]);
        let mut repo = repo();

        client.fetch_manifests(&mut repo, 3).await.unwrap();
        client.fetch_dependencies(&mut repo, "m1", 100).await.unwrap();
        client.fetch_dependencies(&mut repo, "m1", 100).await.unwrap();

        let deps = repo.dep_file_deps("m1").unwrap();
        assert_eq!(deps.len(), 2);
        assert_eq!(deps[1].package_name, "b");
        assert!(repo.dep_file_deps("m2").is_none());

        let seen = transport.seen.lock().unwrap();
        let last = seen.last().unwrap();
        assert_eq!(last["variables"]["manifestsFirst"], 3);
        assert_eq!(last["variables"]["first"], 100);
    }

    #[tokio::test]
    async fn test_fetch_dependencies_requires_known_manifest() {
        let (client, _) = client(Vec::new());
        let mut repo = repo();

        let error = client.fetch_dependencies(&mut repo, "m9", 100).await.unwrap_err();
        assert_eq!(error.kind(), FailureKind::Other);
    }

    #[tokio::test]
    async fn test_null_repository_is_upstream_null_object() {
        let (client, _) = client(vec![("RepoLanguages", json!({"data": {"repository": null}}))]);
        let mut repo = repo();

        let error = client.fetch_languages(&mut repo, 50).await.unwrap_err();
        assert_eq!(error.kind(), FailureKind::UpstreamNullObject);
    }

    #[tokio::test]
    async fn test_vulnerability_alerts_need_schema_support() {
        let (client, _) = client(Vec::new());
        let mut repo = repo();

        assert!(!client.supports_vulnerability_alerts());
        let error = client.fetch_vulnerability_alerts(&mut repo, 10).await.unwrap_err();
        assert_eq!(error.kind(), FailureKind::Other);
    }
}
