//! Builders for the paginated crawl queries.
//!
//! Every builder is pure: it only renders query text and variables. Owner, name,
//! page sizes, and cursors travel as GraphQL variables, never spliced into the text.
//! A query whose cursors are all absent also asks for the repository's scalar fields,
//! so the first page of any axis doubles as the repository metadata lookup.

use serde_json::{Map, Value, json};

const RATE_LIMIT_TOKEN: &str = "__RATE_LIMIT__";
const REPO_FIELDS_TOKEN: &str = "__REPO_FIELDS__";

const RATE_LIMIT_FIELDS: &str = "rateLimit { limit cost remaining resetAt }";
const REPO_SCALAR_FIELDS: &str = "createdAt updatedAt description isArchived isPrivate isFork";

const LANGUAGES_QUERY: &str = r"query RepoLanguages($owner: String!, $name: String!, $first: Int!, $after: String) {
  __RATE_LIMIT__
  repository(owner: $owner, name: $name) {
    __REPO_FIELDS__
    languages(first: $first, after: $after) {
      pageInfo { hasNextPage endCursor }
      totalCount
      totalSize
      edges { node { id name } }
    }
  }
}";

const MANIFESTS_QUERY: &str = r"query RepoManifests($owner: String!, $name: String!, $first: Int!, $after: String) {
  __RATE_LIMIT__
  repository(owner: $owner, name: $name) {
    __REPO_FIELDS__
    dependencyGraphManifests(first: $first, after: $after) {
      pageInfo { hasNextPage endCursor }
      totalCount
      edges { node { id blobPath dependenciesCount exceedsMaxSize filename parseable } }
    }
  }
}";

const MANIFEST_DEPENDENCIES_QUERY: &str = r"query ManifestDependencies(
  $owner: String!, $name: String!,
  $manifestsFirst: Int!, $manifestsAfter: String,
  $first: Int!, $after: String
) {
  __RATE_LIMIT__
  repository(owner: $owner, name: $name) {
    __REPO_FIELDS__
    dependencyGraphManifests(first: $manifestsFirst, after: $manifestsAfter) {
      pageInfo { hasNextPage endCursor }
      totalCount
      edges {
        node {
          id blobPath dependenciesCount exceedsMaxSize filename parseable
          dependencies(first: $first, after: $after) {
            pageInfo { hasNextPage endCursor }
            totalCount
            nodes { packageName packageManager hasDependencies requirements }
          }
        }
      }
    }
  }
}";

const VULNERABILITY_ALERTS_QUERY: &str = r"query RepoVulnerabilityAlerts($owner: String!, $name: String!, $first: Int!, $after: String) {
  __RATE_LIMIT__
  repository(owner: $owner, name: $name) {
    __REPO_FIELDS__
    vulnerabilityAlerts(first: $first, after: $after) {
      pageInfo { hasNextPage endCursor }
      totalCount
      edges {
        node {
          id dismissReason dismissedAt
          dismisser { id name }
          securityAdvisory {
            id ghsaId summary description severity publishedAt updatedAt withdrawnAt
            identifiers { type value }
            vulnerabilities(first: $first) {
              pageInfo { hasNextPage endCursor }
              totalCount
              nodes { package { name ecosystem } severity updatedAt vulnerableVersionRange }
            }
          }
          vulnerableManifestFilename vulnerableManifestPath vulnerableRequirements
        }
      }
    }
  }
}";

const INTROSPECTION_QUERY: &str = r"query IntrospectionQuery {
  __schema {
    queryType { name }
    types { kind name fields(includeDeprecated: true) { name } }
  }
}";

/// Which connection a query pages through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::IntoStaticStr)]
pub enum QueryAxis {
    #[strum(serialize = "RepoLanguages")]
    Languages,
    #[strum(serialize = "RepoManifests")]
    Manifests,
    #[strum(serialize = "ManifestDependencies")]
    ManifestDependencies,
    #[strum(serialize = "RepoVulnerabilityAlerts")]
    VulnerabilityAlerts,
    #[strum(serialize = "IntrospectionQuery")]
    Introspection,
}

/// A page size and an optional cursor to start after.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageRequest {
    pub first: u32,
    pub after: Option<String>,
}

impl PageRequest {
    #[must_use]
    pub const fn first(first: u32) -> Self {
        Self { first, after: None }
    }

    #[must_use]
    pub fn after(first: u32, cursor: impl Into<String>) -> Self {
        Self {
            first,
            after: Some(cursor.into()),
        }
    }
}

/// A rendered GraphQL query together with its variables.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphQlQuery {
    axis: QueryAxis,
    query: String,
    variables: Map<String, Value>,
}

impl GraphQlQuery {
    #[must_use]
    pub const fn axis(&self) -> QueryAxis {
        self.axis
    }

    /// The GraphQL operation name, unique per axis.
    #[must_use]
    pub fn operation(&self) -> &'static str {
        self.axis.into()
    }

    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    #[must_use]
    pub const fn variables(&self) -> &Map<String, Value> {
        &self.variables
    }

    /// The JSON request body.
    #[must_use]
    pub fn to_body(&self) -> Value {
        json!({
            "query": self.query,
            "variables": self.variables,
        })
    }
}

fn render(template: &str, include_repo_fields: bool) -> String {
    let repo_fields = if include_repo_fields { REPO_SCALAR_FIELDS } else { "" };
    template
        .replace(RATE_LIMIT_TOKEN, RATE_LIMIT_FIELDS)
        .replace(REPO_FIELDS_TOKEN, repo_fields)
}

fn repo_variables(owner: &str, name: &str, page: &PageRequest) -> Map<String, Value> {
    let mut variables = Map::new();
    let _ = variables.insert("owner".to_string(), Value::from(owner));
    let _ = variables.insert("name".to_string(), Value::from(name));
    let _ = variables.insert("first".to_string(), Value::from(page.first));
    let _ = variables.insert("after".to_string(), page.after.clone().map_or(Value::Null, Value::from));
    variables
}

fn paged(axis: QueryAxis, template: &str, owner: &str, name: &str, page: &PageRequest) -> GraphQlQuery {
    GraphQlQuery {
        axis,
        query: render(template, page.after.is_none()),
        variables: repo_variables(owner, name, page),
    }
}

/// One page of a repository's languages.
#[must_use]
pub fn languages(owner: &str, name: &str, page: &PageRequest) -> GraphQlQuery {
    paged(QueryAxis::Languages, LANGUAGES_QUERY, owner, name, page)
}

/// One page of a repository's dependency manifests, without their dependencies.
#[must_use]
pub fn manifests(owner: &str, name: &str, page: &PageRequest) -> GraphQlQuery {
    paged(QueryAxis::Manifests, MANIFESTS_QUERY, owner, name, page)
}

/// One dependency page for every manifest on the given manifest page.
///
/// A nested connection cannot be addressed directly, so the manifest page that
/// contains the wanted manifest is requested again and the caller picks the manifest
/// out by id.
#[must_use]
pub fn manifest_dependencies(owner: &str, name: &str, manifest_page: &PageRequest, dependencies_page: &PageRequest) -> GraphQlQuery {
    let mut variables = repo_variables(owner, name, dependencies_page);
    let _ = variables.insert("manifestsFirst".to_string(), Value::from(manifest_page.first));
    let _ = variables.insert(
        "manifestsAfter".to_string(),
        manifest_page.after.clone().map_or(Value::Null, Value::from),
    );

    GraphQlQuery {
        axis: QueryAxis::ManifestDependencies,
        query: render(
            MANIFEST_DEPENDENCIES_QUERY,
            manifest_page.after.is_none() && dependencies_page.after.is_none(),
        ),
        variables,
    }
}

/// One page of a repository's vulnerability alerts.
#[must_use]
pub fn vulnerability_alerts(owner: &str, name: &str, page: &PageRequest) -> GraphQlQuery {
    paged(QueryAxis::VulnerabilityAlerts, VULNERABILITY_ALERTS_QUERY, owner, name, page)
}

/// The schema introspection query.
#[must_use]
pub fn introspection() -> GraphQlQuery {
    GraphQlQuery {
        axis: QueryAxis::Introspection,
        query: INTROSPECTION_QUERY.to_string(),
        variables: Map::new(),
    }
}
