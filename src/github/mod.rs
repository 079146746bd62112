//! GitHub GraphQL crawling: transport, retry policy, query builders, and the crawl client.

mod client;
mod error;
mod executor;
mod model;
mod query;
mod rate_limit;
mod schema;
mod transport;

pub use client::CrawlClient;
pub use error::{CrawlError, FailureKind};
pub use executor::{RetryPolicy, RetryingRequestExecutor, backoff_delay};
pub use model::{
    Actor, AdvisoryIdentifier, DependencyNode, Edge, EdgeConnection, LanguageNode, ManifestNode, NodeConnection, PageInfo, QueryData,
    RateLimitNode, RepositoryNode, SecurityAdvisoryNode, SecurityVulnerabilityNode, VulnerabilityAlertNode, VulnerablePackage,
};
pub use query::{GraphQlQuery, PageRequest, QueryAxis, introspection, languages, manifest_dependencies, manifests, vulnerability_alerts};
pub use rate_limit::{RateLimitSnapshot, RateLimitState};
pub use schema::{Schema, SchemaCache};
pub use transport::{HttpTransport, Transport, TransportResponse};
