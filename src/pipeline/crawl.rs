use crate::config::Config;
use crate::github::{CrawlClient, DependencyNode, FailureKind, ManifestNode, VulnerabilityAlertNode};
use crate::graph::{DependencyGraph, DependencyGraphBuilder};
use crate::model::{RepoCrawl, RepoIdentity, RepoMetadata};
use crate::normalize::{NormalizedRecord, advisories_from_alerts, from_dependency_nodes};
use crate::pipeline::{CHANNEL_CAPACITY, Item, LOG_TARGET, Stage, StageFailure, Throttler, WindowedBatcher, spawn_stage};
use crate::scoring::{ScoreSource, Scores};
use core::time::Duration;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Knobs of a crawl, usually taken from [`Config`].
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub language_page_size: u32,
    pub manifest_page_size: u32,
    pub dependency_page_size: u32,
    pub alert_page_size: u32,
    pub max_concurrent_requests: usize,
    pub batch_window: Duration,
    pub batch_max_items: usize,

    /// Package manager, as named by the dependency graph, whose dependencies are kept
    pub target_ecosystem: String,
    pub fetch_vulnerability_alerts: bool,
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            language_page_size: config.language_page_size,
            manifest_page_size: config.manifest_page_size,
            dependency_page_size: config.dependency_page_size,
            alert_page_size: config.alert_page_size,
            max_concurrent_requests: config.max_concurrent_requests,
            batch_window: config.batch_window(),
            batch_max_items: config.batch_max_items,
            target_ecosystem: config.target_ecosystem.clone(),
            fetch_vulnerability_alerts: config.fetch_vulnerability_alerts,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// The dependency manifest a record was built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestSummary {
    pub id: String,
    pub filename: Option<String>,
    pub blob_path: Option<String>,
    pub dependencies_count: Option<u64>,
}

impl From<&ManifestNode> for ManifestSummary {
    fn from(manifest: &ManifestNode) -> Self {
        Self {
            id: manifest.id.clone(),
            filename: manifest.filename.clone(),
            blob_path: manifest.blob_path.clone(),
            dependencies_count: manifest.dependencies_count,
        }
    }
}

/// Everything the crawl learned about one manifest of one repository.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlRecord {
    pub repo: RepoIdentity,
    pub metadata: Option<RepoMetadata>,
    pub languages: Vec<String>,
    pub manifest: ManifestSummary,
    pub normalized: NormalizedRecord,
    pub graph: DependencyGraph,
    pub scores: Scores,
}

/// A terminal item of the pipeline.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CrawlOutcome {
    Record(CrawlRecord),
    Failure(StageFailure),
}

/// A repository's crawl state, shared by the tasks working on its manifests.
type SharedCrawl = Arc<Mutex<RepoCrawl>>;

#[derive(Debug)]
struct ManifestJob {
    crawl: SharedCrawl,
    manifest_id: String,
}

#[derive(Debug)]
struct DependencyPage {
    crawl: SharedCrawl,
    manifest_id: String,
    dependencies: Vec<DependencyNode>,
}

/// Repository-wide fetches, each run once per repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RepoStep {
    Languages,
    Manifests,
    VulnerabilityAlerts,
}

impl RepoStep {
    const fn stage(self) -> Stage {
        match self {
            Self::Languages => Stage::Languages,
            Self::Manifests => Stage::Manifests,
            Self::VulnerabilityAlerts => Stage::VulnerabilityAlerts,
        }
    }
}

/// Crawls repositories into one [`CrawlRecord`] per dependency manifest.
///
/// Cloning is cheap; clones share the client, the scorer, and the throttler.
#[derive(Debug, Clone)]
pub struct CrawlPipeline {
    client: Arc<CrawlClient>,
    scorer: Arc<dyn ScoreSource>,
    throttler: Arc<Throttler>,
    settings: Arc<PipelineSettings>,
}

impl CrawlPipeline {
    #[must_use]
    pub fn new(client: CrawlClient, scorer: Arc<dyn ScoreSource>, mut settings: PipelineSettings) -> Self {
        if settings.fetch_vulnerability_alerts && !client.supports_vulnerability_alerts() {
            log::warn!(target: LOG_TARGET, "The GraphQL schema has no vulnerability alerts, skipping them");
            settings.fetch_vulnerability_alerts = false;
        }

        Self {
            client: Arc::new(client),
            scorer,
            throttler: Throttler::new(settings.max_concurrent_requests),
            settings: Arc::new(settings),
        }
    }

    #[must_use]
    pub const fn throttler(&self) -> &Arc<Throttler> {
        &self.throttler
    }

    /// Crawls `repos` and collects every outcome.
    pub async fn run(&self, repos: impl IntoIterator<Item = RepoIdentity>) -> Vec<CrawlOutcome> {
        let mut outcomes = Vec::new();
        let mut rx = self.spawn(repos);
        while let Some(outcome) = rx.recv().await {
            outcomes.push(outcome);
        }

        outcomes
    }

    /// Starts crawling `repos` and returns the receiving end of the outcomes.
    ///
    /// Outcomes arrive as soon as their batch is scored; there is no ordering across
    /// repositories. The receiver closes once every repository has been handled.
    pub fn spawn(&self, repos: impl IntoIterator<Item = RepoIdentity>) -> mpsc::Receiver<CrawlOutcome> {
        let repos: Vec<_> = repos.into_iter().collect();
        log::info!(target: LOG_TARGET, "Crawling {} repositories", repos.len());

        let (seed_tx, seed_rx) = mpsc::channel(CHANNEL_CAPACITY);
        drop(tokio::spawn(async move {
            for repo in repos {
                if seed_tx.send(Item::Ok(RepoCrawl::new(repo))).await.is_err() {
                    break;
                }
            }
        }));

        let languages = self.repo_stage(RepoStep::Languages, seed_rx);
        let mut manifests = self.repo_stage(RepoStep::Manifests, languages);
        if self.settings.fetch_vulnerability_alerts {
            manifests = self.repo_stage(RepoStep::VulnerabilityAlerts, manifests);
        }

        let jobs = spawn_stage("manifest fan-out", manifests, |item, tx| async move {
            for job in fan_out(item) {
                if tx.send(job).await.is_err() {
                    break;
                }
            }
        });

        let this = self.clone();
        let pages = spawn_stage(Stage::Dependencies.into(), jobs, move |item, tx| {
            let this = this.clone();
            async move {
                let page = match item {
                    Item::Ok(job) => this.fetch_dependencies(job).await,
                    Item::Failed(failure) => Item::Failed(failure),
                };
                let _ = tx.send(page).await;
            }
        });

        let this = self.clone();
        let records = spawn_stage("normalize", pages, move |item, tx| {
            let this = this.clone();
            async move {
                let record = match item {
                    Item::Ok(page) => this.normalize(page).map(Item::Ok),
                    Item::Failed(failure) => Some(Item::Failed(failure)),
                };
                if let Some(record) = record {
                    let _ = tx.send(record).await;
                }
            }
        });

        let (batch_tx, batches) = mpsc::channel(CHANNEL_CAPACITY);
        let batcher = WindowedBatcher::new(self.settings.batch_window, self.settings.batch_max_items);
        drop(tokio::spawn(batcher.run(records, batch_tx)));

        let this = self.clone();
        spawn_stage(Stage::Scoring.into(), batches, move |batch, tx| {
            let this = this.clone();
            async move {
                for outcome in this.score_batch(batch).await {
                    if tx.send(outcome).await.is_err() {
                        break;
                    }
                }
            }
        })
    }

    fn repo_stage(&self, step: RepoStep, input: mpsc::Receiver<Item<RepoCrawl>>) -> mpsc::Receiver<Item<RepoCrawl>> {
        let this = self.clone();
        spawn_stage(step.stage().into(), input, move |item, tx| {
            let this = this.clone();
            async move {
                let item = match item {
                    Item::Ok(crawl) => this.run_repo_step(step, crawl).await,
                    Item::Failed(failure) => Item::Failed(failure),
                };
                let _ = tx.send(item).await;
            }
        })
    }

    async fn run_repo_step(&self, step: RepoStep, mut crawl: RepoCrawl) -> Item<RepoCrawl> {
        let settings = &self.settings;
        let result = {
            let _permit = self.throttler.admit(self.client.executor().rate_limit()).await;
            match step {
                RepoStep::Languages => self.client.fetch_languages(&mut crawl, settings.language_page_size).await,
                RepoStep::Manifests => self.client.fetch_manifests(&mut crawl, settings.manifest_page_size).await,
                RepoStep::VulnerabilityAlerts => {
                    self.client
                        .fetch_vulnerability_alerts(&mut crawl, settings.alert_page_size)
                        .await
                }
            }
        };

        match result {
            Ok(()) => Item::Ok(crawl),
            Err(e) if step == RepoStep::VulnerabilityAlerts => {
                log::warn!(target: LOG_TARGET, "Continuing {} without vulnerability alerts: {e}", crawl.identity());
                crawl.set_vulnerability_alerts(Vec::new());
                Item::Ok(crawl)
            }
            Err(e) => Item::from_result(Err(StageFailure::from_crawl_error(
                crawl.identity().clone(),
                step.stage(),
                &e,
            ))),
        }
    }

    async fn fetch_dependencies(&self, job: ManifestJob) -> Item<DependencyPage> {
        let (identity, cursor) = {
            let crawl = job.crawl.lock().expect("lock not poisoned");
            (crawl.identity().clone(), crawl.dep_file_cursor(&job.manifest_id).cloned())
        };

        let Some(cursor) = cursor else {
            return Item::from_result(Err(StageFailure::new(
                identity,
                Stage::Dependencies,
                FailureKind::Other,
                "manifest was not returned by the manifest query",
            )
            .with_manifest(job.manifest_id)));
        };

        let result = {
            let _permit = self.throttler.admit(self.client.executor().rate_limit()).await;
            self.client
                .query_dependencies(&identity, &job.manifest_id, &cursor, self.settings.dependency_page_size)
                .await
        };

        match result {
            Ok(dependencies) => {
                log::debug!(target: LOG_TARGET,
                    "Fetched {} dependencies of manifest {} in {identity}",
                    dependencies.len(),
                    job.manifest_id
                );
                job.crawl
                    .lock()
                    .expect("lock not poisoned")
                    .set_dep_file_deps(&job.manifest_id, dependencies.clone());

                Item::Ok(DependencyPage {
                    crawl: job.crawl,
                    manifest_id: job.manifest_id,
                    dependencies,
                })
            }
            Err(e) => Item::from_result(Err(
                StageFailure::from_crawl_error(identity, Stage::Dependencies, &e).with_manifest(job.manifest_id)
            )),
        }
    }

    /// Keeps the dependencies of the target ecosystem and builds the record for them.
    ///
    /// Returns `None` when no dependency belongs to the target ecosystem.
    fn normalize(&self, mut page: DependencyPage) -> Option<CrawlRecord> {
        let ecosystem = &self.settings.target_ecosystem;
        page.dependencies.retain(|d| {
            d.package_manager
                .as_deref()
                .is_some_and(|manager| manager.eq_ignore_ascii_case(ecosystem))
        });

        let crawl = page.crawl.lock().expect("lock not poisoned");
        if page.dependencies.is_empty() {
            log::debug!(target: LOG_TARGET,
                "Manifest {} in {} has no {ecosystem} dependencies",
                page.manifest_id,
                crawl.identity()
            );
            return None;
        }

        let manifest = crawl.dep_file(&page.manifest_id);
        let mut normalized = from_dependency_nodes(&page.dependencies, ecosystem);

        if self.settings.fetch_vulnerability_alerts {
            let alerts: Vec<_> = crawl
                .vulnerability_alerts()
                .iter()
                .filter(|alert| alert_matches(alert, manifest))
                .cloned()
                .collect();
            normalized.set_advisories_with_counts(advisories_from_alerts(&alerts));
        }

        let graph = DependencyGraphBuilder::new(ecosystem.to_ascii_lowercase()).build(&normalized.dependencies, normalized.root.as_ref());
        normalized.graph_stats = Some(graph.stats);

        Some(CrawlRecord {
            repo: crawl.identity().clone(),
            metadata: crawl.metadata().cloned(),
            languages: crawl.languages().iter().map(|l| l.name.clone()).collect(),
            manifest: manifest.map_or_else(
                || ManifestSummary {
                    id: page.manifest_id.clone(),
                    filename: None,
                    blob_path: None,
                    dependencies_count: None,
                },
                ManifestSummary::from,
            ),
            normalized,
            graph,
            scores: Scores::new(),
        })
    }

    /// Looks up scores for every package named in the batch with a single request.
    async fn score_batch(&self, batch: Vec<Item<CrawlRecord>>) -> Vec<CrawlOutcome> {
        let names: Vec<String> = batch
            .iter()
            .filter_map(|item| match item {
                Item::Ok(record) => Some(record),
                Item::Failed(_) => None,
            })
            .flat_map(|record| record.normalized.dependencies.iter().map(|p| p.name.as_str()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect();

        let scores = if names.is_empty() {
            Ok(Scores::new())
        } else {
            let _permit = self.throttler.acquire().await;
            self.scorer.scores(&names).await
        };

        let scores = match scores {
            Ok(scores) => scores,
            Err(e) => {
                let message = format!("{e:#}");
                return batch
                    .into_iter()
                    .map(|item| match item {
                        Item::Ok(record) => CrawlOutcome::Failure(
                            StageFailure::new(record.repo, Stage::Scoring, FailureKind::Other, message.clone())
                                .with_manifest(record.manifest.id),
                        ),
                        Item::Failed(failure) => CrawlOutcome::Failure(failure),
                    })
                    .inspect(|outcome| {
                        if let CrawlOutcome::Failure(failure) = outcome
                            && failure.stage == Stage::Scoring
                        {
                            log::warn!(target: LOG_TARGET, "{failure}");
                        }
                    })
                    .collect();
            }
        };

        batch
            .into_iter()
            .map(|item| match item {
                Item::Ok(mut record) => {
                    record.scores = record
                        .normalized
                        .dependencies
                        .iter()
                        .filter_map(|p| scores.get(&p.name).map(|score| (p.name.clone(), score.clone())))
                        .collect();
                    log::info!(target: LOG_TARGET,
                        "Collected {} dependencies of manifest {} in {}",
                        record.normalized.dependencies_count,
                        record.manifest.id,
                        record.repo
                    );
                    CrawlOutcome::Record(record)
                }
                Item::Failed(failure) => CrawlOutcome::Failure(failure),
            })
            .collect()
    }
}

/// Splits a crawled repository into one job per manifest, all sharing the crawl state.
fn fan_out(item: Item<RepoCrawl>) -> Vec<Item<ManifestJob>> {
    let crawl = match item {
        Item::Ok(crawl) => crawl,
        Item::Failed(failure) => return vec![Item::Failed(failure)],
    };

    let manifest_ids: Vec<_> = crawl.dep_files().iter().map(|m| m.id.clone()).collect();
    if manifest_ids.is_empty() {
        log::info!(target: LOG_TARGET, "{} has no dependency manifests", crawl.identity());
    }

    let shared = Arc::new(Mutex::new(crawl));
    manifest_ids
        .into_iter()
        .map(|manifest_id| {
            Item::Ok(ManifestJob {
                crawl: Arc::clone(&shared),
                manifest_id,
            })
        })
        .collect()
}

/// Whether an alert was raised against `manifest`, by path when both sides have one, else by file name.
fn alert_matches(alert: &VulnerabilityAlertNode, manifest: Option<&ManifestNode>) -> bool {
    let Some(manifest) = manifest else {
        return false;
    };

    match (&alert.vulnerable_manifest_path, &manifest.blob_path) {
        (Some(path), Some(blob_path)) => blob_path.ends_with(path.as_str()),
        _ => alert.vulnerable_manifest_filename.is_some() && alert.vulnerable_manifest_filename == manifest.filename,
    }
}
