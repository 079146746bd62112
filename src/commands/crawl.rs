use crate::commands::common::{Common, CommonArgs};
use clap::Parser;
use dep_observatory::Result;
use dep_observatory::github::{CrawlClient, HttpTransport, RetryPolicy, RetryingRequestExecutor, SchemaCache};
use dep_observatory::model::RepoIdentity;
use dep_observatory::pipeline::{CrawlOutcome, CrawlPipeline, PipelineSettings};
use dep_observatory::scoring::NpmsClient;
use ohno::IntoAppError;
use std::sync::Arc;
use url::Url;

#[derive(Parser, Debug)]
pub struct CrawlArgs {
    /// Repositories to crawl, as `org/repo` or a GitHub URL
    #[arg(value_name = "REPO", required = true)]
    pub repos: Vec<String>,

    /// GitHub personal access token
    #[arg(long, value_name = "TOKEN", env = "GITHUB_TOKEN")]
    pub github_token: Option<String>,

    #[command(flatten)]
    pub common: CommonArgs,
}

pub async fn process_crawl(args: &CrawlArgs) -> Result<()> {
    let common = Common::new(&args.common)?;
    let config = &common.config;

    let repos = args
        .repos
        .iter()
        .map(|repo| repo.parse::<RepoIdentity>())
        .collect::<Result<Vec<_>>>()?;

    if args.github_token.is_none() {
        log::warn!("No GitHub token provided, requests will likely be rejected");
    }

    let api_url = Url::parse(&config.api_url).into_app_err_with(|| format!("invalid API URL '{}'", config.api_url))?;
    let transport = HttpTransport::new(args.github_token.as_deref(), api_url, &config.user_agent)?;
    let policy = RetryPolicy {
        max_attempts: config.max_attempts,
        base_delay: config.backoff_base_delay(),
    };
    let executor = RetryingRequestExecutor::new(Arc::new(transport), policy);

    let schema_cache = SchemaCache::new(common.cache_dir.join(&config.schema_cache_file));
    let schema = schema_cache.load_or_fetch(&executor).await?;
    let client = CrawlClient::new(executor, schema)?;

    let scoring_url =
        Url::parse(&config.scoring_url).into_app_err_with(|| format!("invalid scoring URL '{}'", config.scoring_url))?;
    let scorer = NpmsClient::new(scoring_url, &config.user_agent)?;

    let pipeline = CrawlPipeline::new(client, Arc::new(scorer), PipelineSettings::from(config));
    let mut outcomes = pipeline.spawn(repos);
    let mut output = common.open_output()?;

    let mut records = 0_usize;
    let mut failures = 0_usize;
    while let Some(outcome) = outcomes.recv().await {
        match &outcome {
            CrawlOutcome::Record(_) => records += 1,
            CrawlOutcome::Failure(_) => failures += 1,
        }
        output.write(&outcome)?;
    }

    output.finish()?;
    log::info!("Crawl finished with {records} records and {failures} failures");
    Ok(())
}
