//! A tool to collect dependency and vulnerability metadata for GitHub repositories.
//!
//! # Overview
//!
//! `dep-observatory` crawls repositories through the GitHub GraphQL API, following each
//! repository's languages, dependency manifests and their dependencies. Dependencies of the
//! target ecosystem are turned into a dependency graph, scored in batches against the npms.io
//! API, and written out as one JSON line per manifest.
//!
//! It also normalizes captured `npm` and `yarn` command output (`list` and `audit`) into the
//! same record shape.
//!
//! # Crawling
//!
//! ```bash
//! export GITHUB_TOKEN=ghp_xxxxxxxxxxxxxxxxxxxx
//! dep-observatory crawl expressjs/express https://github.com/lodash/lodash
//! ```
//!
//! Every line is either a record or a failure:
//!
//! ```json
//! {"outcome":"record","repo":{"org":"expressjs","repo":"express"},"manifest":{...},"normalized":{...},"graph":{...},"scores":{...}}
//! {"outcome":"failure","repo":{"org":"org","repo":"missing"},"stage":"languages","kind":"NotFound","message":"..."}
//! ```
//!
//! A failing repository never stops the others. The only fatal error is a GraphQL schema that
//! cannot be loaded or lacks the fields the crawl needs. The schema is introspected once and
//! cached under `--cache-dir`; delete the cached file to refresh it.
//!
//! # Normalizing Captured Output
//!
//! ```bash
//! dep-observatory normalize --input tasks.jsonl --task list_metadata --task audit
//! ```
//!
//! The input holds one captured task per line, together with the repository, git reference and
//! dependency files it ran against. Tasks are grouped by repository, reference and dependency-file
//! hashes, and each group is written as one line.
//!
//! # Configuration
//!
//! ```bash
//! dep-observatory init observatory.yml
//! ```
//!
//! Configuration is read from `--config` or the first of `observatory.toml`, `observatory.yml`,
//! `observatory.yaml` and `observatory.json` in the current directory. Every field is optional.
//!
//! # Rate Limiting
//!
//! Requests are retried up to `max_attempts` times. Rate-limited and unavailable responses wait
//! for `Retry-After`, then for the rate-limit reset, then back off exponentially. When the
//! remaining budget reaches zero, new requests are held back until the budget resets.

use clap::builder::Styles;
use clap::builder::styling::{AnsiColor, Effects};
use clap::{Parser, Subcommand};
use dep_observatory::Result;

mod commands;

use crate::commands::{CrawlArgs, InitArgs, NormalizeArgs, init_config, process_crawl, process_normalize};

const CLAP_STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

#[derive(Parser, Debug)]
#[command(name = "dep-observatory", version, about)]
#[command(styles = CLAP_STYLES)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl repositories and write one JSON line per manifest or failure
    Crawl(Box<CrawlArgs>),
    /// Normalize captured package-manager task output
    Normalize(Box<NormalizeArgs>),
    /// Generate a default configuration file
    Init(InitArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    match &Cli::parse().command {
        Command::Crawl(crawl_args) => process_crawl(crawl_args).await,
        Command::Normalize(normalize_args) => process_normalize(normalize_args),
        Command::Init(init_args) => init_config(init_args),
    }
}
