//! Common setup shared between the crawl and normalize commands.

use camino::Utf8PathBuf;
use clap::Args;
use clap::ValueEnum;
use dep_observatory::Result;
use dep_observatory::config::Config;
use directories::BaseDirs;
use ohno::{IntoAppError, app_err};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// No logging output
    None,
    /// Only error messages
    Error,
    /// Warning and error messages
    Warn,
    /// Info, warning, and error messages
    Info,
    /// Debug and above messages
    Debug,
    /// All messages including trace
    Trace,
}

/// Common arguments shared between the crawl and normalize commands
#[derive(Args, Debug)]
pub struct CommonArgs {
    /// Path to configuration file [default: one of observatory.[toml|yml|yaml|json] ]
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<Utf8PathBuf>,

    /// Directory where the GraphQL schema is cached [default: platform cache directory]
    #[arg(long, value_name = "PATH")]
    pub cache_dir: Option<Utf8PathBuf>,

    /// Write JSON lines to this file instead of to standard output
    #[arg(long, short = 'o', value_name = "PATH")]
    pub output: Option<Utf8PathBuf>,

    /// Set the logging level for diagnostic output
    #[arg(long, value_name = "LEVEL", default_value = "warn", global = true)]
    pub log_level: LogLevel,
}

pub struct Common {
    pub config: Config,
    pub cache_dir: Utf8PathBuf,
    output: Option<Utf8PathBuf>,
}

impl Common {
    /// Set up logging and load the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be loaded or no cache directory can be determined
    pub fn new(args: &CommonArgs) -> Result<Self> {
        init_logging(args.log_level);

        let base_dir = Utf8PathBuf::from(".");
        let (config, warnings) = Config::load(&base_dir, args.config.as_ref())?;

        let cache_dir = if let Some(cache_path) = &args.cache_dir {
            cache_path.clone()
        } else {
            let dir = BaseDirs::new()
                .into_app_err("Failed to determine cache directory")?
                .cache_dir()
                .join("dep-observatory");
            Utf8PathBuf::from_path_buf(dir).map_err(|p| app_err!("cache directory '{}' is not valid UTF-8", p.display()))?
        };

        if !warnings.is_empty() {
            eprintln!("\n⚠️  Configuration validation warnings:");
            for warning in &warnings {
                eprintln!("   {warning}");
            }
            eprintln!();
        }

        Ok(Self {
            config,
            cache_dir,
            output: args.output.clone(),
        })
    }

    /// Opens the destination for JSON lines
    ///
    /// # Errors
    ///
    /// Returns an error if the output file cannot be created
    pub fn open_output(&self) -> Result<JsonLines> {
        let sink: Box<dyn Write> = match &self.output {
            Some(path) => Box::new(File::create(path).into_app_err_with(|| format!("unable to create output file '{path}'"))?),
            None => Box::new(io::stdout().lock()),
        };

        Ok(JsonLines {
            writer: BufWriter::new(sink),
            destination: self.output.clone(),
        })
    }
}

/// Writes one JSON document per line.
pub struct JsonLines {
    writer: BufWriter<Box<dyn Write>>,
    destination: Option<Utf8PathBuf>,
}

impl JsonLines {
    pub fn write(&mut self, value: &impl Serialize) -> Result<()> {
        serde_json::to_writer(&mut self.writer, value).into_app_err("unable to serialize output line")?;
        self.writer.write_all(b"\n").into_app_err("unable to write output line")?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        self.writer.flush().into_app_err("unable to flush output")?;
        if let Some(path) = &self.destination {
            log::debug!("Wrote output to '{path}'");
        }
        Ok(())
    }
}

/// Initialize logger based on log level
pub fn init_logging(log_level: LogLevel) {
    let level = match log_level {
        LogLevel::None => return,
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    };

    let env = env_logger::Env::default().filter_or("RUST_LOG", level);

    env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(matches!(log_level, LogLevel::Debug | LogLevel::Trace))
        .init();
}
