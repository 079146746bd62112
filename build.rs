//! Fails the build when `default_config.yml` does not load cleanly through the crate's own config loader.

#![allow(dead_code, reason = "the build script only needs Config::load")]
#![allow(
    clippy::redundant_pub_crate,
    reason = "visibility is written for the library, not for this script"
)]

use camino::Utf8PathBuf;
use ohno::{IntoAppError, bail};

type Result<T, E = ohno::AppError> = core::result::Result<T, E>;

#[path = "src/config/mod.rs"]
mod config;

fn main() -> Result<()> {
    println!("cargo:rerun-if-changed=default_config.yml");
    println!("cargo:rerun-if-changed=src/config");

    let base_dir = Utf8PathBuf::from(std::env::var("CARGO_MANIFEST_DIR").into_app_err("CARGO_MANIFEST_DIR is not set")?);
    let default_config = base_dir.join("default_config.yml");

    let (_, warnings) = config::Config::load(&base_dir, Some(&default_config))?;
    if !warnings.is_empty() {
        for warning in &warnings {
            println!("cargo:warning={default_config}: {warning}");
        }

        bail!("{default_config} has {} validation warning(s)", warnings.len());
    }

    Ok(())
}
