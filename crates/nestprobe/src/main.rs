#![warn(clippy::all, clippy::pedantic, clippy::nursery, rust_2018_idioms)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![forbid(unsafe_code)]

use anyhow::Context;
use clap::Parser;
use nestprobe_core::{Config, ProberManager};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod frontend;

/// An active path quality prober.
///
/// Probes operator-declared router paths with GRE-encapsulated UDP packets
/// and exposes per-bucket loss and round-trip time on a Prometheus scrape
/// endpoint.
#[derive(Parser, Debug)]
#[command(name = "nestprobe", version, about)]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(long, value_name = "FILE", default_value = "nestprobe.yml")]
    config_file: PathBuf,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&args.log_level).context("unable to parse log level")?,
        )
        .init();
    let config = load_config(&args.config_file)?;
    let manager = Arc::new(ProberManager::new());
    manager.configure(&config)?;
    frontend::serve(&config, manager).await
}

/// Load, default and validate the configuration in one pass.
fn load_config(path: &Path) -> anyhow::Result<Config> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("unable to read config file {}", path.display()))?;
    let mut config: Config =
        serde_yaml::from_str(&raw).context("unable to parse config file")?;
    config.apply_defaults();
    config.validate().context("invalid configuration")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_config_applies_defaults() {
        let mut file = tempfile_in_target();
        writeln!(
            file.1,
            "routers:\n  - name: lab1\n    dst_range: 10.0.0.0/30\npaths:\n  - name: lab\n    hops: [ lab1 ]\n"
        )
        .unwrap();
        let config = load_config(&file.0).unwrap();
        assert_eq!("/metrics", config.metrics_path());
        assert_eq!(32768, config.base_port());
        std::fs::remove_file(&file.0).unwrap();
    }

    #[test]
    fn test_load_config_rejects_unknown_router() {
        let mut file = tempfile_in_target();
        writeln!(
            file.1,
            "paths:\n  - name: lab\n    hops: [ no-such-router ]\n"
        )
        .unwrap();
        assert!(load_config(&file.0).is_err());
        std::fs::remove_file(&file.0).unwrap();
    }

    #[test]
    fn test_load_config_missing_file() {
        assert!(load_config(Path::new("/no/such/nestprobe.yml")).is_err());
    }

    fn tempfile_in_target() -> (PathBuf, std::fs::File) {
        let path = std::env::temp_dir().join(format!(
            "nestprobe-test-{}-{:?}.yml",
            std::process::id(),
            std::thread::current().id()
        ));
        let file = std::fs::File::create(&path).unwrap();
        (path, file)
    }
}
