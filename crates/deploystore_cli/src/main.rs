//! Storage health probe.
//!
//! # Responsibility
//! - Load `StorageConfig` from the environment and open the local stores.
//! - Exit non-zero when either backing store is unhealthy.
//!
//! Usage: `deploystore [health|version]` (defaults to `health`).

use deploystore_core::{default_log_level, init_logging, LocalStorage, StorageConfig};
use log::error;
use std::path::PathBuf;
use std::process::ExitCode;

const ENV_LOG_DIR: &str = "DEPLOYSTORE_LOG_DIR";
const ENV_LOG_LEVEL: &str = "DEPLOYSTORE_LOG_LEVEL";

fn main() -> ExitCode {
    match std::env::args().nth(1).as_deref() {
        None | Some("health") => run_health(),
        Some("version") => {
            println!("deploystore_core version={}", deploystore_core::core_version());
            ExitCode::SUCCESS
        }
        Some(other) => {
            eprintln!("unknown command `{other}`; expected health|version");
            ExitCode::from(2)
        }
    }
}

fn run_health() -> ExitCode {
    let config = match StorageConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return ExitCode::from(2);
        }
    };

    let log_dir = std::env::var(ENV_LOG_DIR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| config.data_dir.join("logs"));
    let log_dir = std::path::absolute(&log_dir).unwrap_or(log_dir);
    let level = std::env::var(ENV_LOG_LEVEL).unwrap_or_else(|_| default_log_level().to_string());
    if let Err(err) = init_logging(&level, &log_dir.to_string_lossy()) {
        eprintln!("logging disabled: {err}");
    }

    let result = LocalStorage::open(&config).and_then(|storage| storage.check_health());
    match result {
        Ok(()) => {
            println!(
                "ok project={} bucket={}",
                config.project_id, config.bucket_name
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("event=health_probe module=cli status=error kind={}", err.kind);
            eprintln!("unhealthy: {err}");
            ExitCode::FAILURE
        }
    }
}
