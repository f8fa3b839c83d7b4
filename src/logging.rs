use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Once;

use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const DEFAULT_DIRECTIVE: &str = "info";
const LOG_ENV_VAR: &str = "TOOLGATE_LOG";

static INIT: Once = Once::new();

/// Install the global tracing subscriber. Later calls are no-ops.
///
/// Human-readable output goes to stderr, filtered by `TOOLGATE_LOG`, then
/// `log_level`, then `info`. With `log_file`, every event is also appended
/// there as one JSON object per line.
///
/// Tool invocations log `tool`, `program`, `args`, `duration_ms` and
/// `exit_code` fields; prompt and code bodies are only ever logged by length.
pub fn init(log_level: Option<&str>, log_file: Option<&Path>) -> anyhow::Result<()> {
    let mut result = Ok(());
    INIT.call_once(|| result = try_init(log_level, log_file));
    result
}

fn try_init(log_level: Option<&str>, log_file: Option<&Path>) -> anyhow::Result<()> {
    let env_directive = std::env::var(LOG_ENV_VAR).ok();
    let filter = build_filter(env_directive.as_deref(), log_level);

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_ansi(true)
        .compact()
        .with_filter(filter);

    let file_layer = match log_file {
        Some(path) => {
            let file = open_log_file(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(file.with_max_level(Level::DEBUG))
                    .with_ansi(false)
                    .json(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))
}

/// Env directive wins when it parses; a malformed one falls back to the
/// configured level instead of silencing output.
fn build_filter(env_directive: Option<&str>, log_level: Option<&str>) -> EnvFilter {
    env_directive
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| {
            EnvFilter::try_new(log_level.unwrap_or(DEFAULT_DIRECTIVE))
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
        })
}

fn open_log_file(path: &Path) -> anyhow::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            anyhow::anyhow!(
                "failed to create log file directory {}: {e}",
                parent.display()
            )
        })?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| anyhow::anyhow!("failed to open log file {}: {e}", path.display()))
}
