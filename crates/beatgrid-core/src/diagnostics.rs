use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use crate::config::DiagnosticsConfig;

pub const DEFAULT_LOG_FILTER: &str = "info,beatgrid_core=trace";
pub const DEFAULT_TRACE_FILE_PREFIX: &str = "beatgrid";

/// Keeps the JSON log writer flushing; drop it last.
pub struct TelemetryGuard {
    pub session_id: Uuid,
    pub log_file: PathBuf,
    _file_guard: WorkerGuard,
}

#[must_use]
pub fn log_file_name(prefix: &str, started_at: DateTime<Utc>) -> String {
    format!("{prefix}-{}.log", started_at.format("%Y%m%d-%H%M%S"))
}

/// `RUST_LOG` wins over the configured filter. A configured filter that does
/// not parse is an error rather than a silent fallback.
pub fn build_filter(env_override: Option<&str>, configured: &str) -> anyhow::Result<EnvFilter> {
    if let Some(directives) = env_override.filter(|value| !value.trim().is_empty()) {
        return EnvFilter::try_new(directives)
            .with_context(|| format!("invalid {} filter: {directives}", EnvFilter::DEFAULT_ENV));
    }
    EnvFilter::try_new(configured)
        .with_context(|| format!("invalid configured log filter: {configured}"))
}

/// Installs the global subscriber: a JSON file layer under `log_dir` and,
/// unless disabled, a compact stdout layer.
pub fn init_tracing(
    log_dir: impl AsRef<Path>,
    config: &DiagnosticsConfig,
) -> anyhow::Result<TelemetryGuard> {
    let log_dir = log_dir.as_ref();
    fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory: {}", log_dir.display()))?;

    let env_value = env::var(EnvFilter::DEFAULT_ENV).ok();
    let env_filter = build_filter(env_value.as_deref(), &config.rust_log_filter)?;

    let session_id = Uuid::new_v4();
    let file_name = log_file_name(&config.trace_file_prefix, Utc::now());
    let log_file = log_dir.join(&file_name);
    let (file_writer, file_guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(log_dir, file_name));

    let stdout_layer = config.log_to_stdout.then(|| {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_thread_ids(true)
            .with_target(true)
    });

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(file_writer);

    match tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
    {
        Ok(()) => info!(%session_id, log_file = %log_file.display(), "tracing initialized"),
        Err(error) => warn!(?error, "global tracing subscriber already initialized"),
    }

    Ok(TelemetryGuard {
        session_id,
        log_file,
        _file_guard: file_guard,
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn log_file_is_named_after_prefix_and_start_time() {
        let started_at = Utc
            .with_ymd_and_hms(2026, 3, 9, 14, 5, 7)
            .single()
            .expect("valid timestamp");
        assert_eq!(
            log_file_name("beatgrid", started_at),
            "beatgrid-20260309-140507.log"
        );
    }

    #[test]
    fn configured_filter_is_validated() {
        assert!(build_filter(None, DEFAULT_LOG_FILTER).is_ok());
        assert!(build_filter(None, "beatgrid_core=loud").is_err());
    }

    #[test]
    fn environment_filter_takes_precedence() {
        assert!(build_filter(Some("debug"), "beatgrid_core=loud").is_ok());
        assert!(build_filter(Some("   "), DEFAULT_LOG_FILTER).is_ok());
        assert!(build_filter(Some("beatgrid_core=loud"), DEFAULT_LOG_FILTER).is_err());
    }
}
