//! Tracing subscriber setup.
//!
//! Human-readable or JSON output goes to stderr so command output on stdout
//! stays machine-parseable. An optional daily-rolling file sink can be added.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    pub verbose: bool,
    pub json: bool,
    /// Directory for `foundry.log.<date>` files; `None` disables the file sink.
    pub file_dir: Option<PathBuf>,
}

fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("foundry=debug,info")
            } else {
                EnvFilter::try_new("foundry=info,warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber.
///
/// The returned guard flushes the file sink on drop and must be held for the
/// life of the process.
pub fn init_logging(opts: &LogOptions) -> Result<Option<WorkerGuard>> {
    let (file_layer, guard) = match &opts.file_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "foundry.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let json_layer = opts
        .json
        .then(|| fmt::layer().json().with_writer(std::io::stderr));
    let text_layer = (!opts.json).then(|| {
        fmt::layer()
            .with_target(opts.verbose)
            .with_writer(std::io::stderr)
            .compact()
    });

    tracing_subscriber::registry()
        .with(env_filter(opts.verbose))
        .with(json_layer)
        .with(text_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

/// Span covering one phase of one run.
pub fn phase_span(run_id: &str, phase: &str) -> tracing::Span {
    tracing::info_span!("phase", run_id = %run_id, phase = %phase)
}
