//! Console logging plus an optional JSONL trace file.

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry, fmt};

/// Holds the trace-file writer; dropping it flushes buffered lines.
pub(crate) struct TracingGuard {
    _file: Option<WorkerGuard>,
}

/// Console output is filtered by `RUST_LOG` (default `info`). When a trace
/// file is configured (`--trace-file` or the `DROVER_TRACE_FILE` env var),
/// full-detail spans and events also land there as one JSON object per
/// line, including span close events for turn and action timings.
pub(crate) fn init(trace_file: Option<&Path>) -> Result<TracingGuard> {
    let console_layer = fmt::layer()
        .with_target(false)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));

    let mut file_guard = None;
    let file_layer = match trace_file {
        Some(path) => {
            let (writer, guard) = trace_writer(path)?;
            file_guard = Some(guard);
            Some(
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .with_filter(EnvFilter::new("debug")),
            )
        }
        None => None,
    };

    Registry::default()
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(TracingGuard { _file: file_guard })
}

/// Non-blocking appender for `path`, creating parent directories as needed.
fn trace_writer(path: &Path) -> Result<(NonBlocking, WorkerGuard)> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create trace directory: {}", dir.display()))?;
    let filename = path
        .file_name()
        .with_context(|| format!("trace file path has no file name: {}", path.display()))?;
    Ok(tracing_appender::non_blocking(
        tracing_appender::rolling::never(dir, filename),
    ))
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_writer_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traces/gateway.jsonl");
        let (_writer, _guard) = trace_writer(&path).unwrap();
        assert!(path.parent().unwrap().is_dir());
    }

    #[test]
    fn trace_writer_rejects_path_without_file_name() {
        let dir = tempfile::tempdir().unwrap();
        assert!(trace_writer(&dir.path().join("..")).is_err());
    }
}
