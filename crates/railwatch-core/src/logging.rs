use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, EnvFilter};

use crate::{errors::Error, Result};

/// Initialize logging/tracing for the monitor.
///
/// Logs go to stderr unless `log_file` is set, in which case they are appended to
/// that file through a non-blocking writer. The returned guard flushes the writer
/// on drop and must be kept alive for the life of the process.
pub fn init(service_name: &str, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    // Default: info for our crates, warn for everything else.
    // Can be overridden with `RUST_LOG`.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,railwatch=info,railwatch_core=info,railwatch_darwin=info,railwatch_telegram=info,{}=info",
            service_name.replace('-', "_")
        ))
    });

    let Some(path) = log_file else {
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_ansi(true)
            .try_init()
            .map_err(|e| Error::Config(format!("logging already initialised: {e}")))?;
        return Ok(None);
    };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::Config(format!("LOG_FILE has no file name: {}", path.display())))?;

    std::fs::create_dir_all(dir)?;
    let appender = tracing_appender::rolling::never(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| Error::Config(format!("logging already initialised: {e}")))?;

    Ok(Some(guard))
}
