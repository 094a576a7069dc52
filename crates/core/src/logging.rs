//! Tracing setup: console output always, plus a daily-rolling file sink
//! under `<data_dir>/logs` when a data directory is available.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const DEFAULT_LOG_FILTER: &str = "info";
/// Appended to implicit filters so ONNX Runtime chatter stays out of the way.
pub const DEFAULT_NOISE_FILTER: &str = "ort=error";
pub const DEFAULT_LOG_DIR_NAME: &str = "logs";
pub const DEFAULT_LOG_FILE_NAME: &str = "tessera.log";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingOptions {
    /// 0 = info, 1 = debug, 2+ = trace.
    pub verbose: u8,
    /// Explicit filter from the CLI; wins over everything else, verbatim.
    pub cli_log_filter: Option<String>,
    /// Contents of RUST_LOG, if set.
    pub rust_log_env: Option<String>,
    /// Where the `logs/` directory lives. `None` disables file logging.
    pub data_dir: Option<PathBuf>,
}

/// Pick the tracing filter string.
///
/// Precedence: explicit CLI filter, then RUST_LOG, then the verbosity flag,
/// then the default. The noise filter is appended to everything except an
/// explicit CLI filter, which is taken as-is.
pub fn select_log_filter(options: &LoggingOptions) -> String {
    if let Some(filter) = options
        .cli_log_filter
        .as_deref()
        .filter(|f| !f.trim().is_empty())
    {
        return filter.to_string();
    }

    if let Some(env_filter) = options
        .rust_log_env
        .as_deref()
        .filter(|f| !f.trim().is_empty())
    {
        return format!("{env_filter},{DEFAULT_NOISE_FILTER}");
    }

    let base = match options.verbose {
        0 => DEFAULT_LOG_FILTER,
        1 => "debug",
        _ => "trace",
    };
    format!("{base},{DEFAULT_NOISE_FILTER}")
}

/// Install the global subscriber.
///
/// Returns the file sink's worker guard; dropping it flushes and stops the
/// background writer, so the caller keeps it alive for the process lifetime.
/// Safe to call more than once; later calls leave the first subscriber in
/// place.
pub fn init(options: &LoggingOptions) -> Option<WorkerGuard> {
    let filter = select_log_filter(options);
    let env_filter =
        EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let file_sink = options.data_dir.as_ref().and_then(|dir| {
        let log_dir = dir.join(DEFAULT_LOG_DIR_NAME);
        match std::fs::create_dir_all(&log_dir) {
            Ok(()) => {
                let appender = tracing_appender::rolling::daily(&log_dir, DEFAULT_LOG_FILE_NAME);
                Some(tracing_appender::non_blocking(appender))
            }
            Err(error) => {
                eprintln!(
                    "Warning: log directory {} unavailable ({error}); file logging disabled",
                    log_dir.display()
                );
                None
            }
        }
    });

    let (file_layer, guard) = match file_sink {
        Some((writer, guard)) => (
            Some(fmt::layer().with_ansi(false).with_writer(writer)),
            Some(guard),
        ),
        None => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init();

    guard
}
