use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::FmtSubscriber;

use coflow_config::{LogFormat, LogLevel};

pub fn init(log_level: LogLevel, log_format: LogFormat) {
    let log_level = if let Ok(rust_log) = std::env::var("RUST_LOG") {
        rust_log
    } else {
        log_level.to_string()
    };

    let filter = build_tracing_filter(&log_level);

    let builder = FmtSubscriber::builder()
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(enable_ansi())
        .with_thread_ids(false);

    match log_format {
        LogFormat::Plaintext => builder.finish().init(),
        LogFormat::Json => builder.json().finish().init(),
    }
}

/// Check if both stdout and stderr are terminals,
/// in which case colored output is enabled.
pub fn enable_ansi() -> bool {
    use std::io::IsTerminal;
    std::io::stdout().is_terminal() && std::io::stderr().is_terminal()
}

/// Prefixes of the crates targeted by the log level given on the command line.
const TARGET_CRATES: &[&str] = &["coflow_coroutine", "coflow_read_files"];

pub fn default_directive(log_level: &str) -> String {
    use itertools::Itertools;

    TARGET_CRATES
        .iter()
        .map(|&c| format!("{c}={log_level}"))
        .join(",")
}

/// Builds a filter enabling the given log levels for the coflow crates only,
/// unless a level explicitly names its target.
fn build_tracing_filter(log_levels: &str) -> EnvFilter {
    let mut filter = EnvFilter::from_default_env();

    for log_level in log_levels.split(',').filter(|l| !l.is_empty()) {
        let directive = if log_level.contains('=') {
            log_level.to_string()
        } else {
            default_directive(log_level)
        };

        for directive in directive.split(',') {
            match directive.parse() {
                Ok(directive) => filter = filter.add_directive(directive),
                Err(e) => eprintln!("Ignoring invalid log level '{directive}': {e}"),
            }
        }
    }

    filter
}
