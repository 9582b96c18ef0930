/// Installs a global subscriber writing to the test output.
///
/// Logs from the runner are shown at `info` level, or `trace` if `COFLOW_DEBUG=1`.
/// `RUST_LOG` overrides both.
pub fn init_logging() {
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    let crate_name = env!("CARGO_CRATE_NAME");
    let debug_vars = &[("ACTIONS_RUNNER_DEBUG", "true"), ("COFLOW_DEBUG", "1")];
    let enable_debug = debug_vars
        .iter()
        .any(|(k, v)| std::env::var(k).as_deref() == Ok(v));

    let trace_level = if enable_debug { "trace" } else { "info" };
    let directive = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| format!("{crate_name}=debug,coflow_coroutine={trace_level}"));

    let filter = match EnvFilter::builder().parse(&directive) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("Invalid log directive '{directive}': {e}");
            EnvFilter::new("info")
        }
    };

    fn enable_ansi() -> bool {
        use std::io::IsTerminal;
        std::io::stdout().is_terminal() && std::io::stderr().is_terminal()
    }

    let subscriber = FmtSubscriber::builder()
        .with_target(false)
        .with_env_filter(filter)
        .with_test_writer()
        .with_ansi(enable_ansi())
        .with_thread_ids(false)
        .finish();

    // Tests share one process, only the first initialization succeeds
    if let Err(e) = subscriber.try_init() {
        tracing::trace!("Logging already initialized: {e}");
    }
}
