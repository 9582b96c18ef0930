//! Reads files from a coroutine.
//!
//! Every file is read by a nested coroutine, either on a blocking thread through
//! a callback-style thunk, or with Tokio's asynchronous file system API through
//! a deferred value. Files which cannot be read are reported and skipped.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use eyre::{eyre, Result};
use tracing::{info, trace, warn};

use coflow_config::{Config, LogFormat, LogLevel, RuntimeConfig};
use coflow_coroutine::interop::{from_future, thunkify};
use coflow_coroutine::{Callback, Coroutine, Error, Runner, Thunk};
use coflow_metrics::{Metrics, SharedRegistry};

mod logging;

#[derive(Parser, Clone, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Files to read
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Configuration file
    #[arg(long, value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Log level (default: `debug`)
    #[arg(long)]
    log_level: Option<LogLevel>,

    /// Log format (default: `plaintext`)
    #[arg(long)]
    log_format: Option<LogFormat>,

    /// Read files on blocking threads instead of with the asynchronous file system API
    #[arg(long)]
    threads: bool,
}

type ReadFile = Arc<dyn Fn(PathBuf) -> Thunk<String, String> + Send + Sync>;

#[derive(Clone)]
enum Reader {
    Threaded(ReadFile),
    Async,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    // Command-line parameters take precedence over the configuration file
    let mut logging = config.logging;
    if let Some(log_level) = args.log_level {
        logging.log_level = log_level;
    }
    if let Some(log_format) = args.log_format {
        logging.log_format = log_format;
    }

    logging::init(logging.log_level, logging.log_format);

    trace!("Command-line parameters: {args:?}");

    let rt = build_runtime(config.runtime)?;
    rt.block_on(read_files(args, config))
}

fn build_runtime(config: RuntimeConfig) -> std::io::Result<tokio::runtime::Runtime> {
    use tokio::runtime::Builder;

    let mut builder = match config {
        RuntimeConfig::SingleThreaded => Builder::new_current_thread(),
        RuntimeConfig::MultiThreaded { worker_threads: 0 } => Builder::new_multi_thread(),
        RuntimeConfig::MultiThreaded { worker_threads } => {
            let mut builder = Builder::new_multi_thread();
            builder.worker_threads(worker_threads);
            builder
        }
    };

    builder.thread_name("coflow-read-files").enable_all().build()
}

async fn read_files(args: Args, config: Config) -> Result<()> {
    let metrics = if config.metrics.enabled {
        Metrics::register_with_prefix(SharedRegistry::global(), &config.metrics.prefix)
    } else {
        Metrics::new()
    };

    let runner = Runner::<String, String>::builder()
        .config(config.runner)
        .metrics(metrics)
        .build();

    let reader = if args.threads {
        let read: ReadFile = Arc::new(thunkify(read_on_thread));
        Reader::Threaded(read)
    } else {
        Reader::Async
    };

    let handle = runner.run(Coroutine::with_args(
        (args.files, reader),
        |co, (files, reader)| async move {
            let mut lines = 0;
            let mut skipped = 0;

            for path in files {
                match co.nested(read_one(path.clone(), reader.clone())).await {
                    Ok(contents) => {
                        let count = contents.lines().count();
                        info!(path = %path.display(), lines = count, "Read file");
                        lines += count;
                    }
                    Err(Error::Failed(reason)) => {
                        warn!(path = %path.display(), %reason, "Skipping file");
                        skipped += 1;
                    }
                    Err(e) => return Err(e),
                }
            }

            Ok(format!("{lines} lines, {skipped} files skipped"))
        },
    ));

    let summary = handle
        .await
        .map_err(|e| eyre!("Failed to read files: {e}"))?;

    println!("{summary}");

    if config.metrics.enabled {
        let mut out = String::new();
        coflow_metrics::export(&mut out)?;
        print!("{out}");
    }

    Ok(())
}

/// Reads a single file, giving up on it if it is empty.
fn read_one(path: PathBuf, reader: Reader) -> Coroutine<String, String> {
    Coroutine::new(move |co| async move {
        let contents = match reader {
            Reader::Threaded(read) => co.yield_(read(path.clone()).into()).await?,
            Reader::Async => {
                let file = path.clone();
                let read = from_future(async move {
                    tokio::fs::read_to_string(&file)
                        .await
                        .map_err(|e| e.to_string())
                });

                co.deferred(&read).await?
            }
        };

        if contents.is_empty() {
            return Err(Error::Failed(format!("{} is empty", path.display())));
        }

        Ok(contents)
    })
}

/// Reads a file on a blocking thread and reports its contents through the callback.
fn read_on_thread(path: PathBuf, callback: Callback<String, String>) {
    std::thread::spawn(move || {
        let result = std::fs::read_to_string(&path).map_err(|e| e.to_string());

        if let Err(e) = callback.settle(result) {
            warn!(path = %path.display(), "Failed to report file contents: {e}");
        }
    });
}
