//! Tracing subscriber wiring

use std::sync::Mutex;

use anyhow::Result;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use simple_deploy_core::RunLog;

/// Install the console layer and, when a run log is open, the file layer.
///
/// The console stays silent unless `RUST_LOG` asks for output; the operator
/// already sees the narrative on stdout. The file layer records INFO and
/// above through the run log's redacting writer.
pub fn init(run_log: Option<&RunLog>) -> Result<()> {
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("off"));
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(console_filter);

    let file = match run_log {
        Some(log) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(log.writer()?))
                .with_filter(LevelFilter::INFO),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()?;
    Ok(())
}
