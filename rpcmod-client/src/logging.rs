use tracing_subscriber::{
    fmt::{self, time::ChronoUtc},
    prelude::*,
    util::TryInitError,
    EnvFilter,
};

const DEFAULT_FILTER: &str = "rpcmod=info,warn";
const TEST_FILTER: &str = "rpcmod=trace,warn";

fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Output format of [`init_logging`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Initialize console logging on stderr.
///
/// `RUST_LOG` overrides the default filter.
pub fn init_logging(format: LogFormat) -> Result<(), TryInitError> {
    let registry = tracing_subscriber::registry().with(env_filter(DEFAULT_FILTER));
    match format {
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
    }

    tracing::debug!("Logging initialized ({:?})", format);
    Ok(())
}

/// Route rpcmod's trace output through the test harness's captured writer.
///
/// Every test may call this; only the first call installs a subscriber.
pub fn init_test_logging() {
    let _ = tracing_subscriber::registry()
        .with(env_filter(TEST_FILTER))
        .with(fmt::layer().without_time().with_test_writer())
        .try_init();
}
