use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    filter::Targets, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

use crate::{errors::Error, sink::SinkWriter, Result};

fn env_filter(service_name: &str) -> EnvFilter {
    // Default: info for our crates. Can be overridden with `RUST_LOG`.
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "info,tgbot=info,tgbot_core=info,tgbot_http=info,{service_name}=info"
        ))
    })
}

/// Initialize logging to stderr.
pub fn init(service_name: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(env_filter(service_name)),
        )
        .try_init()
        .map_err(|e| Error::Config(format!("logging init failed: {e}")))
}

/// Like [`init`], and also mirror WARN and above into the chat through `sink`.
///
/// Events from the notifier crates themselves are not mirrored.
pub fn init_with_mirror(service_name: &str, sink: SinkWriter) -> Result<()> {
    let mirror_filter = Targets::new()
        .with_default(LevelFilter::WARN)
        .with_target("tgbot_core", LevelFilter::OFF)
        .with_target("tgbot_http", LevelFilter::OFF);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(env_filter(service_name)),
        )
        .with(
            fmt::layer()
                .with_writer(sink)
                .with_ansi(false)
                .without_time()
                .with_filter(mirror_filter),
        )
        .try_init()
        .map_err(|e| Error::Config(format!("logging init failed: {e}")))
}
