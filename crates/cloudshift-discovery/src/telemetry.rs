//! Tracing bootstrap for binaries embedding the pipeline

use anyhow::Result;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Build the default log filter
///
/// If RUST_LOG is set it is used as-is, otherwise every cloudshift crate
/// logs at `level` and noisy dependencies at warn.
pub fn build_filter(level: &str) -> Result<EnvFilter> {
    if std::env::var("RUST_LOG").is_ok() {
        return Ok(EnvFilter::try_from_default_env()?);
    }
    Ok(EnvFilter::try_new(format!(
        "cloudshift={level},\
         cloudshift_types={level},\
         cloudshift_discovery={level},\
         cloudshift_gcp={level},\
         cloudshift_mappers={level},\
         hyper=warn,\
         h2=warn,\
         reqwest=warn,\
         rustls=warn",
        level = level
    ))?)
}

/// Install a compact global subscriber
pub fn init_tracing(level: &str) -> Result<()> {
    let filter = build_filter(level)?;
    let fmt_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()?;
    Ok(())
}
