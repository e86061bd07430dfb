use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Environment variable holding `EnvFilter` directives, e.g. `simsites=trace`.
pub const LOG_ENV_VAR: &str = "SIMSITES_LOG";

/// Install the global subscriber. `level` comes from the `-v`/`-q` flags and is
/// overridden per target by `SIMSITES_LOG`.
pub fn setup_logger(level: LevelFilter) {
    let indicatif_layer = IndicatifLayer::new();

    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .with_env_var(LOG_ENV_VAR)
        .from_env_lossy();

    let fmt = fmt::layer()
        .with_ansi(true)
        .with_target(true)
        .with_file(cfg!(debug_assertions))
        .with_line_number(cfg!(debug_assertions))
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_writer(indicatif_layer.get_stderr_writer())
        .pretty();

    tracing_subscriber::registry()
        .with(fmt)
        .with(indicatif_layer)
        .with(env_filter)
        .init();
}
