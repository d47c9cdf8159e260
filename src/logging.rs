use crate::config::Settings;
use tracing_subscriber::{fmt, EnvFilter};
use tracing_subscriber::prelude::*;

/// Inicjalizacja logowania.
/// RUST_LOG ma pierwszeństwo, potem `logging.level`, domyślnie "info".
/// Logi idą na stderr – stdout jest zajęty przez komendy moderacyjne.
pub fn init(settings: &Settings) {
    let level = settings
        .logging
        .level
        .clone()
        .unwrap_or_else(|| "info".to_string());

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Prosty formatter (tekst); `logging.json` na razie ignorowane
    let fmt_layer = fmt::layer().with_writer(std::io::stderr);

    // drugi init (np. w testach) po prostu nic nie robi
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}
