mod app;
mod audio;
mod config;
mod error;
mod generation;
mod preview;
mod ui;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::generation::gemini::GeminiClient;

fn main() -> iced::Result {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let service = match GeminiClient::new(&config) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::error!("failed to create content service client: {e}");
            std::process::exit(1);
        }
    };

    app::run(config, service)
}
