use std::{
    fs::{self, OpenOptions},
    path::Path,
    sync::Arc,
};

use tracing_subscriber::{
    EnvFilter,
    fmt::{self, time::LocalTime},
    prelude::*,
};

use crate::configs::{Config, LoggingConfig};

/// Builds the filter string from `logging.level` and `logging.filters`.
fn filter_directives(logging: Option<&LoggingConfig>) -> String {
    let log_level = logging
        .and_then(|l| l.level.as_deref())
        .unwrap_or("info");

    let filters = logging.and_then(|l| l.filters.as_deref()).unwrap_or("");

    if filters.is_empty() {
        log_level.to_string()
    } else {
        format!("{},{}", log_level, filters)
    }
}

pub fn init(config: &Config) {
    let logging = config.logging.as_ref();

    // RUST_LOG wins over the configured level
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(logging)));

    let stdout_layer = fmt::layer()
        .with_timer(LocalTime::rfc_3339())
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(false);

    let file_layer = logging
        .and_then(|l| l.file.as_ref())
        .and_then(|file_config| {
            if let Some(parent) = Path::new(&file_config.path).parent() {
                if let Err(e) = fs::create_dir_all(parent) {
                    eprintln!("Failed to create log directory: {}", e);
                }
            }

            match OpenOptions::new()
                .create(true)
                .append(true)
                .open(&file_config.path)
            {
                Ok(file) => Some(
                    fmt::layer()
                        .with_writer(Arc::new(file))
                        .with_timer(LocalTime::rfc_3339())
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_line_number(true)
                        .with_file(false)
                        .with_ansi(false),
                ),
                Err(e) => {
                    eprintln!("Failed to open log file {}: {}", file_config.path, e);
                    None
                }
            }
        });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();
}
