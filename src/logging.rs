use crate::models::LoggingSettings;
use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use std::fs;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Create the log directory if it doesn't exist yet.
pub fn ensure_log_dir(log_dir: &str) -> Result<Utf8PathBuf> {
    let log_path = Utf8PathBuf::from(log_dir);
    if !log_path.exists() {
        fs::create_dir_all(&log_path)
            .with_context(|| format!("Failed to create log directory: {}", log_dir))?;
    }
    Ok(log_path)
}

/// Setup logging with a daily rotating file appender and optional console output.
///
/// The file layer writes plain text, or JSON records when `settings.json` is
/// set. `settings.level` is an `EnvFilter` directive.
///
/// # Returns
/// A guard that must be held for the duration of the program to keep logging active
pub fn setup_logging(settings: &LoggingSettings) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_path = ensure_log_dir(&settings.dir)?;

    let file_appender = rolling::daily(&log_path, &settings.prefix);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_new(&settings.level)
        .with_context(|| format!("Invalid log level directive: {}", settings.level))?;

    let (json_layer, text_layer) = if settings.json {
        (
            Some(
                fmt::layer()
                    .json()
                    .with_writer(non_blocking)
                    .with_target(true)
                    .with_current_span(false),
            ),
            None,
        )
    } else {
        (
            None,
            Some(
                fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false) // No ANSI codes in log files
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            ),
        )
    };

    let console_layer = settings
        .console
        .then(|| fmt::layer().with_ansi(true).with_target(false));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(console_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::info!(
        "Logging initialized: dir={}, prefix={}, level={}, console={}, json={}",
        settings.dir,
        settings.prefix,
        settings.level,
        settings.console,
        settings.json
    );

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_log_directory_created() {
        let temp_dir = TempDir::new().unwrap();
        let log_dir = temp_dir.path().join("nested").join("logs");

        let created = ensure_log_dir(log_dir.to_str().unwrap()).unwrap();

        assert!(created.exists());
        assert!(log_dir.is_dir());
    }

    #[test]
    fn test_invalid_level_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let settings = LoggingSettings {
            dir: temp_dir.path().to_str().unwrap().to_string(),
            level: "srcds_control=loud".to_string(),
            console: false,
            ..Default::default()
        };

        // Fails before any global subscriber is touched
        assert!(setup_logging(&settings).is_err());
    }
}
