use crate::conf::{ExecutionEnvironment, TelemetryConfig, ENVIRONMENT};
use anyhow::Context;
use std::sync::Once;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::{layer, Layer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter};

static INIT_TEST_LOG: Once = Once::new();

/// Initialises the global tracing subscriber.
///
/// Console output always goes to stdout. When a log directory is configured, a daily rolling
/// JSON file is written as well and the returned guard must be held for as long as logs should
/// be flushed to it.
pub fn init_tracing(settings: &TelemetryConfig) -> anyhow::Result<Option<WorkerGuard>> {
    settings
        .validate()
        .context("Invalid telemetry configuration")?;

    let (file_layer, guard) = match settings.log_dir() {
        Some(dir) => {
            let appender =
                RollingFileAppender::new(Rotation::DAILY, dir, settings.log_file_prefix());
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let file_layer = layer()
                .with_writer(non_blocking)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false)
                .json()
                .with_current_span(true)
                .with_span_list(true);
            (Some(file_layer), Some(guard))
        }
        None => (None, None),
    };

    let (console_layer, json_console_layer) = if settings.json_logs() {
        (None, Some(fmt_layer().json()))
    } else {
        (Some(fmt_layer()), None)
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .with(json_console_layer)
        .with(env_filter())
        .try_init()
        .context("Failed to initialize tracing")?;

    info!(
        "Tracing initialized for {} in {} mode",
        settings.service_name(),
        *ENVIRONMENT
    );
    Ok(guard)
}

/// Installs a test-writer subscriber once per process. Safe to call from every test.
pub fn init_testing() {
    INIT_TEST_LOG.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(env_filter())
            .try_init();
    });
}

fn env_filter() -> EnvFilter {
    match *ENVIRONMENT {
        ExecutionEnvironment::Integration | ExecutionEnvironment::Local => {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("info")
                    .add_directive("hyper=warn".parse().expect("static directive"))
                    .add_directive("reqwest=info".parse().expect("static directive"))
                    .add_directive("h2=info".parse().expect("static directive"))
            })
        }
        _ => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    }
}

fn fmt_layer<S>() -> Layer<S> {
    layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::NONE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_testing_is_idempotent() {
        init_testing();
        init_testing();
        tracing::info!("still alive");
    }

    #[test]
    fn rejects_invalid_settings() {
        let conf = TelemetryConfig::builder().log_file_prefix("").build();
        assert!(init_tracing(&conf).is_err());
    }
}
