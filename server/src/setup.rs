use std::{borrow::Cow, collections::HashMap, time::Duration};

use color_eyre::eyre::WrapErr;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{trace, Resource};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};
use tracing_tree::HierarchicalLayer;

/// Initialize Sentry error reporting when `SENTRY_DSN` is set
pub fn setup_sentry() -> Option<sentry::ClientInitGuard> {
    let git_commit: Option<Cow<'static, str>> = option_env!("VERGEN_GIT_SHA").map(Cow::from);
    let release_name =
        git_commit.unwrap_or_else(|| sentry::release_name!().unwrap_or_else(|| "unknown".into()));

    match std::env::var("SENTRY_DSN") {
        Ok(sentry_dsn) => {
            println!("Sentry enabled");

            Some(sentry::init((
                sentry_dsn,
                sentry::ClientOptions {
                    traces_sample_rate: 0.5,
                    release: Some(release_name),
                    ..Default::default()
                },
            )))
        }
        Err(_) => {
            println!("Sentry not configured in this environment");
            None
        }
    }
}

/// Install the global tracing subscriber.
///
/// Spans are printed as a tree. When `HONEYCOMB_API_KEY` is set they are
/// also exported over OTLP.
pub fn setup_tracing(crate_name: &str) -> color_eyre::Result<()> {
    let rust_log = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| format!("info,{crate_name}=trace,tower_http=debug"));

    let env_filter = EnvFilter::builder()
        .parse(&rust_log)
        .wrap_err_with(|| format!("Couldn't create env filter from {rust_log}"))?;

    let opentelemetry_layer = match std::env::var("HONEYCOMB_API_KEY") {
        Ok(honeycomb_key) => {
            let mut headers = HashMap::<String, String>::new();
            headers.insert("x-honeycomb-team".to_string(), honeycomb_key);
            headers.insert("x-honeycomb-dataset".to_string(), crate_name.to_string());

            let tracer = opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(
                    opentelemetry_otlp::new_exporter()
                        .http()
                        .with_endpoint("https://api.honeycomb.io/v1/traces")
                        .with_timeout(Duration::from_secs(3))
                        .with_headers(headers),
                )
                .with_trace_config(trace::config().with_resource(Resource::new(vec![
                    KeyValue::new("service.name", crate_name.to_string()),
                ])))
                .install_batch(opentelemetry_sdk::runtime::Tokio)
                .wrap_err("Failed to install OpenTelemetry tracer")?;

            Some(OpenTelemetryLayer::new(tracer))
        }
        Err(_) => None,
    };

    let hierarchical = HierarchicalLayer::default()
        .with_writer(std::io::stdout)
        .with_indent_lines(true)
        .with_indent_amount(2)
        .with_thread_names(true)
        .with_thread_ids(true)
        .with_verbose_exit(true)
        .with_verbose_entry(true)
        .with_targets(true);

    Registry::default()
        .with(hierarchical)
        .with(opentelemetry_layer)
        .with(env_filter)
        .try_init()
        .wrap_err("Failed to install tracing subscriber")?;

    Ok(())
}
