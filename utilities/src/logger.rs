use opentelemetry::KeyValue;
use opentelemetry_otlp::{WithExportConfig, new_exporter, new_pipeline};
use opentelemetry_sdk::{Resource, runtime::Tokio, trace::Tracer};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
// exporing the info! warn! etc tracing macro through this Library
pub use tracing;
pub use tracing::*;

use crate::result::Result;

pub fn init_apm(service_name: &str, node_id: &str, endpoint: &str) -> Result<Tracer> {
    let otlp_exporter = new_exporter().http().with_endpoint(endpoint);
    let resource = Resource::new(vec![
        KeyValue::new("service.name", service_name.to_string()),
        KeyValue::new("service.node.id", node_id.to_string()),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
    ]);
    let tracer = new_pipeline()
        .tracing()
        .with_trace_config(opentelemetry_sdk::trace::config().with_resource(resource))
        .with_exporter(otlp_exporter)
        .install_batch(Tokio)?;
    Ok(tracer)
}

/// Installs the global subscriber: json lines into `log_base/<service>/<node_id>.log`,
/// plain text on stdout and, when an apm endpoint is configured, an otlp exporter.
///
/// The returned guard flushes the file writer on drop, keep it alive for the
/// lifetime of the process.
pub fn init_logger(
    service_name: &str,
    node_id: &str,
    level: &str,
    apm_endpoint: Option<&str>,
    log_base: &str,
) -> Result<WorkerGuard> {
    let file_appender = RollingFileAppender::new(
        Rotation::NEVER,
        format!("{log_base}/{service_name}"),
        format!("{node_id}.log"),
    );
    let (non_blocking, gaurd) = tracing_appender::non_blocking(file_appender);
    let json_layer = fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_line_number(true)
        .with_file(true)
        .with_thread_names(true)
        .with_current_span(true)
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .flatten_event(true);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);
    let filter = EnvFilter::builder()
        .with_default_directive(level.parse::<Level>().unwrap_or(Level::INFO).into())
        .from_env_lossy();

    let telemetery_layer = match apm_endpoint {
        Some(endpoint) => {
            let tracer = init_apm(service_name, node_id, endpoint)?;
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };
    tracing_subscriber::registry()
        .with(json_layer)
        .with(stdout_layer)
        .with(filter)
        .with(telemetery_layer)
        .try_init()?;
    info!(service = %service_name, node_id = %node_id, "Logging initialized");
    if let Some(endpoint) = apm_endpoint {
        info!(%endpoint, "Exporting traces to apm endpoint");
    }
    Ok(gaurd)
}
