use std::time::Duration;

use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource,
    logs::SdkLoggerProvider,
    metrics::{PeriodicReader, SdkMeterProvider},
    trace::SdkTracerProvider,
};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

const DEFAULT_FILTER: &str = "info,tower_http=debug,lettre=warn";
const EXPORT_TIMEOUT: Duration = Duration::from_secs(10);
const METRIC_INTERVAL: Duration = Duration::from_secs(30);

/// OTLP providers for the three signals.
struct Exporters {
    tracer: SdkTracerProvider,
    meter: SdkMeterProvider,
    logger: SdkLoggerProvider,
}

impl Exporters {
    /// Builds all three pipelines against one collector endpoint and installs
    /// the tracer and meter globally.
    fn install(config: &Config) -> anyhow::Result<Self> {
        let resource = service_resource(config);
        let endpoint = config.otel_exporter_endpoint.as_str();

        let spans = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .with_timeout(EXPORT_TIMEOUT)
            .build()?;
        let tracer = SdkTracerProvider::builder()
            .with_batch_exporter(spans)
            .with_resource(resource.clone())
            .build();

        let metrics = opentelemetry_otlp::MetricExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .with_timeout(EXPORT_TIMEOUT)
            .build()?;
        let meter = SdkMeterProvider::builder()
            .with_reader(PeriodicReader::builder(metrics).with_interval(METRIC_INTERVAL).build())
            .with_resource(resource.clone())
            .build();

        let logs = opentelemetry_otlp::LogExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .with_timeout(EXPORT_TIMEOUT)
            .build()?;
        let logger = SdkLoggerProvider::builder()
            .with_batch_exporter(logs)
            .with_resource(resource)
            .build();

        global::set_tracer_provider(tracer.clone());
        global::set_meter_provider(meter.clone());

        Ok(Self {
            tracer,
            meter,
            logger,
        })
    }
}

/// Keeps the OTLP providers alive; flushes them on shutdown. Empty when
/// export is disabled.
pub struct TelemetryGuard {
    exporters: Option<Exporters>,
}

impl TelemetryGuard {
    pub fn shutdown(self) {
        let Some(exporters) = self.exporters else {
            return;
        };
        if let Err(e) = exporters.tracer.shutdown() {
            eprintln!("tracer provider shutdown failed: {e}");
        }
        if let Err(e) = exporters.meter.shutdown() {
            eprintln!("meter provider shutdown failed: {e}");
        }
        if let Err(e) = exporters.logger.shutdown() {
            eprintln!("logger provider shutdown failed: {e}");
        }
    }
}

fn service_resource(config: &Config) -> Resource {
    Resource::builder()
        .with_service_name(config.otel_service_name.clone())
        .with_attribute(KeyValue::new("service.version", env!("CARGO_PKG_VERSION")))
        .with_attribute(KeyValue::new(
            "deployment.environment",
            config.environment.clone(),
        ))
        .build()
}

pub fn init_telemetry(config: &Config) -> anyhow::Result<TelemetryGuard> {
    let exporters = if config.otel_export {
        Some(Exporters::install(config)?)
    } else {
        None
    };

    let trace_layer = exporters
        .as_ref()
        .map(|_| OpenTelemetryLayer::new(global::tracer(config.otel_service_name.clone())));
    let log_bridge = exporters
        .as_ref()
        .map(|e| OpenTelemetryTracingBridge::new(&e.logger));

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = if config.is_production() {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().pretty().boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(trace_layer)
        .with(log_bridge)
        .with(fmt_layer)
        .init();

    if exporters.is_some() {
        tracing::info!(
            service = %config.otel_service_name,
            endpoint = %config.otel_exporter_endpoint,
            "Telemetry export enabled"
        );
    } else {
        tracing::info!(service = %config.otel_service_name, "Telemetry export disabled, logging to stdout only");
    }

    Ok(TelemetryGuard { exporters })
}
