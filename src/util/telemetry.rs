use std::time::Duration;

use opentelemetry::{KeyValue, global};
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{self, Protocol, WithExportConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::util::env::{self, Var};
use crate::var;

pub type Result<T> = core::result::Result<T, Box<dyn std::error::Error>>;

const DEFAULT_FILTER: &str = "floorboard_server=debug,tower_http=debug,axum=debug,redis=info,info";

/// OTLP providers, present only when a collector endpoint is configured
#[derive(Debug, Clone)]
struct Providers {
    logger: SdkLoggerProvider,
    tracer: SdkTracerProvider,
    meter: SdkMeterProvider,
}

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct Telemetry {
    pub tracer_name: &'static str,
    pub base_resource: Resource,
    pub collector_url: Option<&'static str>,

    providers: Option<Providers>,
}

impl Telemetry {
    pub async fn new() -> Result<Telemetry> {
        let collector_url = env::env().await?.otel_exporter_otlp_endpoint.as_deref();
        let tracer_name = var!(Var::ApiTracerName).await?;
        let service_name = var!(Var::ApiServiceName).await?;
        let service_version = env!("CARGO_PKG_VERSION");

        let base_resource = base_attrs(service_name, service_version);

        let providers = match collector_url {
            Some(url) => Some(Providers {
                logger: build_logger_provider(url, base_resource.clone())?,
                tracer: build_tracer_provider(url, base_resource.clone())?,
                meter: build_meter_provider(url, base_resource.clone())?,
            }),
            None => None,
        };

        Ok(Self {
            tracer_name,
            base_resource,
            collector_url,
            providers,
        })
    }

    /// Installs the global subscriber: env filter + fmt, plus the OTLP bridge layers when a
    /// collector is configured.
    pub fn register(self) -> Self {
        self.subscriber().init();

        tracing::debug!(collector_url = ?self.collector_url, "telemetry registered");
        self
    }

    fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync + 'static + use<> {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true);

        // `Option<L>` is a layer, so one chain covers both the local and the exporting setup
        let (otel_traces, otel_logs, otel_metrics) = match &self.providers {
            Some(providers) => {
                global::set_tracer_provider(providers.tracer.clone());
                let tracer = global::tracer(self.tracer_name);

                (
                    Some(tracing_opentelemetry::layer().with_tracer(tracer)),
                    Some(OpenTelemetryTracingBridge::new(&providers.logger)),
                    Some(tracing_opentelemetry::MetricsLayer::new(providers.meter.clone())),
                )
            }
            None => (None, None, None),
        };

        tracing_subscriber::registry()
            .with(otel_traces)
            .with(otel_logs)
            .with(otel_metrics)
            .with(filter)
            .with(fmt_layer)
    }

    pub fn shutdown(self) {
        let Some(providers) = self.providers else {
            return;
        };

        if let Err(e) = providers.meter.shutdown() {
            eprintln!("error during metering shutdown: {e:?}");
        }

        if let Err(e) = providers.logger.shutdown() {
            eprintln!("error during logging shutdown: {e:?}");
        }

        if let Err(e) = providers.tracer.shutdown() {
            eprintln!("error during tracing shutdown: {e:?}");
        }
    }
}

fn build_logger_provider(collector_url: &str, base_resource: Resource) -> Result<SdkLoggerProvider> {
    let exporter = opentelemetry_otlp::LogExporter::builder()
        .with_tonic()
        .with_protocol(Protocol::Grpc)
        .with_endpoint(Endpoint::Logs.to_url(collector_url))
        .with_timeout(Duration::from_secs(5))
        .build()?;

    Ok(SdkLoggerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(base_resource)
        .build())
}

fn build_tracer_provider(collector_url: &str, base_resource: Resource) -> Result<SdkTracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_protocol(Protocol::Grpc)
        .with_endpoint(Endpoint::Traces.to_url(collector_url))
        .with_timeout(Duration::from_secs(5))
        .build()?;

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(base_resource)
        .build())
}

fn build_meter_provider(collector_url: &str, base_resource: Resource) -> Result<SdkMeterProvider> {
    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_protocol(Protocol::Grpc)
        .with_endpoint(Endpoint::Metrics.to_url(collector_url))
        .with_timeout(Duration::from_secs(5))
        .build()?;

    Ok(SdkMeterProvider::builder()
        .with_periodic_exporter(exporter)
        .with_resource(base_resource)
        .build())
}

fn base_attrs(name: &'static str, version: &'static str) -> Resource {
    Resource::builder()
        .with_attributes([
            KeyValue::new("service.name", name),
            KeyValue::new("service.version", version),
        ])
        .build()
}

enum Endpoint {
    Logs,
    Traces,
    Metrics,
}

impl Endpoint {
    pub fn to_url(&self, collector_endpoint: &str) -> String {
        let location: &str = match self {
            Endpoint::Logs => "/v1/logs",
            Endpoint::Traces => "/v1/traces",
            Endpoint::Metrics => "/v1/metrics",
        };

        format!("{}{location}", collector_endpoint.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_subscriber_without_collector() {
        let telemetry = Telemetry {
            tracer_name: "floorboard-test",
            base_resource: base_attrs("floorboard-test", "0.0.0"),
            collector_url: None,
            providers: None,
        };

        tracing::subscriber::with_default(telemetry.subscriber(), || {
            tracing::info!(leaderboard_id = 1, "local subscriber only");
        });
    }

    #[test]
    fn test_endpoint_urls() {
        assert_eq!(
            Endpoint::Traces.to_url("http://collector:4317/"),
            "http://collector:4317/v1/traces"
        );
        assert_eq!(
            Endpoint::Metrics.to_url("http://collector:4317"),
            "http://collector:4317/v1/metrics"
        );
    }
}
