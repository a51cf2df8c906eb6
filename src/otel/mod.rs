//! OpenTelemetry integration for user-service
//!
//! Tracing subscriber setup, optional OTLP export of spans and metrics, and
//! the application metric instruments.

use crate::config::{LoggingConfig, OtelConfig};
use opentelemetry::{
    global,
    metrics::{noop::NoopMeterProvider, Counter, Histogram, Meter, MeterProvider as _},
    trace::TracerProvider as _,
    KeyValue,
};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    metrics::{
        reader::{DefaultAggregationSelector, DefaultTemporalitySelector},
        PeriodicReader, SdkMeterProvider,
    },
    runtime,
    trace::{Config as TraceConfig, Sampler, Tracer, TracerProvider},
    Resource,
};
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// OpenTelemetry error types
#[derive(Debug, Error)]
pub enum OtelError {
    /// Failed to initialize tracer
    #[error("Failed to initialize tracer: {0}")]
    TracerInit(String),

    /// Failed to initialize meter
    #[error("Failed to initialize meter: {0}")]
    MeterInit(String),

    /// Failed to shutdown
    #[error("Failed to shutdown: {0}")]
    Shutdown(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Span and metric pipelines exporting to one OTLP endpoint
struct OtlpPipelines {
    tracer_provider: TracerProvider,
    meter_provider: SdkMeterProvider,
}

impl OtlpPipelines {
    fn install(endpoint: &str, service_name: &str) -> Result<Self, OtelError> {
        let resource = Resource::new([
            KeyValue::new("service.name", service_name.to_string()),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
        ]);

        let span_exporter = opentelemetry_otlp::new_exporter()
            .tonic()
            .with_endpoint(endpoint)
            .build_span_exporter()
            .map_err(|e| OtelError::TracerInit(e.to_string()))?;

        let tracer_provider = TracerProvider::builder()
            .with_batch_exporter(span_exporter, runtime::Tokio)
            .with_config(
                TraceConfig::default()
                    .with_sampler(Sampler::AlwaysOn)
                    .with_resource(resource.clone()),
            )
            .build();

        let metrics_exporter = opentelemetry_otlp::MetricsExporterBuilder::from(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint),
        )
        .build_metrics_exporter(
            Box::new(DefaultTemporalitySelector::new()),
            Box::new(DefaultAggregationSelector::new()),
        )
        .map_err(|e| OtelError::MeterInit(e.to_string()))?;

        let meter_provider = SdkMeterProvider::builder()
            .with_resource(resource)
            .with_reader(PeriodicReader::builder(metrics_exporter, runtime::Tokio).build())
            .build();

        global::set_tracer_provider(tracer_provider.clone());

        Ok(Self {
            tracer_provider,
            meter_provider,
        })
    }

    fn shutdown(self) -> Result<(), OtelError> {
        // Flush spans before the meter so a meter failure does not lose them
        let flushed = self
            .tracer_provider
            .force_flush()
            .into_iter()
            .find_map(Result::err)
            .map(|e| OtelError::Shutdown(format!("Tracer flush failed: {:?}", e)));

        self.meter_provider
            .shutdown()
            .map_err(|e| OtelError::Shutdown(format!("Meter shutdown failed: {:?}", e)))?;

        flushed.map_or(Ok(()), Err)
    }
}

/// OpenTelemetry provider for user-service
///
/// Without an enabled config, no exporter is started and the meter it hands
/// out is a no-op.
pub struct OtelProvider {
    service_name: String,
    pipelines: Option<OtlpPipelines>,
}

impl OtelProvider {
    /// Create a new OtelProvider with the given configuration
    ///
    /// Must be called inside a Tokio runtime when export is enabled.
    pub fn new(config: &OtelConfig) -> Result<Self, OtelError> {
        let pipelines = if config.enabled {
            let endpoint = config.endpoint.as_deref().ok_or_else(|| {
                OtelError::Config("OTLP endpoint is required when enabled".into())
            })?;
            Some(OtlpPipelines::install(endpoint, &config.service_name)?)
        } else {
            None
        };

        Ok(Self {
            service_name: config.service_name.clone(),
            pipelines,
        })
    }

    /// Tracer for the tracing bridge, when export is enabled
    pub fn tracer(&self) -> Option<Tracer> {
        self.pipelines
            .as_ref()
            .map(|p| p.tracer_provider.tracer(self.service_name.clone()))
    }

    /// Meter for creating the application instruments
    pub fn meter(&self) -> Meter {
        match &self.pipelines {
            Some(p) => p.meter_provider.meter(self.service_name.clone()),
            None => NoopMeterProvider::new().meter(self.service_name.clone()),
        }
    }

    /// Check if OpenTelemetry export is enabled
    pub fn is_enabled(&self) -> bool {
        self.pipelines.is_some()
    }

    /// Flush and stop the exporters; later calls are no-ops
    pub fn shutdown(&mut self) -> Result<(), OtelError> {
        match self.pipelines.take() {
            Some(pipelines) => pipelines.shutdown(),
            None => Ok(()),
        }
    }
}

impl Drop for OtelProvider {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

/// Application metrics for user-service
pub struct Metrics {
    /// Total number of requests received
    pub requests_total: Counter<u64>,

    /// Request processing duration in seconds
    pub request_duration: Histogram<f64>,

    /// Successful registrations
    pub registrations_total: Counter<u64>,

    /// Login attempts by outcome
    pub logins_total: Counter<u64>,

    /// Audit events that could not be stored
    pub audit_failures_total: Counter<u64>,

    /// Requests rejected by the rate limiter
    pub rate_limited_total: Counter<u64>,
}

impl Metrics {
    /// Create new metrics with the given meter
    pub fn new(meter: &Meter) -> Self {
        let requests_total = meter
            .u64_counter("user_service_requests_total")
            .with_description("Total number of requests received")
            .init();

        let request_duration = meter
            .f64_histogram("user_service_request_duration_seconds")
            .with_description("Request processing duration in seconds")
            .init();

        let registrations_total = meter
            .u64_counter("user_service_registrations_total")
            .with_description("Total number of successful registrations")
            .init();

        let logins_total = meter
            .u64_counter("user_service_logins_total")
            .with_description("Total number of login attempts by outcome")
            .init();

        let audit_failures_total = meter
            .u64_counter("user_service_audit_failures_total")
            .with_description("Audit events dropped after retries")
            .init();

        let rate_limited_total = meter
            .u64_counter("user_service_rate_limited_total")
            .with_description("Requests rejected by the rate limiter")
            .init();

        Self {
            requests_total,
            request_duration,
            registrations_total,
            logins_total,
            audit_failures_total,
            rate_limited_total,
        }
    }

    /// Metrics backed by a no-op meter
    pub fn noop() -> Self {
        Self::new(&NoopMeterProvider::new().meter("user-service"))
    }

    /// Record a request with the given attributes
    pub fn record_request(&self, method: &str, status: u16) {
        self.requests_total.add(
            1,
            &[
                KeyValue::new("method", method.to_string()),
                KeyValue::new("status", i64::from(status)),
            ],
        );
    }

    /// Record request duration
    pub fn record_request_duration(&self, method: &str, duration_secs: f64) {
        self.request_duration.record(
            duration_secs,
            &[KeyValue::new("method", method.to_string())],
        );
    }

    pub fn record_registration(&self) {
        self.registrations_total.add(1, &[]);
    }

    /// Record a login attempt ("success" or "failure")
    pub fn record_login(&self, outcome: &'static str) {
        self.logins_total
            .add(1, &[KeyValue::new("outcome", outcome)]);
    }

    pub fn record_audit_failure(&self, event_type: &str) {
        self.audit_failures_total
            .add(1, &[KeyValue::new("event_type", event_type.to_string())]);
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited_total.add(1, &[]);
    }
}

/// Initialize tracing subscriber with OpenTelemetry integration
///
/// `RUST_LOG` overrides the configured level when set.
pub fn init_tracing(otel: &OtelProvider, logging: &LoggingConfig) -> Result<(), OtelError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(normalize_level(&logging.level)))
        .map_err(|e| OtelError::Config(e.to_string()))?;

    let pretty = logging.format.eq_ignore_ascii_case("pretty");
    let json_layer = (!pretty).then(|| tracing_subscriber::fmt::layer().json());
    let pretty_layer = pretty.then(|| tracing_subscriber::fmt::layer().pretty());

    let otel_layer = otel
        .tracer()
        .map(|tracer| tracing_opentelemetry::layer().with_tracer(tracer));

    tracing_subscriber::registry()
        .with(filter)
        .with(otel_layer)
        .with(json_layer)
        .with(pretty_layer)
        .try_init()
        .map_err(|e| OtelError::TracerInit(e.to_string()))?;

    Ok(())
}

fn normalize_level(level: &str) -> &'static str {
    match level.to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" => "error",
        _ => "info",
    }
}
