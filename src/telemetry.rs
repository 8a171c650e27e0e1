//! Logging, tracing and metrics setup for the operator process
//!
//! Logs go to stdout as JSON (or plain text for local runs) with the current
//! reconcile span attached, so every line carries the instance being worked
//! on. When an OTLP endpoint is configured, spans and metrics are exported as
//! well, tagged with the pod the operator runs in.
//!
//! [`init_telemetry`] returns a [`TelemetryGuard`]; keep it alive for the life
//! of the process so buffered spans are flushed on shutdown.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::TracerProvider;
use opentelemetry_sdk::{runtime, Resource};
use opentelemetry_semantic_conventions::resource as semconv;
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Service name reported in logs, traces and metrics
pub const SERVICE_NAME: &str = "limitador-operator";

/// Filter used when neither an explicit filter nor `RUST_LOG` is set
pub const DEFAULT_LOG_FILTER: &str = "info,limitador_operator=debug,kube=info,tower=warn,hyper=warn";

/// Errors raised while wiring up telemetry
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The log filter directive did not parse
    #[error("invalid log filter '{filter}': {message}")]
    InvalidFilter {
        /// The rejected directive
        filter: String,
        /// Parser message
        message: String,
    },

    /// An OTLP exporter could not be built
    #[error("failed to build OTLP {signal} exporter: {message}")]
    Exporter {
        /// `traces` or `metrics`
        signal: &'static str,
        /// Underlying error
        message: String,
    },

    /// A global subscriber was already installed
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(String),
}

/// Shape of log lines on stdout
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Human-readable lines for local runs
    Text,
}

/// Where the operator itself is running, from the downward API
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PodIdentity {
    /// Operator pod name
    pub pod_name: Option<String>,
    /// Operator pod namespace
    pub namespace: Option<String>,
    /// Node the pod is scheduled on
    pub node_name: Option<String>,
}

impl PodIdentity {
    /// Read `POD_NAME`, `POD_NAMESPACE` and `NODE_NAME`
    pub fn from_env() -> Self {
        Self {
            pod_name: std::env::var("POD_NAME").ok(),
            namespace: std::env::var("POD_NAMESPACE").ok(),
            node_name: std::env::var("NODE_NAME").ok(),
        }
    }

    fn attributes(&self) -> impl Iterator<Item = KeyValue> + '_ {
        [
            ("k8s.pod.name", &self.pod_name),
            ("k8s.namespace.name", &self.namespace),
            ("k8s.node.name", &self.node_name),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.clone().map(|v| KeyValue::new(key, v)))
    }
}

/// Telemetry settings collected at startup
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Service name for traces and metrics
    pub service_name: String,
    /// Log line format
    pub log_format: LogFormat,
    /// Explicit filter directive; takes precedence over `RUST_LOG`
    pub log_filter: Option<String>,
    /// OTLP collector endpoint; logs only when unset
    pub otlp_endpoint: Option<String>,
    /// Resource attributes describing the operator pod
    pub identity: PodIdentity,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: SERVICE_NAME.to_string(),
            log_format: LogFormat::default(),
            log_filter: None,
            otlp_endpoint: None,
            identity: PodIdentity::default(),
        }
    }
}

/// Owns the export pipelines; flushes and stops them when dropped
#[must_use = "dropping the guard stops span and metric export"]
#[derive(Default)]
pub struct TelemetryGuard {
    tracer_provider: Option<TracerProvider>,
    meter_provider: Option<SdkMeterProvider>,
}

impl TelemetryGuard {
    /// True if spans and metrics leave the process
    pub fn exporting(&self) -> bool {
        self.tracer_provider.is_some()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.tracer_provider.take() {
            if let Err(e) = provider.shutdown() {
                tracing::warn!(error = ?e, "failed to flush spans");
            }
        }
        if let Some(provider) = self.meter_provider.take() {
            if let Err(e) = provider.shutdown() {
                tracing::warn!(error = ?e, "failed to flush metrics");
            }
        }
    }
}

/// Install the global subscriber and, if an endpoint is set, OTLP export
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let filter = log_filter(config.log_filter.as_deref())?;

    let mut guard = TelemetryGuard::default();
    let otel_layer = match &config.otlp_endpoint {
        Some(endpoint) => {
            global::set_text_map_propagator(TraceContextPropagator::new());
            let resource = build_resource(&config.service_name, &config.identity);

            let meter_provider = meter_provider(endpoint, resource.clone())?;
            global::set_meter_provider(meter_provider.clone());
            guard.meter_provider = Some(meter_provider);

            let tracer_provider = tracer_provider(endpoint, resource)?;
            global::set_tracer_provider(tracer_provider.clone());
            let tracer = tracer_provider.tracer(config.service_name.clone());
            guard.tracer_provider = Some(tracer_provider);

            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    let json_layer = (config.log_format == LogFormat::Json).then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
    });
    let text_layer =
        (config.log_format == LogFormat::Text).then(|| tracing_subscriber::fmt::layer());

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .with(otel_layer)
        .try_init()
        .map_err(|e| TelemetryError::Subscriber(e.to_string()))?;

    tracing::debug!(
        format = ?config.log_format,
        exporting = guard.exporting(),
        "telemetry initialized"
    );
    Ok(guard)
}

/// Pick the filter: explicit directive, then `RUST_LOG`, then the default
fn log_filter(explicit: Option<&str>) -> Result<EnvFilter, TelemetryError> {
    match explicit {
        Some(directive) => {
            EnvFilter::try_new(directive).map_err(|e| TelemetryError::InvalidFilter {
                filter: directive.to_string(),
                message: e.to_string(),
            })
        }
        None => Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))),
    }
}

fn build_resource(service_name: &str, identity: &PodIdentity) -> Resource {
    let attributes = [
        KeyValue::new(semconv::SERVICE_NAME, service_name.to_string()),
        KeyValue::new(semconv::SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
    ]
    .into_iter()
    .chain(identity.attributes());
    Resource::new(attributes)
}

fn tracer_provider(endpoint: &str, resource: Resource) -> Result<TracerProvider, TelemetryError> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| TelemetryError::Exporter {
            signal: "traces",
            message: e.to_string(),
        })?;

    Ok(TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_resource(resource)
        .build())
}

fn meter_provider(endpoint: &str, resource: Resource) -> Result<SdkMeterProvider, TelemetryError> {
    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| TelemetryError::Exporter {
            signal: "metrics",
            message: e.to_string(),
        })?;

    Ok(SdkMeterProvider::builder()
        .with_reader(PeriodicReader::builder(exporter, runtime::Tokio).build())
        .with_resource(resource)
        .build())
}
