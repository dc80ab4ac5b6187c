//! Process-wide telemetry client
//!
//! Owns the trace export pipeline, the metrics registry and the correlated
//! logger. Construct exactly one client per process, before accepting
//! traffic, and call [`TelemetryClient::shutdown`] exactly once at exit.

use crate::config::{TelemetryOptions, TelemetrySettings};
use crate::error::{Error, Result};
use crate::logging::{AttrValue, JsonLineSink, Level, Logger};
use crate::metrics::HttpMetrics;
use crate::propagation::composite_propagator;
use crate::runtime::register_runtime_gauges;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, Context, KeyValue};
use opentelemetry_otlp::{SpanExporter, WithExportConfig};
use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler, SdkTracer, SdkTracerProvider};
use opentelemetry_sdk::Resource;
use prometheus::Registry;
use std::sync::Arc;
use std::time::Duration;

/// Handle to the configured observability stack
pub struct TelemetryClient {
    provider: SdkTracerProvider,
    tracer: SdkTracer,
    registry: Arc<Registry>,
    logger: Logger,
    service_name: String,
}

impl TelemetryClient {
    /// Build the telemetry stack from parsed settings
    ///
    /// Installs the global tracer provider and text-map propagator as a side
    /// effect. Any pipeline construction failure is fatal.
    pub fn new(settings: TelemetrySettings) -> Result<Self> {
        global::set_text_map_propagator(composite_propagator(&settings.propagators));

        let mut attributes = vec![
            KeyValue::new("service.version", settings.service.version.clone()),
            KeyValue::new("deployment.environment", settings.service.environment.clone()),
        ];
        for (key, value) in &settings.resource {
            attributes.push(KeyValue::new(key.clone(), value.clone()));
        }
        let resource = Resource::builder()
            .with_service_name(settings.service.name.clone())
            .with_attributes(attributes)
            .build();

        // The blocking export client must be constructed outside the async
        // runtime.
        let endpoint = settings.exporter.endpoint.clone();
        let timeout = Duration::from_secs(settings.exporter.timeout_secs);
        let exporter = std::thread::spawn(move || {
            SpanExporter::builder()
                .with_http()
                .with_endpoint(&endpoint)
                .with_timeout(timeout)
                .build()
        })
        .join()
        .map_err(|_| Error::Trace("exporter construction panicked".to_string()))?
        .map_err(|e| Error::Trace(e.to_string()))?;

        let provider = SdkTracerProvider::builder()
            .with_resource(resource)
            .with_sampler(sampler_for(settings.exporter.sampling_rate))
            .with_id_generator(RandomIdGenerator::default())
            .with_batch_exporter(exporter)
            .build();

        global::set_tracer_provider(provider.clone());

        let tracer = provider.tracer(settings.service.name.clone());
        let logger = Logger::new(Arc::new(JsonLineSink::stdout(settings.logging.min_level())));

        Ok(Self {
            provider,
            tracer,
            registry: Arc::new(Registry::new()),
            logger,
            service_name: settings.service.name,
        })
    }

    /// Load settings from `options` and build the client
    pub fn from_options(options: &TelemetryOptions) -> Result<Self> {
        Self::new(TelemetrySettings::load(options)?)
    }

    /// Tracer scoped to the service name
    pub fn tracer(&self) -> &SdkTracer {
        &self.tracer
    }

    /// Shared metrics registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Correlated structured logger
    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Create the standard HTTP instruments on the client's registry
    pub fn http_metrics(&self) -> Result<HttpMetrics> {
        HttpMetrics::new(&self.registry).map_err(Error::from)
    }

    /// Register the process runtime gauges on the client's registry
    pub fn register_runtime_metrics(&self) -> Result<()> {
        register_runtime_gauges(&self.registry).map_err(Error::from)
    }

    /// Flush and release the trace export pipeline
    ///
    /// Call exactly once; a second call surfaces the underlying
    /// already-shutdown error.
    pub fn shutdown(&self) -> Result<()> {
        self.provider
            .shutdown()
            .map_err(|e| Error::Trace(e.to_string()))
    }

    /// Log an info message with trace correlation
    pub fn info_with_trace(&self, cx: &Context, msg: &str, attrs: &[(&str, AttrValue)]) {
        self.logger.info_with_trace(cx, msg, attrs);
    }

    /// Log an error and record it on the current span
    pub fn log_error(
        &self,
        cx: &Context,
        err: &dyn std::error::Error,
        msg: &str,
        attrs: &[(&str, AttrValue)],
    ) {
        self.logger.log_error(cx, err, msg, attrs);
    }

    /// Log an HTTP request completion
    pub fn log_http_request(
        &self,
        cx: &Context,
        method: &str,
        path: &str,
        status_code: u16,
        duration: Duration,
        attrs: &[(&str, AttrValue)],
    ) {
        self.logger
            .log_http_request(cx, method, path, status_code, duration, attrs);
    }

    /// Log a message and mirror the attributes onto the current span
    pub fn log_with_span_attributes(
        &self,
        cx: &Context,
        level: Level,
        msg: &str,
        attrs: &[(&str, AttrValue)],
    ) {
        self.logger.log_with_span_attributes(cx, level, msg, attrs);
    }
}

fn sampler_for(rate: f64) -> Sampler {
    if rate >= 1.0 {
        Sampler::AlwaysOn
    } else if rate <= 0.0 {
        Sampler::AlwaysOff
    } else {
        Sampler::TraceIdRatioBased(rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::{Span, Tracer};

    #[test]
    fn test_sampler_mapping() {
        assert!(matches!(sampler_for(1.0), Sampler::AlwaysOn));
        assert!(matches!(sampler_for(0.0), Sampler::AlwaysOff));
        assert!(matches!(sampler_for(0.5), Sampler::TraceIdRatioBased(_)));
    }

    #[test]
    fn test_client_from_default_settings() {
        let client = TelemetryClient::new(TelemetrySettings::default()).unwrap();
        assert_eq!(client.service_name(), "unknown-service");

        let span = client.tracer().start("test_span");
        assert!(!span.span_context().trace_id().to_string().is_empty());
    }

    #[test]
    fn test_duplicate_http_metrics_creation_fails() {
        let client = TelemetryClient::new(TelemetrySettings::default()).unwrap();
        client.http_metrics().unwrap();
        assert!(matches!(client.http_metrics(), Err(Error::Metrics(_))));
    }

    #[test]
    fn test_register_runtime_metrics() {
        let client = TelemetryClient::new(TelemetrySettings::default()).unwrap();
        client.register_runtime_metrics().unwrap();

        let names: Vec<String> = client
            .registry()
            .gather()
            .iter()
            .map(|m| m.name().to_string())
            .collect();
        assert!(names.contains(&"process_threads".to_string()));
    }

    #[test]
    fn test_shutdown_is_exactly_once() {
        let client = TelemetryClient::new(TelemetrySettings::default()).unwrap();
        client.shutdown().unwrap();
        assert!(client.shutdown().is_err());
    }
}
