//! Pipeline assembly: three OTLP exporters, their processors, and the shared
//! resource, bundled into one immutable value.
//!
//! # Assembly order
//!
//! 1. Generate the [`ServiceIdentity`] and build the resource.
//! 2. Build all three exporters. Any failure here aborts before a single
//!    background worker has been spawned.
//! 3. Wrap each exporter in its batching processor / periodic reader and build
//!    the tracer, meter, and logger providers.
//!
//! Exporter channels connect lazily, so assembly performs no network I/O, but
//! it must run inside a Tokio runtime: the batch workers are spawned there.

use std::fmt;
use std::sync::Arc;

use opentelemetry::metrics::noop::NoopMeterProvider;
use opentelemetry::metrics::{Meter, MeterProvider as _};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::{
    LogExporterBuilder, MetricsExporter, MetricsExporterBuilder, SpanExporterBuilder, TonicExporterBuilder,
    WithExportConfig,
};
use opentelemetry_sdk::logs::{BatchLogProcessor, LoggerProvider};
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{BatchSpanProcessor, Tracer, TracerProvider};
use opentelemetry_sdk::{logs, runtime, trace, Resource};
use tonic::metadata::{MetadataKey, MetadataMap, MetadataValue};
use tonic::transport::ClientTlsConfig;

use crate::config::{ExporterConfig, PipelineConfig, Signal};
use crate::error::TelemetryError;
use crate::limits::{AttributeLimitLogProcessor, AttributeLimitSpanProcessor};
use crate::metrics::ExportPolicy;
use crate::resource::ServiceIdentity;

/// Fully wired trace, metric, and log pipelines sharing one resource.
#[derive(Clone)]
pub struct TelemetryPipeline {
    identity: ServiceIdentity,
    resource: Resource,
    exporters: [ExporterConfig; 3],
    tracer_provider: TracerProvider,
    meter_provider: SdkMeterProvider,
    logger_provider: LoggerProvider,
    propagator: TraceContextPropagator,
}

impl TelemetryPipeline {
    /// Assemble all three pipelines from `config`.
    ///
    /// # Errors
    ///
    /// Returns the first exporter construction failure. Nothing is left
    /// running when this returns `Err`.
    pub fn assemble(config: &PipelineConfig) -> Result<Self, TelemetryError> {
        let identity = ServiceIdentity::new(config.service_name());
        let resource = identity.to_resource();
        let exporters = Signal::ALL.map(|signal| config.exporter(signal));
        let [trace_cfg, metric_cfg, log_cfg] = &exporters;

        // --- Exporters ---
        let span_exporter = SpanExporterBuilder::from(exporter_builder(trace_cfg)?)
            .build_span_exporter()
            .map_err(TelemetryError::TraceExporter)?;
        let metric_exporter = metrics_exporter(metric_cfg)?;
        let log_exporter = LogExporterBuilder::from(exporter_builder(log_cfg)?)
            .build_log_exporter()
            .map_err(TelemetryError::LogExporter)?;

        let max_len = config.max_attribute_value_length();

        // --- Traces ---
        let span_processor = AttributeLimitSpanProcessor::new(
            BatchSpanProcessor::builder(span_exporter, runtime::Tokio).build(),
            max_len,
        );
        let tracer_provider = TracerProvider::builder()
            .with_config(trace::Config::default().with_resource(resource.clone()))
            .with_span_processor(span_processor)
            .build();

        // --- Metrics ---
        let reader = PeriodicReader::builder(metric_exporter, runtime::Tokio).build();
        let meter_provider = SdkMeterProvider::builder()
            .with_resource(resource.clone())
            .with_reader(reader)
            .build();

        // --- Logs ---
        let log_processor = AttributeLimitLogProcessor::new(
            BatchLogProcessor::builder(log_exporter, runtime::Tokio).build(),
            max_len,
        );
        let logger_provider = LoggerProvider::builder()
            .with_config(logs::Config::default().with_resource(resource.clone()))
            .with_log_processor(log_processor)
            .build();

        tracing::debug!(
            service.name = %identity.service_name,
            service.instance.id = %identity.instance_id,
            endpoint = %config.endpoint(),
            "telemetry pipeline assembled"
        );

        Ok(Self {
            identity,
            resource,
            exporters,
            tracer_provider,
            meter_provider,
            logger_provider,
            propagator: TraceContextPropagator::new(),
        })
    }

    pub fn identity(&self) -> &ServiceIdentity {
        &self.identity
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    /// The exporter settings the `signal` pipeline was built with.
    pub fn exporter_config(&self, signal: Signal) -> &ExporterConfig {
        match signal {
            Signal::Traces => &self.exporters[0],
            Signal::Metrics => &self.exporters[1],
            Signal::Logs => &self.exporters[2],
        }
    }

    pub fn tracer_provider(&self) -> &TracerProvider {
        &self.tracer_provider
    }

    pub fn meter_provider(&self) -> &SdkMeterProvider {
        &self.meter_provider
    }

    pub fn logger_provider(&self) -> &LoggerProvider {
        &self.logger_provider
    }

    pub fn propagator(&self) -> &TraceContextPropagator {
        &self.propagator
    }

    /// A tracer from this pipeline's provider.
    pub fn tracer(&self, name: &'static str) -> Tracer {
        self.tracer_provider.tracer(name)
    }

    /// Flush pending spans and log records, then stop the metric reader.
    ///
    /// Blocks until the exporters return; call it from a blocking thread.
    /// Failures are logged, not returned: by now there is nowhere to send them.
    pub fn shutdown(&self) {
        for result in self.tracer_provider.force_flush() {
            if let Err(e) = result {
                tracing::warn!(error = %e, "failed to flush spans");
            }
        }
        for result in self.logger_provider.force_flush() {
            if let Err(e) = result {
                tracing::warn!(error = %e, "failed to flush log records");
            }
        }
        if let Err(e) = self.meter_provider.shutdown() {
            tracing::warn!(error = %e, "failed to shut down meter provider");
        }
    }
}

impl fmt::Debug for TelemetryPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryPipeline")
            .field("identity", &self.identity)
            .field("exporters", &self.exporters)
            .finish_non_exhaustive()
    }
}

/// gRPC exporter builder with endpoint, gzip, auth metadata, and TLS applied.
/// The OTLP metric exporter. Its selectors decide temporality and aggregation
/// for every reader built on top of it.
fn metrics_exporter(cfg: &ExporterConfig) -> Result<MetricsExporter, TelemetryError> {
    MetricsExporterBuilder::from(exporter_builder(cfg)?)
        .build_metrics_exporter(
            Box::new(ExportPolicy::default()),
            Box::new(ExportPolicy::default()),
        )
        .map_err(TelemetryError::MetricExporter)
}

fn exporter_builder(cfg: &ExporterConfig) -> Result<TonicExporterBuilder, TelemetryError> {
    let (name, secret) = (cfg.auth_header.0, &cfg.auth_header.1);
    let value = MetadataValue::try_from(secret.expose())
        .map_err(|_| TelemetryError::InvalidHeader { header: name })?;
    let mut metadata = MetadataMap::new();
    metadata.insert(MetadataKey::from_static(name), value);

    let mut builder = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(cfg.endpoint.clone())
        .with_timeout(cfg.timeout)
        .with_compression(cfg.compression.into())
        .with_metadata(metadata);
    if cfg.uses_tls() {
        builder = builder.with_tls_config(ClientTlsConfig::new());
    }
    Ok(builder)
}

/// What request handlers and background tasks hold: either a live pipeline or
/// nothing at all.
///
/// Cloning is cheap. The no-op variant hands out instruments that discard
/// every measurement.
#[derive(Debug, Clone, Default)]
pub struct Telemetry {
    pipeline: Option<Arc<TelemetryPipeline>>,
}

impl Telemetry {
    /// A handle that records nothing.
    pub fn noop() -> Self {
        Self::default()
    }

    pub(crate) fn from_pipeline(pipeline: Arc<TelemetryPipeline>) -> Self {
        Self {
            pipeline: Some(pipeline),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.pipeline.is_none()
    }

    pub fn pipeline(&self) -> Option<&TelemetryPipeline> {
        self.pipeline.as_deref()
    }

    /// A meter from the pipeline, or a no-op meter.
    pub fn meter(&self, name: &'static str) -> Meter {
        match &self.pipeline {
            Some(pipeline) => pipeline.meter_provider().meter(name),
            None => NoopMeterProvider::new().meter(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AUTH_HEADER, SERVICE_NAME};
    use opentelemetry::Key;
    use opentelemetry_semantic_conventions::resource::{
        SERVICE_INSTANCE_ID, SERVICE_NAME as SERVICE_NAME_KEY,
    };

    use opentelemetry_sdk::metrics::data::Temporality;
    use opentelemetry_sdk::metrics::reader::{AggregationSelector, TemporalitySelector};
    use opentelemetry_sdk::metrics::{Aggregation, InstrumentKind};

    const LOCAL_COLLECTOR: &str = "http://127.0.0.1:4317";

    fn local_config() -> PipelineConfig {
        PipelineConfig::new(SERVICE_NAME, LOCAL_COLLECTOR, "abc123").unwrap()
    }

    async fn shutdown(pipeline: TelemetryPipeline) {
        tokio::task::spawn_blocking(move || pipeline.shutdown())
            .await
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn assembles_all_three_signals() {
        let pipeline = TelemetryPipeline::assemble(&local_config()).unwrap();

        for signal in Signal::ALL {
            let exporter = pipeline.exporter_config(signal);
            assert_eq!(exporter.signal, signal);
            assert_eq!(exporter.endpoint, LOCAL_COLLECTOR);
            assert_eq!(exporter.header(AUTH_HEADER), Some("abc123"));
        }
        assert_eq!(
            pipeline
                .resource()
                .get(Key::from_static_str(SERVICE_NAME_KEY))
                .map(|v| v.as_str().into_owned())
                .as_deref(),
            Some("getting-started-java")
        );
        shutdown(pipeline).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn each_assembly_gets_a_new_instance_id() {
        let a = TelemetryPipeline::assemble(&local_config()).unwrap();
        let b = TelemetryPipeline::assemble(&local_config()).unwrap();

        let id = |p: &TelemetryPipeline| {
            p.resource()
                .get(Key::from_static_str(SERVICE_INSTANCE_ID))
                .map(|v| v.as_str().into_owned())
        };
        assert_ne!(id(&a), id(&b));
        assert_eq!(a.identity().service_name, b.identity().service_name);

        shutdown(a).await;
        shutdown(b).await;
    }

    #[test]
    fn malformed_endpoint_fails_before_assembly() {
        let err = PipelineConfig::new(SERVICE_NAME, "otlp.nr-data.net:4317", "").unwrap_err();
        assert!(matches!(err, TelemetryError::InvalidEndpoint { .. }));
    }

    #[test]
    fn noop_handle_hands_out_working_meters() {
        let telemetry = Telemetry::noop();
        assert!(telemetry.is_noop());
        assert!(telemetry.pipeline().is_none());

        let counter = telemetry.meter("test").u64_counter("noop.counter").init();
        counter.add(1, &[]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn debug_output_hides_license_key() {
        let pipeline = TelemetryPipeline::assemble(&local_config()).unwrap();
        let rendered = format!("{pipeline:?}");
        assert!(!rendered.contains("abc123"));
        assert!(rendered.contains("TelemetryPipeline"));
        shutdown(pipeline).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn metric_exporter_carries_export_policy() {
        let exporter = metrics_exporter(&local_config().exporter(Signal::Metrics)).unwrap();

        assert_eq!(exporter.temporality(InstrumentKind::Counter), Temporality::Delta);
        assert_eq!(exporter.temporality(InstrumentKind::Histogram), Temporality::Delta);
        assert_eq!(
            exporter.temporality(InstrumentKind::UpDownCounter),
            Temporality::Cumulative
        );
        assert!(matches!(
            exporter.aggregation(InstrumentKind::Histogram),
            Aggregation::Base2ExponentialHistogram {
                max_size: 160,
                max_scale: 20,
                ..
            }
        ));
    }
}
