//! In-memory span, log, and metric capture for unit tests.

use std::sync::{Arc, Mutex, Weak};

use opentelemetry::logs::{LogResult, Severity};
use opentelemetry::trace::TraceResult;
use opentelemetry::Context;
use opentelemetry_sdk::export::logs::LogData;
use opentelemetry_sdk::export::trace::SpanData;
use opentelemetry_sdk::logs::LogProcessor;
use opentelemetry_sdk::metrics::data::{ResourceMetrics, Temporality};
use opentelemetry_sdk::metrics::reader::{AggregationSelector, MetricReader, TemporalitySelector};
use opentelemetry_sdk::metrics::{Aggregation, InstrumentKind, ManualReader, Pipeline};
use opentelemetry_sdk::trace::{Span, SpanProcessor};

/// Records every ended span. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct CapturingSpanProcessor {
    spans: Arc<Mutex<Vec<SpanData>>>,
}

impl CapturingSpanProcessor {
    pub fn spans(&self) -> Vec<SpanData> {
        self.spans.lock().unwrap().clone()
    }
}

impl SpanProcessor for CapturingSpanProcessor {
    fn on_start(&self, _span: &mut Span, _cx: &Context) {}

    fn on_end(&self, span: SpanData) {
        self.spans.lock().unwrap().push(span);
    }

    fn force_flush(&self) -> TraceResult<()> {
        Ok(())
    }

    fn shutdown(&mut self) -> TraceResult<()> {
        Ok(())
    }
}

/// Records every emitted log record. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct CapturingLogProcessor {
    logs: Arc<Mutex<Vec<LogData>>>,
}

impl CapturingLogProcessor {
    pub fn logs(&self) -> Vec<LogData> {
        self.logs.lock().unwrap().clone()
    }
}

impl LogProcessor for CapturingLogProcessor {
    fn emit(&self, data: LogData) {
        self.logs.lock().unwrap().push(data);
    }

    fn force_flush(&self) -> LogResult<()> {
        Ok(())
    }

    fn shutdown(&self) -> LogResult<()> {
        Ok(())
    }

    fn event_enabled(&self, _level: Severity, _target: &str, _name: &str) -> bool {
        true
    }
}

/// A [`ManualReader`] that can be handed to a meter provider and still be
/// collected from afterwards.
#[derive(Debug, Clone)]
pub struct SharedReader(Arc<ManualReader>);

impl SharedReader {
    pub fn new(reader: ManualReader) -> Self {
        Self(Arc::new(reader))
    }
}

impl TemporalitySelector for SharedReader {
    fn temporality(&self, kind: InstrumentKind) -> Temporality {
        self.0.temporality(kind)
    }
}

impl AggregationSelector for SharedReader {
    fn aggregation(&self, kind: InstrumentKind) -> Aggregation {
        self.0.aggregation(kind)
    }
}

impl MetricReader for SharedReader {
    fn register_pipeline(&self, pipeline: Weak<Pipeline>) {
        self.0.register_pipeline(pipeline);
    }

    fn collect(&self, rm: &mut ResourceMetrics) -> opentelemetry::metrics::Result<()> {
        self.0.collect(rm)
    }

    fn force_flush(&self) -> opentelemetry::metrics::Result<()> {
        self.0.force_flush()
    }

    fn shutdown(&self) -> opentelemetry::metrics::Result<()> {
        self.0.shutdown()
    }
}
