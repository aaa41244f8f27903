//! The process-wide telemetry slot.
//!
//! Empty (no-op) until [`install`] succeeds, the full pipeline afterwards.
//! Written at most once; reads are lock-free. Prefer passing the [`Telemetry`]
//! returned by [`install`] to the code that needs it; [`telemetry`] is for
//! places injection cannot reach.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use opentelemetry::global;

use crate::error::TelemetryError;
use crate::pipeline::{Telemetry, TelemetryPipeline};

static GLOBAL: TelemetrySlot = TelemetrySlot::new();

/// A write-once holder for a [`TelemetryPipeline`].
#[derive(Debug)]
pub struct TelemetrySlot {
    inner: ArcSwapOption<TelemetryPipeline>,
}

impl TelemetrySlot {
    pub const fn new() -> Self {
        Self {
            inner: ArcSwapOption::const_empty(),
        }
    }

    /// Store `pipeline` if the slot is still empty.
    ///
    /// # Errors
    ///
    /// [`TelemetryError::AlreadyInstalled`] if another pipeline got there
    /// first. The stored pipeline is left untouched and `pipeline` is dropped.
    pub fn publish(&self, pipeline: TelemetryPipeline) -> Result<Telemetry, TelemetryError> {
        let pipeline = Arc::new(pipeline);
        let previous = self
            .inner
            .compare_and_swap(&None::<Arc<TelemetryPipeline>>, Some(Arc::clone(&pipeline)));
        if previous.is_some() {
            return Err(TelemetryError::AlreadyInstalled);
        }
        Ok(Telemetry::from_pipeline(pipeline))
    }

    /// The published pipeline, or a no-op handle.
    pub fn current(&self) -> Telemetry {
        self.inner
            .load_full()
            .map(Telemetry::from_pipeline)
            .unwrap_or_default()
    }
}

impl Default for TelemetrySlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Publish `pipeline` process-wide and make it the OpenTelemetry global
/// tracer provider, meter provider, and propagator.
///
/// # Errors
///
/// [`TelemetryError::AlreadyInstalled`] on every call after the first
/// successful one. The OpenTelemetry globals are only touched on success.
pub fn install(pipeline: TelemetryPipeline) -> Result<Telemetry, TelemetryError> {
    let telemetry = GLOBAL.publish(pipeline)?;
    if let Some(pipeline) = telemetry.pipeline() {
        set_otel_globals(pipeline);
        tracing::info!(
            service.instance.id = %pipeline.identity().instance_id,
            "telemetry pipeline installed"
        );
    }
    Ok(telemetry)
}

fn set_otel_globals(pipeline: &TelemetryPipeline) {
    global::set_tracer_provider(pipeline.tracer_provider().clone());
    global::set_meter_provider(pipeline.meter_provider().clone());
    global::set_text_map_propagator(pipeline.propagator().clone());
}

/// The process-wide handle; no-op until [`install`] has succeeded.
pub fn telemetry() -> Telemetry {
    GLOBAL.current()
}
