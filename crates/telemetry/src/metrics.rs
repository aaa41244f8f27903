//! Temporality and aggregation choices for the metric exporter.

use opentelemetry_sdk::metrics::data::Temporality;
use opentelemetry_sdk::metrics::reader::{
    AggregationSelector, DefaultAggregationSelector, TemporalitySelector,
};
use opentelemetry_sdk::metrics::{Aggregation, InstrumentKind};

/// Delta for everything except up-down counters, which stay cumulative.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeltaPreferred;

impl TemporalitySelector for DeltaPreferred {
    fn temporality(&self, kind: InstrumentKind) -> Temporality {
        match kind {
            InstrumentKind::UpDownCounter | InstrumentKind::ObservableUpDownCounter => {
                Temporality::Cumulative
            }
            _ => Temporality::Delta,
        }
    }
}

/// Base-2 exponential buckets for histograms, SDK defaults for the rest.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExponentialHistograms;

impl ExponentialHistograms {
    pub const MAX_SIZE: u32 = 160;
    pub const MAX_SCALE: i8 = 20;
}

impl AggregationSelector for ExponentialHistograms {
    fn aggregation(&self, kind: InstrumentKind) -> Aggregation {
        match kind {
            InstrumentKind::Histogram => Aggregation::Base2ExponentialHistogram {
                max_size: Self::MAX_SIZE,
                max_scale: Self::MAX_SCALE,
                record_min_max: true,
            },
            other => DefaultAggregationSelector::new().aggregation(other),
        }
    }
}

/// Both selectors behind one value, handed to the exporter for each role.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExportPolicy {
    temporality: DeltaPreferred,
    aggregation: ExponentialHistograms,
}

impl TemporalitySelector for ExportPolicy {
    fn temporality(&self, kind: InstrumentKind) -> Temporality {
        self.temporality.temporality(kind)
    }
}

impl AggregationSelector for ExportPolicy {
    fn aggregation(&self, kind: InstrumentKind) -> Aggregation {
        self.aggregation.aggregation(kind)
    }
}
