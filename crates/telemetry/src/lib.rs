//! OTLP telemetry for the getting-started service.
//!
//! Traces, metrics, and logs are exported over OTLP/gRPC to a New Relic
//! collector, gzip-compressed and authenticated with an `api-key` header.
//!
//! # Startup sequence
//!
//! 1. [`config::PipelineConfig::from_resolver`]: read the license key and
//!    endpoint (environment first, then `-D` properties).
//! 2. [`pipeline::TelemetryPipeline::assemble`]: build all three pipelines.
//! 3. [`global::install`]: publish once, set the OpenTelemetry globals.
//! 4. [`subscriber::init`] and [`runtime::register`]: bridge `tracing` and
//!    start the runtime observers.
//! 5. [`http::trace_layer`] on the router.
//!
//! # Telemetry invariants
//!
//! - The license key never appears in `Debug` output or log fields.
//! - String attribute values longer than 4095 characters are truncated before
//!   export.
//! - The pipeline is published at most once per process.

pub mod config;
pub mod env;
pub mod error;
pub mod global;
pub mod http;
pub mod limits;
pub mod metrics;
pub mod pipeline;
pub mod resource;
pub mod runtime;
pub mod subscriber;

#[cfg(test)]
mod testing;

pub use config::PipelineConfig;
pub use error::TelemetryError;
pub use pipeline::{Telemetry, TelemetryPipeline};
