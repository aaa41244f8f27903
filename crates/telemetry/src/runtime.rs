//! Runtime observers: process, host, and Tokio scheduler gauges sampled on
//! every metric collection.
//!
//! Each observer samples independently. A sample that errors or panics is
//! logged at `warn`, counted in `telemetry.runtime.sampling_failures`, and
//! skipped; the other observers and the collection cycle carry on.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use opentelemetry::metrics::{Meter, ObservableCounter, ObservableGauge, Unit};
use sysinfo::{Pid, Process, System};
use thiserror::Error;
use tokio::runtime::Handle;

use crate::pipeline::Telemetry;

const METER_NAME: &str = "runtime-observers";

/// Name of the counter tracking failed samples.
pub const SAMPLING_FAILURES: &str = "telemetry.runtime.sampling_failures";

/// Why a single sample could not be taken.
#[derive(Debug, Error)]
pub enum SampleError {
    #[error("current process id unavailable: {0}")]
    Pid(&'static str),

    #[error("process {0} not found")]
    ProcessNotFound(Pid),

    #[error("{0} is not reported on this platform")]
    Unsupported(&'static str),
}

/// Handles for every registered runtime instrument.
///
/// Callbacks stay registered for the life of the meter provider; holding
/// this value keeps the instrument handles and the failure tally reachable.
pub struct RuntimeObservers {
    names: Vec<&'static str>,
    failures: Arc<AtomicU64>,
    f64_gauges: Vec<ObservableGauge<f64>>,
    u64_gauges: Vec<ObservableGauge<u64>>,
    _failure_counter: ObservableCounter<u64>,
}

impl RuntimeObservers {
    /// Names of the registered instruments, in registration order.
    pub fn names(&self) -> &[&'static str] {
        &self.names
    }

    /// Samples that have failed since registration.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for RuntimeObservers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeObservers")
            .field("names", &self.names)
            .field("failures", &self.failures())
            .field("gauges", &(self.f64_gauges.len() + self.u64_gauges.len()))
            .finish_non_exhaustive()
    }
}

/// Register every observer group against `telemetry`'s meter provider.
///
/// Never fails. Groups that cannot be sampled here (no current process id,
/// no Tokio runtime, no per-thread accounting) are skipped with a log line.
pub fn register(telemetry: &Telemetry) -> RuntimeObservers {
    let meter = telemetry.meter(METER_NAME);
    let mut registrar = Registrar::new(&meter);

    // --- Process ---
    match ProcessSampler::new() {
        Ok(process) => {
            let process = Arc::new(process);

            let p = Arc::clone(&process);
            registrar.gauge_f64(
                "process.cpu.utilization",
                "CPU time used by this process as a share of available cores",
                "1",
                move || p.cpu_utilization(),
            );
            let p = Arc::clone(&process);
            registrar.gauge_u64(
                "process.memory.usage",
                "Resident memory of this process",
                "By",
                move || p.memory_usage(),
            );
            let p = Arc::clone(&process);
            registrar.gauge_u64(
                "process.memory.virtual",
                "Virtual memory committed by this process",
                "By",
                move || p.virtual_memory(),
            );
            if process.thread_count().is_ok() {
                let p = Arc::clone(&process);
                registrar.gauge_u64(
                    "process.thread.count",
                    "Threads in this process",
                    "{thread}",
                    move || p.thread_count(),
                );
            } else {
                tracing::debug!("thread count unavailable; process.thread.count not registered");
            }
        }
        Err(e) => tracing::warn!(error = %e, "process observers not registered"),
    }

    // --- Host ---
    let host = Arc::new(HostSampler::new());
    let h = Arc::clone(&host);
    registrar.gauge_f64(
        "system.cpu.utilization",
        "CPU utilisation across all cores of the host",
        "1",
        move || Ok(h.cpu_utilization()),
    );
    registrar.gauge_f64(
        "system.cpu.load_average.1m",
        "One-minute load average of the host",
        "{run_queue_item}",
        || Ok(System::load_average().one),
    );

    // --- Tokio scheduler ---
    match Handle::try_current() {
        Ok(handle) => {
            let h = handle.clone();
            registrar.gauge_u64(
                "tokio.runtime.workers",
                "Worker threads in the Tokio runtime",
                "{thread}",
                move || Ok(h.metrics().num_workers() as u64),
            );
            let h = handle.clone();
            registrar.gauge_u64(
                "tokio.runtime.alive_tasks",
                "Tasks spawned on the Tokio runtime that have not completed",
                "{task}",
                move || Ok(h.metrics().num_alive_tasks() as u64),
            );
            registrar.gauge_u64(
                "tokio.runtime.global_queue_depth",
                "Tasks waiting in the Tokio runtime's injection queue",
                "{task}",
                move || Ok(handle.metrics().global_queue_depth() as u64),
            );
        }
        Err(_) => tracing::debug!("no Tokio runtime; scheduler observers not registered"),
    }

    let observers = registrar.finish();
    tracing::info!(instruments = observers.names.len(), "runtime observers registered");
    observers
}

/// Collects instruments while sharing one failure tally.
struct Registrar<'a> {
    meter: &'a Meter,
    names: Vec<&'static str>,
    failures: Arc<AtomicU64>,
    f64_gauges: Vec<ObservableGauge<f64>>,
    u64_gauges: Vec<ObservableGauge<u64>>,
}

impl<'a> Registrar<'a> {
    fn new(meter: &'a Meter) -> Self {
        Self {
            meter,
            names: Vec::new(),
            failures: Arc::new(AtomicU64::new(0)),
            f64_gauges: Vec::new(),
            u64_gauges: Vec::new(),
        }
    }

    fn gauge_f64<F>(
        &mut self,
        name: &'static str,
        description: &'static str,
        unit: &'static str,
        sample: F,
    ) where
        F: Fn() -> Result<f64, SampleError> + Send + Sync + 'static,
    {
        let failures = Arc::clone(&self.failures);
        let gauge = self
            .meter
            .f64_observable_gauge(name)
            .with_description(description)
            .with_unit(Unit::new(unit))
            .with_callback(move |observer| {
                if let Some(value) = guarded(name, &failures, &sample) {
                    observer.observe(value, &[]);
                }
            })
            .init();
        self.names.push(name);
        self.f64_gauges.push(gauge);
    }

    fn gauge_u64<F>(
        &mut self,
        name: &'static str,
        description: &'static str,
        unit: &'static str,
        sample: F,
    ) where
        F: Fn() -> Result<u64, SampleError> + Send + Sync + 'static,
    {
        let failures = Arc::clone(&self.failures);
        let gauge = self
            .meter
            .u64_observable_gauge(name)
            .with_description(description)
            .with_unit(Unit::new(unit))
            .with_callback(move |observer| {
                if let Some(value) = guarded(name, &failures, &sample) {
                    observer.observe(value, &[]);
                }
            })
            .init();
        self.names.push(name);
        self.u64_gauges.push(gauge);
    }

    fn finish(mut self) -> RuntimeObservers {
        let failures = Arc::clone(&self.failures);
        let failure_counter = self
            .meter
            .u64_observable_counter(SAMPLING_FAILURES)
            .with_description("Runtime observer samples that failed or panicked")
            .with_unit(Unit::new("{failure}"))
            .with_callback(move |observer| observer.observe(failures.load(Ordering::Relaxed), &[]))
            .init();
        self.names.push(SAMPLING_FAILURES);

        RuntimeObservers {
            names: self.names,
            failures: self.failures,
            f64_gauges: self.f64_gauges,
            u64_gauges: self.u64_gauges,
            _failure_counter: failure_counter,
        }
    }
}

/// Run one sample. Errors and panics are logged, counted, and swallowed.
fn guarded<T, F>(name: &'static str, failures: &AtomicU64, sample: &F) -> Option<T>
where
    F: Fn() -> Result<T, SampleError>,
{
    match panic::catch_unwind(AssertUnwindSafe(sample)) {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(instrument = name, error = %e, "runtime sample failed");
            None
        }
        Err(_) => {
            failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(instrument = name, "runtime sample panicked");
            None
        }
    }
}

/// Per-process readings. `sysinfo` needs two refreshes for a CPU figure, so
/// the first utilisation sample is always zero.
struct ProcessSampler {
    system: Mutex<System>,
    pid: Pid,
    cores: f64,
}

impl ProcessSampler {
    fn new() -> Result<Self, SampleError> {
        let pid = sysinfo::get_current_pid().map_err(SampleError::Pid)?;
        let cores = std::thread::available_parallelism().map_or(1, |n| n.get()) as f64;
        Ok(Self {
            system: Mutex::new(System::new()),
            pid,
            cores,
        })
    }

    fn read<T>(&self, f: impl FnOnce(&Process) -> T) -> Result<T, SampleError> {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        if !system.refresh_process(self.pid) {
            return Err(SampleError::ProcessNotFound(self.pid));
        }
        system
            .process(self.pid)
            .map(f)
            .ok_or(SampleError::ProcessNotFound(self.pid))
    }

    fn cpu_utilization(&self) -> Result<f64, SampleError> {
        let cores = self.cores;
        self.read(|p| f64::from(p.cpu_usage()) / 100.0 / cores)
    }

    fn memory_usage(&self) -> Result<u64, SampleError> {
        self.read(Process::memory)
    }

    fn virtual_memory(&self) -> Result<u64, SampleError> {
        self.read(Process::virtual_memory)
    }

    fn thread_count(&self) -> Result<u64, SampleError> {
        self.read(|p| p.tasks().map(|tasks| tasks.len() as u64))?
            .ok_or(SampleError::Unsupported("per-process thread count"))
    }
}

/// Host-wide CPU readings.
struct HostSampler {
    system: Mutex<System>,
}

impl HostSampler {
    fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    fn cpu_utilization(&self) -> f64 {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_cpu();
        f64::from(system.global_cpu_info().cpu_usage()) / 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_sample_is_returned() {
        let failures = AtomicU64::new(0);
        let value = guarded("ok", &failures, &|| Ok(7_u64));
        assert_eq!(value, Some(7));
        assert_eq!(failures.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn failed_sample_is_counted_and_skipped() {
        let failures = AtomicU64::new(0);
        let value: Option<u64> = guarded("err", &failures, &|| {
            Err(SampleError::Unsupported("anything"))
        });
        assert_eq!(value, None);
        assert_eq!(failures.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn panicking_sample_does_not_escape() {
        let failures = AtomicU64::new(0);
        let value: Option<f64> = guarded("panic", &failures, &|| panic!("sampler blew up"));
        assert_eq!(value, None);

        // The next sample on the same tally still works.
        assert_eq!(guarded("ok", &failures, &|| Ok(1.5)), Some(1.5));
        assert_eq!(failures.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn process_memory_is_reported() {
        let sampler = ProcessSampler::new().unwrap();
        assert!(sampler.memory_usage().unwrap() > 0);
        assert!(sampler.virtual_memory().unwrap() > 0);
        let cpu = sampler.cpu_utilization().unwrap();
        assert!(cpu >= 0.0);
    }

    #[test]
    fn host_cpu_is_a_fraction() {
        let host = HostSampler::new();
        let value = host.cpu_utilization();
        assert!((0.0..=1.0).contains(&value), "got {value}");
    }

    #[test]
    fn registers_without_runtime() {
        let observers = register(&Telemetry::noop());
        assert!(observers.names().contains(&"process.memory.usage"));
        assert!(observers.names().contains(&"system.cpu.utilization"));
        assert!(!observers.names().contains(&"tokio.runtime.workers"));
        assert_eq!(observers.names().last(), Some(&SAMPLING_FAILURES));
        assert_eq!(observers.failures(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn registers_scheduler_observers_inside_runtime() {
        let observers = register(&Telemetry::noop());
        for name in [
            "process.cpu.utilization",
            "process.memory.virtual",
            "system.cpu.load_average.1m",
            "tokio.runtime.workers",
            "tokio.runtime.alive_tasks",
            "tokio.runtime.global_queue_depth",
        ] {
            assert!(observers.names().contains(&name), "{name} missing");
        }
    }
}
