//! Process runtime gauges
//!
//! Gauges backed by zero-argument sampling functions, evaluated when the
//! registry is gathered (i.e. on the exporter's schedule, not on request
//! threads).

use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{Gauge, Opts, Registry};

/// A gauge whose value is sampled at collection time
pub struct SampledGauge {
    gauge: Gauge,
    sample: Box<dyn Fn() -> f64 + Send + Sync>,
}

impl SampledGauge {
    pub fn new(
        name: &str,
        help: &str,
        sample: impl Fn() -> f64 + Send + Sync + 'static,
    ) -> Result<Self, prometheus::Error> {
        Ok(Self {
            gauge: Gauge::with_opts(Opts::new(name, help))?,
            sample: Box::new(sample),
        })
    }
}

impl Collector for SampledGauge {
    fn desc(&self) -> Vec<&Desc> {
        self.gauge.desc()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.gauge.set((self.sample)());
        self.gauge.collect()
    }
}

/// Register the standard process gauges on `registry`
pub fn register_runtime_gauges(registry: &Registry) -> Result<(), prometheus::Error> {
    registry.register(Box::new(SampledGauge::new(
        "process_threads",
        "Number of OS threads in the process",
        thread_count,
    )?))?;
    registry.register(Box::new(SampledGauge::new(
        "process_resident_memory_bytes",
        "Resident set size in bytes",
        resident_memory_bytes,
    )?))?;
    Ok(())
}

fn thread_count() -> f64 {
    proc_status_value("Threads:").unwrap_or(0.0)
}

fn resident_memory_bytes() -> f64 {
    proc_status_value("VmRSS:").map(|kb| kb * 1024.0).unwrap_or(0.0)
}

#[cfg(target_os = "linux")]
fn proc_status_value(key: &str) -> Option<f64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    status
        .lines()
        .find(|line| line.starts_with(key))?
        .split_whitespace()
        .nth(1)?
        .parse()
        .ok()
}

#[cfg(not(target_os = "linux"))]
fn proc_status_value(_key: &str) -> Option<f64> {
    None
}
