//! Prometheus metrics helpers.
//!
//! Lock-free counters and gauges that render themselves in the Prometheus
//! text exposition format. Exporting them is left to the host process.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

/// A metric that can render itself as Prometheus text.
pub trait Metric: Send + Sync {
    /// Metric name.
    fn name(&self) -> &str;

    /// Format as Prometheus text.
    fn to_prometheus(&self) -> String;
}

/// Render several metrics into one exposition document.
#[must_use]
pub fn render(metrics: &[&dyn Metric]) -> String {
    metrics.iter().fold(String::new(), |mut out, metric| {
        out.push_str(&metric.to_prometheus());
        out
    })
}

fn exposition(name: &str, help: &str, kind: &str, value: u64) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} {kind}");
    let _ = writeln!(out, "{name} {value}");
    out
}

/// A monotonically increasing counter.
#[derive(Debug)]
pub struct Counter {
    name: String,
    help: String,
    value: AtomicU64,
}

impl Counter {
    /// Create a new counter.
    #[must_use]
    pub fn new(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            value: AtomicU64::new(0),
        }
    }

    /// Increment the counter by 1.
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the counter by a specific amount.
    pub fn inc_by(&self, amount: u64) {
        self.value.fetch_add(amount, Ordering::Relaxed);
    }

    /// Get the current value.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Metric for Counter {
    fn name(&self) -> &str {
        &self.name
    }

    fn to_prometheus(&self) -> String {
        exposition(&self.name, &self.help, "counter", self.get())
    }
}

/// A value that can go up and down.
#[derive(Debug)]
pub struct Gauge {
    name: String,
    help: String,
    value: AtomicU64,
}

impl Gauge {
    /// Create a new gauge.
    #[must_use]
    pub fn new(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            value: AtomicU64::new(0),
        }
    }

    /// Set the gauge value.
    pub fn set(&self, value: u64) {
        self.value.store(value, Ordering::Relaxed);
    }

    /// Get the current value.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Metric for Gauge {
    fn name(&self) -> &str {
        &self.name
    }

    fn to_prometheus(&self) -> String {
        exposition(&self.name, &self.help, "gauge", self.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let counter = Counter::new("rotations_total", "Rotations started");
        assert_eq!(counter.get(), 0);

        counter.inc();
        counter.inc_by(5);
        assert_eq!(counter.get(), 6);
    }

    #[test]
    fn test_gauge() {
        let gauge = Gauge::new("session_ttl_seconds", "Seconds until expiry");
        gauge.set(10);
        assert_eq!(gauge.get(), 10);
        gauge.set(3);
        assert_eq!(gauge.get(), 3);
    }

    #[test]
    fn test_prometheus_format() {
        let counter = Counter::new("requests_total", "Total requests");
        counter.inc_by(42);

        let output = counter.to_prometheus();
        assert!(output.contains("# HELP requests_total Total requests"));
        assert!(output.contains("# TYPE requests_total counter"));
        assert!(output.contains("requests_total 42"));
    }

    #[test]
    fn test_render_concatenates() {
        let counter = Counter::new("a_total", "A");
        let gauge = Gauge::new("b", "B");
        gauge.set(7);

        let output = render(&[&counter, &gauge]);
        assert!(output.contains("a_total 0"));
        assert!(output.contains("# TYPE b gauge"));
        assert!(output.contains("b 7"));
    }
}
