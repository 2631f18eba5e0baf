//! In-process metrics registry exported in Prometheus text format at `/metrics`.

use axum::{
    http::{header, StatusCode},
    response::IntoResponse,
};
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct Counter {
    value: Arc<AtomicU64>,
}

impl Counter {
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, value: u64) {
        self.value.fetch_add(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Gauge {
    value: Arc<AtomicI64>,
}

impl Gauge {
    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    counters: DashMap<String, Counter>,
    gauges: DashMap<String, Gauge>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create_counter(&self, name: &str) -> Counter {
        self.counters.entry(name.to_string()).or_default().clone()
    }

    pub fn get_or_create_gauge(&self, name: &str) -> Gauge {
        self.gauges.entry(name.to_string()).or_default().clone()
    }

    pub fn export_metrics(&self) -> String {
        let mut counters: Vec<(String, u64)> = self
            .counters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().get()))
            .collect();
        counters.sort();

        let mut gauges: Vec<(String, i64)> = self
            .gauges
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().get()))
            .collect();
        gauges.sort();

        let mut output = String::new();
        for (name, value) in counters {
            output.push_str(&format!("# TYPE {} counter\n{} {}\n", name, name, value));
        }
        for (name, value) in gauges {
            output.push_str(&format!("# TYPE {} gauge\n{} {}\n", name, name, value));
        }
        output
    }
}

lazy_static::lazy_static! {
    pub static ref METRICS: MetricsRegistry = MetricsRegistry::new();
}

pub fn increment_counter(name: &str) {
    METRICS.get_or_create_counter(name).inc();
}

pub fn increment_counter_by(name: &str, value: u64) {
    METRICS.get_or_create_counter(name).inc_by(value);
}

pub fn set_gauge(name: &str, value: i64) {
    METRICS.get_or_create_gauge(name).set(value);
}

pub fn counter_value(name: &str) -> u64 {
    METRICS
        .counters
        .get(name)
        .map(|counter| counter.get())
        .unwrap_or(0)
}

pub async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        METRICS.export_metrics(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_lists_counters_and_gauges_sorted() {
        let registry = MetricsRegistry::new();
        registry.get_or_create_counter("b_total").inc_by(3);
        registry.get_or_create_counter("a_total").inc();
        registry.get_or_create_gauge("open_orders").set(7);

        let text = registry.export_metrics();
        let a = text.find("a_total 1").unwrap();
        let b = text.find("b_total 3").unwrap();
        assert!(a < b);
        assert!(text.contains("# TYPE open_orders gauge\nopen_orders 7"));
    }

    #[test]
    fn global_helpers_feed_the_shared_registry() {
        increment_counter_by("helper_units_total", 4);
        increment_counter("helper_units_total");
        assert_eq!(counter_value("helper_units_total"), 5);

        set_gauge("helper_gauge", 3);
        set_gauge("helper_gauge", 2);
        assert!(METRICS.export_metrics().contains("helper_gauge 2"));
    }
}
