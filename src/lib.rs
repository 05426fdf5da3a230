//! Process exporter: Prometheus gauges for CPU, memory share and open files of root processes.
//!
//! Modular structure:
//! - [`collectors`] — On-demand process sampling, owner filter, gauge derivation
//! - [`exposition`] — Prometheus text encoding and the HTTP scrape endpoint
//! - [`config`] — JSON configuration with deployment defaults
//! - [`logging`] — Structured JSON logging

pub mod config;
pub mod collectors;
pub mod exposition;
pub mod logging;

pub use config::ExporterConfig;
pub use collectors::{GaugeObservation, MetricKind, ProcessMetricsCollector, SysinfoSource};
