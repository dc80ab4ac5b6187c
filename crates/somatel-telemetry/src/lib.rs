//! Somatel Telemetry
//!
//! This crate wraps the observability stack behind a simplified API:
//! - Declarative YAML configuration with placeholder expansion
//! - Distributed tracing (OpenTelemetry, OTLP export)
//! - Metrics collection (Prometheus) with a fixed HTTP label schema
//! - Trace-correlated structured JSON logging
//! - Health endpoints

pub mod client;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod propagation;
pub mod runtime;

pub use client::TelemetryClient;
pub use config::{TelemetryOptions, TelemetrySettings};
pub use error::{Error, Result};
pub use health::health_router;
pub use logging::{AttrValue, Level, LogSink, Logger, Record};
pub use metrics::HttpMetrics;
pub use propagation::{extract_context, inject_context};
