//! Somatel demo service
//!
//! An instrumented sum service: validates two numeric query parameters,
//! forwards the calculation to a downstream service with trace context
//! propagated over HTTP headers, and records metrics and correlated logs
//! around the call.

pub mod app;
