//! Trace-correlated structured logging
//!
//! A log record flows through a chain of [`LogSink`]s. The terminal sink
//! ([`JsonLineSink`]) renders one JSON object per record; [`CorrelatedSink`]
//! decorates any other sink and injects `trace_id`/`span_id` (and
//! `trace_sampled` when the span is sampled) whenever the context carries a
//! recording span with valid identifiers. Derived sinks (`with_attrs`,
//! `with_group`) are re-wrapped so correlation keeps applying to descendants.

use crate::error::{Error, Result};
use opentelemetry::trace::{Status, TraceContextExt};
use opentelemetry::{Context, KeyValue};
use serde_json::{Map, Value as JsonValue};
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

/// Attribute values carried by log records
///
/// A closed set of variants; callers construct the variant explicitly (or via
/// the `From` impls) instead of relying on runtime type inspection.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Str(String),
    I64(i64),
    F64(f64),
    Bool(bool),
}

impl AttrValue {
    fn to_json(&self) -> JsonValue {
        match self {
            Self::Str(s) => JsonValue::String(s.clone()),
            Self::I64(i) => JsonValue::Number((*i).into()),
            Self::F64(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Self::Bool(b) => JsonValue::Bool(*b),
        }
    }

    fn to_otel_value(&self) -> opentelemetry::Value {
        match self {
            Self::Str(s) => opentelemetry::Value::from(s.clone()),
            Self::I64(i) => (*i).into(),
            Self::F64(f) => (*f).into(),
            Self::Bool(b) => (*b).into(),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        Self::I64(value)
    }
}

impl From<i32> for AttrValue {
    fn from(value: i32) -> Self {
        Self::I64(value as i64)
    }
}

impl From<u16> for AttrValue {
    fn from(value: u16) -> Self {
        Self::I64(value as i64)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        Self::F64(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// One log emission
#[derive(Debug, Clone)]
pub struct Record {
    pub level: Level,
    pub message: String,
    pub attrs: Vec<(String, AttrValue)>,
}

impl Record {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            attrs: Vec::new(),
        }
    }
}

/// A structured-log sink
///
/// `with_attrs` and `with_group` derive child sinks; implementations that
/// decorate another sink must re-wrap the derived inner sink.
pub trait LogSink: Send + Sync {
    /// Reports whether records at `level` are emitted
    fn enabled(&self, level: Level) -> bool;

    /// Emit one record
    fn handle(&self, cx: &Context, record: Record) -> Result<()>;

    /// Derive a sink with additional fixed attributes
    fn with_attrs(&self, attrs: Vec<(String, AttrValue)>) -> Arc<dyn LogSink>;

    /// Derive a sink whose subsequent attributes nest under `name`
    fn with_group(&self, name: &str) -> Arc<dyn LogSink>;
}

/// Terminal sink writing one JSON object per record
pub struct JsonLineSink {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
    min_level: Level,
    /// Fixed attributes, each remembering the group path it was added under
    attrs: Vec<(Vec<String>, (String, AttrValue))>,
    groups: Vec<String>,
}

impl JsonLineSink {
    pub fn new(writer: impl Write + Send + 'static, min_level: Level) -> Self {
        Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
            min_level,
            attrs: Vec::new(),
            groups: Vec::new(),
        }
    }

    /// Sink writing to standard output
    pub fn stdout(min_level: Level) -> Self {
        Self::new(std::io::stdout(), min_level)
    }
}

/// Insert `key: value` under the nested object named by `path`
fn insert_nested(root: &mut Map<String, JsonValue>, path: &[String], key: &str, value: JsonValue) {
    let mut node = root;
    for segment in path {
        let entry = node
            .entry(segment.clone())
            .or_insert_with(|| JsonValue::Object(Map::new()));
        if !entry.is_object() {
            *entry = JsonValue::Object(Map::new());
        }
        node = match entry.as_object_mut() {
            Some(obj) => obj,
            None => return,
        };
    }
    node.insert(key.to_string(), value);
}

impl LogSink for JsonLineSink {
    fn enabled(&self, level: Level) -> bool {
        level >= self.min_level
    }

    fn handle(&self, _cx: &Context, record: Record) -> Result<()> {
        let mut root = Map::new();
        root.insert(
            "time".to_string(),
            JsonValue::String(chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)),
        );
        root.insert(
            "level".to_string(),
            JsonValue::String(record.level.as_str().to_string()),
        );
        root.insert("msg".to_string(), JsonValue::String(record.message));

        for (path, (key, value)) in &self.attrs {
            insert_nested(&mut root, path, key, value.to_json());
        }
        for (key, value) in &record.attrs {
            insert_nested(&mut root, &self.groups, key, value.to_json());
        }

        let line = serde_json::to_string(&JsonValue::Object(root))?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| Error::Internal("log writer lock poisoned".to_string()))?;
        writeln!(writer, "{line}")?;
        Ok(())
    }

    fn with_attrs(&self, attrs: Vec<(String, AttrValue)>) -> Arc<dyn LogSink> {
        let mut fixed = self.attrs.clone();
        for attr in attrs {
            fixed.push((self.groups.clone(), attr));
        }
        Arc::new(Self {
            writer: self.writer.clone(),
            min_level: self.min_level,
            attrs: fixed,
            groups: self.groups.clone(),
        })
    }

    fn with_group(&self, name: &str) -> Arc<dyn LogSink> {
        let mut groups = self.groups.clone();
        groups.push(name.to_string());
        Arc::new(Self {
            writer: self.writer.clone(),
            min_level: self.min_level,
            attrs: self.attrs.clone(),
            groups,
        })
    }
}

/// Decorator injecting trace correlation into every record
pub struct CorrelatedSink {
    inner: Arc<dyn LogSink>,
}

impl CorrelatedSink {
    pub fn new(inner: Arc<dyn LogSink>) -> Self {
        Self { inner }
    }
}

impl LogSink for CorrelatedSink {
    fn enabled(&self, level: Level) -> bool {
        self.inner.enabled(level)
    }

    fn handle(&self, cx: &Context, mut record: Record) -> Result<()> {
        let span = cx.span();
        if span.is_recording() {
            let span_context = span.span_context();
            if span_context.is_valid() {
                record.attrs.push((
                    "trace_id".to_string(),
                    AttrValue::Str(span_context.trace_id().to_string()),
                ));
                record.attrs.push((
                    "span_id".to_string(),
                    AttrValue::Str(span_context.span_id().to_string()),
                ));
                if span_context.is_sampled() {
                    record
                        .attrs
                        .push(("trace_sampled".to_string(), AttrValue::Bool(true)));
                }
            }
        }

        self.inner.handle(cx, record)
    }

    fn with_attrs(&self, attrs: Vec<(String, AttrValue)>) -> Arc<dyn LogSink> {
        Arc::new(Self {
            inner: self.inner.with_attrs(attrs),
        })
    }

    fn with_group(&self, name: &str) -> Arc<dyn LogSink> {
        Arc::new(Self {
            inner: self.inner.with_group(name),
        })
    }
}

/// Context-aware logger fronting a sink chain
#[derive(Clone)]
pub struct Logger {
    sink: Arc<dyn LogSink>,
}

impl Logger {
    /// Wrap `sink` so every record carries trace correlation when available
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink: Arc::new(CorrelatedSink::new(sink)),
        }
    }

    /// Derive a logger with additional fixed attributes
    pub fn with_attrs(&self, attrs: Vec<(String, AttrValue)>) -> Self {
        Self {
            sink: self.sink.with_attrs(attrs),
        }
    }

    /// Derive a logger whose subsequent attributes nest under `name`
    pub fn with_group(&self, name: &str) -> Self {
        Self {
            sink: self.sink.with_group(name),
        }
    }

    pub fn log(&self, cx: &Context, level: Level, msg: &str, attrs: &[(&str, AttrValue)]) {
        if !self.sink.enabled(level) {
            return;
        }
        let mut record = Record::new(level, msg);
        record.attrs = attrs
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect();
        if let Err(err) = self.sink.handle(cx, record) {
            tracing::warn!("failed to emit log record: {err}");
        }
    }

    pub fn debug(&self, cx: &Context, msg: &str, attrs: &[(&str, AttrValue)]) {
        self.log(cx, Level::Debug, msg, attrs);
    }

    pub fn info(&self, cx: &Context, msg: &str, attrs: &[(&str, AttrValue)]) {
        self.log(cx, Level::Info, msg, attrs);
    }

    pub fn warn(&self, cx: &Context, msg: &str, attrs: &[(&str, AttrValue)]) {
        self.log(cx, Level::Warn, msg, attrs);
    }

    pub fn error(&self, cx: &Context, msg: &str, attrs: &[(&str, AttrValue)]) {
        self.log(cx, Level::Error, msg, attrs);
    }

    /// Log an info message with trace correlation
    pub fn info_with_trace(&self, cx: &Context, msg: &str, attrs: &[(&str, AttrValue)]) {
        self.info(cx, msg, attrs);
    }

    /// Log an error and record it on the current span
    pub fn log_error(
        &self,
        cx: &Context,
        err: &dyn std::error::Error,
        msg: &str,
        attrs: &[(&str, AttrValue)],
    ) {
        let span = cx.span();
        if span.is_recording() {
            span.record_error(err);
            span.set_status(Status::error(err.to_string()));
        }

        let mut all_attrs: Vec<(&str, AttrValue)> =
            vec![("error", AttrValue::Str(err.to_string()))];
        all_attrs.extend_from_slice(attrs);
        self.error(cx, msg, &all_attrs);
    }

    /// Log an HTTP request completion with a fixed record shape
    ///
    /// Severity follows the status code: info, warn at >= 400, error at >= 500.
    pub fn log_http_request(
        &self,
        cx: &Context,
        method: &str,
        path: &str,
        status_code: u16,
        duration: Duration,
        attrs: &[(&str, AttrValue)],
    ) {
        let mut all_attrs: Vec<(&str, AttrValue)> = vec![
            ("http_method", AttrValue::from(method)),
            ("http_path", AttrValue::from(path)),
            ("http_status_code", AttrValue::from(status_code)),
            ("duration_ms", AttrValue::I64(duration.as_millis() as i64)),
        ];
        all_attrs.extend_from_slice(attrs);

        let level = if status_code >= 500 {
            Level::Error
        } else if status_code >= 400 {
            Level::Warn
        } else {
            Level::Info
        };

        self.log(cx, level, "HTTP request completed", &all_attrs);
    }

    /// Log a message and set the same attributes on the current span
    pub fn log_with_span_attributes(
        &self,
        cx: &Context,
        level: Level,
        msg: &str,
        attrs: &[(&str, AttrValue)],
    ) {
        let span = cx.span();
        if span.is_recording() {
            for (key, value) in attrs {
                span.set_attribute(KeyValue::new(key.to_string(), value.to_otel_value()));
            }
        }

        self.log(cx, level, msg, attrs);
    }
}
