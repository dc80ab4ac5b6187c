//! Telemetry configuration loading
//!
//! Loads a declarative YAML telemetry configuration from disk. Before
//! parsing, `${VAR}` and `${VAR:-default}` placeholders are expanded against
//! an explicit substitution map: a snapshot of the process environment merged
//! with the caller's override attributes. The process environment is never
//! mutated, so concurrent loads cannot race on shared state.

use crate::error::{Error, Result};
use crate::logging::Level;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Regex for matching ${VAR} or ${VAR:-default} placeholders
static PLACEHOLDER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").unwrap());

/// Options controlling how the telemetry configuration is loaded
///
/// Overrides take precedence over the process environment during placeholder
/// expansion: `service_name` binds `${SERVICE_NAME}`, `service_version` binds
/// `${SERVICE_VERSION}`, `environment` binds `${ENVIRONMENT}`, and each extra
/// attribute binds the placeholder of the same name.
#[derive(Debug, Clone, Default)]
pub struct TelemetryOptions {
    /// Path to the YAML config file
    pub config_path: PathBuf,
    /// Service name override
    pub service_name: Option<String>,
    /// Service version override
    pub service_version: Option<String>,
    /// Environment tag override (dev, staging, prod)
    pub environment: Option<String>,
    /// Additional substitution attributes
    pub attributes: HashMap<String, String>,
}

impl TelemetryOptions {
    pub fn new(config_path: impl AsRef<Path>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Set the service name override
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Set the service version override
    pub fn with_service_version(mut self, version: impl Into<String>) -> Self {
        self.service_version = Some(version.into());
        self
    }

    /// Set the environment override
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Add an extra substitution attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Parsed and validated telemetry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySettings {
    #[serde(default)]
    pub service: ServiceSettings,

    /// Extra resource attributes attached to every exported span
    #[serde(default)]
    pub resource: HashMap<String, String>,

    #[serde(default = "default_propagators")]
    pub propagators: Vec<PropagatorKind>,

    #[serde(default)]
    pub exporter: ExporterSettings,

    #[serde(default)]
    pub logging: LogSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSettings {
    #[serde(default = "default_service_name")]
    pub name: String,

    #[serde(default = "default_service_version")]
    pub version: String,

    #[serde(default = "default_environment")]
    pub environment: String,
}

/// Trace context propagation formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropagatorKind {
    TraceContext,
    Baggage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExporterSettings {
    /// OTLP/HTTP endpoint for span export
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Sampling rate (0.0-1.0)
    #[serde(default = "default_sampling_rate")]
    pub sampling_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl LogSettings {
    /// Minimum level for the structured log output
    pub fn min_level(&self) -> Level {
        match self.level.to_lowercase().as_str() {
            "debug" => Level::Debug,
            "warn" => Level::Warn,
            "error" => Level::Error,
            _ => Level::Info,
        }
    }
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            service: ServiceSettings::default(),
            resource: HashMap::new(),
            propagators: default_propagators(),
            exporter: ExporterSettings::default(),
            logging: LogSettings::default(),
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            version: default_service_version(),
            environment: default_environment(),
        }
    }
}

impl Default for ExporterSettings {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_secs: default_timeout_secs(),
            sampling_rate: default_sampling_rate(),
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl TelemetrySettings {
    /// Load settings from the file named by `options`
    ///
    /// Any read or parse error is fatal; there is no partial or degraded
    /// mode. Placeholders are expanded before YAML parsing.
    pub fn load(options: &TelemetryOptions) -> Result<Self> {
        let raw = std::fs::read_to_string(&options.config_path)?;
        let vars = substitution_map(options, std::env::vars());
        let expanded = expand_placeholders(&raw, &vars);
        let settings: TelemetrySettings = serde_yaml::from_str(&expanded)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.exporter.endpoint.is_empty() {
            return Err(Error::ConfigValidation(
                "exporter endpoint cannot be empty".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.exporter.sampling_rate) {
            return Err(Error::ConfigValidation(format!(
                "sampling rate must be between 0.0 and 1.0, got {}",
                self.exporter.sampling_rate
            )));
        }
        if self.propagators.is_empty() {
            return Err(Error::ConfigValidation(
                "at least one propagator is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Build the substitution map for placeholder expansion
///
/// Starts from a snapshot of the given environment and layers the override
/// attributes on top, so overrides win over inherited variables.
pub fn substitution_map(
    options: &TelemetryOptions,
    env: impl IntoIterator<Item = (String, String)>,
) -> HashMap<String, String> {
    let mut vars: HashMap<String, String> = env.into_iter().collect();

    if let Some(name) = &options.service_name {
        vars.insert("SERVICE_NAME".to_string(), name.clone());
    }
    if let Some(version) = &options.service_version {
        vars.insert("SERVICE_VERSION".to_string(), version.clone());
    }
    if let Some(environment) = &options.environment {
        vars.insert("ENVIRONMENT".to_string(), environment.clone());
    }
    for (key, value) in &options.attributes {
        vars.insert(key.clone(), value.clone());
    }

    vars
}

/// Expand `${VAR}` and `${VAR:-default}` placeholders in `input`
///
/// Unknown variables without a default expand to the empty string.
pub fn expand_placeholders(input: &str, vars: &HashMap<String, String>) -> String {
    PLACEHOLDER_REGEX
        .replace_all(input, |caps: &regex::Captures| {
            let name = &caps[1];
            match vars.get(name) {
                Some(value) => value.clone(),
                None => match caps.get(2) {
                    Some(default) => default.as_str().to_string(),
                    None => {
                        tracing::debug!("config placeholder not set, expanding to empty: {name}");
                        String::new()
                    }
                },
            }
        })
        .into_owned()
}

fn default_service_name() -> String {
    "unknown-service".to_string()
}

fn default_service_version() -> String {
    "0.0.0".to_string()
}

fn default_environment() -> String {
    "dev".to_string()
}

fn default_propagators() -> Vec<PropagatorKind> {
    vec![PropagatorKind::TraceContext, PropagatorKind::Baggage]
}

fn default_endpoint() -> String {
    "http://localhost:4318/v1/traces".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_sampling_rate() -> f64 {
    1.0
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_expand_simple_placeholder() {
        let result = expand_placeholders("name: ${SERVICE_NAME}", &vars(&[("SERVICE_NAME", "svc")]));
        assert_eq!(result, "name: svc");
    }

    #[test]
    fn test_expand_default_used_when_missing() {
        let result = expand_placeholders("env: ${ENVIRONMENT:-dev}", &vars(&[]));
        assert_eq!(result, "env: dev");
    }

    #[test]
    fn test_expand_value_wins_over_default() {
        let result =
            expand_placeholders("env: ${ENVIRONMENT:-dev}", &vars(&[("ENVIRONMENT", "prod")]));
        assert_eq!(result, "env: prod");
    }

    #[test]
    fn test_expand_missing_without_default_is_empty() {
        let result = expand_placeholders("name: '${SERVICE_NAME}'", &vars(&[]));
        assert_eq!(result, "name: ''");
    }

    #[test]
    fn test_expand_multiple_placeholders() {
        let result = expand_placeholders(
            "${A}-${B:-two}-${C}",
            &vars(&[("A", "one"), ("C", "three")]),
        );
        assert_eq!(result, "one-two-three");
    }

    #[test]
    fn test_substitution_map_overrides_win_over_env() {
        let options = TelemetryOptions::new("unused.yaml")
            .with_service_name("override")
            .with_attribute("TEAM", "backend");

        let env = vec![
            ("SERVICE_NAME".to_string(), "from-env".to_string()),
            ("TEAM".to_string(), "from-env".to_string()),
            ("REGION".to_string(), "us-east-1".to_string()),
        ];

        let map = substitution_map(&options, env);
        assert_eq!(map.get("SERVICE_NAME").map(String::as_str), Some("override"));
        assert_eq!(map.get("TEAM").map(String::as_str), Some("backend"));
        assert_eq!(map.get("REGION").map(String::as_str), Some("us-east-1"));
    }

    #[test]
    fn test_load_expands_overrides_into_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "service:\n  name: ${{SERVICE_NAME:-fallback}}\n  environment: ${{ENVIRONMENT:-dev}}"
        )
        .unwrap();

        let options = TelemetryOptions::new(file.path())
            .with_service_name("my-awesome-service")
            .with_environment("production");

        let settings = TelemetrySettings::load(&options).unwrap();
        assert_eq!(settings.service.name, "my-awesome-service");
        assert_eq!(settings.service.environment, "production");
        // Untouched sections fall back to defaults
        assert_eq!(settings.exporter.sampling_rate, 1.0);
        assert_eq!(
            settings.propagators,
            vec![PropagatorKind::TraceContext, PropagatorKind::Baggage]
        );
    }

    #[test]
    fn test_load_missing_file_is_fatal() {
        let options = TelemetryOptions::new("/nonexistent/telemetry.yaml");
        let err = TelemetrySettings::load(&options).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_load_invalid_yaml_is_fatal() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "service: [not, a, mapping").unwrap();

        let options = TelemetryOptions::new(file.path());
        let err = TelemetrySettings::load(&options).unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }

    #[test]
    fn test_load_rejects_out_of_range_sampling_rate() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "exporter:\n  sampling_rate: 1.5").unwrap();

        let options = TelemetryOptions::new(file.path());
        let err = TelemetrySettings::load(&options).unwrap_err();
        assert!(matches!(err, Error::ConfigValidation(_)));
    }

    #[test]
    fn test_propagator_parsing() {
        let yaml = "propagators: [tracecontext, baggage]";
        let settings: TelemetrySettings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            settings.propagators,
            vec![PropagatorKind::TraceContext, PropagatorKind::Baggage]
        );
    }

    #[test]
    fn test_defaults() {
        let settings = TelemetrySettings::default();
        assert_eq!(settings.service.name, "unknown-service");
        assert_eq!(settings.service.environment, "dev");
        assert_eq!(settings.exporter.endpoint, "http://localhost:4318/v1/traces");
        assert_eq!(settings.logging.min_level(), Level::Info);
    }

    #[test]
    fn test_log_level_parsing() {
        let levels = [
            ("debug", Level::Debug),
            ("info", Level::Info),
            ("warn", Level::Warn),
            ("error", Level::Error),
            ("bogus", Level::Info),
        ];
        for (input, expected) in levels {
            let settings = LogSettings {
                level: input.to_string(),
            };
            assert_eq!(settings.min_level(), expected);
        }
    }
}
