//! Server options and the service configuration contract.
//!
//! [`ServerOptions`] configures the transport. It deserializes from any serde
//! format and can be read from `HEUREUX_*` environment variables:
//!
//! | Variable | Field | Default |
//! |---|---|---|
//! | `HEUREUX_HOST` | `host` | `127.0.0.1` |
//! | `HEUREUX_PORT` | `port` | `0` (ephemeral) |
//! | `HEUREUX_STOP_TIMEOUT_MS` | `stop_timeout_ms` | `5000` |
//! | `HEUREUX_RESPONSE_VALIDATION` | `response_validation` | `enforce` |

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Application configuration carried in the service bundle.
///
/// The only thing the server itself reads is the service name, used as the
/// `component` tag on request spans.
pub trait Config: Send + Sync + 'static {
    fn service_name(&self) -> &str;
}

/// Free-form JSON config: `service_name` is read from the top-level key.
impl Config for Value {
    fn service_name(&self) -> &str {
        self.get("service_name").and_then(Value::as_str).unwrap_or("")
    }
}

/// A ready-made config: a service name plus arbitrary extra settings.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct ServiceConfig {
    pub service_name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ServiceConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self { service_name: service_name.into(), extra: Map::new() }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}

impl Config for ServiceConfig {
    fn service_name(&self) -> &str {
        &self.service_name
    }
}

/// What the response finalizer does when a handler's output breaks its
/// declared response schema.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseValidation {
    /// Log the violation and answer `500` instead of the bad payload.
    #[default]
    Enforce,
    /// Log the violation and send the payload anyway.
    Log,
}

/// Transport settings.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct ServerOptions {
    pub host: String,
    pub port: u16,
    pub stop_timeout_ms: u64,
    pub response_validation: ResponseValidation,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 0,
            stop_timeout_ms: 5_000,
            response_validation: ResponseValidation::Enforce,
        }
    }
}

/// A `HEUREUX_*` variable that is set but cannot be parsed.
#[derive(Debug, thiserror::Error)]
#[error("invalid value `{value}` for {name}")]
pub struct InvalidSetting {
    pub name: &'static str,
    pub value: String,
}

impl ServerOptions {
    /// Listens on `host:port`.
    pub fn bind(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port, ..Self::default() }
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    /// Reads options from the process environment, falling back to defaults.
    pub fn from_env() -> Result<Self, InvalidSetting> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads options through `lookup`, falling back to defaults for unset names.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, InvalidSetting> {
        let mut options = Self::default();

        if let Some(host) = lookup("HEUREUX_HOST") {
            options.host = host;
        }
        if let Some(port) = lookup("HEUREUX_PORT") {
            options.port = parse_setting("HEUREUX_PORT", port)?;
        }
        if let Some(ms) = lookup("HEUREUX_STOP_TIMEOUT_MS") {
            options.stop_timeout_ms = parse_setting("HEUREUX_STOP_TIMEOUT_MS", ms)?;
        }
        if let Some(mode) = lookup("HEUREUX_RESPONSE_VALIDATION") {
            options.response_validation = match mode.as_str() {
                "enforce" => ResponseValidation::Enforce,
                "log" => ResponseValidation::Log,
                _ => return Err(InvalidSetting { name: "HEUREUX_RESPONSE_VALIDATION", value: mode }),
            };
        }

        Ok(options)
    }
}

fn parse_setting<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, InvalidSetting> {
    value.trim().parse().map_err(|_| InvalidSetting { name, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn value_config_reads_service_name() {
        assert_eq!(json!({ "service_name": "widgets" }).service_name(), "widgets");
        assert_eq!(json!({ "hello": "world" }).service_name(), "");
    }

    #[test]
    fn service_config_keeps_extra_keys() {
        let cfg: ServiceConfig =
            serde_json::from_value(json!({ "service_name": "widgets", "region": "eu" })).unwrap();
        assert_eq!(cfg.service_name(), "widgets");
        assert_eq!(cfg.get("region"), Some(&json!("eu")));
    }

    #[test]
    fn options_fill_missing_fields_with_defaults() {
        let opts: ServerOptions = serde_json::from_value(json!({ "port": 8080 })).unwrap();
        assert_eq!(opts.port, 8080);
        assert_eq!(opts.host, "127.0.0.1");
        assert_eq!(opts.stop_timeout(), Duration::from_secs(5));
        assert_eq!(opts.response_validation, ResponseValidation::Enforce);
    }

    #[test]
    fn options_from_lookup() {
        let env: HashMap<&str, &str> = [
            ("HEUREUX_HOST", "0.0.0.0"),
            ("HEUREUX_PORT", "3000"),
            ("HEUREUX_RESPONSE_VALIDATION", "log"),
        ]
        .into_iter()
        .collect();

        let opts = ServerOptions::from_lookup(|k| env.get(k).map(|v| (*v).to_owned())).unwrap();
        assert_eq!(opts.host, "0.0.0.0");
        assert_eq!(opts.port, 3000);
        assert_eq!(opts.stop_timeout_ms, 5_000);
        assert_eq!(opts.response_validation, ResponseValidation::Log);
    }

    #[test]
    fn options_from_lookup_rejects_garbage() {
        let err = ServerOptions::from_lookup(|k| (k == "HEUREUX_PORT").then(|| "http".to_owned()))
            .unwrap_err();
        assert_eq!(err.name, "HEUREUX_PORT");
        assert_eq!(err.to_string(), "invalid value `http` for HEUREUX_PORT");
    }
}
