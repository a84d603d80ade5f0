//! Configuration file management for sanchecker.
//!
//! This module handles loading, parsing, and merging configuration from TOML files
//! and command-line arguments, and turns the merged result into a validated
//! [`ProbeConfig`].
//!
//! # Configuration Precedence
//!
//! 1. Default values (lowest priority)
//! 2. Configuration file (sanchecker.toml or specified with --config)
//! 3. Command-line arguments (highest priority)
//!
//! # Example Configuration File
//!
//! ```toml
//! host = "example.com"
//! port = 443
//! try_ports = [443, 8443]
//! timeout_ms = 1000
//! concurrency = 8
//! san_mode = "dns"
//! output = "text"
//! exit_code = 2
//!
//! [prometheus]
//! enabled = true
//! address = "http://localhost:9091"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::probe::{ProbeConfig, DEFAULT_PORT, DEFAULT_TIMEOUT_MS};
use crate::san::SanMode;

/// Main configuration structure for sanchecker.
///
/// All fields are optional to support partial configuration and merging.
/// Missing values will be filled in by defaults or overridden by CLI arguments.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct Config {
    /// Source host: hostname, IP, host:port or URL
    pub host: Option<String>,
    /// TCP port of the source host
    pub port: Option<u16>,
    /// Ports tried on every discovered SAN hostname
    pub try_ports: Option<Vec<u16>>,
    /// Connection timeout in milliseconds
    pub timeout_ms: Option<u64>,
    /// Number of SAN probes run at once
    pub concurrency: Option<usize>,
    /// SAN extraction mode: dns, legacy
    pub san_mode: Option<String>,
    /// Output format: text, json, summary
    pub output: Option<String>,
    /// Exit code to use when a SAN host presents a different certificate
    pub exit_code: Option<i32>,
    /// Prometheus configuration
    pub prometheus: Option<PrometheusConfig>,
}

/// Prometheus integration configuration.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct PrometheusConfig {
    /// Enable prometheus metrics pushing
    pub enabled: Option<bool>,
    /// Prometheus push gateway address (e.g., "http://localhost:9091")
    pub address: Option<String>,
}

impl Config {
    /// Loads configuration from a TOML file.
    ///
    /// # Returns
    ///
    /// * `Ok(Config)` - Successfully parsed configuration
    /// * `Err(ConfigError::Io)` - File could not be read
    /// * `Err(ConfigError::Parse)` - File contains invalid TOML
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use sanchecker::config::Config;
    /// let config = Config::from_file("sanchecker.toml")?;
    /// # Ok::<(), sanchecker::config::ConfigError>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;

        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        Ok(config)
    }

    /// Creates a configuration with the built-in defaults.
    ///
    /// # Default Values
    ///
    /// - `host`: None (must be provided)
    /// - `port`: 443
    /// - `try_ports`: [443]
    /// - `timeout_ms`: 1000
    /// - `concurrency`: 1 (sequential)
    /// - `san_mode`: "dns"
    /// - `output`: "text"
    /// - `exit_code`: 0 (don't fail on mismatching certificates)
    /// - `prometheus.enabled`: false
    /// - `prometheus.address`: "http://localhost:9091"
    pub fn defaults() -> Self {
        Config {
            host: None,
            port: Some(DEFAULT_PORT),
            try_ports: Some(vec![DEFAULT_PORT]),
            timeout_ms: Some(DEFAULT_TIMEOUT_MS),
            concurrency: Some(1),
            san_mode: Some(SanMode::default().to_string()),
            output: Some("text".to_string()),
            exit_code: Some(0),
            prometheus: Some(PrometheusConfig {
                enabled: Some(false),
                address: Some("http://localhost:9091".to_string()),
            }),
        }
    }

    /// Merges this configuration with another, prioritizing the other's values.
    ///
    /// For each field, if the `other` config has a value (Some), it overrides
    /// this config's value. If the `other` value is None, keeps the current value.
    ///
    /// ```
    /// # use sanchecker::config::Config;
    /// let defaults = Config::defaults();
    /// let file_config = Config::from_file("sanchecker.toml").unwrap_or_default();
    /// let merged = defaults.merge_with(file_config);
    /// assert_eq!(merged.port, Some(443));
    /// ```
    pub fn merge_with(mut self, other: Config) -> Self {
        if other.host.is_some() {
            self.host = other.host;
        }
        if other.port.is_some() {
            self.port = other.port;
        }
        if other.try_ports.is_some() {
            self.try_ports = other.try_ports;
        }
        if other.timeout_ms.is_some() {
            self.timeout_ms = other.timeout_ms;
        }
        if other.concurrency.is_some() {
            self.concurrency = other.concurrency;
        }
        if other.san_mode.is_some() {
            self.san_mode = other.san_mode;
        }
        if other.output.is_some() {
            self.output = other.output;
        }
        if other.exit_code.is_some() {
            self.exit_code = other.exit_code;
        }
        if let Some(other_prom) = other.prometheus {
            if let Some(ref mut self_prom) = self.prometheus {
                if other_prom.enabled.is_some() {
                    self_prom.enabled = other_prom.enabled;
                }
                if other_prom.address.is_some() {
                    self_prom.address = other_prom.address;
                }
            } else {
                self.prometheus = Some(other_prom);
            }
        }
        self
    }

    /// Validates the merged configuration and produces the probe input.
    ///
    /// A port embedded in `host` (`host:port` or a URL with a port) takes
    /// precedence over `port`.
    pub fn resolve(&self) -> Result<ProbeConfig, ConfigError> {
        let raw_host = self
            .host
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ConfigError::Validation("host is required".to_string()))?;
        let (host, embedded_port) = parse_target(raw_host)?;

        let port = embedded_port.or(self.port).unwrap_or(DEFAULT_PORT);
        if port == 0 {
            return Err(ConfigError::Validation("port must be between 1 and 65535".to_string()));
        }

        let try_ports = self
            .try_ports
            .clone()
            .unwrap_or_else(|| vec![DEFAULT_PORT]);
        if try_ports.is_empty() {
            return Err(ConfigError::Validation("try_ports must not be empty".to_string()));
        }
        if try_ports.contains(&0) {
            return Err(ConfigError::Validation(
                "try_ports must be between 1 and 65535".to_string(),
            ));
        }

        let timeout_ms = self.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS);
        if timeout_ms == 0 {
            return Err(ConfigError::Validation("timeout_ms must be greater than 0".to_string()));
        }

        let concurrency = self.concurrency.unwrap_or(1);
        if concurrency == 0 {
            return Err(ConfigError::Validation("concurrency must be greater than 0".to_string()));
        }

        let san_mode = match self.san_mode.as_deref() {
            Some(mode) => mode
                .parse::<SanMode>()
                .map_err(|_| ConfigError::Validation(format!("unknown san_mode '{}'", mode)))?,
            None => SanMode::default(),
        };

        Ok(ProbeConfig {
            host,
            port,
            try_ports,
            timeout: Duration::from_millis(timeout_ms),
            concurrency,
            san_mode,
        })
    }

    /// Generates an example configuration file in TOML format.
    ///
    /// ```
    /// # use sanchecker::config::Config;
    /// let example = Config::example_toml();
    /// assert!(example.contains("try_ports"));
    /// ```
    pub fn example_toml() -> String {
        let example = Config {
            host: Some("example.com".to_string()),
            port: Some(443),
            try_ports: Some(vec![443, 8443]),
            timeout_ms: Some(1000),
            concurrency: Some(8),
            san_mode: Some("dns".to_string()),
            output: Some("text".to_string()),
            exit_code: Some(2),
            prometheus: Some(PrometheusConfig {
                enabled: Some(true),
                address: Some("http://localhost:9091".to_string()),
            }),
        };

        toml::to_string_pretty(&example)
            .unwrap_or_else(|_| "# Error generating example".to_string())
    }
}

/// Splits a host argument into hostname and optional explicit port.
///
/// Accepts `example.com`, `example.com:8443`, `10.0.0.1`, `::1`,
/// `[::1]:8443` and URLs such as `https://example.com:9443/path`.
pub fn parse_target(input: &str) -> Result<(String, Option<u16>), ConfigError> {
    if input.parse::<IpAddr>().is_ok() {
        return Ok((input.to_string(), None));
    }

    // a non-special scheme keeps every explicit port, including a scheme's default
    let authority = match input.split_once("://") {
        Some((_, rest)) => rest,
        None => input,
    };
    let candidate = format!("tls://{}", authority);
    let url = Url::parse(&candidate)
        .map_err(|e| ConfigError::Validation(format!("invalid host '{}': {}", input, e)))?;

    let host = url
        .host_str()
        .map(|h| h.trim_start_matches('[').trim_end_matches(']'))
        .filter(|h| !h.is_empty())
        .ok_or_else(|| ConfigError::Validation(format!("invalid host '{}': no hostname", input)))?;

    Ok((host.to_string(), url.port()))
}

/// Errors that can occur during configuration loading and parsing.
#[derive(Debug)]
pub enum ConfigError {
    /// I/O error (file not found, permission denied, etc.)
    Io(String),
    /// TOML parsing error (invalid syntax, type mismatch, etc.)
    Parse(String),
    /// Validation error (missing required fields, invalid values, etc.)
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "IO Error: {}", msg),
            ConfigError::Parse(msg) => write!(f, "Parse Error: {}", msg),
            ConfigError::Validation(msg) => write!(f, "Validation Error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_from_toml() {
        let toml_content = r#"
            host = "example.com"
            port = 8443
            try_ports = [443, 8443]
            timeout_ms = 2500
            san_mode = "legacy"
            output = "json"
            exit_code = 1

            [prometheus]
            enabled = true
            address = "http://localhost:9092"
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::from_file(temp_file.path()).unwrap();

        assert_eq!(config.host, Some("example.com".to_string()));
        assert_eq!(config.port, Some(8443));
        assert_eq!(config.try_ports, Some(vec![443, 8443]));
        assert_eq!(config.timeout_ms, Some(2500));
        assert_eq!(config.concurrency, None);
        assert_eq!(config.san_mode, Some("legacy".to_string()));
        assert_eq!(config.output, Some("json".to_string()));
        assert_eq!(config.exit_code, Some(1));

        let prometheus = config.prometheus.unwrap();
        assert_eq!(prometheus.enabled, Some(true));
        assert_eq!(
            prometheus.address,
            Some("http://localhost:9092".to_string())
        );
    }

    #[test]
    fn test_config_merge() {
        let base_config = Config::defaults();

        let override_config = Config {
            host: Some("override.com".to_string()),
            try_ports: Some(vec![8443]),
            exit_code: Some(3),
            prometheus: Some(PrometheusConfig {
                enabled: Some(true),
                address: None,
            }),
            ..Config::default()
        };

        let merged = base_config.merge_with(override_config);

        assert_eq!(merged.host, Some("override.com".to_string()));
        assert_eq!(merged.port, Some(443)); // From base (not overridden)
        assert_eq!(merged.try_ports, Some(vec![8443]));
        assert_eq!(merged.exit_code, Some(3));
        assert_eq!(merged.output, Some("text".to_string()));

        let prometheus = merged.prometheus.unwrap();
        assert_eq!(prometheus.enabled, Some(true)); // Overridden
        assert_eq!(
            prometheus.address,
            Some("http://localhost:9091".to_string())
        ); // From base
    }

    #[test]
    fn test_resolve_defaults() {
        let config = Config {
            host: Some("example.com".to_string()),
            ..Config::defaults()
        };

        assert_eq!(config.resolve().unwrap(), ProbeConfig::new("example.com"));
    }

    #[test]
    fn test_resolve_embedded_port_wins() {
        let config = Config {
            host: Some("https://secure.example.com:9443/login".to_string()),
            port: Some(443),
            ..Config::defaults()
        };
        let resolved = config.resolve().unwrap();
        assert_eq!(resolved.host, "secure.example.com");
        assert_eq!(resolved.port, 9443);
    }

    #[test]
    fn test_resolve_rejects_invalid_values() {
        let base = Config {
            host: Some("example.com".to_string()),
            ..Config::defaults()
        };

        let cases = vec![
            Config { host: None, ..base.clone() },
            Config { host: Some("  ".to_string()), ..base.clone() },
            Config { try_ports: Some(vec![]), ..base.clone() },
            Config { try_ports: Some(vec![443, 0]), ..base.clone() },
            Config { port: Some(0), ..base.clone() },
            Config { timeout_ms: Some(0), ..base.clone() },
            Config { concurrency: Some(0), ..base.clone() },
            Config { san_mode: Some("asn1".to_string()), ..base.clone() },
        ];

        for config in cases {
            match config.resolve() {
                Err(ConfigError::Validation(_)) => {}
                other => panic!("Expected ValidationError for {:?}, got {:?}", config, other),
            }
        }
    }

    #[test]
    fn test_resolve_keeps_default_port_typed_in_url() {
        let config = Config {
            host: Some("https://a.test:443".to_string()),
            port: Some(8443),
            ..Config::defaults()
        };
        let resolved = config.resolve().unwrap();
        assert_eq!(resolved.host, "a.test");
        assert_eq!(resolved.port, 443);

        let config = Config {
            host: Some("https://a.test".to_string()),
            port: Some(8443),
            ..Config::defaults()
        };
        assert_eq!(config.resolve().unwrap().port, 8443);
    }

    #[test]
    fn test_parse_target_forms() {
        assert_eq!(parse_target("example.com").unwrap(), ("example.com".to_string(), None));
        assert_eq!(
            parse_target("example.com:8443").unwrap(),
            ("example.com".to_string(), Some(8443))
        );
        assert_eq!(parse_target("10.0.0.1").unwrap(), ("10.0.0.1".to_string(), None));
        assert_eq!(parse_target("::1").unwrap(), ("::1".to_string(), None));
        assert_eq!(parse_target("[::1]:8443").unwrap(), ("::1".to_string(), Some(8443)));
        assert_eq!(
            parse_target("https://example.com").unwrap(),
            ("example.com".to_string(), None)
        );
        assert_eq!(
            parse_target("http://[::1]:80/").unwrap(),
            ("::1".to_string(), Some(80))
        );
        assert!(parse_target("example.com:notaport").is_err());
    }

    #[test]
    fn test_invalid_toml() {
        let invalid_toml = "try_ports = [invalid toml";

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(invalid_toml.as_bytes()).unwrap();

        let result = Config::from_file(temp_file.path());
        assert!(result.is_err());

        match result.unwrap_err() {
            ConfigError::Parse(_) => {} // Expected
            other => panic!("Expected ParseError, got {:?}", other),
        }
    }

    #[test]
    fn test_example_toml_generation() {
        let example = Config::example_toml();

        let parsed: Config = toml::from_str(&example).unwrap();

        assert!(parsed.host.is_some());
        assert_eq!(parsed.try_ports, Some(vec![443, 8443]));
        assert!(parsed.resolve().is_ok());
    }
}
