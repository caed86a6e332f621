// Configuration File Support
//
// TOML configuration for the admission service with environment variable
// overrides. The `[rate_limit]` section mirrors the RATE_LIMIT_* variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;

use crate::rate_limit::RateLimitConfig;

/// Default configuration file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "paygate-admission.toml";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// HTTP listener configuration
    pub server: ServerConfig,

    /// Admission quotas
    pub rate_limit: RateLimitConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Bearer token for the `/api/v1/ratelimit/*` admin routes; unset disables them
    pub admin_token: Option<String>,

    /// Accept the `X-Tenant-ID` header as the caller's tenant
    ///
    /// Only safe behind a proxy that authenticates callers and overwrites the
    /// header. Off by default: every caller is limited per client IP.
    pub trust_tenant_header: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            admin_token: None,
            trust_tenant_header: false,
        }
    }
}

impl ServerConfig {
    /// Socket address to bind
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .host
            .parse()
            .with_context(|| format!("Invalid server host: {}", self.host))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl Config {
    /// Load configuration from a specific path
    ///
    /// A missing file yields the defaults. Environment overrides are applied
    /// on top of whatever was loaded, then the result is validated.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// if the merged configuration is invalid.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file from {:?}", path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file from {:?}", path))?;
            tracing::info!("Loaded configuration from {:?}", path);
            config
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            Self::default()
        };

        let config = config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// - PAYGATE_LOG_LEVEL
    /// - PAYGATE_LOG_FORMAT
    /// - PAYGATE_HOST
    /// - PAYGATE_PORT
    /// - PAYGATE_ADMIN_TOKEN
    /// - PAYGATE_TRUST_TENANT_HEADER
    /// - RATE_LIMIT_* (see [`RateLimitConfig::apply_env`])
    pub fn apply_env_overrides(self) -> Self {
        self.apply_overrides_from(|var| std::env::var(var).ok())
    }

    fn apply_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("PAYGATE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("PAYGATE_LOG_FORMAT") {
            self.logging.format = format;
        }

        if let Some(host) = lookup("PAYGATE_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PAYGATE_PORT") {
            match port.parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid PAYGATE_PORT"),
            }
        }
        if let Some(token) = lookup("PAYGATE_ADMIN_TOKEN") {
            self.server.admin_token = Some(token).filter(|t| !t.trim().is_empty());
        }
        if let Some(trust) = lookup("PAYGATE_TRUST_TENANT_HEADER") {
            match trust.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => self.server.trust_tenant_header = true,
                "false" | "0" | "no" | "off" => self.server.trust_tenant_header = false,
                _ => tracing::warn!(value = %trust, "Ignoring invalid PAYGATE_TRUST_TENANT_HEADER"),
            }
        }

        self.rate_limit.apply_env(&lookup);
        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            ),
        }

        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => anyhow::bail!(
                "Invalid log format: {}. Must be one of: json, pretty, compact",
                self.logging.format
            ),
        }

        self.server.bind_addr()?;
        if matches!(&self.server.admin_token, Some(token) if token.trim().is_empty()) {
            anyhow::bail!("Admin token must not be empty; omit it to disable the admin API");
        }

        let rl = &self.rate_limit;
        if rl.window_secs == 0 {
            anyhow::bail!("Rate limit window must be at least 1 second");
        }
        if rl.cleanup_interval_secs == 0 {
            anyhow::bail!("Cleanup interval must be at least 1 second");
        }
        if !rl.premium_multiplier.is_finite() || rl.premium_multiplier <= 0.0 {
            anyhow::bail!(
                "Premium multiplier must be a positive number, got {}",
                rl.premium_multiplier
            );
        }

        Ok(())
    }

    /// Convert log level string to tracing::Level
    pub fn log_level(&self) -> Result<tracing::Level> {
        self.logging
            .level
            .to_lowercase()
            .parse()
            .map_err(|e| anyhow::anyhow!("Failed to parse log level: {}", e))
    }
}
