//! `VmcpServerConfig` (spec §6 "Environment configuration"), following the
//! teacher's `ProxyConfig`: a plain struct with a `Default` impl and an
//! `from_env` constructor, not a dynamic config framework.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct VmcpServerConfig {
    pub log_level: String,
    pub database_url: Option<String>,
    pub data_dir: String,
    pub port: u16,
    pub max_concurrent_scripts: usize,
    pub max_upstream_concurrency: usize,
    pub default_request_deadline: Duration,
    pub template_max_depth: usize,
}

impl Default for VmcpServerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            database_url: None,
            data_dir: "./data".to_string(),
            port: 8080,
            max_concurrent_scripts: 8,
            max_upstream_concurrency: 16,
            default_request_deadline: vmcp_core::context::DEFAULT_REQUEST_DEADLINE,
            template_max_depth: vmcp_core::context::DEFAULT_TEMPLATE_MAX_DEPTH,
        }
    }
}

impl VmcpServerConfig {
    /// Reads spec §6's env vars over the defaults, tolerating absence or
    /// unparsable values by falling back rather than failing startup.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            database_url: std::env::var("DATABASE_URL").ok(),
            data_dir: std::env::var("DATA_DIR").unwrap_or(defaults.data_dir),
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            max_concurrent_scripts: std::env::var("MAX_CONCURRENT_SCRIPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_concurrent_scripts),
            max_upstream_concurrency: std::env::var("MAX_UPSTREAM_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_upstream_concurrency),
            default_request_deadline: std::env::var("DEFAULT_REQUEST_DEADLINE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.default_request_deadline),
            template_max_depth: std::env::var("TEMPLATE_MAX_DEPTH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.template_max_depth),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_env_falls_back_to_defaults_when_unset() {
        for var in [
            "LOG_LEVEL",
            "DATABASE_URL",
            "DATA_DIR",
            "PORT",
            "MAX_CONCURRENT_SCRIPTS",
            "MAX_UPSTREAM_CONCURRENCY",
            "DEFAULT_REQUEST_DEADLINE_MS",
            "TEMPLATE_MAX_DEPTH",
        ] {
            std::env::remove_var(var);
        }
        let config = VmcpServerConfig::from_env();
        assert_eq!(config.port, 8080);
        assert_eq!(config.max_concurrent_scripts, 8);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn from_env_parses_overrides() {
        std::env::set_var("PORT", "9001");
        std::env::set_var("MAX_CONCURRENT_SCRIPTS", "4");
        let config = VmcpServerConfig::from_env();
        assert_eq!(config.port, 9001);
        assert_eq!(config.max_concurrent_scripts, 4);
        std::env::remove_var("PORT");
        std::env::remove_var("MAX_CONCURRENT_SCRIPTS");
    }
}
