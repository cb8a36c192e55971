use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Server configuration, loaded from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Public URL prefix used in `location` fields.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub store: StoreSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Worker tasks draining the write queue.
    #[serde(default = "default_pool_width")]
    pub pool_width: usize,
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:8090".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8090
}

fn default_pool_width() -> usize {
    20
}

fn default_queue_depth() -> usize {
    100
}

fn default_write_timeout_secs() -> u64 {
    10
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            pool_width: default_pool_width(),
            queue_depth: default_queue_depth(),
            write_timeout_secs: default_write_timeout_secs(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            host: default_host(),
            port: default_port(),
            store: StoreSettings::default(),
        }
    }
}

impl AppConfig {
    /// Reads `IRONFHIR_*` environment variables over the defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(base_url) = std::env::var("IRONFHIR_BASE_URL") {
            config.base_url = base_url;
        }
        if let Ok(host) = std::env::var("IRONFHIR_HOST") {
            config.host = host;
        }
        if let Ok(port) = std::env::var("IRONFHIR_PORT")
            && let Ok(port) = port.parse()
        {
            config.port = port;
        }
        if let Ok(width) = std::env::var("IRONFHIR_STORE_POOL_WIDTH")
            && let Ok(width) = width.parse()
        {
            config.store.pool_width = width;
        }
        if let Ok(depth) = std::env::var("IRONFHIR_STORE_QUEUE_DEPTH")
            && let Ok(depth) = depth.parse()
        {
            config.store.queue_depth = depth;
        }
        if let Ok(timeout) = std::env::var("IRONFHIR_STORE_WRITE_TIMEOUT_SECS")
            && let Ok(timeout) = timeout.parse()
        {
            config.store.write_timeout_secs = timeout;
        }
        config
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.base_url.trim().is_empty() {
            return Err("base_url must not be empty".into());
        }
        if self.port == 0 {
            return Err("port must be > 0".into());
        }
        if self.store.pool_width == 0 {
            return Err("store.pool_width must be > 0".into());
        }
        if self.store.queue_depth == 0 {
            return Err("store.queue_depth must be > 0".into());
        }
        if self.store.write_timeout_secs == 0 {
            return Err("store.write_timeout_secs must be > 0".into());
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        let host: IpAddr = self
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        SocketAddr::new(host, self.port)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.store.write_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.store.pool_width, 20);
        assert_eq!(config.store.queue_depth, 100);
        assert_eq!(config.store.write_timeout_secs, 10);
    }

    #[test]
    fn invalid_values_are_reported() {
        let mut config = AppConfig::default();
        config.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.base_url = "  ".into();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.store.queue_depth = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn addr_falls_back_to_localhost() {
        let mut config = AppConfig::default();
        config.host = "not-an-ip".into();
        assert_eq!(config.addr().ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
    }
}
