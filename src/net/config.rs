//! Network configuration — ports and backend address loaded from ~/.choreo/net.yaml.

use serde::{Deserialize, Serialize};

/// Network configuration loaded from YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetConfig {
    /// UDP port the feedback listener binds on.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    /// Scoring backend host.
    #[serde(default = "default_backend_host")]
    pub backend_host: String,
    /// Scoring backend port.
    #[serde(default = "default_backend_port")]
    pub backend_port: u16,
    /// Handshake retry interval while connecting, in milliseconds.
    #[serde(default = "default_hello_interval_ms")]
    pub hello_interval_ms: u64,
}

fn default_listen_port() -> u16 {
    9571
}

fn default_backend_host() -> String {
    "127.0.0.1".to_string()
}

fn default_backend_port() -> u16 {
    9570
}

fn default_hello_interval_ms() -> u64 {
    500
}

impl NetConfig {
    /// Load config from the standard path (~/.choreo/net.yaml).
    /// Returns None if the file doesn't exist (graceful fallback).
    pub fn load() -> Option<Self> {
        let home = dirs::home_dir()?;
        let path = home.join(".choreo").join("net.yaml");
        let content = std::fs::read_to_string(path).ok()?;
        serde_yaml::from_str(&content).ok()
    }

    /// Backend address in `host:port` form.
    pub fn backend_addr(&self) -> String {
        format!("{}:{}", self.backend_host, self.backend_port)
    }
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            listen_port: default_listen_port(),
            backend_host: default_backend_host(),
            backend_port: default_backend_port(),
            hello_interval_ms: default_hello_interval_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = NetConfig::default();
        assert_eq!(config.listen_port, 9571);
        assert_eq!(config.backend_port, 9570);
        assert_eq!(config.backend_addr(), "127.0.0.1:9570");
        assert_eq!(config.hello_interval_ms, 500);
    }

    #[test]
    fn yaml_round_trip() {
        let config = NetConfig {
            listen_port: 7001,
            backend_host: "10.0.0.5".to_string(),
            backend_port: 7000,
            hello_interval_ms: 250,
        };
        let yaml = serde_yaml::to_string(&config).unwrap();
        let back: NetConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let config: NetConfig = serde_yaml::from_str("listen_port: 7777").unwrap();
        assert_eq!(config.listen_port, 7777);
        assert_eq!(config.backend_host, "127.0.0.1");
        assert_eq!(config.hello_interval_ms, 500);
    }
}
