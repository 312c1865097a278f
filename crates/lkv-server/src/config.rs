use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

pub const DEFAULT_PORT: u16 = 3000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Allow cross-origin requests from any origin.
    pub permissive_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            permissive_cors: true,
        }
    }
}

impl ServerConfig {
    /// Defaults with the port taken from `PORT`, if set.
    pub fn from_env() -> ServerResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> ServerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(port) = lookup("PORT").filter(|p| !p.trim().is_empty()) {
            let port: u16 = port
                .trim()
                .parse()
                .map_err(|_| ServerError::Config(format!("PORT: expected a port number, got {port:?}")))?;
            config.bind_addr.set_port(port);
        }
        Ok(config)
    }

    pub fn from_toml_str(doc: &str) -> ServerResult<Self> {
        toml::from_str(doc).map_err(|e| ServerError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = ServerConfig::default();
        assert_eq!(c.bind_addr, "0.0.0.0:3000".parse::<SocketAddr>().unwrap());
        assert!(c.permissive_cors);
    }

    #[test]
    fn port_from_environment() {
        let c = ServerConfig::from_lookup(|k| (k == "PORT").then(|| "8080".to_string())).unwrap();
        assert_eq!(c.bind_addr.port(), 8080);
        assert!(ServerConfig::from_lookup(|_| Some("http".into())).is_err());
    }

    #[test]
    fn toml_config() {
        let c = ServerConfig::from_toml_str("bind_addr = \"127.0.0.1:4000\"").unwrap();
        assert_eq!(c.bind_addr.port(), 4000);
        assert!(c.permissive_cors);
    }
}
