use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use lkv_fabric::ConnectOptions;
use lkv_types::SecretString;

use crate::error::{GatewayError, GatewayResult};

pub const DEFAULT_CONNECTION_PROFILE: &str = "connection-profile-org1.json";
pub const DEFAULT_WALLET_PATH: &str = "./wallets";
pub const DEFAULT_CA_NAME: &str = "ca.org1.example.com";
pub const DEFAULT_MSP_ID: &str = "Org1MSP";
pub const DEFAULT_CHANNEL_NAME: &str = "my-channel1";
pub const DEFAULT_CONTRACT_NAME: &str = "chaincode1";
pub const DEFAULT_ADMIN_USER: &str = "admin";
pub const DEFAULT_ADMIN_PASSWORD: &str = "adminpw";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Gateway configuration, built once at process start and passed by
/// reference into the identity and session managers.
///
/// Every field has a default matching the development network, so an empty
/// environment yields a usable configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// Connection profile (topology descriptor) location.
    pub connection_profile: PathBuf,
    /// Key store directory.
    pub wallet_path: PathBuf,
    /// Certificate authority entry looked up in the topology.
    pub ca_name: String,
    /// Overrides the CA URL from the topology.
    pub ca_url: Option<String>,
    /// Membership tag recorded on enrolled identities.
    pub msp_id: String,
    pub channel_name: String,
    pub contract_name: String,
    /// Identity every session runs as.
    pub admin_user: String,
    pub admin_password: SecretString,
    pub discovery: DiscoveryConfig,
    pub timeouts: TimeoutConfig,
    /// Session pooling; `None` opens a fresh session per operation.
    pub pool: Option<PoolConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            connection_profile: PathBuf::from(DEFAULT_CONNECTION_PROFILE),
            wallet_path: PathBuf::from(DEFAULT_WALLET_PATH),
            ca_name: DEFAULT_CA_NAME.into(),
            ca_url: None,
            msp_id: DEFAULT_MSP_ID.into(),
            channel_name: DEFAULT_CHANNEL_NAME.into(),
            contract_name: DEFAULT_CONTRACT_NAME.into(),
            admin_user: DEFAULT_ADMIN_USER.into(),
            admin_password: SecretString::new(DEFAULT_ADMIN_PASSWORD),
            discovery: DiscoveryConfig::default(),
            timeouts: TimeoutConfig::default(),
            pool: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiscoveryConfig {
    pub enabled: bool,
    pub as_localhost: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            as_localhost: true,
        }
    }
}

impl From<&DiscoveryConfig> for ConnectOptions {
    fn from(d: &DiscoveryConfig) -> Self {
        ConnectOptions {
            discovery_enabled: d.enabled,
            as_localhost: d.as_localhost,
        }
    }
}

/// Upper bounds for each suspending network call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeoutConfig {
    #[serde(with = "secs")]
    pub enroll: Duration,
    #[serde(with = "secs")]
    pub connect: Duration,
    #[serde(with = "secs")]
    pub evaluate: Duration,
    #[serde(with = "secs")]
    pub submit: Duration,
}

impl TimeoutConfig {
    /// The same bound for every call.
    pub fn uniform(timeout: Duration) -> Self {
        Self {
            enroll: timeout,
            connect: timeout,
            evaluate: timeout,
            submit: timeout,
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self::uniform(DEFAULT_TIMEOUT)
    }
}

/// Session pool sizing and idle eviction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
    pub max_size: usize,
    #[serde(with = "secs")]
    pub idle_timeout: Duration,
    #[serde(with = "secs")]
    pub reap_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 8,
            idle_timeout: Duration::from_secs(60),
            reap_interval: Duration::from_secs(15),
        }
    }
}

/// Durations as whole seconds in config files.
mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

impl GatewayConfig {
    /// Read the `FABRIC_*` environment variables over the defaults.
    pub fn from_env() -> GatewayResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> GatewayResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::default().overlay_lookup(lookup)
    }

    /// Parse a TOML document. Absent fields keep their defaults.
    pub fn from_toml_str(doc: &str) -> GatewayResult<Self> {
        let config: Self =
            toml::from_str(doc).map_err(|e| GatewayError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file, then apply environment overrides.
    pub fn load(path: &Path) -> GatewayResult<Self> {
        let doc = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&doc)?.overlay_lookup(|key| std::env::var(key).ok())
    }

    /// Apply variables from `lookup` on top of `self`.
    pub fn overlay_lookup<F>(mut self, lookup: F) -> GatewayResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("FABRIC_CONNECTION_PROFILE_PATH") {
            self.connection_profile = PathBuf::from(v);
        }
        if let Some(v) = get("FABRIC_WALLET_PATH") {
            self.wallet_path = PathBuf::from(v);
        }
        if let Some(v) = get("FABRIC_CA_NAME") {
            self.ca_name = v;
        }
        if let Some(v) = get("FABRIC_CA_URL") {
            self.ca_url = Some(v);
        }
        if let Some(v) = get("FABRIC_MSP_ID") {
            self.msp_id = v;
        }
        if let Some(v) = get("FABRIC_CHANNEL_NAME") {
            self.channel_name = v;
        }
        if let Some(v) = get("FABRIC_CHAINCODE_NAME") {
            self.contract_name = v;
        }
        if let Some(v) = get("FABRIC_ADMIN_USER") {
            self.admin_user = v;
        }
        if let Some(v) = get("FABRIC_ADMIN_PASSWORD") {
            self.admin_password = SecretString::new(v);
        }
        if let Some(v) = get("FABRIC_DISCOVERY_AS_LOCALHOST") {
            self.discovery.as_localhost = parse_bool("FABRIC_DISCOVERY_AS_LOCALHOST", &v)?;
        }
        if let Some(v) = get("FABRIC_TIMEOUT_SECS") {
            let secs = parse_u64("FABRIC_TIMEOUT_SECS", &v)?;
            self.timeouts = TimeoutConfig::uniform(Duration::from_secs(secs));
        }
        if let Some(v) = get("FABRIC_POOL_SIZE") {
            let size = usize::try_from(parse_u64("FABRIC_POOL_SIZE", &v)?).map_err(|_| {
                GatewayError::Configuration(format!("FABRIC_POOL_SIZE: {v:?} is out of range"))
            })?;
            self.pool = (size > 0).then(|| PoolConfig {
                max_size: size,
                ..self.pool.clone().unwrap_or_default()
            });
        }
        if let Some(v) = get("FABRIC_POOL_IDLE_SECS") {
            let secs = parse_u64("FABRIC_POOL_IDLE_SECS", &v)?;
            if let Some(pool) = self.pool.as_mut() {
                pool.idle_timeout = Duration::from_secs(secs);
            }
        }

        self.validate()?;
        Ok(self)
    }

    /// Reject configurations that cannot work.
    pub fn validate(&self) -> GatewayResult<()> {
        let required = [
            ("ca_name", &self.ca_name),
            ("msp_id", &self.msp_id),
            ("channel_name", &self.channel_name),
            ("contract_name", &self.contract_name),
            ("admin_user", &self.admin_user),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(GatewayError::Configuration(format!("{field} must not be empty")));
            }
        }
        let timeouts = [
            self.timeouts.enroll,
            self.timeouts.connect,
            self.timeouts.evaluate,
            self.timeouts.submit,
        ];
        if timeouts.iter().any(Duration::is_zero) {
            return Err(GatewayError::Configuration("timeouts must be non-zero".into()));
        }
        if let Some(pool) = &self.pool {
            if pool.max_size == 0 || pool.reap_interval.is_zero() {
                return Err(GatewayError::Configuration(
                    "pool max_size and reap_interval must be non-zero".into(),
                ));
            }
            if pool.max_size > Semaphore::MAX_PERMITS {
                return Err(GatewayError::Configuration(format!(
                    "pool max_size must not exceed {}",
                    Semaphore::MAX_PERMITS
                )));
            }
        }
        Ok(())
    }

    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions::from(&self.discovery)
    }
}

fn parse_bool(key: &str, value: &str) -> GatewayResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(GatewayError::Configuration(format!("{key}: expected a boolean, got {value:?}"))),
    }
}

fn parse_u64(key: &str, value: &str) -> GatewayResult<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| GatewayError::Configuration(format!("{key}: expected a number, got {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn overlay(vars: &[(&str, &str)]) -> GatewayResult<GatewayConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        GatewayConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_match_development_network() {
        let c = GatewayConfig::default();
        assert_eq!(c.channel_name, "my-channel1");
        assert_eq!(c.contract_name, "chaincode1");
        assert_eq!(c.admin_user, "admin");
        assert_eq!(c.admin_password.expose(), "adminpw");
        assert_eq!(c.msp_id, "Org1MSP");
        assert_eq!(c.wallet_path, PathBuf::from("./wallets"));
        assert!(c.ca_url.is_none());
        assert!(c.pool.is_none());
        assert!(c.validate().is_ok());
    }

    #[test]
    fn environment_overrides_defaults() {
        let c = overlay(&[
            ("FABRIC_CHANNEL_NAME", "prod-channel"),
            ("FABRIC_CHAINCODE_NAME", "kv"),
            ("FABRIC_CA_URL", "https://ca:7054"),
            ("FABRIC_ADMIN_PASSWORD", "s3cret"),
            ("FABRIC_TIMEOUT_SECS", "5"),
            ("FABRIC_DISCOVERY_AS_LOCALHOST", "false"),
        ])
        .unwrap();
        assert_eq!(c.channel_name, "prod-channel");
        assert_eq!(c.contract_name, "kv");
        assert_eq!(c.ca_url.as_deref(), Some("https://ca:7054"));
        assert_eq!(c.admin_password.expose(), "s3cret");
        assert_eq!(c.timeouts.submit, Duration::from_secs(5));
        assert!(!c.connect_options().as_localhost);
    }

    #[test]
    fn blank_variables_are_ignored() {
        let c = overlay(&[("FABRIC_MSP_ID", "  ")]).unwrap();
        assert_eq!(c.msp_id, "Org1MSP");
    }

    #[test]
    fn invalid_numbers_are_configuration_errors() {
        let err = overlay(&[("FABRIC_TIMEOUT_SECS", "soon")]).unwrap_err();
        assert!(matches!(err, GatewayError::Configuration(_)));
        assert!(overlay(&[("FABRIC_TIMEOUT_SECS", "0")]).is_err());
    }

    #[test]
    fn pool_size_enables_pooling() {
        let c = overlay(&[("FABRIC_POOL_SIZE", "4"), ("FABRIC_POOL_IDLE_SECS", "10")]).unwrap();
        let pool = c.pool.unwrap();
        assert_eq!(pool.max_size, 4);
        assert_eq!(pool.idle_timeout, Duration::from_secs(10));
        assert!(overlay(&[("FABRIC_POOL_SIZE", "0")]).unwrap().pool.is_none());
    }

    #[test]
    fn toml_document_overrides_selected_fields() {
        let c = GatewayConfig::from_toml_str(
            r#"
            channel_name = "ch2"
            admin_password = "pw"

            [timeouts]
            connect = 3

            [pool]
            max_size = 2
            "#,
        )
        .unwrap();
        assert_eq!(c.channel_name, "ch2");
        assert_eq!(c.contract_name, "chaincode1");
        assert_eq!(c.timeouts.connect, Duration::from_secs(3));
        assert_eq!(c.timeouts.submit, DEFAULT_TIMEOUT);
        assert_eq!(c.pool.unwrap().max_size, 2);
    }

    #[test]
    fn oversized_pool_is_rejected() {
        let err = overlay(&[("FABRIC_POOL_SIZE", "18446744073709551615")]).unwrap_err();
        assert!(matches!(err, GatewayError::Configuration(_)));

        let limit = overlay(&[("FABRIC_POOL_SIZE", &Semaphore::MAX_PERMITS.to_string())]).unwrap();
        assert_eq!(limit.pool.unwrap().max_size, Semaphore::MAX_PERMITS);

        let doc = format!("[pool]\nmax_size = {}\n", Semaphore::MAX_PERMITS as u64 + 1);
        let err = GatewayConfig::from_toml_str(&doc).unwrap_err();
        assert!(matches!(err, GatewayError::Configuration(_)));
    }

    #[test]
    fn toml_rejects_unknown_fields() {
        assert!(GatewayConfig::from_toml_str("chanel_name = \"typo\"").is_err());
    }

    #[test]
    fn debug_redacts_admin_password() {
        let debug = format!("{:?}", GatewayConfig::default());
        assert!(!debug.contains("adminpw"));
    }
}
