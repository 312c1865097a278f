use std::path::Path;
use std::sync::Arc;

use tracing::info;

use lkv_types::TopologyDescriptor;

use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};

/// Loads the connection profile once and checks it against the configuration.
///
/// The returned descriptor is shared read-only for the life of the process.
pub struct TopologyLoader;

impl TopologyLoader {
    /// Read and validate the profile named by `config.connection_profile`.
    pub fn load(config: &GatewayConfig) -> GatewayResult<Arc<TopologyDescriptor>> {
        let topology = Self::load_path(&config.connection_profile)?;
        Self::validate(&topology, config)?;
        info!(
            profile = %config.connection_profile.display(),
            name = %topology.name,
            channels = topology.channels.len(),
            "connection profile loaded"
        );
        Ok(Arc::new(topology))
    }

    /// Parse a profile without checking it against a configuration.
    pub fn load_path(path: &Path) -> GatewayResult<TopologyDescriptor> {
        let data = std::fs::read(path).map_err(|e| {
            GatewayError::Configuration(format!(
                "cannot read connection profile {}: {e}",
                path.display()
            ))
        })?;
        Self::parse(&data)
    }

    pub fn parse(data: &[u8]) -> GatewayResult<TopologyDescriptor> {
        TopologyDescriptor::from_json_slice(data)
            .map_err(|e| GatewayError::Configuration(e.to_string()))
    }

    /// The configured CA and channel must both be named in the profile.
    pub fn validate(topology: &TopologyDescriptor, config: &GatewayConfig) -> GatewayResult<()> {
        if topology.certificate_authority(&config.ca_name).is_none() {
            return Err(GatewayError::Configuration(format!(
                "unknown CA {}",
                config.ca_name
            )));
        }
        if !topology.has_channel(&config.channel_name) {
            return Err(GatewayError::Configuration(format!(
                "channel {} is not defined in the connection profile",
                config.channel_name
            )));
        }
        if let Some(msp) = topology.client_msp_id() {
            if msp != config.msp_id {
                tracing::warn!(
                    profile_msp = msp,
                    configured_msp = %config.msp_id,
                    "client organization MSP differs from configured MSP id"
                );
            }
        }
        Ok(())
    }
}
