use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Static description of the ledger network, parsed from a connection
/// profile document.
///
/// The descriptor is loaded once per process and shared read-only. Unknown
/// profile sections are ignored so profiles generated by network tooling
/// load without edits.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologyDescriptor {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub client: Option<ClientInfo>,
    #[serde(default)]
    pub organizations: BTreeMap<String, OrganizationInfo>,
    #[serde(default)]
    pub peers: BTreeMap<String, Endpoint>,
    #[serde(default)]
    pub orderers: BTreeMap<String, Endpoint>,
    #[serde(default)]
    pub certificate_authorities: BTreeMap<String, CertificateAuthorityInfo>,
    #[serde(default)]
    pub channels: BTreeMap<String, ChannelInfo>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    #[serde(default)]
    pub organization: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationInfo {
    #[serde(default)]
    pub mspid: String,
    #[serde(default)]
    pub peers: Vec<String>,
    #[serde(default)]
    pub certificate_authorities: Vec<String>,
}

/// A network endpoint (peer or orderer).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateAuthorityInfo {
    pub url: String,
    #[serde(default)]
    pub ca_name: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelInfo {
    #[serde(default)]
    pub peers: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub orderers: Vec<String>,
}

impl TopologyDescriptor {
    /// Parse a JSON connection profile.
    pub fn from_json_slice(data: &[u8]) -> Result<Self, TypeError> {
        let descriptor: Self = serde_json::from_slice(data)
            .map_err(|e| TypeError::InvalidTopology(e.to_string()))?;
        for (name, ca) in &descriptor.certificate_authorities {
            if ca.url.is_empty() {
                return Err(TypeError::InvalidTopology(format!(
                    "certificate authority {name} has no url"
                )));
            }
        }
        Ok(descriptor)
    }

    pub fn to_json_pretty(&self) -> Result<String, TypeError> {
        serde_json::to_string_pretty(self).map_err(|e| TypeError::Serialization(e.to_string()))
    }

    pub fn certificate_authority(&self, name: &str) -> Option<&CertificateAuthorityInfo> {
        self.certificate_authorities.get(name)
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    pub fn channel_names(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }

    /// Peer and orderer endpoints, peers first.
    pub fn endpoints(&self) -> Vec<(&str, &Endpoint)> {
        self.peers
            .iter()
            .chain(self.orderers.iter())
            .map(|(name, ep)| (name.as_str(), ep))
            .collect()
    }

    /// MSP id of the organization named in the `client` section, if any.
    pub fn client_msp_id(&self) -> Option<&str> {
        let org = &self.client.as_ref()?.organization;
        self.organizations
            .get(org)
            .map(|o| o.mspid.as_str())
            .filter(|m| !m.is_empty())
    }
}
