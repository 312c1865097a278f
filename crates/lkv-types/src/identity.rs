use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// A string holding secret material (private keys, enrollment secrets).
///
/// `Debug` never prints the contents. Access goes through [`expose`](Self::expose)
/// so every read of the secret is visible at the call site.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The secret value.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString(<redacted>)")
    }
}

/// Kind of credential an identity carries. Only X.509 is issued by the CA.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentityKind {
    #[serde(rename = "X.509")]
    X509,
}

impl fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::X509 => write!(f, "X.509"),
        }
    }
}

/// Certificate and private key pair, both PEM-encoded.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct X509Credentials {
    pub certificate: String,
    pub private_key: SecretString,
}

impl fmt::Debug for X509Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("X509Credentials")
            .field("certificate_len", &self.certificate.len())
            .field("private_key", &self.private_key)
            .finish()
    }
}

/// A signing identity used to authenticate to the ledger network.
///
/// Identities are immutable once enrolled: the key store never rewrites an
/// existing entry, and nothing in the gateway mutates one after construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    name: String,
    credentials: X509Credentials,
    msp_id: String,
    kind: IdentityKind,
}

impl Identity {
    /// Build an X.509 identity, rejecting empty fields.
    pub fn x509(
        name: impl Into<String>,
        credentials: X509Credentials,
        msp_id: impl Into<String>,
    ) -> Result<Self, TypeError> {
        let name = name.into();
        let msp_id = msp_id.into();
        if name.is_empty() {
            return Err(TypeError::InvalidIdentity("empty identity name".into()));
        }
        if msp_id.is_empty() {
            return Err(TypeError::InvalidIdentity(format!("identity {name}: empty MSP id")));
        }
        if credentials.certificate.is_empty() || credentials.private_key.is_empty() {
            return Err(TypeError::InvalidIdentity(format!(
                "identity {name}: missing certificate or private key"
            )));
        }
        Ok(Self {
            name,
            credentials,
            msp_id,
            kind: IdentityKind::X509,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn credentials(&self) -> &X509Credentials {
        &self.credentials
    }

    pub fn certificate(&self) -> &str {
        &self.credentials.certificate
    }

    /// Membership service provider id (organizational membership tag).
    pub fn msp_id(&self) -> &str {
        &self.msp_id
    }

    pub fn kind(&self) -> IdentityKind {
        self.kind
    }
}
