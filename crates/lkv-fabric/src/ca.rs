use async_trait::async_trait;

use lkv_types::SecretString;

use crate::error::FabricResult;

/// Enrollment call against a certificate authority.
#[derive(Clone, Debug)]
pub struct EnrollmentRequest {
    pub ca_url: String,
    pub ca_name: Option<String>,
    pub enrollment_id: String,
    pub enrollment_secret: SecretString,
}

/// Material issued by a successful enrollment, PEM-encoded.
#[derive(Clone, Debug)]
pub struct Enrollment {
    pub certificate: String,
    pub private_key: SecretString,
}

/// Certificate-issuing service.
#[async_trait]
pub trait CertificateAuthority: Send + Sync {
    /// Enroll `request.enrollment_id`, returning a fresh certificate and key.
    ///
    /// Fails on bad credentials or when the service is unreachable.
    async fn enroll(&self, request: &EnrollmentRequest) -> FabricResult<Enrollment>;
}
