use tracing::{debug, instrument};

use lkv_types::{TransactionMode, TransactionRequest, TransactionResult};

use crate::config::TimeoutConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::session::ContractHandle;

/// Sends transaction requests through a contract handle and classifies
/// the response.
///
/// Transient payloads travel with the request to the contract and are never
/// logged: spans record only whether one is present.
#[derive(Clone, Debug)]
pub struct TransactionDispatcher {
    timeouts: TimeoutConfig,
}

impl TransactionDispatcher {
    pub fn new(timeouts: TimeoutConfig) -> Self {
        Self { timeouts }
    }

    /// Evaluate or submit `request`, bounded by the per-mode timeout.
    ///
    /// Negative outcomes (`NotFound`, `VerificationFailed`) and contract
    /// error sentinels come back as a [`TransactionResult`]. Transport and
    /// endorsement failures are [`GatewayError::Dispatch`].
    #[instrument(
        skip_all,
        fields(
            operation = request.operation(),
            mode = %request.mode(),
            channel = handle.channel(),
            transient = request.has_transient(),
        )
    )]
    pub async fn invoke(
        &self,
        handle: &ContractHandle,
        request: &TransactionRequest,
    ) -> GatewayResult<TransactionResult> {
        let contract = handle.contract();
        let (step, limit, call) = match request.mode() {
            TransactionMode::Evaluate => ("evaluate", self.timeouts.evaluate, contract.evaluate(request)),
            TransactionMode::Submit => ("submit", self.timeouts.submit, contract.submit(request)),
        };

        let raw = tokio::time::timeout(limit, call)
            .await
            .map_err(|_| GatewayError::Timeout { step, after: limit })?
            .map_err(|source| GatewayError::Dispatch {
                operation: request.operation().to_string(),
                mode: request.mode(),
                source,
            })?;

        let result = TransactionResult::from_response(&raw);
        debug!(result = result.label(), bytes = raw.len(), "transaction completed");
        Ok(result)
    }
}
