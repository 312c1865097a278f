use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;

/// Confidential fields sent alongside a transaction but kept out of the
/// on-chain record.
pub type TransientMap = BTreeMap<String, Bytes>;

/// How a transaction is dispatched to the contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransactionMode {
    /// Read-only query against current state. Never mutates the ledger.
    Evaluate,
    /// State-changing proposal that waits for commit acknowledgment.
    Submit,
}

impl fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Evaluate => write!(f, "evaluate"),
            Self::Submit => write!(f, "submit"),
        }
    }
}

/// A single contract invocation.
///
/// `Debug` prints transient field names only; values never leave the request
/// except through the contract call itself.
#[derive(Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    operation: String,
    arguments: Vec<String>,
    transient: Option<TransientMap>,
    mode: TransactionMode,
}

impl TransactionRequest {
    pub fn new(operation: impl Into<String>, mode: TransactionMode) -> Self {
        Self {
            operation: operation.into(),
            arguments: Vec::new(),
            transient: None,
            mode,
        }
    }

    pub fn evaluate(operation: impl Into<String>) -> Self {
        Self::new(operation, TransactionMode::Evaluate)
    }

    pub fn submit(operation: impl Into<String>) -> Self {
        Self::new(operation, TransactionMode::Submit)
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.arguments.push(arg.into());
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments.extend(args.into_iter().map(Into::into));
        self
    }

    /// Attach one transient field.
    pub fn with_transient(mut self, field: impl Into<String>, value: impl Into<Bytes>) -> Self {
        self.transient
            .get_or_insert_with(TransientMap::new)
            .insert(field.into(), value.into());
        self
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    pub fn transient(&self) -> Option<&TransientMap> {
        self.transient.as_ref()
    }

    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    pub fn has_transient(&self) -> bool {
        self.transient.as_ref().is_some_and(|t| !t.is_empty())
    }
}

impl fmt::Debug for TransactionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let transient_fields: Option<Vec<&str>> = self
            .transient
            .as_ref()
            .map(|t| t.keys().map(String::as_str).collect());
        f.debug_struct("TransactionRequest")
            .field("operation", &self.operation)
            .field("arguments", &self.arguments)
            .field("transient_fields", &transient_fields)
            .field("mode", &self.mode)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_arguments_in_order() {
        let req = TransactionRequest::submit("KVContract:put")
            .with_arg("k")
            .with_args(["v1", "v2"]);
        assert_eq!(req.operation(), "KVContract:put");
        assert_eq!(req.arguments(), ["k", "v1", "v2"]);
        assert_eq!(req.mode(), TransactionMode::Submit);
        assert!(!req.has_transient());
    }

    #[test]
    fn transient_fields_are_attached() {
        let req = TransactionRequest::evaluate("KVContract:verifyPrivateMessage")
            .with_arg("coll")
            .with_transient("message", "secret".to_string());
        assert!(req.has_transient());
        let t = req.transient().unwrap();
        assert_eq!(t.get("message").unwrap().as_ref(), b"secret");
    }

    #[test]
    fn debug_hides_transient_values() {
        let req = TransactionRequest::submit("op").with_transient("message", "top-secret".to_string());
        let debug = format!("{req:?}");
        assert!(debug.contains("message"));
        assert!(!debug.contains("top-secret"));
    }

    #[test]
    fn mode_display() {
        assert_eq!(TransactionMode::Evaluate.to_string(), "evaluate");
        assert_eq!(TransactionMode::Submit.to_string(), "submit");
    }
}
