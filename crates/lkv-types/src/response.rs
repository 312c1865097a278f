use serde::Deserialize;
use serde_json::Value;

/// Sentinel the contract returns when a key or collection entry is absent.
pub const NOT_FOUND: &str = "NOT_FOUND";

/// Sentinel the contract returns when a private message does not match.
pub const VERIFICATION_FAILED: &str = "VERIFICATION_FAILED";

/// Raw envelope written by the contract: `{"success": ..}` or `{"error": ".."}`.
#[derive(Debug, Deserialize)]
struct ResponseEnvelope {
    #[serde(default)]
    success: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

/// Classified outcome of a contract invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransactionResult {
    Success { payload: Vec<u8> },
    NotFound,
    VerificationFailed,
    Error { message: String },
}

impl TransactionResult {
    /// Deserialize and classify a raw contract response in one step.
    ///
    /// An `error` field takes precedence over `success`. A string `success`
    /// value becomes the payload verbatim; any other JSON value is
    /// re-serialized.
    pub fn from_response(raw: &[u8]) -> Self {
        let envelope: ResponseEnvelope = match serde_json::from_slice(raw) {
            Ok(env) => env,
            Err(e) => {
                return Self::Error {
                    message: format!("malformed response envelope: {e}"),
                }
            }
        };

        match (envelope.error, envelope.success) {
            (Some(Value::String(code)), _) => match code.as_str() {
                NOT_FOUND => Self::NotFound,
                VERIFICATION_FAILED => Self::VerificationFailed,
                _ => Self::Error {
                    message: format!("contract returned error: {code}"),
                },
            },
            (Some(Value::Null), Some(success)) => Self::success_from(success),
            (Some(other), _) => Self::Error {
                message: format!("contract returned error: {other}"),
            },
            (None, Some(success)) => Self::success_from(success),
            (None, None) => Self::Error {
                message: "response envelope has neither success nor error".into(),
            },
        }
    }

    fn success_from(value: Value) -> Self {
        let payload = match value {
            Value::String(s) => s.into_bytes(),
            other => other.to_string().into_bytes(),
        };
        Self::Success { payload }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Payload as UTF-8 text, if this is a success with a valid UTF-8 body.
    pub fn payload_str(&self) -> Option<&str> {
        match self {
            Self::Success { payload } => std::str::from_utf8(payload).ok(),
            _ => None,
        }
    }

    /// Short label for logs; never includes the payload.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::NotFound => "not_found",
            Self::VerificationFailed => "verification_failed",
            Self::Error { .. } => "error",
        }
    }
}
