use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of one handler invocation. Failures are values, not errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HandlerResult {
    /// A successful result, optionally carrying a payload.
    pub fn ok(message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
            error: None,
        }
    }

    /// A failed result, optionally carrying error detail.
    pub fn fail(message: impl Into<String>, error: Option<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            error,
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }
}
