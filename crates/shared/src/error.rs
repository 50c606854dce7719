use serde::{Deserialize, Serialize};

/// Coarse failure class used to pick what a screen shows the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Credential,
    Forbidden,
    Conflict,
    Validation,
    NotFound,
    RateLimited,
    Unavailable,
    Internal,
}

impl ErrorCode {
    /// Credential and validation failures are actionable by the user; the rest
    /// get a generic message.
    pub fn is_user_actionable(self) -> bool {
        matches!(
            self,
            Self::Credential | Self::Conflict | Self::Validation | Self::RateLimited
        )
    }
}

/// A failure as presented to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorNotice {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorNotice {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}
