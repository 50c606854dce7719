use shared::error::{ErrorCode, ErrorNotice};
use thiserror::Error;

/// Failure reported by the managed authentication/document backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("user account is disabled")]
    UserDisabled,
    #[error("session expired; sign in again")]
    SessionExpired,
    #[error("no signed-in user on this auth instance")]
    NotSignedIn,
    #[error("email address is already in use")]
    EmailAlreadyInUse,
    #[error("email address is malformed")]
    InvalidEmail,
    #[error("password is too weak")]
    WeakPassword,
    #[error("too many attempts; try again later")]
    TooManyAttempts,
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("backend rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("failed to decode backend payload: {0}")]
    Decode(String),
    #[error("credential persistence failed: {0}")]
    Persistence(String),
}

impl BackendError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidCredentials
            | Self::UserDisabled
            | Self::SessionExpired
            | Self::NotSignedIn => ErrorCode::Credential,
            Self::PermissionDenied(_) => ErrorCode::Forbidden,
            Self::EmailAlreadyInUse => ErrorCode::Conflict,
            Self::InvalidEmail | Self::WeakPassword => ErrorCode::Validation,
            Self::TooManyAttempts => ErrorCode::RateLimited,
            Self::Unavailable(_) => ErrorCode::Unavailable,
            Self::Rejected { .. } | Self::Decode(_) | Self::Persistence(_) => ErrorCode::Internal,
        }
    }

    /// Message suitable for a screen. Availability and internal failures all
    /// collapse into one generic message.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "Invalid email or password.",
            Self::UserDisabled => "This account has been disabled.",
            Self::SessionExpired | Self::NotSignedIn => "Your session has ended; please sign in again.",
            Self::EmailAlreadyInUse => "This email is already in use.",
            Self::InvalidEmail => "Invalid email format.",
            Self::WeakPassword => "Password must be at least 6 characters.",
            Self::TooManyAttempts => "Too many attempts; please try again later.",
            Self::PermissionDenied(_) => "You are not allowed to do that.",
            Self::Unavailable(_) | Self::Rejected { .. } | Self::Decode(_) | Self::Persistence(_) => {
                "Something went wrong; please try again."
            }
        }
    }

    pub fn notice(&self) -> ErrorNotice {
        ErrorNotice::new(self.code(), self.user_message())
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Unavailable(err.to_string())
        }
    }
}
