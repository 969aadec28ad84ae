use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid OAuth configuration: {0}")]
    InvalidConfig(String),

    #[error("A sign-in is already waiting for its redirect")]
    SignInInProgress,

    #[error("No sign-in is in progress")]
    NoSignInInProgress,

    #[error("Sign-in expired before the redirect arrived")]
    SignInExpired,

    #[error("OAuth state mismatch")]
    StateMismatch,

    #[error("Authorization code rejected: {0}")]
    InvalidAuthCode(String),

    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),

    #[error("No refresh token stored for the session")]
    NoRefreshToken,

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Failed to fetch user profile: {0}")]
    ProfileFetchFailed(String),

    #[error("Secure storage unavailable: {0}")]
    SecureStorageUnavailable(String),

    #[error("Stored credentials are corrupted: {0}")]
    TokenCorrupted(String),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("{operation} timed out")]
    OperationTimeout { operation: String },
}

impl AuthError {
    /// Whether repeating the same step may succeed without user action on
    /// the account itself.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AuthError::NetworkError(_)
                | AuthError::OperationTimeout { .. }
                | AuthError::SecureStorageUnavailable(_)
                | AuthError::ProfileFetchFailed(_)
                | AuthError::SignInExpired
        )
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
