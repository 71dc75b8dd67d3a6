//! Error types for the school_drive crate.

use thiserror::Error;

use crate::validation::ValidationFailure;

/// Errors that can occur when talking to Google Drive or the local database.
#[derive(Error, Debug)]
pub enum DriveError {
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Failed to read credentials file: {0}")]
    CredentialsFileError(#[from] std::io::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Invalid payload: {0}")]
    Validation(#[from] ValidationFailure),

    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    #[error("No stored credential for user: {0}")]
    CredentialNotFound(String),

    #[error("JWT encoding error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),

    #[error("Token refresh failed: {0}")]
    TokenRefreshError(String),
}

impl DriveError {
    /// Whether the error came from the network rather than from local data.
    pub fn is_transport(&self) -> bool {
        matches!(self, DriveError::HttpError(_) | DriveError::ApiError { .. })
    }
}

/// Result type alias for DriveError.
pub type Result<T> = std::result::Result<T, DriveError>;
