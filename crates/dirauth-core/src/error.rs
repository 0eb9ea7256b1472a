//! Error types for Dirauth

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // Configuration Errors
    #[error("Directory configuration error: {0}")]
    Configuration(String),

    // Transport Errors
    #[error("Directory unavailable: {0}")]
    DirectoryUnavailable(String),

    #[error("TLS certificate verification failed: {0}")]
    TlsVerification(String),

    // Resolution Errors
    #[error("No directory entry matches identifier: {0}")]
    UserNotFound(String),

    #[error("Identifier {identifier} matches {matches} directory entries")]
    AmbiguousUser { identifier: String, matches: usize },

    #[error("Could not extract user id: {0}")]
    IdentifierExtraction(String),

    // Credential Errors
    #[error("Empty credentials are never sent to the directory")]
    EmptyCredential,

    #[error("Invalid credentials")]
    InvalidCredential,

    // Settings Errors
    #[error("Settings store error: {0}")]
    Settings(String),

    #[error("Access Denied: {0}")]
    AccessDenied(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Error::Configuration(_) => "ConfigurationError",
            Error::DirectoryUnavailable(_) => "DirectoryUnavailable",
            Error::TlsVerification(_) => "TlsVerificationError",
            Error::UserNotFound(_) => "UserNotFound",
            Error::AmbiguousUser { .. } => "AmbiguousUser",
            Error::IdentifierExtraction(_) => "IdentifierExtractionError",
            Error::EmptyCredential => "EmptyCredential",
            Error::InvalidCredential => "InvalidCredential",
            Error::Settings(_) => "SettingsError",
            Error::AccessDenied(_) => "AccessDenied",
            Error::Io(_) => "InternalError",
            Error::Serialization(_) => "InternalError",
            Error::Other(_) => "InternalError",
        }
    }

    /// Whether a later attempt may succeed without any change to config or data.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::DirectoryUnavailable(_) | Error::TlsVerification(_) | Error::Io(_)
        )
    }
}

/// The only authentication outcome shown to end users.
///
/// Directory outages, unknown users and wrong passwords all look the same
/// from the outside; the underlying [`Error`] goes to the operator log.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Authentication failed")]
pub struct AuthenticationFailed;

impl From<Error> for AuthenticationFailed {
    fn from(_: Error) -> Self {
        AuthenticationFailed
    }
}
