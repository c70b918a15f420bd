//! Error types for two-party threshold operations

use crate::scheme::Scope;
use thiserror::Error;

/// Result type alias for two-party operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running a threshold operation
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed caller input (digest length, share bytes, address)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Identity failed the syntactic check
    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    /// Scope tag is not a known scheme
    #[error("Unsupported scope: {0}")]
    UnsupportedScope(String),

    /// Share was handed to a routine for another scheme
    #[error("Scope mismatch: expected {expected}, got {actual}")]
    ScopeMismatch { expected: Scope, actual: Scope },

    /// Could not open the channel to the peer
    #[error("Connect error: {0}")]
    Connect(String),

    /// Transport failure on an open channel
    #[error("Channel error: {0}")]
    Channel(String),

    /// Timeout waiting for the peer
    #[error("Timeout waiting for {0}")]
    Timeout(String),

    /// Peer disconnected or answered out of sequence
    #[error("Protocol aborted: {0}")]
    ProtocolAbort(String),

    /// A cryptographic check inside the protocol failed
    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    /// Joint public key differs from the expected one
    #[error("Public key mismatch: {0}")]
    PublicKeyMismatch(String),

    /// Share is already in use by another operation
    #[error("Share busy: {0}")]
    ShareBusy(String),

    /// Share id is unknown to the store
    #[error("Share not found: {0}")]
    ShareNotFound(String),

    /// Scheme does not offer key export
    #[error("Export unsupported for scope {0}")]
    ExportUnsupported(Scope),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Cryptographic operation failed
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Fieldless classification of [`Error`], used for structured logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    InvalidIdentity,
    UnsupportedScope,
    ScopeMismatch,
    Connect,
    Channel,
    Timeout,
    ProtocolAbort,
    VerificationFailed,
    PublicKeyMismatch,
    ShareBusy,
    ShareNotFound,
    ExportUnsupported,
    Serialization,
    Deserialization,
    Crypto,
    Internal,
}

impl ErrorKind {
    /// Transport-level failures, safe to retry with a fresh session
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorKind::Connect | ErrorKind::Channel | ErrorKind::Timeout)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::InvalidIdentity => "invalid_identity",
            ErrorKind::UnsupportedScope => "unsupported_scope",
            ErrorKind::ScopeMismatch => "scope_mismatch",
            ErrorKind::Connect => "connect",
            ErrorKind::Channel => "channel",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ProtocolAbort => "protocol_abort",
            ErrorKind::VerificationFailed => "verification_failed",
            ErrorKind::PublicKeyMismatch => "public_key_mismatch",
            ErrorKind::ShareBusy => "share_busy",
            ErrorKind::ShareNotFound => "share_not_found",
            ErrorKind::ExportUnsupported => "export_unsupported",
            ErrorKind::Serialization => "serialization",
            ErrorKind::Deserialization => "deserialization",
            ErrorKind::Crypto => "crypto",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::InvalidIdentity(_) => ErrorKind::InvalidIdentity,
            Error::UnsupportedScope(_) => ErrorKind::UnsupportedScope,
            Error::ScopeMismatch { .. } => ErrorKind::ScopeMismatch,
            Error::Connect(_) => ErrorKind::Connect,
            Error::Channel(_) => ErrorKind::Channel,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::ProtocolAbort(_) => ErrorKind::ProtocolAbort,
            Error::VerificationFailed(_) => ErrorKind::VerificationFailed,
            Error::PublicKeyMismatch(_) => ErrorKind::PublicKeyMismatch,
            Error::ShareBusy(_) => ErrorKind::ShareBusy,
            Error::ShareNotFound(_) => ErrorKind::ShareNotFound,
            Error::ExportUnsupported(_) => ErrorKind::ExportUnsupported,
            Error::Serialization(_) => ErrorKind::Serialization,
            Error::Deserialization(_) => ErrorKind::Deserialization,
            Error::Crypto(_) => ErrorKind::Crypto,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Deserialization(e.to_string())
    }
}
