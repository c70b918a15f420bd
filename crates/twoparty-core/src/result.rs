//! Two-case operation outcome handed across the language boundary

use crate::{Error, ErrorKind};

/// Outcome of one operation as seen by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationResult {
    /// Operation payload: share bytes, signature bytes or exported key
    Ok(Vec<u8>),
    /// Error kind plus a human-readable message
    Err { kind: ErrorKind, message: String },
}

impl OperationResult {
    pub fn from_result(result: crate::Result<Vec<u8>>) -> Self {
        match result {
            Ok(payload) => OperationResult::Ok(payload),
            Err(e) => OperationResult::from(e),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, OperationResult::Ok(_))
    }

    pub fn payload(&self) -> Option<&[u8]> {
        match self {
            OperationResult::Ok(payload) => Some(payload),
            OperationResult::Err { .. } => None,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            OperationResult::Ok(_) => None,
            OperationResult::Err { kind, .. } => Some(*kind),
        }
    }

    /// Flatten to the legacy array shape: one element on success, an empty
    /// placeholder plus the UTF-8 message on failure
    pub fn into_wire(self) -> Vec<Vec<u8>> {
        match self {
            OperationResult::Ok(payload) => vec![payload],
            OperationResult::Err { message, .. } => vec![Vec::new(), message.into_bytes()],
        }
    }

    /// Inverse of [`into_wire`](Self::into_wire); the kind of a flattened
    /// error is no longer known and reads back as `Internal`
    pub fn from_wire(mut parts: Vec<Vec<u8>>) -> Option<Self> {
        match parts.len() {
            1 => parts.pop().map(OperationResult::Ok),
            2 => {
                let message = String::from_utf8_lossy(&parts[1]).into_owned();
                Some(OperationResult::Err {
                    kind: ErrorKind::Internal,
                    message,
                })
            }
            _ => None,
        }
    }
}

impl From<Error> for OperationResult {
    fn from(e: Error) -> Self {
        OperationResult::Err {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}
