//! Round messages exchanged between the two parties

use crate::{scheme::Scope, Error, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Keygen,
    Sign,
    Rotate,
    Export,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Keygen => "keygen",
            Operation::Sign => "sign",
            Operation::Rotate => "rotate",
            Operation::Export => "export",
        })
    }
}

/// One protocol step sent by the initiator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundRequest {
    pub operation: Operation,
    pub scope: Scope,
    /// 1-based step within the operation
    pub step: u8,
    pub identity_id: String,
    /// Empty for keygen
    #[serde(default)]
    pub share_id: String,
    pub payload: serde_json::Value,
}

impl RoundRequest {
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            Error::InvalidInput(format!(
                "{} {} step {} payload: {e}",
                self.scope, self.operation, self.step
            ))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Ok,
    BadRequest,
    VerificationFailed,
    PublicKeyMismatch,
    ShareNotFound,
    Internal,
}

/// Responder's answer to a [`RoundRequest`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundResponse {
    pub status: Status,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RoundResponse {
    pub fn ok<T: Serialize>(payload: &T) -> Result<Self> {
        Ok(Self {
            status: Status::Ok,
            payload: serde_json::to_value(payload)
                .map_err(|e| Error::Serialization(e.to_string()))?,
            error: None,
        })
    }

    /// Map a responder-side failure onto a status code
    pub fn from_error(e: &Error) -> Self {
        let status = match e {
            Error::VerificationFailed(_) => Status::VerificationFailed,
            Error::PublicKeyMismatch(_) => Status::PublicKeyMismatch,
            Error::ShareNotFound(_) => Status::ShareNotFound,
            Error::InvalidInput(_)
            | Error::InvalidIdentity(_)
            | Error::UnsupportedScope(_)
            | Error::ScopeMismatch { .. }
            | Error::ExportUnsupported(_)
            | Error::Deserialization(_)
            | Error::ProtocolAbort(_) => Status::BadRequest,
            _ => Status::Internal,
        };
        Self {
            status,
            payload: serde_json::Value::Null,
            error: Some(e.to_string()),
        }
    }

    /// Turn a non-ok status back into an error and decode the payload
    pub fn into_payload<T: DeserializeOwned>(self, step: u8) -> Result<T> {
        let message = self.error.unwrap_or_else(|| "no detail".to_string());
        match self.status {
            Status::Ok => serde_json::from_value(self.payload).map_err(|e| {
                Error::ProtocolAbort(format!("malformed peer reply to step {step}: {e}"))
            }),
            Status::VerificationFailed => Err(Error::VerificationFailed(format!(
                "peer rejected step {step}: {message}"
            ))),
            Status::PublicKeyMismatch => Err(Error::PublicKeyMismatch(format!(
                "peer rejected step {step}: {message}"
            ))),
            status => Err(Error::ProtocolAbort(format!(
                "peer answered step {step} with {status:?}: {message}"
            ))),
        }
    }
}

/// Transport envelope carried in each channel message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub seq: u32,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub body: FrameBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum FrameBody {
    Request(RoundRequest),
    Response(RoundResponse),
}

impl Frame {
    pub fn new(seq: u32, body: FrameBody) -> Self {
        Self {
            seq,
            timestamp: chrono::Utc::now().timestamp_millis(),
            body,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| Error::ProtocolAbort(format!("malformed frame: {e}")))
    }
}
