//! Share model: one party's persistent state for one joint key

use crate::{scheme::Scope, Error, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Fresh share id: UUID v4 without hyphens
pub fn new_share_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Share ids coming back from the peer must be usable as store keys
pub(crate) fn check_share_id(share_id: &str) -> Result<()> {
    if share_id.is_empty() || !share_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(Error::ProtocolAbort(format!(
            "peer returned an unusable share id {share_id:?}"
        )));
    }
    Ok(())
}

/// Position of a party in the two-party protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PartyRole {
    /// Party 0, the local side that opens the channel
    Initiator,
    /// Party 1, the counterparty answering on the channel
    Responder,
}

impl PartyRole {
    pub fn index(self) -> u8 {
        match self {
            PartyRole::Initiator => 0,
            PartyRole::Responder => 1,
        }
    }
}

impl TryFrom<u8> for PartyRole {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(PartyRole::Initiator),
            1 => Ok(PartyRole::Responder),
            other => Err(format!("party must be 0 or 1, got {other}")),
        }
    }
}

impl From<PartyRole> for u8 {
    fn from(role: PartyRole) -> u8 {
        role.index()
    }
}

/// One party's share of a joint key.
///
/// `share_detail` is opaque outside the protocol modules. It is wiped on
/// drop and never shown by `Debug`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct SavedShare {
    /// Owner name used for routing and lookup
    #[zeroize(skip)]
    pub identity_id: String,

    /// Changes on every rotation
    #[zeroize(skip)]
    pub share_id: String,

    #[zeroize(skip)]
    pub scope: Scope,

    #[zeroize(skip)]
    pub party: PartyRole,

    /// Joint public key, SEC1 uncompressed for secp256k1, RFC 8032 for ed25519
    #[zeroize(skip)]
    #[serde(with = "hex_bytes")]
    pub uncompressed_pub: Vec<u8>,

    #[serde(with = "hex_bytes")]
    pub share_detail: Vec<u8>,
}

impl SavedShare {
    /// Build a share around a scheme-specific secret record
    pub fn new<T: Serialize>(
        identity_id: impl Into<String>,
        share_id: impl Into<String>,
        scope: Scope,
        party: PartyRole,
        uncompressed_pub: Vec<u8>,
        detail: &T,
    ) -> Result<Self> {
        let share_detail =
            serde_json::to_vec(detail).map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(Self {
            identity_id: identity_id.into(),
            share_id: share_id.into(),
            scope,
            party,
            uncompressed_pub,
            share_detail,
        })
    }

    /// Decode the scheme-specific secret record
    pub fn detail<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.share_detail).map_err(|e| {
            Error::InvalidInput(format!("share {} has malformed detail: {e}", self.share_id))
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Parse and validate share bytes handed in by a caller
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let malformed = |e: serde_json::Error| Error::InvalidInput(format!("malformed share: {e}"));
        let value: serde_json::Value = serde_json::from_slice(bytes).map_err(malformed)?;
        if let Some(tag) = value.get("scope").and_then(serde_json::Value::as_str) {
            Scope::from_tag(tag)?;
        }
        let share: SavedShare = serde_json::from_value(value).map_err(malformed)?;
        share.validate()?;
        Ok(share)
    }

    pub fn validate(&self) -> Result<()> {
        if self.share_id.is_empty() {
            return Err(Error::InvalidInput("share has empty share_id".to_string()));
        }
        if self.identity_id.is_empty() {
            return Err(Error::InvalidInput("share has empty identity_id".to_string()));
        }
        if self.share_detail.is_empty() {
            return Err(Error::InvalidInput(format!(
                "share {} has no secret detail",
                self.share_id
            )));
        }
        self.scope.params().validate_public_key(&self.uncompressed_pub)
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(&self.uncompressed_pub)
    }
}

impl fmt::Debug for SavedShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SavedShare")
            .field("identity_id", &self.identity_id)
            .field("share_id", &self.share_id)
            .field("scope", &self.scope)
            .field("party", &self.party)
            .field("uncompressed_pub", &hex::encode(&self.uncompressed_pub))
            .field("share_detail", &"<redacted>")
            .finish()
    }
}

/// Hex string encoding for byte fields
pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
