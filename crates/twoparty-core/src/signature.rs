//! Signature values produced by the sign operation

use crate::{scheme::Scope, Error, Result};
use serde::{Deserialize, Serialize};

/// ECDSA signature over secp256k1.
///
/// `r` and `s` are 32-byte big-endian scalars, hex-encoded in JSON. `s` is
/// always in the lower half of the group order. `v` is the recovery id in
/// `{0, 1}`: the parity of the nonce point's y-coordinate after low-s
/// normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcdsaSignature {
    #[serde(with = "hex_array")]
    pub r: [u8; 32],
    #[serde(with = "hex_array")]
    pub s: [u8; 32],
    pub v: u8,
}

impl EcdsaSignature {
    pub fn new(r: [u8; 32], s: [u8; 32], v: u8) -> Self {
        Self { r, s, v }
    }

    /// `r || s || v`
    pub fn to_bytes(&self) -> [u8; 65] {
        let mut bytes = [0u8; 65];
        bytes[..32].copy_from_slice(&self.r);
        bytes[32..64].copy_from_slice(&self.s);
        bytes[64] = self.v;
        bytes
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Convert to DER format
    pub fn to_der(&self) -> Result<Vec<u8>> {
        let sig = k256::ecdsa::Signature::from_scalars(
            *k256::FieldBytes::from_slice(&self.r),
            *k256::FieldBytes::from_slice(&self.s),
        )
        .map_err(|e| Error::Crypto(e.to_string()))?;
        Ok(sig.to_der().as_bytes().to_vec())
    }
}

/// Signature of either scheme
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signature {
    Ecdsa(EcdsaSignature),
    /// RFC 8032 `R || S`
    Eddsa([u8; 64]),
}

impl Signature {
    pub fn scope(&self) -> Scope {
        match self {
            Signature::Ecdsa(_) => Scope::Secp256k1Ecdsa,
            Signature::Eddsa(_) => Scope::Ed25519Eddsa,
        }
    }

    /// Bytes handed across the boundary: JSON `{r, s, v}` for ECDSA, raw
    /// 64 bytes for Ed25519
    pub fn to_payload(&self) -> Result<Vec<u8>> {
        match self {
            Signature::Ecdsa(sig) => sig.to_json(),
            Signature::Eddsa(bytes) => Ok(bytes.to_vec()),
        }
    }

    /// Fixed-width raw encoding
    pub fn to_raw(&self) -> Vec<u8> {
        match self {
            Signature::Ecdsa(sig) => sig.to_bytes().to_vec(),
            Signature::Eddsa(bytes) => bytes.to_vec(),
        }
    }
}

mod hex_array {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("Invalid scalar length"))
    }
}
