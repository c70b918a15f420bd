//! Scheme registry and the operation-set capability shared by all schemes

use crate::{
    channel::RoundContext, share::SavedShare, signature::Signature, Error, Result,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum identity length in bytes
pub const MAX_IDENTITY_LEN: usize = 128;

/// Maximum message length accepted for Ed25519 signing
pub const MAX_ED25519_MESSAGE_LEN: usize = 4096;

/// Signature scheme and curve of a share lineage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    #[serde(rename = "SECP256K1_ECDSA")]
    Secp256k1Ecdsa,
    #[serde(rename = "ED25519_EDDSA")]
    Ed25519Eddsa,
}

impl Scope {
    pub const ALL: [Scope; 2] = [Scope::Secp256k1Ecdsa, Scope::Ed25519Eddsa];

    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Secp256k1Ecdsa => "SECP256K1_ECDSA",
            Scope::Ed25519Eddsa => "ED25519_EDDSA",
        }
    }

    /// Look up a scope by its tag
    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag {
            "SECP256K1_ECDSA" => Ok(Scope::Secp256k1Ecdsa),
            "ED25519_EDDSA" => Ok(Scope::Ed25519Eddsa),
            other => Err(Error::UnsupportedScope(other.to_string())),
        }
    }

    pub fn params(self) -> &'static SchemeParams {
        match self {
            Scope::Secp256k1Ecdsa => &SECP256K1_PARAMS,
            Scope::Ed25519Eddsa => &ED25519_PARAMS,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "secp256k1" | "secp256k1_ecdsa" => Ok(Scope::Secp256k1Ecdsa),
            "ed25519" | "ed25519_eddsa" => Ok(Scope::Ed25519Eddsa),
            _ => Err(Error::UnsupportedScope(s.to_string())),
        }
    }
}

/// Accepted digest lengths for a scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestRule {
    /// Digest must be exactly this many bytes
    Exact(usize),
    /// Any non-empty message up to this many bytes
    UpTo(usize),
}

/// Byte-layout rules and capabilities of a scheme
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemeParams {
    pub scope: Scope,
    /// Length of `uncompressed_pub`
    pub public_key_len: usize,
    /// Length of the raw signature bytes
    pub signature_len: usize,
    pub digest: DigestRule,
    /// Same message and same public key always give the same signature
    pub deterministic_signing: bool,
    pub supports_export: bool,
}

static SECP256K1_PARAMS: SchemeParams = SchemeParams {
    scope: Scope::Secp256k1Ecdsa,
    public_key_len: 65,
    signature_len: 65,
    digest: DigestRule::Exact(32),
    deterministic_signing: false,
    supports_export: true,
};

static ED25519_PARAMS: SchemeParams = SchemeParams {
    scope: Scope::Ed25519Eddsa,
    public_key_len: 32,
    signature_len: 64,
    digest: DigestRule::UpTo(MAX_ED25519_MESSAGE_LEN),
    deterministic_signing: true,
    supports_export: false,
};

impl SchemeParams {
    pub fn validate_digest(&self, digest: &[u8]) -> Result<()> {
        match self.digest {
            DigestRule::Exact(len) if digest.len() != len => Err(Error::InvalidInput(format!(
                "{} digest must be {} bytes, got {}",
                self.scope,
                len,
                digest.len()
            ))),
            DigestRule::UpTo(max) if digest.is_empty() || digest.len() > max => {
                Err(Error::InvalidInput(format!(
                    "{} message must be 1..={} bytes, got {}",
                    self.scope,
                    max,
                    digest.len()
                )))
            }
            _ => Ok(()),
        }
    }

    pub fn validate_public_key(&self, public_key: &[u8]) -> Result<()> {
        if public_key.len() != self.public_key_len {
            return Err(Error::InvalidInput(format!(
                "{} public key must be {} bytes, got {}",
                self.scope,
                self.public_key_len,
                public_key.len()
            )));
        }
        if self.scope == Scope::Secp256k1Ecdsa && public_key[0] != 0x04 {
            return Err(Error::InvalidInput(
                "secp256k1 public key must be uncompressed SEC1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Syntactic identity check: non-empty, bounded, printable
pub fn validate_identity(identity_id: &str) -> Result<()> {
    if identity_id.is_empty() {
        return Err(Error::InvalidIdentity("identity is empty".to_string()));
    }
    if identity_id.len() > MAX_IDENTITY_LEN {
        return Err(Error::InvalidIdentity(format!(
            "identity exceeds {MAX_IDENTITY_LEN} bytes"
        )));
    }
    if identity_id.chars().any(char::is_control) {
        return Err(Error::InvalidIdentity(format!(
            "identity {identity_id:?} contains control characters"
        )));
    }
    Ok(())
}

/// Operations every two-party scheme offers, run by the initiating party
#[async_trait]
pub trait ThresholdScheme: Send + Sync {
    fn scope(&self) -> Scope;

    /// Generate a fresh joint key
    async fn keygen(&self, ctx: &mut RoundContext<'_>, identity_id: &str) -> Result<SavedShare>;

    /// Sign a caller-supplied digest
    async fn sign(
        &self,
        ctx: &mut RoundContext<'_>,
        share: &SavedShare,
        digest: &[u8],
    ) -> Result<Signature>;

    /// Refresh both shares under an unchanged public key
    async fn rotate(&self, ctx: &mut RoundContext<'_>, share: &SavedShare) -> Result<SavedShare>;

    fn params(&self) -> &'static SchemeParams {
        self.scope().params()
    }

    /// Reject shares of another scheme
    fn check_scope(&self, share: &SavedShare) -> Result<()> {
        if share.scope != self.scope() {
            return Err(Error::ScopeMismatch {
                expected: self.scope(),
                actual: share.scope,
            });
        }
        Ok(())
    }
}

/// Schemes that can cooperatively reconstruct the private key
#[async_trait]
pub trait Exportable: ThresholdScheme {
    /// Returns the private scalar, hex-encoded
    async fn export(&self, ctx: &mut RoundContext<'_>, share: &SavedShare) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_tag() {
        assert_eq!(Scope::from_tag("SECP256K1_ECDSA").unwrap(), Scope::Secp256k1Ecdsa);
        assert_eq!(Scope::from_tag("ED25519_EDDSA").unwrap(), Scope::Ed25519Eddsa);
        assert!(matches!(
            Scope::from_tag("BLS12_381"),
            Err(Error::UnsupportedScope(tag)) if tag == "BLS12_381"
        ));
    }

    #[test]
    fn test_scope_serde_uses_tags() {
        let json = serde_json::to_string(&Scope::Ed25519Eddsa).unwrap();
        assert_eq!(json, "\"ED25519_EDDSA\"");
        let parsed: Scope = serde_json::from_str("\"SECP256K1_ECDSA\"").unwrap();
        assert_eq!(parsed, Scope::Secp256k1Ecdsa);
    }

    #[test]
    fn test_short_names_parse() {
        assert_eq!("secp256k1".parse::<Scope>().unwrap(), Scope::Secp256k1Ecdsa);
        assert_eq!("Ed25519".parse::<Scope>().unwrap(), Scope::Ed25519Eddsa);
        assert!("p256".parse::<Scope>().is_err());
    }

    #[test]
    fn test_params() {
        let secp = Scope::Secp256k1Ecdsa.params();
        assert_eq!(secp.public_key_len, 65);
        assert!(secp.supports_export);
        assert!(!secp.deterministic_signing);

        let ed = Scope::Ed25519Eddsa.params();
        assert_eq!(ed.public_key_len, 32);
        assert_eq!(ed.signature_len, 64);
        assert!(!ed.supports_export);
        assert!(ed.deterministic_signing);
    }

    #[test]
    fn test_digest_rules() {
        let secp = Scope::Secp256k1Ecdsa.params();
        assert!(secp.validate_digest(&[7u8; 32]).is_ok());
        assert!(matches!(secp.validate_digest(&[7u8; 31]), Err(Error::InvalidInput(_))));
        assert!(secp.validate_digest(&[]).is_err());

        let ed = Scope::Ed25519Eddsa.params();
        assert!(ed.validate_digest(&[1, 2, 3, 4]).is_ok());
        assert!(ed.validate_digest(&[]).is_err());
        assert!(ed.validate_digest(&vec![0u8; MAX_ED25519_MESSAGE_LEN + 1]).is_err());
    }

    #[test]
    fn test_public_key_layout() {
        let secp = Scope::Secp256k1Ecdsa.params();
        let mut key = [0u8; 65];
        assert!(secp.validate_public_key(&key).is_err());
        key[0] = 0x04;
        assert!(secp.validate_public_key(&key).is_ok());
        assert!(secp.validate_public_key(&key[..33]).is_err());
    }

    #[test]
    fn test_identity_check() {
        assert!(validate_identity("wangcy").is_ok());
        assert!(matches!(validate_identity(""), Err(Error::InvalidIdentity(_))));
        assert!(validate_identity(&"a".repeat(MAX_IDENTITY_LEN)).is_ok());
        assert!(validate_identity(&"a".repeat(MAX_IDENTITY_LEN + 1)).is_err());
        assert!(validate_identity("bad\nname").is_err());
    }
}
