//! Two-party EdDSA over ed25519.
//!
//! Shares are additive: each party holds a clamped secret `x_i` and a
//! 32-byte nonce prefix, and the joint key is `A = a·(Q1 + Q2)` with the
//! aggregation coefficient `a = H("agg" || Q1 || Q2)`. Nonces are derived
//! from the prefix, message and joint key, so signing is deterministic and
//! survives rotation, which only moves a random `δ` between the two secrets.

pub mod keygen;
pub mod rotate;
pub mod sign;

use crate::{
    channel::RoundContext,
    curve::{Curve, CurvePoint, CurveScalar, Ed25519},
    scheme::{Scope, ThresholdScheme},
    share::{hex_bytes, SavedShare},
    signature::Signature,
    Error, Result,
};
use async_trait::async_trait;
use curve25519_dalek::{EdwardsPoint, Scalar};
use rand::RngCore;
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};

/// Secret record held by either party
#[derive(Serialize, Deserialize)]
pub struct EdShare {
    /// `x_i`
    pub secret: CurveScalar<Ed25519>,
    /// Nonce derivation key, never rotated
    #[serde(with = "hex_bytes")]
    pub prefix: Vec<u8>,
    /// `a`, fixed at keygen
    pub agg_coefficient: CurveScalar<Ed25519>,
    pub public_share: CurvePoint<Ed25519>,
    pub peer_public_share: CurvePoint<Ed25519>,
    /// `A`
    pub public_key: CurvePoint<Ed25519>,
}

impl EdShare {
    /// Check the aggregate key against the stored shares
    pub(crate) fn aggregate_matches(&self) -> bool {
        aggregate(&self.agg_coefficient.0, &self.public_share.0, &self.peer_public_share.0)
            == self.public_key.0
    }
}

/// Per-party key material from a 32-byte seed, as in RFC 8032
pub(crate) struct SeedKey {
    pub secret: Scalar,
    pub prefix: [u8; 32],
}

impl SeedKey {
    pub fn random() -> Self {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        Self::from_seed(&seed)
    }

    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let h = Sha512::digest(seed);
        let mut lower = [0u8; 32];
        lower.copy_from_slice(&h[..32]);
        lower[0] &= 248;
        lower[31] &= 127;
        lower[31] |= 64;
        let mut prefix = [0u8; 32];
        prefix.copy_from_slice(&h[32..]);
        Self {
            secret: Scalar::from_bytes_mod_order(lower),
            prefix,
        }
    }
}

/// `a = H("agg" || Q_initiator || Q_responder)`
pub(crate) fn agg_coefficient(initiator: &EdwardsPoint, responder: &EdwardsPoint) -> Scalar {
    Ed25519::hash_to_scalar(&[
        b"twoparty/ed25519/agg",
        &Ed25519::encode_point(initiator),
        &Ed25519::encode_point(responder),
    ])
}

pub(crate) fn aggregate(a: &Scalar, q1: &EdwardsPoint, q2: &EdwardsPoint) -> EdwardsPoint {
    (q1 + q2) * a
}

pub(crate) fn detail(share: &SavedShare) -> Result<EdShare> {
    let detail: EdShare = share.detail()?;
    if detail.public_key.to_bytes() != share.uncompressed_pub {
        return Err(Error::InvalidInput(format!(
            "share {} detail does not match its public key",
            share.share_id
        )));
    }
    Ok(detail)
}

/// ed25519 EdDSA with deterministic two-party nonces
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Eddsa;

#[async_trait]
impl ThresholdScheme for Ed25519Eddsa {
    fn scope(&self) -> Scope {
        Scope::Ed25519Eddsa
    }

    async fn keygen(&self, ctx: &mut RoundContext<'_>, identity_id: &str) -> Result<SavedShare> {
        keygen::run_keygen(ctx, identity_id).await
    }

    async fn sign(
        &self,
        ctx: &mut RoundContext<'_>,
        share: &SavedShare,
        digest: &[u8],
    ) -> Result<Signature> {
        self.check_scope(share)?;
        self.params().validate_digest(digest)?;
        sign::run_sign(ctx, share, digest).await.map(Signature::Eddsa)
    }

    async fn rotate(&self, ctx: &mut RoundContext<'_>, share: &SavedShare) -> Result<SavedShare> {
        self.check_scope(share)?;
        rotate::run_rotate(ctx, share).await
    }
}
