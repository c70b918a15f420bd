//! Two-party ECDSA over secp256k1.
//!
//! The key is split multiplicatively: the initiator holds `x1`, the
//! responder `x2`, and the joint key is `x1·x2·G`. During keygen the
//! initiator hands the responder a Paillier encryption of `x1`, which lets
//! the responder contribute its half of a signature homomorphically
//! without ever seeing `x1`. Rotation multiplies `x1` by a coin-tossed
//! factor and `x2` by its inverse.

pub mod export;
pub mod keygen;
pub mod paillier;
pub mod rotate;
pub mod sign;

use crate::{
    channel::RoundContext,
    config::ProtocolConfig,
    curve::{CurvePoint, CurveScalar, Secp256k1},
    scheme::{Exportable, Scope, ThresholdScheme},
    share::SavedShare,
    signature::Signature,
    Error, Result,
};
use async_trait::async_trait;
use k256::{
    elliptic_curve::{bigint::U256, ops::Reduce, point::AffineCoordinates, sec1::ToEncodedPoint},
    ProjectivePoint, Scalar,
};
use libpaillier::{unknown_order::BigNumber, EncryptionKey};
use paillier::big_hex;
use serde::{Deserialize, Serialize};

/// Initiator's secret record
#[derive(Serialize, Deserialize)]
pub struct InitiatorShare {
    /// `x1`
    pub secret: CurveScalar<Secp256k1>,
    /// `Q1 = x1·G`
    pub public_share: CurvePoint<Secp256k1>,
    /// `Q2 = x2·G`
    pub peer_public_share: CurvePoint<Secp256k1>,
    /// Paillier primes; the responder holds `Enc(x1)` under `N = p·q`
    #[serde(with = "big_hex")]
    pub paillier_p: BigNumber,
    #[serde(with = "big_hex")]
    pub paillier_q: BigNumber,
    pub public_key: CurvePoint<Secp256k1>,
}

/// Responder's secret record
#[derive(Serialize, Deserialize)]
pub struct ResponderShare {
    /// `x2`
    pub secret: CurveScalar<Secp256k1>,
    pub public_share: CurvePoint<Secp256k1>,
    pub peer_public_share: CurvePoint<Secp256k1>,
    pub paillier_key: EncryptionKey,
    /// `Enc(x1)` under `paillier_key`
    #[serde(with = "big_hex")]
    pub encrypted_secret: BigNumber,
    pub public_key: CurvePoint<Secp256k1>,
}

/// secp256k1 ECDSA with Paillier-assisted signing
#[derive(Debug, Clone, Default)]
pub struct Secp256k1Ecdsa {
    config: ProtocolConfig,
}

impl Secp256k1Ecdsa {
    pub fn new(config: ProtocolConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }
}

#[async_trait]
impl ThresholdScheme for Secp256k1Ecdsa {
    fn scope(&self) -> Scope {
        Scope::Secp256k1Ecdsa
    }

    async fn keygen(&self, ctx: &mut RoundContext<'_>, identity_id: &str) -> Result<SavedShare> {
        keygen::run_keygen(ctx, identity_id, &self.config).await
    }

    async fn sign(
        &self,
        ctx: &mut RoundContext<'_>,
        share: &SavedShare,
        digest: &[u8],
    ) -> Result<Signature> {
        self.check_scope(share)?;
        self.params().validate_digest(digest)?;
        sign::run_sign(ctx, share, digest).await.map(Signature::Ecdsa)
    }

    async fn rotate(&self, ctx: &mut RoundContext<'_>, share: &SavedShare) -> Result<SavedShare> {
        self.check_scope(share)?;
        rotate::run_rotate(ctx, share, &self.config).await
    }
}

#[async_trait]
impl Exportable for Secp256k1Ecdsa {
    async fn export(&self, ctx: &mut RoundContext<'_>, share: &SavedShare) -> Result<String> {
        self.check_scope(share)?;
        export::run_export(ctx, share).await
    }
}

/// SEC1 uncompressed encoding, `0x04 || X || Y`
pub fn uncompressed(point: &ProjectivePoint) -> Vec<u8> {
    point.to_affine().to_encoded_point(false).as_bytes().to_vec()
}

/// x-coordinate of a point reduced into the scalar field
pub(crate) fn x_scalar(point: &ProjectivePoint) -> Scalar {
    <Scalar as Reduce<U256>>::reduce_bytes(&point.to_affine().x())
}

pub(crate) fn invert(scalar: &Scalar) -> Result<Scalar> {
    Option::<Scalar>::from(scalar.invert())
        .ok_or_else(|| Error::Crypto("scalar is not invertible".to_string()))
}

/// The initiator only accepts shares whose public key matches its record
pub(crate) fn initiator_detail(share: &SavedShare) -> Result<InitiatorShare> {
    let detail: InitiatorShare = share.detail()?;
    if uncompressed(&detail.public_key.0) != share.uncompressed_pub {
        return Err(Error::InvalidInput(format!(
            "share {} detail does not match its public key",
            share.share_id
        )));
    }
    Ok(detail)
}
