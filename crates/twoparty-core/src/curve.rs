//! Group operations the proof systems need, for both supported curves

use crate::{Error, Result};
use curve25519_dalek::{
    constants::ED25519_BASEPOINT_POINT,
    edwards::{CompressedEdwardsY, EdwardsPoint},
    traits::IsIdentity,
    Scalar as EdScalar,
};
use k256::{
    elliptic_curve::{
        bigint::U256, ff::Field, ops::Reduce, sec1::FromEncodedPoint, sec1::ToEncodedPoint,
        PrimeField,
    },
    AffinePoint, FieldBytes, ProjectivePoint, Scalar as KScalar,
};
use rand_core::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::Sha512;
use sha3::{Digest, Keccak256};
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

/// A prime-order group with a fixed generator and a hash-to-scalar
pub trait Curve: Send + Sync + 'static {
    type Scalar: Copy
        + PartialEq
        + Send
        + Sync
        + Add<Output = Self::Scalar>
        + Sub<Output = Self::Scalar>
        + Mul<Output = Self::Scalar>
        + Neg<Output = Self::Scalar>;

    type Point: Copy
        + PartialEq
        + Send
        + Sync
        + Add<Output = Self::Point>
        + Sub<Output = Self::Point>
        + Mul<Self::Scalar, Output = Self::Point>;

    const NAME: &'static str;

    fn generator() -> Self::Point;

    fn is_identity(point: &Self::Point) -> bool;

    fn random_scalar() -> Self::Scalar;

    fn hash_to_scalar(chunks: &[&[u8]]) -> Self::Scalar;

    fn encode_point(point: &Self::Point) -> Vec<u8>;

    /// Rejects the identity and, for ed25519, small-order points
    fn decode_point(bytes: &[u8]) -> Result<Self::Point>;

    fn encode_scalar(scalar: &Self::Scalar) -> Vec<u8>;

    fn decode_scalar(bytes: &[u8]) -> Result<Self::Scalar>;

    fn mul_base(scalar: &Self::Scalar) -> Self::Point {
        Self::generator() * *scalar
    }
}

/// secp256k1 via `k256`; Keccak-256 transcripts
#[derive(Debug, Clone, Copy)]
pub struct Secp256k1;

impl Curve for Secp256k1 {
    type Scalar = KScalar;
    type Point = ProjectivePoint;

    const NAME: &'static str = "secp256k1";

    fn generator() -> ProjectivePoint {
        ProjectivePoint::GENERATOR
    }

    fn is_identity(point: &ProjectivePoint) -> bool {
        *point == ProjectivePoint::IDENTITY
    }

    fn random_scalar() -> KScalar {
        KScalar::random(&mut OsRng)
    }

    fn hash_to_scalar(chunks: &[&[u8]]) -> KScalar {
        let mut hasher = Keccak256::new();
        for chunk in chunks {
            hasher.update((chunk.len() as u32).to_be_bytes());
            hasher.update(chunk);
        }
        <KScalar as Reduce<U256>>::reduce_bytes(&hasher.finalize())
    }

    fn encode_point(point: &ProjectivePoint) -> Vec<u8> {
        point.to_affine().to_encoded_point(true).as_bytes().to_vec()
    }

    fn decode_point(bytes: &[u8]) -> Result<ProjectivePoint> {
        let encoded = k256::EncodedPoint::from_bytes(bytes)
            .map_err(|e| Error::Deserialization(format!("secp256k1 point: {e}")))?;
        let affine = Option::<AffinePoint>::from(AffinePoint::from_encoded_point(&encoded))
            .ok_or_else(|| Error::Deserialization("secp256k1 point not on curve".to_string()))?;
        let point = ProjectivePoint::from(affine);
        if Self::is_identity(&point) {
            return Err(Error::Deserialization("secp256k1 identity point".to_string()));
        }
        Ok(point)
    }

    fn encode_scalar(scalar: &KScalar) -> Vec<u8> {
        scalar.to_bytes().to_vec()
    }

    fn decode_scalar(bytes: &[u8]) -> Result<KScalar> {
        if bytes.len() != 32 {
            return Err(Error::Deserialization(format!(
                "secp256k1 scalar must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        Option::<KScalar>::from(KScalar::from_repr(*FieldBytes::from_slice(bytes)))
            .ok_or_else(|| Error::Deserialization("secp256k1 scalar out of range".to_string()))
    }
}

/// Edwards25519 via `curve25519-dalek`; SHA-512 transcripts
#[derive(Debug, Clone, Copy)]
pub struct Ed25519;

impl Curve for Ed25519 {
    type Scalar = EdScalar;
    type Point = EdwardsPoint;

    const NAME: &'static str = "ed25519";

    fn generator() -> EdwardsPoint {
        ED25519_BASEPOINT_POINT
    }

    fn is_identity(point: &EdwardsPoint) -> bool {
        point.is_identity()
    }

    fn random_scalar() -> EdScalar {
        EdScalar::random(&mut OsRng)
    }

    fn hash_to_scalar(chunks: &[&[u8]]) -> EdScalar {
        let mut hasher = Sha512::new();
        for chunk in chunks {
            hasher.update((chunk.len() as u32).to_be_bytes());
            hasher.update(chunk);
        }
        wide_reduce(&hasher.finalize())
    }

    fn encode_point(point: &EdwardsPoint) -> Vec<u8> {
        point.compress().to_bytes().to_vec()
    }

    fn decode_point(bytes: &[u8]) -> Result<EdwardsPoint> {
        let compressed = CompressedEdwardsY::from_slice(bytes)
            .map_err(|_| Error::Deserialization("ed25519 point must be 32 bytes".to_string()))?;
        let point = compressed
            .decompress()
            .ok_or_else(|| Error::Deserialization("ed25519 point not on curve".to_string()))?;
        if point.is_small_order() {
            return Err(Error::Deserialization("ed25519 small-order point".to_string()));
        }
        Ok(point)
    }

    fn encode_scalar(scalar: &EdScalar) -> Vec<u8> {
        scalar.to_bytes().to_vec()
    }

    fn decode_scalar(bytes: &[u8]) -> Result<EdScalar> {
        let array: [u8; 32] = bytes.try_into().map_err(|_| {
            Error::Deserialization(format!("ed25519 scalar must be 32 bytes, got {}", bytes.len()))
        })?;
        Option::<EdScalar>::from(EdScalar::from_canonical_bytes(array))
            .ok_or_else(|| Error::Deserialization("ed25519 scalar not canonical".to_string()))
    }
}

/// Reduce a 64-byte hash output modulo the ed25519 group order
pub(crate) fn wide_reduce(bytes: &[u8]) -> EdScalar {
    let mut wide = [0u8; 64];
    wide.copy_from_slice(&bytes[..64]);
    EdScalar::from_bytes_mod_order_wide(&wide)
}

/// Point that serializes as hex of its canonical encoding
pub struct CurvePoint<C: Curve>(pub C::Point);

/// Scalar that serializes as hex of its canonical encoding
pub struct CurveScalar<C: Curve>(pub C::Scalar);

impl<C: Curve> Clone for CurvePoint<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C: Curve> Copy for CurvePoint<C> {}

impl<C: Curve> PartialEq for CurvePoint<C> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<C: Curve> fmt::Debug for CurvePoint<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Point({})", C::NAME, hex::encode(C::encode_point(&self.0)))
    }
}

impl<C: Curve> CurvePoint<C> {
    pub fn to_bytes(&self) -> Vec<u8> {
        C::encode_point(&self.0)
    }
}

impl<C: Curve> Serialize for CurvePoint<C> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(C::encode_point(&self.0)))
    }
}

impl<'de, C: Curve> Deserialize<'de> for CurvePoint<C> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(s).map_err(serde::de::Error::custom)?;
        C::decode_point(&bytes)
            .map(CurvePoint)
            .map_err(serde::de::Error::custom)
    }
}

impl<C: Curve> Clone for CurveScalar<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C: Curve> Copy for CurveScalar<C> {}

// Never print secret scalars
impl<C: Curve> fmt::Debug for CurveScalar<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Scalar(..)", C::NAME)
    }
}

impl<C: Curve> Serialize for CurveScalar<C> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(C::encode_scalar(&self.0)))
    }
}

impl<'de, C: Curve> Deserialize<'de> for CurveScalar<C> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(s).map_err(serde::de::Error::custom)?;
        C::decode_scalar(&bytes)
            .map(CurveScalar)
            .map_err(serde::de::Error::custom)
    }
}
