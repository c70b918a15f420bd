//! Schnorr proof of knowledge of a discrete logarithm

use crate::curve::{Curve, CurvePoint, CurveScalar};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Non-interactive proof that the prover knows `x` with `Q = x·G`.
///
/// `binding` ties the proof to context the verifier also knows, such as a
/// joint nonce point; pass an empty slice when there is none.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct DLogProof<C: Curve> {
    pub q: CurvePoint<C>,
    pub r: CurvePoint<C>,
    pub s: CurveScalar<C>,
}

impl<C: Curve> DLogProof<C> {
    pub fn prove(x: &C::Scalar, binding: &[u8]) -> Self {
        let q = C::mul_base(x);
        let k = C::random_scalar();
        let r = C::mul_base(&k);
        let e = challenge::<C>(&q, &r, binding);
        Self {
            q: CurvePoint(q),
            r: CurvePoint(r),
            s: CurveScalar(k + e * *x),
        }
    }

    pub fn verify(&self, binding: &[u8]) -> Result<()> {
        if C::is_identity(&self.q.0) {
            return Err(Error::VerificationFailed(format!(
                "{} dlog proof for identity point",
                C::NAME
            )));
        }
        let e = challenge::<C>(&self.q.0, &self.r.0, binding);
        if C::mul_base(&self.s.0) != self.r.0 + self.q.0 * e {
            return Err(Error::VerificationFailed(format!(
                "{} dlog proof does not verify",
                C::NAME
            )));
        }
        Ok(())
    }

    /// The point whose discrete log is proven
    pub fn public(&self) -> C::Point {
        self.q.0
    }
}

fn challenge<C: Curve>(q: &C::Point, r: &C::Point, binding: &[u8]) -> C::Scalar {
    C::hash_to_scalar(&[
        b"twoparty/dlog",
        &C::encode_point(&C::generator()),
        &C::encode_point(q),
        &C::encode_point(r),
        binding,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::{Ed25519, Secp256k1};

    fn honest<C: Curve>() {
        let x = C::random_scalar();
        let proof = DLogProof::<C>::prove(&x, b"ctx");
        proof.verify(b"ctx").unwrap();
        assert!(proof.public() == C::mul_base(&x));
    }

    #[test]
    fn test_honest_proofs_verify() {
        honest::<Secp256k1>();
        honest::<Ed25519>();
    }

    #[test]
    fn test_binding_is_checked() {
        let proof = DLogProof::<Secp256k1>::prove(&Secp256k1::random_scalar(), b"R1");
        assert!(matches!(proof.verify(b"R2"), Err(Error::VerificationFailed(_))));
    }

    #[test]
    fn test_swapped_point_fails() {
        let mut proof = DLogProof::<Ed25519>::prove(&Ed25519::random_scalar(), b"");
        proof.q = CurvePoint(Ed25519::mul_base(&Ed25519::random_scalar()));
        assert!(proof.verify(b"").is_err());
    }

    #[test]
    fn test_serde_round_trip_still_verifies() {
        let proof = DLogProof::<Secp256k1>::prove(&Secp256k1::random_scalar(), b"");
        let json = serde_json::to_string(&proof).unwrap();
        let parsed: DLogProof<Secp256k1> = serde_json::from_str(&json).unwrap();
        parsed.verify(b"").unwrap();
    }
}
