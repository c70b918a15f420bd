//! Blinded hash commitments to a discrete-log proof

use super::dlog::DLogProof;
use crate::curve::Curve;
use crate::share::hex_bytes;
use crate::{Error, Result};
use rand::RngCore;
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

/// Commitments to the `Q` and `R` points of a [`DLogProof`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DLogCommitment {
    #[serde(with = "hex_bytes")]
    pub q_commitment: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub r_commitment: Vec<u8>,
}

/// Opening of a [`DLogCommitment`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct DLogWitness<C: Curve> {
    pub proof: DLogProof<C>,
    #[serde(with = "hex_bytes")]
    pub q_blind: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub r_blind: Vec<u8>,
}

/// A fresh proof together with its commitment; the commitment is sent
/// first, the witness once the peer has revealed its own point
#[derive(Debug, Clone)]
pub struct CommittedProof<C: Curve> {
    pub commitment: DLogCommitment,
    pub witness: DLogWitness<C>,
}

impl<C: Curve> CommittedProof<C> {
    pub fn new(x: &C::Scalar, binding: &[u8]) -> Self {
        let proof = DLogProof::<C>::prove(x, binding);
        let q_blind = random_blind();
        let r_blind = random_blind();
        let commitment = DLogCommitment {
            q_commitment: commit::<C>(&proof.q.to_bytes(), &q_blind),
            r_commitment: commit::<C>(&proof.r.to_bytes(), &r_blind),
        };
        Self {
            commitment,
            witness: DLogWitness {
                proof,
                q_blind,
                r_blind,
            },
        }
    }
}

impl<C: Curve> DLogWitness<C> {
    /// Check the opening against `commitment`, verify the proof, and
    /// return the committed point
    pub fn open(&self, commitment: &DLogCommitment, binding: &[u8]) -> Result<C::Point> {
        let q_ok = commit::<C>(&self.proof.q.to_bytes(), &self.q_blind)
            .ct_eq(&commitment.q_commitment);
        let r_ok = commit::<C>(&self.proof.r.to_bytes(), &self.r_blind)
            .ct_eq(&commitment.r_commitment);
        if !bool::from(q_ok & r_ok) {
            return Err(Error::VerificationFailed(format!(
                "{} commitment opening does not match",
                C::NAME
            )));
        }
        self.proof.verify(binding)?;
        Ok(self.proof.public())
    }
}

fn random_blind() -> Vec<u8> {
    let mut blind = vec![0u8; 32];
    OsRng.fill_bytes(&mut blind);
    blind
}

fn commit<C: Curve>(data: &[u8], blind: &[u8]) -> Vec<u8> {
    C::encode_scalar(&C::hash_to_scalar(&[b"twoparty/commit", data, blind]))
}
