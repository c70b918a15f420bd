//! ed25519 signing
//!
//! 1. I → R: message and commitment to `R1`
//! 2. R → I: `R2` with proof of `r2`
//! 3. I → R: opening of `R1`
//! 4. R → I: partial scalar `s2`
//!
//! Both nonces are derived from the party's prefix, the message and the
//! joint key, so the same message always yields the same signature.

use super::{detail, EdShare};
use crate::{
    channel::RoundContext,
    curve::{wide_reduce, Curve, CurveScalar, Ed25519},
    scheme::Scope,
    share::{hex_bytes, SavedShare},
    zk::{CommittedProof, DLogCommitment, DLogProof, DLogWitness},
    Error, Result,
};
use curve25519_dalek::{EdwardsPoint, Scalar};
use ed25519_dalek::{Signature as DalekSignature, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdSignCommit {
    pub commitment: DLogCommitment,
    #[serde(with = "hex_bytes")]
    pub message: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdSignPeerProof {
    pub proof: DLogProof<Ed25519>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdSignReveal {
    pub witness: DLogWitness<Ed25519>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdSignPartial {
    pub s: CurveScalar<Ed25519>,
}

fn derive_nonce(detail: &EdShare, message: &[u8]) -> Scalar {
    Ed25519::hash_to_scalar(&[
        b"twoparty/ed25519/nonce",
        &detail.prefix,
        message,
        &detail.public_key.to_bytes(),
    ])
}

/// RFC 8032 challenge `H(R || A || M) mod l`
fn challenge(nonce_point: &EdwardsPoint, public_key: &EdwardsPoint, message: &[u8]) -> Scalar {
    let mut hasher = Sha512::new();
    hasher.update(nonce_point.compress().as_bytes());
    hasher.update(public_key.compress().as_bytes());
    hasher.update(message);
    wide_reduce(&hasher.finalize())
}

/// `s_i = r_i + k·a·x_i`
fn partial(detail: &EdShare, nonce: &Scalar, k: &Scalar) -> Scalar {
    nonce + k * detail.agg_coefficient.0 * detail.secret.0
}

#[instrument(skip(ctx, share, message), fields(share_id = %share.share_id, len = message.len()))]
pub async fn run_sign(
    ctx: &mut RoundContext<'_>,
    share: &SavedShare,
    message: &[u8],
) -> Result<[u8; 64]> {
    ctx.bind_share(share);
    let detail = detail(share)?;
    info!("Starting ed25519 signing");

    let nonce = derive_nonce(&detail, message);
    let committed = CommittedProof::<Ed25519>::new(&nonce, message);

    debug!("Sign round 1: message and nonce commitment");
    let reply: EdSignPeerProof = ctx
        .exchange(&EdSignCommit {
            commitment: committed.commitment.clone(),
            message: message.to_vec(),
        })
        .await?;
    reply.proof.verify(message)?;
    let peer_nonce_point = reply.proof.public();

    debug!("Sign round 2: reveal");
    let peer: EdSignPartial = ctx
        .exchange(&EdSignReveal {
            witness: committed.witness,
        })
        .await?;

    ctx.finalizing()?;
    let nonce_point = Ed25519::mul_base(&nonce) + peer_nonce_point;
    let k = challenge(&nonce_point, &detail.public_key.0, message);
    let expected = peer_nonce_point + detail.peer_public_share.0 * (k * detail.agg_coefficient.0);
    if Ed25519::mul_base(&peer.s.0) != expected {
        return Err(Error::VerificationFailed(
            "peer partial signature does not verify".to_string(),
        ));
    }

    let s = partial(&detail, &nonce, &k) + peer.s.0;
    let mut signature = [0u8; 64];
    signature[..32].copy_from_slice(nonce_point.compress().as_bytes());
    signature[32..].copy_from_slice(s.as_bytes());
    verify(&share.uncompressed_pub, message, &signature)?;

    info!("ed25519 signature complete");
    Ok(signature)
}

/// Strict RFC 8032 verification
pub fn verify(public_key: &[u8], message: &[u8], signature: &[u8; 64]) -> Result<()> {
    let key_bytes: [u8; 32] = public_key.try_into().map_err(|_| {
        Error::InvalidInput(format!("ed25519 public key must be 32 bytes, got {}", public_key.len()))
    })?;
    let key = VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| Error::InvalidInput(format!("ed25519 public key: {e}")))?;
    key.verify_strict(message, &DalekSignature::from_bytes(signature))
        .map_err(|_| Error::VerificationFailed("signature does not verify".to_string()))
}

/// Responder state between signing steps
pub struct EdSignPending {
    commitment: DLogCommitment,
    message: Vec<u8>,
    nonce: Scalar,
    detail: EdShare,
}

pub(crate) fn respond_commit(share: &SavedShare, msg: EdSignCommit) -> Result<(EdSignPeerProof, EdSignPending)> {
    Scope::Ed25519Eddsa.params().validate_digest(&msg.message)?;
    let detail = detail(share)?;
    let nonce = derive_nonce(&detail, &msg.message);
    let proof = DLogProof::<Ed25519>::prove(&nonce, &msg.message);
    Ok((
        EdSignPeerProof { proof },
        EdSignPending {
            commitment: msg.commitment,
            message: msg.message,
            nonce,
            detail,
        },
    ))
}

pub(crate) fn respond_reveal(pending: EdSignPending, msg: EdSignReveal) -> Result<EdSignPartial> {
    let peer_nonce_point = msg.witness.open(&pending.commitment, &pending.message)?;
    let nonce_point = peer_nonce_point + Ed25519::mul_base(&pending.nonce);
    let k = challenge(&nonce_point, &pending.detail.public_key.0, &pending.message);
    Ok(EdSignPartial {
        s: CurveScalar(partial(&pending.detail, &pending.nonce, &k)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::LocalPeer;
    use crate::config::ProtocolConfig;
    use crate::ed25519::Ed25519Eddsa;
    use crate::signature::Signature;
    use crate::secp256k1::Secp256k1Ecdsa;
    use ed25519_dalek::Verifier;

    async fn sign(peer: &LocalPeer, share: &SavedShare, message: &[u8]) -> [u8; 64] {
        match peer.sign(&Ed25519Eddsa, share, message).await.unwrap() {
            Signature::Eddsa(bytes) => bytes,
            other => panic!("unexpected signature {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_signature_verifies_with_dalek() {
        let peer = LocalPeer::new(ProtocolConfig::insecure_for_testing());
        let share = peer.keygen(&Ed25519Eddsa, "wangcy").await.unwrap();
        let sig = sign(&peer, &share, b"hello").await;

        let key_bytes: [u8; 32] = share.uncompressed_pub.as_slice().try_into().unwrap();
        let key = VerifyingKey::from_bytes(&key_bytes).unwrap();
        key.verify(b"hello", &DalekSignature::from_bytes(&sig)).unwrap();
    }

    #[tokio::test]
    async fn test_signing_is_deterministic() {
        let peer = LocalPeer::new(ProtocolConfig::insecure_for_testing());
        let share = peer.keygen(&Ed25519Eddsa, "wangcy").await.unwrap();
        let first = sign(&peer, &share, b"hello").await;
        let second = sign(&peer, &share, b"hello").await;
        assert_eq!(first, second);
        assert_ne!(first, sign(&peer, &share, b"hello!").await);
    }

    #[tokio::test]
    async fn test_digest_length_rules() {
        let peer = LocalPeer::new(ProtocolConfig::insecure_for_testing());
        let share = peer.keygen(&Ed25519Eddsa, "wangcy").await.unwrap();

        let empty = peer.sign(&Ed25519Eddsa, &share, b"").await;
        assert!(matches!(empty, Err(Error::InvalidInput(_))));
        let huge = peer.sign(&Ed25519Eddsa, &share, &[0u8; 4097]).await;
        assert!(matches!(huge, Err(Error::InvalidInput(_))));
        sign(&peer, &share, &[0u8; 4096]).await;
    }

    #[tokio::test]
    async fn test_wrong_scheme_share() {
        let peer = LocalPeer::new(ProtocolConfig::insecure_for_testing());
        let share = peer.keygen(&Ed25519Eddsa, "wangcy").await.unwrap();
        let ecdsa = Secp256k1Ecdsa::new(ProtocolConfig::insecure_for_testing());
        let result = peer.sign(&ecdsa, &share, &[1u8; 32]).await;
        assert!(matches!(result, Err(Error::ScopeMismatch { .. })));
    }

    #[tokio::test]
    async fn test_bad_partial_detected() {
        let peer = LocalPeer::new(ProtocolConfig::insecure_for_testing());
        let share = peer.keygen(&Ed25519Eddsa, "wangcy").await.unwrap();
        let mut channel = peer.channel().with_tamper(|request, response| {
            if request.step == 2 {
                let mut reply: EdSignPartial =
                    serde_json::from_value(response.payload.clone()).unwrap();
                reply.s = CurveScalar(reply.s.0 + Scalar::ONE);
                response.payload = serde_json::to_value(&reply).unwrap();
            }
        });
        let mut machine = crate::state::StateMachine::new(crate::wire::Operation::Sign);
        machine.advance(crate::state::OperationState::Connecting).unwrap();
        let mut ctx = RoundContext::new(&mut channel, &mut machine, Scope::Ed25519Eddsa);

        let result = run_sign(&mut ctx, &share, b"hello").await;
        assert!(matches!(result, Err(Error::VerificationFailed(_))));
    }
}
