//! secp256k1 signing
//!
//! 1. I → R: commitment to `K1 = k1·G`
//! 2. R → I: proof of `k2` for `K2`
//! 3. I → R: opening of `K1`, digest, proof of `x1` bound to `R = k1·k2·G`
//! 4. R → I: `Enc(ρ·n + k2⁻¹·m) ⊕ Enc(x1) ⊗ (k2⁻¹·r·x2)`
//!
//! The initiator decrypts, divides by `k1` and checks the result against
//! the joint key before returning it.

use super::paillier::{self, big_hex, bn_to_scalar, curve_order, scalar_to_bn, PaillierKeyPair};
use super::{initiator_detail, invert, x_scalar, ResponderShare};
use crate::{
    channel::RoundContext,
    curve::{Curve, Secp256k1},
    scheme::Scope,
    share::{hex_bytes, SavedShare},
    signature::EcdsaSignature,
    zk::{CommittedProof, DLogCommitment, DLogProof, DLogWitness},
    Error, Result,
};
use k256::{
    ecdsa::{signature::hazmat::PrehashVerifier, VerifyingKey},
    elliptic_curve::{bigint::U256, ops::Reduce, point::AffineCoordinates, scalar::IsHigh},
    FieldBytes, ProjectivePoint, Scalar,
};
use libpaillier::unknown_order::BigNumber;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignCommit {
    pub commitment: DLogCommitment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignPeerProof {
    pub proof: DLogProof<Secp256k1>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignReveal {
    pub witness: DLogWitness<Secp256k1>,
    #[serde(with = "hex_bytes")]
    pub digest: Vec<u8>,
    /// Proof of `x1`, bound to the joint nonce point
    pub secret_proof: DLogProof<Secp256k1>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignPartial {
    #[serde(with = "big_hex")]
    pub encrypted_partial: BigNumber,
}

/// Initiator side of signing; `digest` must already be 32 bytes
#[instrument(skip(ctx, share, digest), fields(share_id = %share.share_id))]
pub async fn run_sign(
    ctx: &mut RoundContext<'_>,
    share: &SavedShare,
    digest: &[u8],
) -> Result<EcdsaSignature> {
    ctx.bind_share(share);
    let detail = initiator_detail(share)?;
    let paillier = PaillierKeyPair::from_primes(
        detail.paillier_p.clone(),
        detail.paillier_q.clone(),
    )?;
    info!("Starting secp256k1 signing");

    let nonce = Secp256k1::random_scalar();
    let committed = CommittedProof::<Secp256k1>::new(&nonce, b"");

    debug!("Sign round 1: nonce commitment");
    let reply: SignPeerProof = ctx
        .exchange(&SignCommit {
            commitment: committed.commitment.clone(),
        })
        .await?;
    reply.proof.verify(b"")?;
    let nonce_point = reply.proof.public() * nonce;

    debug!("Sign round 2: reveal and secret proof");
    let binding = Secp256k1::encode_point(&nonce_point);
    let partial: SignPartial = ctx
        .exchange(&SignReveal {
            witness: committed.witness,
            digest: digest.to_vec(),
            secret_proof: DLogProof::prove(&detail.secret.0, &binding),
        })
        .await?;

    ctx.finalizing()?;
    let s_partial = bn_to_scalar(&paillier.decrypt(&partial.encrypted_partial)?)?;
    let s = s_partial * invert(&nonce)?;
    let signature = assemble(&nonce_point, s)?;
    verify(&share.uncompressed_pub, digest, &signature)?;

    info!(v = signature.v, "secp256k1 signature complete");
    Ok(signature)
}

/// Build a low-s signature and its recovery id from the nonce point
fn assemble(nonce_point: &ProjectivePoint, s: Scalar) -> Result<EcdsaSignature> {
    let affine = nonce_point.to_affine();
    let r = x_scalar(nonce_point);
    let mut v = affine.y_is_odd().unwrap_u8();
    let s = if bool::from(s.is_high()) {
        v ^= 1;
        -s
    } else {
        s
    };
    if r == Scalar::ZERO || s == Scalar::ZERO {
        return Err(Error::Crypto("degenerate signature".to_string()));
    }
    let mut r_bytes = [0u8; 32];
    r_bytes.copy_from_slice(&r.to_bytes());
    let mut s_bytes = [0u8; 32];
    s_bytes.copy_from_slice(&s.to_bytes());
    Ok(EcdsaSignature::new(r_bytes, s_bytes, v))
}

/// Standard ECDSA verification of a prehashed digest
pub fn verify(public_key: &[u8], digest: &[u8], signature: &EcdsaSignature) -> Result<()> {
    let key = VerifyingKey::from_sec1_bytes(public_key)
        .map_err(|e| Error::InvalidInput(format!("secp256k1 public key: {e}")))?;
    let sig = k256::ecdsa::Signature::from_scalars(
        *FieldBytes::from_slice(&signature.r),
        *FieldBytes::from_slice(&signature.s),
    )
    .map_err(|e| Error::VerificationFailed(format!("malformed signature: {e}")))?;
    key.verify_prehash(digest, &sig)
        .map_err(|_| Error::VerificationFailed("signature does not verify".to_string()))
}

/// Responder state between signing steps
pub struct SignPending {
    commitment: DLogCommitment,
    nonce: Scalar,
    share: SavedShare,
}

pub(crate) fn respond_commit(share: SavedShare, msg: SignCommit) -> (SignPeerProof, SignPending) {
    let nonce = Secp256k1::random_scalar();
    let proof = DLogProof::<Secp256k1>::prove(&nonce, b"");
    (
        SignPeerProof { proof },
        SignPending {
            commitment: msg.commitment,
            nonce,
            share,
        },
    )
}

pub(crate) fn respond_reveal(pending: SignPending, msg: SignReveal) -> Result<SignPartial> {
    Scope::Secp256k1Ecdsa.params().validate_digest(&msg.digest)?;
    let detail: ResponderShare = pending.share.detail()?;

    let peer_nonce_point = msg.witness.open(&pending.commitment, b"")?;
    let nonce_point = peer_nonce_point * pending.nonce;
    msg.secret_proof
        .verify(&Secp256k1::encode_point(&nonce_point))?;
    if msg.secret_proof.public() != detail.peer_public_share.0 {
        return Err(Error::VerificationFailed(
            "secret proof is not for the stored peer share".to_string(),
        ));
    }

    let r = x_scalar(&nonce_point);
    let m = <Scalar as Reduce<U256>>::reduce_bytes(FieldBytes::from_slice(&msg.digest));
    let nonce_inv = invert(&pending.nonce)?;

    let order = curve_order();
    let mask = BigNumber::random(&(&order * &order));
    let masked = &mask * &order + scalar_to_bn(&(nonce_inv * m));
    let (c1, _) = paillier::encrypt(&detail.paillier_key, &masked)?;
    let factor = scalar_to_bn(&(nonce_inv * r * detail.secret.0));
    let c2 = paillier::mul(&detail.paillier_key, &detail.encrypted_secret, &factor)?;
    let encrypted_partial = paillier::add(&detail.paillier_key, &c1, &c2)?;

    debug!(share_id = %pending.share.share_id, "Responder produced encrypted partial signature");
    Ok(SignPartial { encrypted_partial })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::LocalPeer;
    use crate::config::ProtocolConfig;
    use crate::scheme::ThresholdScheme;
    use crate::secp256k1::Secp256k1Ecdsa;
    use crate::signature::Signature;
    use k256::ecdsa::RecoveryId;
    use sha2::{Digest, Sha256};

    fn scheme() -> Secp256k1Ecdsa {
        Secp256k1Ecdsa::new(ProtocolConfig::insecure_for_testing())
    }

    fn hello_digest() -> Vec<u8> {
        Sha256::digest(b"hello").to_vec()
    }

    async fn signed() -> (SavedShare, EcdsaSignature) {
        let peer = LocalPeer::new(ProtocolConfig::insecure_for_testing());
        let share = peer.keygen(&scheme(), "wangcy").await.unwrap();
        let signature = match peer.sign(&scheme(), &share, &hello_digest()).await.unwrap() {
            Signature::Ecdsa(sig) => sig,
            other => panic!("unexpected signature {other:?}"),
        };
        (share, signature)
    }

    #[tokio::test]
    async fn test_signature_verifies_under_joint_key() {
        let (share, signature) = signed().await;
        verify(&share.uncompressed_pub, &hello_digest(), &signature).unwrap();
        assert!(verify(&share.uncompressed_pub, &[0u8; 32], &signature).is_err());
    }

    #[tokio::test]
    async fn test_low_s_and_recovery_id() {
        let (share, signature) = signed().await;
        assert!(signature.v <= 1);

        let sig = k256::ecdsa::Signature::from_scalars(
            *FieldBytes::from_slice(&signature.r),
            *FieldBytes::from_slice(&signature.s),
        )
        .unwrap();
        assert!(!bool::from(sig.s().is_high()));

        let recovery_id = RecoveryId::from_byte(signature.v).unwrap();
        let recovered =
            VerifyingKey::recover_from_prehash(&hello_digest(), &sig, recovery_id).unwrap();
        assert_eq!(
            recovered.to_encoded_point(false).as_bytes(),
            share.uncompressed_pub.as_slice()
        );
    }

    #[tokio::test]
    async fn test_wrong_digest_length_rejected() {
        let peer = LocalPeer::new(ProtocolConfig::insecure_for_testing());
        let share = peer.keygen(&scheme(), "wangcy").await.unwrap();
        let result = peer.sign(&scheme(), &share, b"hello").await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_scope_mismatch_rejected() {
        let peer = LocalPeer::new(ProtocolConfig::insecure_for_testing());
        let share = peer
            .keygen(&crate::ed25519::Ed25519Eddsa, "wangcy")
            .await
            .unwrap();
        let result = peer.sign(&scheme(), &share, &hello_digest()).await;
        assert!(matches!(
            result,
            Err(Error::ScopeMismatch { expected: Scope::Secp256k1Ecdsa, actual: Scope::Ed25519Eddsa })
        ));
        assert_eq!(scheme().scope(), Scope::Secp256k1Ecdsa);
    }

    #[tokio::test]
    async fn test_responder_rejects_foreign_secret_proof() {
        let peer = LocalPeer::new(ProtocolConfig::insecure_for_testing());
        let share = peer.keygen(&scheme(), "wangcy").await.unwrap();
        let other = peer.keygen(&scheme(), "wangcy").await.unwrap();

        // Route a sign for `share` to the responder half of `other`
        let mut forged = share.clone();
        forged.share_id = other.share_id.clone();
        let result = peer.sign(&scheme(), &forged, &hello_digest()).await;
        assert!(matches!(result, Err(Error::VerificationFailed(_))));
    }
}
