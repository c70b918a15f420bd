//! secp256k1 share rotation
//!
//! Both parties toss a coin for a factor `f = x(s1·s2·G) mod n` through a
//! committed seed exchange, then set `x1' = x1·f` and `x2' = x2·f⁻¹`. The
//! initiator generates a fresh Paillier key and re-encrypts `x1'`.

use super::keygen::{verify_handover, PaillierHandover};
use super::paillier::{big_hex, CorrectEncryptionProof, CorrectKeyProof};
use super::{initiator_detail, invert, uncompressed, x_scalar, InitiatorShare, ResponderShare};
use crate::{
    channel::RoundContext,
    config::ProtocolConfig,
    curve::{Curve, CurvePoint, CurveScalar, Secp256k1},
    scheme::Scope,
    share::{check_share_id, new_share_id, PartyRole, SavedShare},
    store::ShareStore,
    zk::{CommittedProof, DLogCommitment, DLogProof, DLogWitness},
    Error, Result,
};
use k256::{ProjectivePoint, Scalar};
use libpaillier::{unknown_order::BigNumber, EncryptionKey};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotateCommit {
    pub commitment: DLogCommitment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotatePeerProof {
    pub proof: DLogProof<Secp256k1>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotateReveal {
    pub witness: DLogWitness<Secp256k1>,
    pub paillier_key: EncryptionKey,
    #[serde(with = "big_hex")]
    pub encrypted_secret: BigNumber,
    pub key_proof: CorrectKeyProof,
    pub encryption_proof: CorrectEncryptionProof,
    /// Proof of `x1'`
    pub new_public_proof: DLogProof<Secp256k1>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotateDone {
    pub share_id: String,
    /// Proof of `x2'`
    pub new_public_proof: DLogProof<Secp256k1>,
}

/// Coin-tossed rotation factor from the joint seed point
fn rotation_factor(seed_point: &ProjectivePoint) -> Result<Scalar> {
    let factor = x_scalar(seed_point);
    if factor == Scalar::ZERO {
        return Err(Error::Crypto("zero rotation factor".to_string()));
    }
    Ok(factor)
}

/// Initiator side of rotation
#[instrument(skip(ctx, share, config), fields(share_id = %share.share_id))]
pub async fn run_rotate(
    ctx: &mut RoundContext<'_>,
    share: &SavedShare,
    config: &ProtocolConfig,
) -> Result<SavedShare> {
    ctx.bind_share(share);
    let detail = initiator_detail(share)?;
    info!("Starting secp256k1 rotation");

    let seed = Secp256k1::random_scalar();
    let committed = CommittedProof::<Secp256k1>::new(&seed, b"");

    debug!("Rotate round 1: seed commitment");
    let reply: RotatePeerProof = ctx
        .exchange(&RotateCommit {
            commitment: committed.commitment.clone(),
        })
        .await?;
    reply.proof.verify(b"")?;
    let factor = rotation_factor(&(reply.proof.public() * seed))?;

    let new_secret = detail.secret.0 * factor;
    let handover = PaillierHandover::prepare(new_secret, config.paillier_modulus_bits).await?;

    debug!("Rotate round 2: reveal and Paillier hand-over");
    let done: RotateDone = ctx
        .exchange(&RotateReveal {
            witness: committed.witness,
            paillier_key: handover.pair.encryption_key.clone(),
            encrypted_secret: handover.encrypted_secret,
            key_proof: handover.key_proof,
            encryption_proof: handover.encryption_proof,
            new_public_proof: DLogProof::prove(&new_secret, b""),
        })
        .await?;

    ctx.finalizing()?;
    check_share_id(&done.share_id)?;
    done.new_public_proof.verify(b"")?;
    let peer_public_share = done.new_public_proof.public();
    if peer_public_share * new_secret != detail.public_key.0 {
        return Err(Error::PublicKeyMismatch(format!(
            "rotation of {} changed the joint public key",
            share.share_id
        )));
    }

    let rotated = InitiatorShare {
        secret: CurveScalar(new_secret),
        public_share: CurvePoint(Secp256k1::mul_base(&new_secret)),
        peer_public_share: CurvePoint(peer_public_share),
        paillier_p: handover.pair.p,
        paillier_q: handover.pair.q,
        public_key: detail.public_key,
    };
    info!(new_share_id = %done.share_id, "secp256k1 rotation complete");
    SavedShare::new(
        share.identity_id.as_str(),
        done.share_id,
        Scope::Secp256k1Ecdsa,
        PartyRole::Initiator,
        share.uncompressed_pub.clone(),
        &rotated,
    )
}

/// Responder state between rotation steps
pub struct RotatePending {
    commitment: DLogCommitment,
    seed: Scalar,
    share: SavedShare,
}

pub(crate) fn respond_commit(share: SavedShare, msg: RotateCommit) -> (RotatePeerProof, RotatePending) {
    let seed = Secp256k1::random_scalar();
    let proof = DLogProof::<Secp256k1>::prove(&seed, b"");
    (
        RotatePeerProof { proof },
        RotatePending {
            commitment: msg.commitment,
            seed,
            share,
        },
    )
}

pub(crate) fn respond_reveal(
    pending: RotatePending,
    msg: RotateReveal,
    store: &dyn ShareStore,
    config: &ProtocolConfig,
) -> Result<RotateDone> {
    let detail: ResponderShare = pending.share.detail()?;
    let peer_seed_point = msg.witness.open(&pending.commitment, b"")?;
    let factor = rotation_factor(&(peer_seed_point * pending.seed))?;

    msg.new_public_proof.verify(b"")?;
    let peer_public_share = msg.new_public_proof.public();
    if peer_public_share != detail.peer_public_share.0 * factor {
        return Err(Error::VerificationFailed(
            "peer share was not rotated by the agreed factor".to_string(),
        ));
    }
    verify_handover(
        &msg.paillier_key,
        &msg.encrypted_secret,
        &msg.key_proof,
        &msg.encryption_proof,
        &peer_public_share,
        config,
    )?;

    let new_secret = detail.secret.0 * invert(&factor)?;
    if peer_public_share * new_secret != detail.public_key.0 {
        return Err(Error::PublicKeyMismatch(format!(
            "rotation of {} changed the joint public key",
            pending.share.share_id
        )));
    }

    let share_id = new_share_id();
    let rotated = ResponderShare {
        secret: CurveScalar(new_secret),
        public_share: CurvePoint(Secp256k1::mul_base(&new_secret)),
        peer_public_share: CurvePoint(peer_public_share),
        paillier_key: msg.paillier_key,
        encrypted_secret: msg.encrypted_secret,
        public_key: detail.public_key,
    };
    store.put(SavedShare::new(
        pending.share.identity_id.as_str(),
        share_id.as_str(),
        Scope::Secp256k1Ecdsa,
        PartyRole::Responder,
        uncompressed(&detail.public_key.0),
        &rotated,
    )?)?;

    store.mark_superseded(&pending.share.share_id);
    debug!(old_share_id = %pending.share.share_id, share_id, "Responder stored rotated secp256k1 share");
    Ok(RotateDone {
        share_id,
        new_public_proof: DLogProof::prove(&new_secret, b""),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::LocalPeer;
    use crate::secp256k1::{sign::verify, Secp256k1Ecdsa};
    use crate::signature::Signature;
    use crate::wire::Status;
    use sha2::{Digest, Sha256};

    fn scheme() -> Secp256k1Ecdsa {
        Secp256k1Ecdsa::new(ProtocolConfig::insecure_for_testing())
    }

    #[tokio::test]
    async fn test_rotation_keeps_public_key() {
        let peer = LocalPeer::new(ProtocolConfig::insecure_for_testing());
        let share = peer.keygen(&scheme(), "wangcy").await.unwrap();
        let rotated = peer.rotate(&scheme(), &share).await.unwrap();

        assert_eq!(rotated.uncompressed_pub, share.uncompressed_pub);
        assert_ne!(rotated.share_id, share.share_id);
        assert_eq!(rotated.identity_id, share.identity_id);
        assert_eq!(rotated.party, share.party);
        assert_eq!(rotated.scope, share.scope);

        let old: InitiatorShare = share.detail().unwrap();
        let new: InitiatorShare = rotated.detail().unwrap();
        assert!(old.secret.0 != new.secret.0);
        assert!(old.paillier_p != new.paillier_p);
    }

    #[tokio::test]
    async fn test_rotated_share_signs() {
        let peer = LocalPeer::new(ProtocolConfig::insecure_for_testing());
        let share = peer.keygen(&scheme(), "wangcy").await.unwrap();
        let rotated = peer.rotate(&scheme(), &share).await.unwrap();
        let digest = Sha256::digest(b"hello").to_vec();

        let Signature::Ecdsa(sig) = peer.sign(&scheme(), &rotated, &digest).await.unwrap() else {
            panic!("expected ECDSA signature");
        };
        verify(&share.uncompressed_pub, &digest, &sig).unwrap();
    }

    #[tokio::test]
    async fn test_mismatched_peer_share_is_fatal() {
        let peer = LocalPeer::new(ProtocolConfig::insecure_for_testing());
        let share = peer.keygen(&scheme(), "wangcy").await.unwrap();

        // Peer answers with a proof for an unrelated secret
        let mut channel = peer.channel().with_tamper(|request, response| {
            if request.step == 2 && response.status == Status::Ok {
                let mut done: RotateDone = serde_json::from_value(response.payload.clone()).unwrap();
                done.new_public_proof = DLogProof::prove(&Secp256k1::random_scalar(), b"");
                response.payload = serde_json::to_value(&done).unwrap();
            }
        });
        let mut machine = crate::state::StateMachine::new(crate::wire::Operation::Rotate);
        machine.advance(crate::state::OperationState::Connecting).unwrap();
        let mut ctx = RoundContext::new(&mut channel, &mut machine, Scope::Secp256k1Ecdsa);

        let result = run_rotate(&mut ctx, &share, &ProtocolConfig::insecure_for_testing()).await;
        assert!(matches!(result, Err(Error::PublicKeyMismatch(_))));
    }
}
