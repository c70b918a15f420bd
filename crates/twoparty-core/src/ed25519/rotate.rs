//! ed25519 share rotation
//!
//! A coin-tossed `δ = H("rotate" || d1·d2·G)` moves from one secret to the
//! other: `x1' = x1 + δ`, `x2' = x2 − δ`. The sum, the aggregation
//! coefficient and both nonce prefixes stay the same, so the joint key and
//! every signature it produces are unchanged.

use super::{aggregate, detail, EdShare};
use crate::{
    channel::RoundContext,
    curve::{Curve, CurvePoint, CurveScalar, Ed25519},
    scheme::Scope,
    share::{check_share_id, new_share_id, PartyRole, SavedShare},
    store::ShareStore,
    zk::{CommittedProof, DLogCommitment, DLogProof, DLogWitness},
    Error, Result,
};
use curve25519_dalek::{EdwardsPoint, Scalar};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdRotateCommit {
    pub commitment: DLogCommitment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdRotatePeerProof {
    pub proof: DLogProof<Ed25519>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdRotateReveal {
    pub witness: DLogWitness<Ed25519>,
    /// Proof of `x1'`
    pub new_public_proof: DLogProof<Ed25519>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdRotateDone {
    pub share_id: String,
    /// Proof of `x2'`
    pub new_public_proof: DLogProof<Ed25519>,
}

fn rotation_delta(seed_point: &EdwardsPoint) -> Scalar {
    Ed25519::hash_to_scalar(&[b"twoparty/ed25519/rotate", &Ed25519::encode_point(seed_point)])
}

fn rotated(detail: &EdShare, secret: Scalar, peer_public_share: EdwardsPoint) -> Result<EdShare> {
    let next = EdShare {
        secret: CurveScalar(secret),
        prefix: detail.prefix.clone(),
        agg_coefficient: detail.agg_coefficient,
        public_share: CurvePoint(Ed25519::mul_base(&secret)),
        peer_public_share: CurvePoint(peer_public_share),
        public_key: detail.public_key,
    };
    if !next.aggregate_matches() {
        return Err(Error::PublicKeyMismatch(
            "rotated shares no longer aggregate to the joint public key".to_string(),
        ));
    }
    Ok(next)
}

#[instrument(skip(ctx, share), fields(share_id = %share.share_id))]
pub async fn run_rotate(ctx: &mut RoundContext<'_>, share: &SavedShare) -> Result<SavedShare> {
    ctx.bind_share(share);
    let detail = detail(share)?;
    info!("Starting ed25519 rotation");

    let seed = Ed25519::random_scalar();
    let committed = CommittedProof::<Ed25519>::new(&seed, b"");

    debug!("Rotate round 1: seed commitment");
    let reply: EdRotatePeerProof = ctx
        .exchange(&EdRotateCommit {
            commitment: committed.commitment.clone(),
        })
        .await?;
    reply.proof.verify(b"")?;
    let delta = rotation_delta(&(reply.proof.public() * seed));
    let new_secret = detail.secret.0 + delta;

    debug!("Rotate round 2: reveal");
    let done: EdRotateDone = ctx
        .exchange(&EdRotateReveal {
            witness: committed.witness,
            new_public_proof: DLogProof::prove(&new_secret, b""),
        })
        .await?;

    ctx.finalizing()?;
    check_share_id(&done.share_id)?;
    done.new_public_proof.verify(b"")?;
    let peer_public_share = done.new_public_proof.public();
    if peer_public_share != detail.peer_public_share.0 - Ed25519::mul_base(&delta) {
        return Err(Error::PublicKeyMismatch(format!(
            "peer share for {} was not rotated by the agreed amount",
            share.share_id
        )));
    }
    let next = rotated(&detail, new_secret, peer_public_share)?;

    info!(new_share_id = %done.share_id, "ed25519 rotation complete");
    SavedShare::new(
        share.identity_id.as_str(),
        done.share_id,
        Scope::Ed25519Eddsa,
        PartyRole::Initiator,
        share.uncompressed_pub.clone(),
        &next,
    )
}

/// Responder state between rotation steps
pub struct EdRotatePending {
    commitment: DLogCommitment,
    seed: Scalar,
    share: SavedShare,
}

pub(crate) fn respond_commit(share: SavedShare, msg: EdRotateCommit) -> (EdRotatePeerProof, EdRotatePending) {
    let seed = Ed25519::random_scalar();
    (
        EdRotatePeerProof {
            proof: DLogProof::prove(&seed, b""),
        },
        EdRotatePending {
            commitment: msg.commitment,
            seed,
            share,
        },
    )
}

pub(crate) fn respond_reveal(
    pending: EdRotatePending,
    msg: EdRotateReveal,
    store: &dyn ShareStore,
) -> Result<EdRotateDone> {
    let detail = detail(&pending.share)?;
    let peer_seed_point = msg.witness.open(&pending.commitment, b"")?;
    let delta = rotation_delta(&(peer_seed_point * pending.seed));

    msg.new_public_proof.verify(b"")?;
    let peer_public_share = msg.new_public_proof.public();
    if peer_public_share != detail.peer_public_share.0 + Ed25519::mul_base(&delta) {
        return Err(Error::VerificationFailed(
            "peer share was not rotated by the agreed amount".to_string(),
        ));
    }
    let new_secret = detail.secret.0 - delta;
    let next = rotated(&detail, new_secret, peer_public_share)?;

    let share_id = new_share_id();
    store.put(SavedShare::new(
        pending.share.identity_id.as_str(),
        share_id.as_str(),
        Scope::Ed25519Eddsa,
        PartyRole::Responder,
        pending.share.uncompressed_pub.clone(),
        &next,
    )?)?;

    store.mark_superseded(&pending.share.share_id);
    debug!(old_share_id = %pending.share.share_id, share_id, "Responder stored rotated ed25519 share");
    Ok(EdRotateDone {
        share_id,
        new_public_proof: DLogProof::prove(&new_secret, b""),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::LocalPeer;
    use crate::config::ProtocolConfig;
    use crate::ed25519::Ed25519Eddsa;
    use crate::signature::Signature;
    use crate::wire::Status;

    #[tokio::test]
    async fn test_rotation_invariants() {
        let peer = LocalPeer::new(ProtocolConfig::insecure_for_testing());
        let share = peer.keygen(&Ed25519Eddsa, "wangcy").await.unwrap();
        let rotated = peer.rotate(&Ed25519Eddsa, &share).await.unwrap();

        assert_eq!(rotated.uncompressed_pub, share.uncompressed_pub);
        assert_ne!(rotated.share_id, share.share_id);
        assert_eq!(rotated.identity_id, share.identity_id);
        assert_eq!(rotated.party, share.party);
        assert_eq!(rotated.scope, share.scope);

        let old: EdShare = share.detail().unwrap();
        let new: EdShare = rotated.detail().unwrap();
        assert_ne!(old.secret.0, new.secret.0);
        assert_eq!(old.prefix, new.prefix);
    }

    #[tokio::test]
    async fn test_signature_identical_after_rotation() {
        let peer = LocalPeer::new(ProtocolConfig::insecure_for_testing());
        let share = peer.keygen(&Ed25519Eddsa, "wangcy").await.unwrap();
        let rotated = peer.rotate(&Ed25519Eddsa, &share).await.unwrap();
        let twice = peer.rotate(&Ed25519Eddsa, &rotated).await.unwrap();

        let before = peer.sign(&Ed25519Eddsa, &share, b"hello").await.unwrap();
        let after = peer.sign(&Ed25519Eddsa, &rotated, b"hello").await.unwrap();
        let later = peer.sign(&Ed25519Eddsa, &twice, b"hello").await.unwrap();
        assert_eq!(before, after);
        assert_eq!(before, later);
        assert!(matches!(before, Signature::Eddsa(_)));
    }

    #[tokio::test]
    async fn test_mismatched_rotation_is_fatal() {
        let peer = LocalPeer::new(ProtocolConfig::insecure_for_testing());
        let share = peer.keygen(&Ed25519Eddsa, "wangcy").await.unwrap();
        let mut channel = peer.channel().with_tamper(|request, response| {
            if request.step == 2 && response.status == Status::Ok {
                let mut done: EdRotateDone = serde_json::from_value(response.payload.clone()).unwrap();
                done.new_public_proof = DLogProof::prove(&Ed25519::random_scalar(), b"");
                response.payload = serde_json::to_value(&done).unwrap();
            }
        });
        let mut machine = crate::state::StateMachine::new(crate::wire::Operation::Rotate);
        machine.advance(crate::state::OperationState::Connecting).unwrap();
        let mut ctx = RoundContext::new(&mut channel, &mut machine, Scope::Ed25519Eddsa);

        let result = run_rotate(&mut ctx, &share).await;
        assert!(matches!(result, Err(Error::PublicKeyMismatch(_))));
    }

    #[tokio::test]
    async fn test_superseded_share_swept_after_rotation() {
        let peer = LocalPeer::new(ProtocolConfig::insecure_for_testing());
        let share = peer.keygen(&Ed25519Eddsa, "wangcy").await.unwrap();
        let rotated = peer.rotate(&Ed25519Eddsa, &share).await.unwrap();

        // Old share stays usable until the retention sweep
        assert_eq!(peer.store().cleanup(std::time::Duration::from_secs(3600)), 0);
        peer.sign(&Ed25519Eddsa, &share, b"hello").await.unwrap();

        assert_eq!(peer.store().cleanup(std::time::Duration::ZERO), 1);
        assert!(!peer.store().exists(&share.share_id));
        peer.sign(&Ed25519Eddsa, &rotated, b"hello").await.unwrap();
    }
}
