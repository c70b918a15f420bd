//! ed25519 key generation
//!
//! 1. I → R: commitment to `Q1`
//! 2. R → I: proof of `x2` for `Q2`
//! 3. I → R: opening of `Q1`
//! 4. R → I: new share id and the responder's aggregate key

use super::{agg_coefficient, aggregate, EdShare, SeedKey};
use crate::{
    channel::RoundContext,
    curve::{Curve, CurvePoint, CurveScalar, Ed25519},
    scheme::{validate_identity, Scope},
    share::{check_share_id, new_share_id, PartyRole, SavedShare},
    store::ShareStore,
    zk::{CommittedProof, DLogCommitment, DLogProof, DLogWitness},
    Error, Result,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdKeygenCommit {
    pub commitment: DLogCommitment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdKeygenPeerProof {
    pub proof: DLogProof<Ed25519>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdKeygenReveal {
    pub witness: DLogWitness<Ed25519>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdKeygenDone {
    pub share_id: String,
    pub public_key: CurvePoint<Ed25519>,
}

#[instrument(skip(ctx))]
pub async fn run_keygen(ctx: &mut RoundContext<'_>, identity_id: &str) -> Result<SavedShare> {
    validate_identity(identity_id)?;
    ctx.bind_identity(identity_id);
    info!(identity_id, "Starting ed25519 keygen");

    let key = SeedKey::random();
    let committed = CommittedProof::<Ed25519>::new(&key.secret, b"");

    debug!("Keygen round 1: commitment");
    let reply: EdKeygenPeerProof = ctx
        .exchange(&EdKeygenCommit {
            commitment: committed.commitment.clone(),
        })
        .await?;
    reply.proof.verify(b"")?;
    let peer_public_share = reply.proof.public();

    debug!("Keygen round 2: reveal");
    let done: EdKeygenDone = ctx
        .exchange(&EdKeygenReveal {
            witness: committed.witness,
        })
        .await?;

    ctx.finalizing()?;
    check_share_id(&done.share_id)?;
    let public_share = Ed25519::mul_base(&key.secret);
    let a = agg_coefficient(&public_share, &peer_public_share);
    let public_key = aggregate(&a, &public_share, &peer_public_share);
    if done.public_key.0 != public_key {
        return Err(Error::VerificationFailed(
            "peer derived a different public key".to_string(),
        ));
    }

    let detail = EdShare {
        secret: CurveScalar(key.secret),
        prefix: key.prefix.to_vec(),
        agg_coefficient: CurveScalar(a),
        public_share: CurvePoint(public_share),
        peer_public_share: CurvePoint(peer_public_share),
        public_key: CurvePoint(public_key),
    };
    info!(identity_id, share_id = %done.share_id, "ed25519 keygen complete");
    SavedShare::new(
        identity_id,
        done.share_id,
        Scope::Ed25519Eddsa,
        PartyRole::Initiator,
        Ed25519::encode_point(&public_key),
        &detail,
    )
}

/// Responder state between keygen steps
pub struct EdKeygenPending {
    commitment: DLogCommitment,
    key: SeedKey,
}

pub(crate) fn respond_commit(msg: EdKeygenCommit) -> (EdKeygenPeerProof, EdKeygenPending) {
    let key = SeedKey::random();
    let proof = DLogProof::<Ed25519>::prove(&key.secret, b"");
    (
        EdKeygenPeerProof { proof },
        EdKeygenPending {
            commitment: msg.commitment,
            key,
        },
    )
}

pub(crate) fn respond_reveal(
    pending: EdKeygenPending,
    msg: EdKeygenReveal,
    identity_id: &str,
    store: &dyn ShareStore,
) -> Result<EdKeygenDone> {
    validate_identity(identity_id)?;
    let peer_public_share = msg.witness.open(&pending.commitment, b"")?;
    let public_share = Ed25519::mul_base(&pending.key.secret);
    let a = agg_coefficient(&peer_public_share, &public_share);
    let public_key = aggregate(&a, &peer_public_share, &public_share);

    let share_id = new_share_id();
    let detail = EdShare {
        secret: CurveScalar(pending.key.secret),
        prefix: pending.key.prefix.to_vec(),
        agg_coefficient: CurveScalar(a),
        public_share: CurvePoint(public_share),
        peer_public_share: CurvePoint(peer_public_share),
        public_key: CurvePoint(public_key),
    };
    store.put(SavedShare::new(
        identity_id,
        share_id.as_str(),
        Scope::Ed25519Eddsa,
        PartyRole::Responder,
        Ed25519::encode_point(&public_key),
        &detail,
    )?)?;

    debug!(identity_id, share_id, "Responder stored ed25519 share");
    Ok(EdKeygenDone {
        share_id,
        public_key: CurvePoint(public_key),
    })
}
