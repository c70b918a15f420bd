//! secp256k1 key generation
//!
//! 1. I → R: commitment to `Q1`
//! 2. R → I: proof of `x2` for `Q2`
//! 3. I → R: opening of `Q1`, Paillier key, `Enc(x1)` with proofs
//! 4. R → I: new share id and the responder's view of the public key

use super::paillier::{
    self, big_hex, scalar_to_bn, CorrectEncryptionProof, CorrectKeyProof, PaillierKeyPair,
};
use super::{uncompressed, InitiatorShare, ResponderShare};
use crate::{
    channel::RoundContext,
    config::ProtocolConfig,
    curve::{Curve, CurvePoint, CurveScalar, Secp256k1},
    scheme::{validate_identity, Scope},
    share::{check_share_id, new_share_id, PartyRole, SavedShare},
    store::ShareStore,
    zk::{CommittedProof, DLogCommitment, DLogProof, DLogWitness},
    Error, Result,
};
use k256::Scalar;
use libpaillier::{unknown_order::BigNumber, EncryptionKey};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeygenCommit {
    pub commitment: DLogCommitment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeygenPeerProof {
    pub proof: DLogProof<Secp256k1>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeygenReveal {
    pub witness: DLogWitness<Secp256k1>,
    pub paillier_key: EncryptionKey,
    #[serde(with = "big_hex")]
    pub encrypted_secret: BigNumber,
    pub key_proof: CorrectKeyProof,
    pub encryption_proof: CorrectEncryptionProof,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeygenDone {
    pub share_id: String,
    pub public_key: CurvePoint<Secp256k1>,
}

/// Everything the Paillier hand-over needs, shared with rotation
pub(crate) struct PaillierHandover {
    pub pair: PaillierKeyPair,
    pub encrypted_secret: BigNumber,
    pub key_proof: CorrectKeyProof,
    pub encryption_proof: CorrectEncryptionProof,
}

impl PaillierHandover {
    /// Fresh Paillier key plus `Enc(secret)` and both proofs
    pub(crate) async fn prepare(secret: Scalar, modulus_bits: usize) -> Result<Self> {
        Self::spawn(secret, modulus_bits)?.wait().await
    }

    /// Start the hand-over on its own thread. Prime generation is slow and
    /// cannot be interrupted, so it stays off the runtime's blocking pool
    /// and an abandoned hand-over never holds up runtime shutdown.
    pub(crate) fn spawn(secret: Scalar, modulus_bits: usize) -> Result<PendingHandover> {
        let (tx, rx) = oneshot::channel();
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        std::thread::Builder::new()
            .name("paillier-keygen".to_string())
            .spawn(move || {
                let _ = tx.send(Self::compute(secret, modulus_bits, &flag));
            })
            .map_err(|e| Error::Internal(format!("Paillier worker: {e}")))?;
        Ok(PendingHandover { rx, cancelled })
    }

    fn compute(secret: Scalar, modulus_bits: usize, cancelled: &AtomicBool) -> Result<Self> {
        let abandoned = || Error::Internal("Paillier hand-over abandoned".to_string());
        if cancelled.load(Ordering::Relaxed) {
            return Err(abandoned());
        }
        let pair = PaillierKeyPair::generate(modulus_bits)?;
        if cancelled.load(Ordering::Relaxed) {
            return Err(abandoned());
        }
        let (encrypted_secret, nonce) =
            paillier::encrypt(&pair.encryption_key, &scalar_to_bn(&secret))?;
        let key_proof = CorrectKeyProof::prove(&pair)?;
        let encryption_proof = CorrectEncryptionProof::prove(
            &pair.encryption_key,
            &encrypted_secret,
            &nonce,
            &secret,
        )?;
        Ok(Self {
            pair,
            encrypted_secret,
            key_proof,
            encryption_proof,
        })
    }
}

/// Hand-over still being computed; dropping it tells the worker to stop
/// at its next checkpoint
pub(crate) struct PendingHandover {
    rx: oneshot::Receiver<Result<PaillierHandover>>,
    cancelled: Arc<AtomicBool>,
}

impl PendingHandover {
    pub(crate) async fn wait(mut self) -> Result<PaillierHandover> {
        (&mut self.rx)
            .await
            .map_err(|_| Error::Internal("Paillier worker exited".to_string()))?
    }
}

impl Drop for PendingHandover {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}

/// Responder-side check of a Paillier hand-over for the secret behind `q`
pub(crate) fn verify_handover(
    key: &EncryptionKey,
    encrypted_secret: &BigNumber,
    key_proof: &CorrectKeyProof,
    encryption_proof: &CorrectEncryptionProof,
    q: &k256::ProjectivePoint,
    config: &ProtocolConfig,
) -> Result<()> {
    paillier::check_modulus(key, config.min_peer_modulus_bits)?;
    key_proof.verify(key)?;
    encryption_proof.verify(key, encrypted_secret, q)
}

/// Initiator side of key generation
#[instrument(skip(ctx, config))]
pub async fn run_keygen(
    ctx: &mut RoundContext<'_>,
    identity_id: &str,
    config: &ProtocolConfig,
) -> Result<SavedShare> {
    validate_identity(identity_id)?;
    ctx.bind_identity(identity_id);
    info!(identity_id, "Starting secp256k1 keygen");

    let secret = Secp256k1::random_scalar();
    let committed = CommittedProof::<Secp256k1>::new(&secret, b"");
    let handover = PaillierHandover::spawn(secret, config.paillier_modulus_bits)?;

    debug!("Keygen round 1: commitment");
    let reply: KeygenPeerProof = ctx
        .exchange(&KeygenCommit {
            commitment: committed.commitment.clone(),
        })
        .await?;
    reply.proof.verify(b"")?;
    let peer_public_share = reply.proof.public();

    let handover = handover.wait().await?;
    let public_key = peer_public_share * secret;

    debug!("Keygen round 2: reveal and Paillier hand-over");
    let done: KeygenDone = ctx
        .exchange(&KeygenReveal {
            witness: committed.witness,
            paillier_key: handover.pair.encryption_key.clone(),
            encrypted_secret: handover.encrypted_secret,
            key_proof: handover.key_proof,
            encryption_proof: handover.encryption_proof,
        })
        .await?;

    ctx.finalizing()?;
    check_share_id(&done.share_id)?;
    if done.public_key.0 != public_key {
        return Err(Error::VerificationFailed(
            "peer derived a different public key".to_string(),
        ));
    }

    let detail = InitiatorShare {
        secret: CurveScalar(secret),
        public_share: CurvePoint(Secp256k1::mul_base(&secret)),
        peer_public_share: CurvePoint(peer_public_share),
        paillier_p: handover.pair.p,
        paillier_q: handover.pair.q,
        public_key: CurvePoint(public_key),
    };
    info!(identity_id, share_id = %done.share_id, "secp256k1 keygen complete");
    SavedShare::new(
        identity_id,
        done.share_id,
        Scope::Secp256k1Ecdsa,
        PartyRole::Initiator,
        uncompressed(&public_key),
        &detail,
    )
}

/// Responder state between keygen steps
pub struct KeygenPending {
    commitment: DLogCommitment,
    secret: Scalar,
}

pub(crate) fn respond_commit(msg: KeygenCommit) -> (KeygenPeerProof, KeygenPending) {
    let secret = Secp256k1::random_scalar();
    let proof = DLogProof::<Secp256k1>::prove(&secret, b"");
    (
        KeygenPeerProof { proof },
        KeygenPending {
            commitment: msg.commitment,
            secret,
        },
    )
}

pub(crate) fn respond_reveal(
    pending: KeygenPending,
    msg: KeygenReveal,
    identity_id: &str,
    store: &dyn ShareStore,
    config: &ProtocolConfig,
) -> Result<KeygenDone> {
    validate_identity(identity_id)?;
    let peer_public_share = msg.witness.open(&pending.commitment, b"")?;
    verify_handover(
        &msg.paillier_key,
        &msg.encrypted_secret,
        &msg.key_proof,
        &msg.encryption_proof,
        &peer_public_share,
        config,
    )?;

    let public_key = peer_public_share * pending.secret;
    let share_id = new_share_id();
    let detail = ResponderShare {
        secret: CurveScalar(pending.secret),
        public_share: CurvePoint(Secp256k1::mul_base(&pending.secret)),
        peer_public_share: CurvePoint(peer_public_share),
        paillier_key: msg.paillier_key,
        encrypted_secret: msg.encrypted_secret,
        public_key: CurvePoint(public_key),
    };
    store.put(SavedShare::new(
        identity_id,
        share_id.as_str(),
        Scope::Secp256k1Ecdsa,
        PartyRole::Responder,
        uncompressed(&public_key),
        &detail,
    )?)?;

    debug!(identity_id, share_id, "Responder stored secp256k1 share");
    Ok(KeygenDone {
        share_id,
        public_key: CurvePoint(public_key),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::LocalPeer;
    use crate::secp256k1::Secp256k1Ecdsa;
    use crate::wire::Status;

    fn scheme() -> Secp256k1Ecdsa {
        Secp256k1Ecdsa::new(ProtocolConfig::insecure_for_testing())
    }

    #[tokio::test]
    async fn test_keygen_shares_agree() {
        let peer = LocalPeer::new(ProtocolConfig::insecure_for_testing());
        let share = peer.keygen(&scheme(), "wangcy").await.unwrap();

        assert_eq!(share.uncompressed_pub.len(), 65);
        assert_eq!(share.uncompressed_pub[0], 0x04);
        assert_eq!(share.party, PartyRole::Initiator);
        assert_eq!(share.identity_id, "wangcy");

        let theirs = peer.store().get(&share.share_id).unwrap();
        assert_eq!(theirs.uncompressed_pub, share.uncompressed_pub);
        assert_eq!(theirs.party, PartyRole::Responder);

        let mine: InitiatorShare = share.detail().unwrap();
        let other: ResponderShare = theirs.detail().unwrap();
        assert_eq!(
            Secp256k1::mul_base(&(mine.secret.0 * other.secret.0)),
            mine.public_key.0
        );
    }

    #[tokio::test]
    async fn test_invalid_identity_rejected_before_any_round() {
        let peer = LocalPeer::new(ProtocolConfig::insecure_for_testing());
        let result = peer.keygen(&scheme(), "").await;
        assert!(matches!(result, Err(Error::InvalidIdentity(_))));
        assert!(peer.store().is_empty());
    }

    #[tokio::test]
    async fn test_small_modulus_rejected_by_peer() {
        let peer = LocalPeer::new(ProtocolConfig::insecure_for_testing().with_min_peer_modulus_bits(2047));
        let result = peer.keygen(&scheme(), "wangcy").await;
        assert!(matches!(result, Err(Error::VerificationFailed(msg)) if msg.contains("modulus")));
        assert!(peer.store().is_empty());
    }

    #[tokio::test]
    async fn test_forged_peer_proof_detected() {
        let peer = LocalPeer::new(ProtocolConfig::insecure_for_testing());
        let mut channel = peer.channel().with_tamper(|request, response| {
            if request.step == 1 && response.status == Status::Ok {
                let mut reply: KeygenPeerProof =
                    serde_json::from_value(response.payload.clone()).unwrap();
                reply.proof.s = CurveScalar(Secp256k1::random_scalar());
                response.payload = serde_json::to_value(&reply).unwrap();
            }
        });
        let mut machine = crate::state::StateMachine::new(crate::wire::Operation::Keygen);
        machine.advance(crate::state::OperationState::Connecting).unwrap();
        let mut ctx = RoundContext::new(&mut channel, &mut machine, Scope::Secp256k1Ecdsa);

        let result = run_keygen(&mut ctx, "wangcy", &ProtocolConfig::insecure_for_testing()).await;
        assert!(matches!(result, Err(Error::VerificationFailed(_))));
    }

    #[test]
    fn test_abandoned_handover_stops_early() {
        let cancelled = AtomicBool::new(true);
        let result = PaillierHandover::compute(Secp256k1::random_scalar(), 1024, &cancelled);
        assert!(matches!(result, Err(Error::Internal(msg)) if msg.contains("abandoned")));
    }

    #[tokio::test]
    async fn test_failed_first_round_abandons_handover() {
        let peer = LocalPeer::new(ProtocolConfig::insecure_for_testing());
        let mut channel = peer.channel().disconnect_at(1);
        let mut machine = crate::state::StateMachine::new(crate::wire::Operation::Keygen);
        machine.advance(crate::state::OperationState::Connecting).unwrap();
        let mut ctx = RoundContext::new(&mut channel, &mut machine, Scope::Secp256k1Ecdsa);

        let result = run_keygen(&mut ctx, "wangcy", &ProtocolConfig::insecure_for_testing()).await;
        assert!(matches!(result, Err(Error::ProtocolAbort(_))));
        assert!(peer.store().is_empty());
    }
}
