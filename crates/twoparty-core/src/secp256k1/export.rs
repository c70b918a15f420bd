//! secp256k1 key export
//!
//! The initiator proves knowledge of `x1`; the responder returns `Enc(x2)`
//! under the initiator's Paillier key. The initiator decrypts, checks
//! `x2·Q1` against the joint key and outputs `x1·x2`.

use super::paillier::{self, big_hex, bn_to_scalar, scalar_to_bn, PaillierKeyPair};
use super::{initiator_detail, ResponderShare};
use crate::{
    channel::RoundContext,
    curve::Secp256k1,
    share::SavedShare,
    zk::DLogProof,
    Error, Result,
};
use libpaillier::unknown_order::BigNumber;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

const EXPORT_BINDING: &[u8] = b"twoparty/export";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportRequest {
    /// Proof of `x1`
    pub secret_proof: DLogProof<Secp256k1>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportReply {
    /// `Enc(x2)` under the initiator's Paillier key
    #[serde(with = "big_hex")]
    pub encrypted_secret: BigNumber,
}

/// Initiator side of export; returns the private key as 64 hex chars
#[instrument(skip(ctx, share), fields(share_id = %share.share_id))]
pub async fn run_export(ctx: &mut RoundContext<'_>, share: &SavedShare) -> Result<String> {
    ctx.bind_share(share);
    let detail = initiator_detail(share)?;
    let paillier = PaillierKeyPair::from_primes(
        detail.paillier_p.clone(),
        detail.paillier_q.clone(),
    )?;
    warn!("Exporting secp256k1 private key; the share must be retired afterwards");

    debug!("Export round 1: secret proof");
    let reply: ExportReply = ctx
        .exchange(&ExportRequest {
            secret_proof: DLogProof::prove(&detail.secret.0, EXPORT_BINDING),
        })
        .await?;

    ctx.finalizing()?;
    let peer_secret = bn_to_scalar(&paillier.decrypt(&reply.encrypted_secret)?)?;
    if detail.public_share.0 * peer_secret != detail.public_key.0 {
        return Err(Error::VerificationFailed(
            "peer secret does not match the joint public key".to_string(),
        ));
    }

    let private_key = detail.secret.0 * peer_secret;
    info!("secp256k1 export complete");
    Ok(hex::encode(private_key.to_bytes()))
}

pub(crate) fn respond(share: &SavedShare, msg: ExportRequest) -> Result<ExportReply> {
    let detail: ResponderShare = share.detail()?;
    msg.secret_proof.verify(EXPORT_BINDING)?;
    if msg.secret_proof.public() != detail.peer_public_share.0 {
        return Err(Error::VerificationFailed(
            "secret proof is not for the stored peer share".to_string(),
        ));
    }
    if msg.secret_proof.public() * detail.secret.0 != detail.public_key.0 {
        return Err(Error::VerificationFailed(
            "stored share does not match the joint public key".to_string(),
        ));
    }
    let (encrypted_secret, _) =
        paillier::encrypt(&detail.paillier_key, &scalar_to_bn(&detail.secret.0))?;
    debug!(share_id = %share.share_id, "Responder released encrypted share for export");
    Ok(ExportReply { encrypted_secret })
}

#[cfg(test)]
mod tests {
    use crate::channel::LocalPeer;
    use crate::config::ProtocolConfig;
    use crate::curve::{Curve, Secp256k1};
    use crate::secp256k1::Secp256k1Ecdsa;
    use k256::elliptic_curve::sec1::ToEncodedPoint;

    fn scheme() -> Secp256k1Ecdsa {
        Secp256k1Ecdsa::new(ProtocolConfig::insecure_for_testing())
    }

    fn public_x(private_hex: &str) -> Vec<u8> {
        let bytes = hex::decode(private_hex).unwrap();
        let x = Secp256k1::decode_scalar(&bytes).unwrap();
        Secp256k1::mul_base(&x)
            .to_affine()
            .to_encoded_point(false)
            .x()
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn test_export_reproduces_public_key() {
        let peer = LocalPeer::new(ProtocolConfig::insecure_for_testing());
        let share = peer.keygen(&scheme(), "wangcy").await.unwrap();
        let exported = peer.export(&scheme(), &share).await.unwrap();

        assert_eq!(exported.len(), 64);
        assert_eq!(public_x(&exported), share.uncompressed_pub[1..33].to_vec());
    }

    #[tokio::test]
    async fn test_export_stable_across_rotation() {
        let peer = LocalPeer::new(ProtocolConfig::insecure_for_testing());
        let share = peer.keygen(&scheme(), "wangcy").await.unwrap();
        let before = peer.export(&scheme(), &share).await.unwrap();
        let rotated = peer.rotate(&scheme(), &share).await.unwrap();
        let after = peer.export(&scheme(), &rotated).await.unwrap();
        assert_eq!(before, after);
    }
}
