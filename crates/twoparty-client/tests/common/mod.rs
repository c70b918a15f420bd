#![allow(dead_code)]

use k256::ecdsa::{signature::hazmat::PrehashVerifier, RecoveryId, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use sha2::{Digest, Sha256};
use tokio::net::TcpListener;
use twoparty_core::{EcdsaSignature, ProtocolConfig};
use twoparty_peer::{serve, PeerState};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Start a peer on an ephemeral port; returns its websocket address
pub async fn start_peer() -> (String, PeerState) {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let state = PeerState::new(ProtocolConfig::insecure_for_testing());
    tokio::spawn(serve(listener, state.clone()));
    (format!("ws://127.0.0.1:{port}/ws"), state)
}

/// Peer on its own thread and runtime, for the blocking surface
pub fn start_peer_thread() -> String {
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async move {
            let (address, _state) = start_peer().await;
            tx.send(address).unwrap();
            std::future::pending::<()>().await;
        });
    });
    rx.recv().unwrap()
}

pub fn hello_digest() -> Vec<u8> {
    Sha256::digest(b"hello").to_vec()
}

/// Verify and recover the signer from `v`
pub fn check_ecdsa(public_key: &[u8], digest: &[u8], signature: &EcdsaSignature) {
    let key = VerifyingKey::from_sec1_bytes(public_key).unwrap();
    let mut rs = [0u8; 64];
    rs[..32].copy_from_slice(&signature.r);
    rs[32..].copy_from_slice(&signature.s);
    let sig = k256::ecdsa::Signature::from_slice(&rs).unwrap();
    key.verify_prehash(digest, &sig).unwrap();

    let recovery = RecoveryId::from_byte(signature.v).unwrap();
    let recovered = VerifyingKey::recover_from_prehash(digest, &sig, recovery).unwrap();
    assert_eq!(recovered, key);
}

pub fn check_ed25519(public_key: &[u8], message: &[u8], signature: &[u8]) {
    let key_bytes: [u8; 32] = public_key.try_into().unwrap();
    let sig_bytes: [u8; 64] = signature.try_into().unwrap();
    let key = ed25519_dalek::VerifyingKey::from_bytes(&key_bytes).unwrap();
    key.verify_strict(message, &ed25519_dalek::Signature::from_bytes(&sig_bytes))
        .unwrap();
}

/// Uncompressed public key of an exported secp256k1 private key
pub fn exported_public_key(private_hex: &str) -> Vec<u8> {
    let secret = k256::SecretKey::from_slice(&hex::decode(private_hex).unwrap()).unwrap();
    secret
        .public_key()
        .to_encoded_point(false)
        .as_bytes()
        .to_vec()
}
