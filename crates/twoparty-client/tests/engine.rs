mod common;

use common::*;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpListener;
use twoparty_client::{Engine, EngineConfig};
use twoparty_core::{
    ed25519::Ed25519Eddsa, scheme::MAX_IDENTITY_LEN, secp256k1::Secp256k1Ecdsa, Error, ErrorKind,
    PartyRole, ProtocolConfig, Scope,
    ShareStore, Signature,
};

/// Address nothing listens on
fn dead_address() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("ws://127.0.0.1:{port}/ws")
}

fn engine() -> Engine {
    Engine::new(EngineConfig::default().with_protocol(ProtocolConfig::insecure_for_testing()))
}

#[tokio::test(flavor = "multi_thread")]
async fn test_secp256k1_lifecycle() {
    let (address, peer) = start_peer().await;
    let engine = engine();

    let share = engine
        .keygen(Scope::Secp256k1Ecdsa, "wangcy", &address)
        .await
        .unwrap();
    assert_eq!(share.uncompressed_pub.len(), 65);
    assert_eq!(share.uncompressed_pub[0], 0x04);
    assert_eq!(share.party, PartyRole::Initiator);
    assert!(peer.store.exists(&share.share_id));

    let digest = hello_digest();
    let Signature::Ecdsa(sig) = engine.sign(&address, &share, &digest).await.unwrap() else {
        panic!("expected ECDSA signature");
    };
    check_ecdsa(&share.uncompressed_pub, &digest, &sig);

    let rotated = engine.rotate(&address, &share).await.unwrap();
    assert_eq!(rotated.uncompressed_pub, share.uncompressed_pub);
    assert_ne!(rotated.share_id, share.share_id);
    let Signature::Ecdsa(sig) = engine.sign(&address, &rotated, &digest).await.unwrap() else {
        panic!("expected ECDSA signature");
    };
    check_ecdsa(&share.uncompressed_pub, &digest, &sig);

    let exported = engine.export(&address, &rotated).await.unwrap();
    assert_eq!(exported.len(), 64);
    assert_eq!(exported, exported.to_lowercase());
    assert_eq!(exported_public_key(&exported), share.uncompressed_pub);
    assert!(engine.leases().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ed25519_signature_survives_rotation() {
    let (address, _peer) = start_peer().await;
    let engine = engine();
    let client = engine.scheme::<Ed25519Eddsa>();

    let share = client.keygen("wangcy", &address).await.unwrap();
    assert_eq!(share.uncompressed_pub.len(), 32);

    let before = client.sign(&address, &share, b"hello").await.unwrap();
    let rotated = client.rotate(&address, &share).await.unwrap();
    let after = client.sign(&address, &rotated, b"hello").await.unwrap();

    assert_eq!(before, after);
    let raw = after.to_raw();
    assert_eq!(raw.len(), 64);
    check_ed25519(&share.uncompressed_pub, b"hello", &raw);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_use_of_one_share_is_busy() {
    let (address, _peer) = start_peer().await;
    let engine = engine();
    let share = engine
        .keygen(Scope::Ed25519Eddsa, "wangcy", &address)
        .await
        .unwrap();

    let (first, second) = tokio::join!(
        engine.sign(&address, &share, b"one"),
        engine.sign(&address, &share, b"two"),
    );
    assert!(first.is_ok());
    assert!(matches!(second, Err(Error::ShareBusy(_))));

    // Released once the first operation finished
    engine.sign(&address, &share, b"three").await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_wrong_digest_length_fails_fast() {
    let (address, _peer) = start_peer().await;
    let engine = engine();
    let share = engine
        .keygen(Scope::Secp256k1Ecdsa, "wangcy", &address)
        .await
        .unwrap();

    let result = engine.sign(&address, &share, b"short").await;
    assert!(matches!(result, Err(Error::InvalidInput(_))));
    let typed = engine.scheme::<Secp256k1Ecdsa>().export(&address, &share).await;
    assert!(typed.is_ok());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_silent_peer_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut socket = tokio_tungstenite::accept_async(stream).await.unwrap();
        // Read requests, never answer
        while socket.next().await.is_some() {}
    });

    let engine = Engine::new(
        EngineConfig::default()
            .with_round_timeout(Duration::from_millis(300))
            .with_protocol(ProtocolConfig::insecure_for_testing()),
    );
    let result = engine
        .keygen(Scope::Ed25519Eddsa, "wangcy", &format!("ws://127.0.0.1:{port}/ws"))
        .await;
    assert!(matches!(result, Err(Error::Timeout(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_peer_hangup_aborts() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut socket = tokio_tungstenite::accept_async(stream).await.unwrap();
        let _ = socket.next().await;
        let _ = socket.close(None).await;
        let _ = socket.flush().await;
    });

    let result = engine()
        .keygen(Scope::Ed25519Eddsa, "wangcy", &format!("ws://127.0.0.1:{port}/ws"))
        .await;
    assert!(matches!(result, Err(Error::ProtocolAbort(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unreachable_peer_is_transient() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let err = engine()
        .keygen(Scope::Ed25519Eddsa, "wangcy", &format!("ws://127.0.0.1:{port}/ws"))
        .await
        .unwrap_err();
    assert!(err.kind().is_transient());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_bad_identity_is_not_transient() {
    let dead = dead_address();
    let engine = engine();
    for identity in [String::new(), "a".repeat(MAX_IDENTITY_LEN + 1), "bad\nname".to_string()] {
        for scope in Scope::ALL {
            let err = engine.keygen(scope, &identity, &dead).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidIdentity, "{scope} {identity:?}");
            assert!(!err.kind().is_transient());
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_bad_digest_is_not_transient() {
    let (address, _peer) = start_peer().await;
    let engine = engine();
    let secp = engine
        .keygen(Scope::Secp256k1Ecdsa, "wangcy", &address)
        .await
        .unwrap();
    let ed = engine
        .keygen(Scope::Ed25519Eddsa, "wangcy", &address)
        .await
        .unwrap();

    let dead = dead_address();
    let cases = [
        (&secp, vec![7u8; 31]),
        (&secp, Vec::new()),
        (&ed, Vec::new()),
        (&ed, vec![7u8; 4097]),
    ];
    for (share, digest) in cases {
        let err = engine.sign(&dead, share, &digest).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput, "{} {}", share.scope, digest.len());
        assert!(!engine.leases().is_held(&share.share_id));
    }

    // Bounds themselves are accepted and reach the transport
    let err = engine.sign(&dead, &ed, &[7u8; 4096]).await.unwrap_err();
    assert!(err.kind().is_transient());
}
