//! Blocking call surface, one module per scheme.
//!
//! Every call runs on its own current-thread runtime and returns an
//! [`OperationResult`]; nothing panics across this boundary. A call made
//! from inside an async runtime is rejected with `InvalidInput`.
//!
//! Payloads on success:
//! - `keygen`, `rotate`: [`SavedShare`] JSON bytes
//! - `sign`: `{"r","s","v"}` JSON for secp256k1, raw 64 bytes for ed25519
//! - `export`: the private key as 64 lowercase hex characters

use crate::{config::EngineConfig, engine::Engine};
use std::future::Future;
use std::sync::OnceLock;
use tracing::warn;
use twoparty_core::{Error, OperationResult, Result, SavedShare, Scope};

static ENGINE: OnceLock<Engine> = OnceLock::new();

/// Process-wide engine configured from the environment
fn engine() -> &'static Engine {
    ENGINE.get_or_init(|| {
        let config = EngineConfig::from_env().unwrap_or_else(|e| {
            warn!(error = %e, "Ignoring invalid engine environment");
            EngineConfig::default()
        });
        Engine::new(config)
    })
}

fn block_on<F>(operation: F) -> OperationResult
where
    F: Future<Output = Result<Vec<u8>>>,
{
    if tokio::runtime::Handle::try_current().is_ok() {
        return OperationResult::from(Error::InvalidInput(
            "blocking call made from within an async runtime".to_string(),
        ));
    }
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Internal(format!("runtime: {e}")));
    match runtime {
        Ok(runtime) => OperationResult::from_result(runtime.block_on(operation)),
        Err(e) => OperationResult::from(e),
    }
}

fn parse_share(share_bytes: &[u8], scope: Scope) -> Result<SavedShare> {
    let share = SavedShare::from_bytes(share_bytes)?;
    if share.scope != scope {
        return Err(Error::ScopeMismatch {
            expected: scope,
            actual: share.scope,
        });
    }
    Ok(share)
}

fn keygen(scope: Scope, identity_id: &str, address: &str) -> OperationResult {
    block_on(async {
        engine()
            .keygen(scope, identity_id, address)
            .await?
            .to_bytes()
    })
}

fn sign(scope: Scope, address: &str, share_bytes: &[u8], digest: &[u8]) -> OperationResult {
    block_on(async {
        let share = parse_share(share_bytes, scope)?;
        engine().sign(address, &share, digest).await?.to_payload()
    })
}

fn rotate(scope: Scope, address: &str, share_bytes: &[u8]) -> OperationResult {
    block_on(async {
        let share = parse_share(share_bytes, scope)?;
        engine().rotate(address, &share).await?.to_bytes()
    })
}

pub mod secp256k1 {
    use super::*;

    pub fn keygen(identity_id: &str, address: &str) -> OperationResult {
        super::keygen(Scope::Secp256k1Ecdsa, identity_id, address)
    }

    /// `digest` must be exactly 32 bytes
    pub fn sign(address: &str, share_bytes: &[u8], digest: &[u8]) -> OperationResult {
        super::sign(Scope::Secp256k1Ecdsa, address, share_bytes, digest)
    }

    pub fn rotate(address: &str, share_bytes: &[u8]) -> OperationResult {
        super::rotate(Scope::Secp256k1Ecdsa, address, share_bytes)
    }

    /// The share must not be used again once exported
    pub fn export(address: &str, share_bytes: &[u8]) -> OperationResult {
        block_on(async {
            let share = parse_share(share_bytes, Scope::Secp256k1Ecdsa)?;
            engine()
                .export(address, &share)
                .await
                .map(String::into_bytes)
        })
    }
}

pub mod ed25519 {
    use super::*;

    pub fn keygen(identity_id: &str, address: &str) -> OperationResult {
        super::keygen(Scope::Ed25519Eddsa, identity_id, address)
    }

    /// `message` is signed as given, 1 to 4096 bytes
    pub fn sign(address: &str, share_bytes: &[u8], message: &[u8]) -> OperationResult {
        super::sign(Scope::Ed25519Eddsa, address, share_bytes, message)
    }

    pub fn rotate(address: &str, share_bytes: &[u8]) -> OperationResult {
        super::rotate(Scope::Ed25519Eddsa, address, share_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use twoparty_core::ErrorKind;

    #[test]
    fn test_garbage_share_is_invalid_input() {
        let result = ed25519::sign("ws://127.0.0.1:1/ws", b"not a share", b"hello");
        assert_eq!(result.error_kind(), Some(ErrorKind::InvalidInput));
        assert_eq!(result.into_wire().len(), 2);
    }

    #[test]
    fn test_bad_address_is_reported() {
        let result = secp256k1::keygen("wangcy", "localhost:8822");
        assert_eq!(result.error_kind(), Some(ErrorKind::InvalidInput));
    }

    #[tokio::test]
    async fn test_call_inside_runtime_is_rejected() {
        let result = ed25519::keygen("wangcy", "ws://127.0.0.1:1/ws");
        assert_eq!(result.error_kind(), Some(ErrorKind::InvalidInput));
        let wire = result.into_wire();
        assert!(String::from_utf8_lossy(&wire[1]).contains("async runtime"));
    }
}
