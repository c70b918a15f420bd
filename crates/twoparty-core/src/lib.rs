//! # twoparty-core
//!
//! Two-party threshold signing: two cooperating parties jointly hold a key
//! so that neither can sign alone, yet together they can generate keys,
//! sign, rotate their shares and, for secp256k1, export the private key.
//!
//! This crate provides:
//! - The share model and scheme registry
//! - Wire messages and the channel abstraction both parties talk over
//! - secp256k1 ECDSA (multiplicative shares, Paillier-assisted signing)
//! - ed25519 EdDSA (additive shares, deterministic signing)
//! - The responder that runs the counterparty side of every operation
//!
//! ## Example
//!
//! ```rust,ignore
//! use twoparty_core::{ed25519::Ed25519Eddsa, LocalPeer, ProtocolConfig};
//!
//! let peer = LocalPeer::new(ProtocolConfig::default());
//! let share = peer.keygen(&Ed25519Eddsa, "wangcy").await?;
//! let signature = peer.sign(&Ed25519Eddsa, &share, b"hello").await?;
//! ```

pub mod channel;
pub mod config;
pub mod curve;
pub mod ed25519;
pub mod error;
pub mod responder;
pub mod result;
pub mod scheme;
pub mod secp256k1;
pub mod share;
pub mod signature;
pub mod state;
pub mod store;
pub mod wire;
pub mod zk;

pub use channel::{Channel, LocalPeer, MemoryChannel, RoundContext};
pub use config::ProtocolConfig;
pub use error::{Error, ErrorKind, Result};
pub use responder::Responder;
pub use result::OperationResult;
pub use scheme::{Exportable, Scope, ThresholdScheme};
pub use share::{PartyRole, SavedShare};
pub use signature::{EcdsaSignature, Signature};
pub use state::{OperationState, StateMachine};
pub use store::{MemoryShareStore, ShareStore};

/// Protocol version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
