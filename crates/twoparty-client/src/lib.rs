//! # twoparty-client
//!
//! Runs the initiating side of two-party operations against a remote peer.
//!
//! - [`Session`]: one websocket connection per operation
//! - [`Engine`]: share leases, timeouts and scheme dispatch
//! - [`SchemeClient`]: typed per-scheme front end
//! - [`boundary`]: blocking calls returning an [`OperationResult`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use twoparty_client::{Engine, EngineConfig};
//! use twoparty_core::Scope;
//!
//! let engine = Engine::new(EngineConfig::default());
//! let share = engine.keygen(Scope::Ed25519Eddsa, "wangcy", "ws://localhost:8822/ws").await?;
//! let signature = engine.sign("ws://localhost:8822/ws", &share, b"hello").await?;
//! ```

pub mod boundary;
pub mod config;
pub mod engine;
pub mod lease;
pub mod session;

pub use config::EngineConfig;
pub use engine::{Engine, SchemeClient};
pub use lease::{LeaseGuard, ShareLeases};
pub use session::Session;
pub use twoparty_core::OperationResult;
