//! Counterparty side of every operation.
//!
//! A [`Responder`] serves one channel. It keeps the round state of at most
//! one in-flight operation; step 1 always starts over, and any other step
//! must follow the pending one exactly.

use crate::{
    config::ProtocolConfig,
    ed25519::{keygen as ed_keygen, rotate as ed_rotate, sign as ed_sign},
    scheme::Scope,
    secp256k1::{export, keygen, rotate, sign},
    share::{PartyRole, SavedShare},
    store::ShareStore,
    wire::{Operation, RoundRequest, RoundResponse},
    Error, Result,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Round state carried between steps of one operation
enum Pending {
    Idle,
    Keygen(keygen::KeygenPending),
    Sign(sign::SignPending),
    Rotate(rotate::RotatePending),
    EdKeygen(ed_keygen::EdKeygenPending),
    EdSign(ed_sign::EdSignPending),
    EdRotate(ed_rotate::EdRotatePending),
}

impl Pending {
    fn name(&self) -> &'static str {
        match self {
            Pending::Idle => "idle",
            Pending::Keygen(_) => "secp256k1 keygen",
            Pending::Sign(_) => "secp256k1 sign",
            Pending::Rotate(_) => "secp256k1 rotate",
            Pending::EdKeygen(_) => "ed25519 keygen",
            Pending::EdSign(_) => "ed25519 sign",
            Pending::EdRotate(_) => "ed25519 rotate",
        }
    }
}

pub struct Responder {
    store: Arc<dyn ShareStore>,
    config: ProtocolConfig,
    pending: Pending,
}

impl Responder {
    pub fn new(store: Arc<dyn ShareStore>, config: ProtocolConfig) -> Self {
        Self {
            store,
            config,
            pending: Pending::Idle,
        }
    }

    /// Whether an operation is half-way through
    pub fn is_busy(&self) -> bool {
        !matches!(self.pending, Pending::Idle)
    }

    /// Answer one request; failures become error responses and drop any
    /// pending round state
    pub fn handle(&mut self, request: &RoundRequest) -> RoundResponse {
        match self.step(request) {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    operation = %request.operation,
                    scope = %request.scope,
                    step = request.step,
                    kind = %e.kind(),
                    error = %e,
                    "Responder rejected request"
                );
                self.pending = Pending::Idle;
                RoundResponse::from_error(&e)
            }
        }
    }

    fn step(&mut self, request: &RoundRequest) -> Result<RoundResponse> {
        debug!(
            operation = %request.operation,
            scope = %request.scope,
            step = request.step,
            pending = self.pending.name(),
            "Responder step"
        );
        if request.step == 1 {
            self.pending = Pending::Idle;
        }
        let pending = std::mem::replace(&mut self.pending, Pending::Idle);

        match (request.scope, request.operation, request.step, pending) {
            (Scope::Secp256k1Ecdsa, Operation::Keygen, 1, Pending::Idle) => {
                let (reply, next) = keygen::respond_commit(request.payload()?);
                self.pending = Pending::Keygen(next);
                RoundResponse::ok(&reply)
            }
            (Scope::Secp256k1Ecdsa, Operation::Keygen, 2, Pending::Keygen(p)) => {
                RoundResponse::ok(&keygen::respond_reveal(
                    p,
                    request.payload()?,
                    &request.identity_id,
                    self.store.as_ref(),
                    &self.config,
                )?)
            }
            (Scope::Secp256k1Ecdsa, Operation::Sign, 1, Pending::Idle) => {
                let share = self.load(request)?;
                let (reply, next) = sign::respond_commit(share, request.payload()?);
                self.pending = Pending::Sign(next);
                RoundResponse::ok(&reply)
            }
            (Scope::Secp256k1Ecdsa, Operation::Sign, 2, Pending::Sign(p)) => {
                RoundResponse::ok(&sign::respond_reveal(p, request.payload()?)?)
            }
            (Scope::Secp256k1Ecdsa, Operation::Rotate, 1, Pending::Idle) => {
                let share = self.load(request)?;
                let (reply, next) = rotate::respond_commit(share, request.payload()?);
                self.pending = Pending::Rotate(next);
                RoundResponse::ok(&reply)
            }
            (Scope::Secp256k1Ecdsa, Operation::Rotate, 2, Pending::Rotate(p)) => {
                RoundResponse::ok(&rotate::respond_reveal(
                    p,
                    request.payload()?,
                    self.store.as_ref(),
                    &self.config,
                )?)
            }
            (Scope::Secp256k1Ecdsa, Operation::Export, 1, Pending::Idle) => {
                let share = self.load(request)?;
                RoundResponse::ok(&export::respond(&share, request.payload()?)?)
            }
            (Scope::Ed25519Eddsa, Operation::Keygen, 1, Pending::Idle) => {
                let (reply, next) = ed_keygen::respond_commit(request.payload()?);
                self.pending = Pending::EdKeygen(next);
                RoundResponse::ok(&reply)
            }
            (Scope::Ed25519Eddsa, Operation::Keygen, 2, Pending::EdKeygen(p)) => {
                RoundResponse::ok(&ed_keygen::respond_reveal(
                    p,
                    request.payload()?,
                    &request.identity_id,
                    self.store.as_ref(),
                )?)
            }
            (Scope::Ed25519Eddsa, Operation::Sign, 1, Pending::Idle) => {
                let share = self.load(request)?;
                let (reply, next) = ed_sign::respond_commit(&share, request.payload()?)?;
                self.pending = Pending::EdSign(next);
                RoundResponse::ok(&reply)
            }
            (Scope::Ed25519Eddsa, Operation::Sign, 2, Pending::EdSign(p)) => {
                RoundResponse::ok(&ed_sign::respond_reveal(p, request.payload()?)?)
            }
            (Scope::Ed25519Eddsa, Operation::Rotate, 1, Pending::Idle) => {
                let share = self.load(request)?;
                let (reply, next) = ed_rotate::respond_commit(share, request.payload()?);
                self.pending = Pending::EdRotate(next);
                RoundResponse::ok(&reply)
            }
            (Scope::Ed25519Eddsa, Operation::Rotate, 2, Pending::EdRotate(p)) => {
                RoundResponse::ok(&ed_rotate::respond_reveal(
                    p,
                    request.payload()?,
                    self.store.as_ref(),
                )?)
            }
            (Scope::Ed25519Eddsa, Operation::Export, _, _) => {
                Err(Error::ExportUnsupported(Scope::Ed25519Eddsa))
            }
            (scope, operation, step, pending) => Err(Error::ProtocolAbort(format!(
                "out-of-sequence {scope} {operation} step {step} while {}",
                pending.name()
            ))),
        }
    }

    /// Fetch the responder half of the share a request names
    fn load(&self, request: &RoundRequest) -> Result<SavedShare> {
        let share = self.store.get(&request.share_id)?;
        if share.scope != request.scope {
            return Err(Error::ScopeMismatch {
                expected: request.scope,
                actual: share.scope,
            });
        }
        if share.party != PartyRole::Responder {
            return Err(Error::InvalidInput(format!(
                "share {} is not a responder share",
                share.share_id
            )));
        }
        if share.identity_id != request.identity_id {
            return Err(Error::InvalidInput(format!(
                "share {} belongs to another identity",
                share.share_id
            )));
        }
        Ok(share)
    }
}
