//! Channel abstraction between the two parties

use crate::{
    scheme::Scope,
    share::SavedShare,
    state::{OperationState, StateMachine},
    wire::{Operation, RoundRequest, RoundResponse},
    Error, Result,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

pub use ::async_trait::async_trait;

/// Request/response link to the counterparty for one operation
#[async_trait]
pub trait Channel: Send {
    /// Send one round request and wait for the matching response
    async fn round_trip(&mut self, request: RoundRequest) -> Result<RoundResponse>;
}

/// Per-operation view of a channel: numbers the steps, tags each request
/// with the operation and share, and drives the state machine
pub struct RoundContext<'a> {
    channel: &'a mut dyn Channel,
    machine: &'a mut StateMachine,
    scope: Scope,
    identity_id: String,
    share_id: String,
    step: u8,
}

impl<'a> RoundContext<'a> {
    pub fn new(channel: &'a mut dyn Channel, machine: &'a mut StateMachine, scope: Scope) -> Self {
        Self {
            channel,
            machine,
            scope,
            identity_id: String::new(),
            share_id: String::new(),
            step: 0,
        }
    }

    pub fn operation(&self) -> Operation {
        self.machine.operation()
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn state(&self) -> OperationState {
        self.machine.state()
    }

    pub fn bind_identity(&mut self, identity_id: &str) {
        self.identity_id = identity_id.to_string();
    }

    /// Route subsequent requests to the peer's half of `share`
    pub fn bind_share(&mut self, share: &SavedShare) {
        self.identity_id = share.identity_id.clone();
        self.share_id = share.share_id.clone();
    }

    /// Run the next protocol step
    pub async fn exchange<T, R>(&mut self, payload: &T) -> Result<R>
    where
        T: Serialize + Sync,
        R: DeserializeOwned,
    {
        let step = self.step + 1;
        self.machine.advance(OperationState::RoundExchange(step))?;

        let request = RoundRequest {
            operation: self.operation(),
            scope: self.scope,
            step,
            identity_id: self.identity_id.clone(),
            share_id: self.share_id.clone(),
            payload: serde_json::to_value(payload)
                .map_err(|e| Error::Serialization(e.to_string()))?,
        };

        debug!(operation = %self.operation(), scope = %self.scope, step, "Round exchange");
        let response = self.channel.round_trip(request).await?;
        self.step = step;
        response.into_payload(step)
    }

    /// All rounds are done; only local computation remains
    pub fn finalizing(&mut self) -> Result<()> {
        self.machine.advance(OperationState::Finalizing)
    }
}

/// In-process channel for tests and embedding
pub mod memory;

pub use memory::{LocalPeer, MemoryChannel};
