//! In-memory channel that answers with a local responder

use super::{async_trait, Channel, RoundContext};
use crate::{
    config::ProtocolConfig,
    responder::Responder,
    scheme::{Exportable, ThresholdScheme},
    share::SavedShare,
    signature::Signature,
    state::{OperationState, StateMachine},
    store::{MemoryShareStore, ShareStore},
    wire::{Operation, RoundRequest, RoundResponse},
    Error, Result,
};
use std::sync::Arc;

type Tamper = Box<dyn FnMut(&RoundRequest, &mut RoundResponse) + Send>;

/// Channel whose far end is a [`Responder`] in the same process
pub struct MemoryChannel {
    responder: Responder,
    tamper: Option<Tamper>,
    /// Simulate a peer that hangs up before answering this step
    disconnect_at: Option<u8>,
}

impl MemoryChannel {
    pub fn new(store: Arc<dyn ShareStore>, config: ProtocolConfig) -> Self {
        Self {
            responder: Responder::new(store, config),
            tamper: None,
            disconnect_at: None,
        }
    }

    /// Rewrite responses before the initiator sees them
    pub fn with_tamper(
        mut self,
        tamper: impl FnMut(&RoundRequest, &mut RoundResponse) + Send + 'static,
    ) -> Self {
        self.tamper = Some(Box::new(tamper));
        self
    }

    pub fn disconnect_at(mut self, step: u8) -> Self {
        self.disconnect_at = Some(step);
        self
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn round_trip(&mut self, request: RoundRequest) -> Result<RoundResponse> {
        if self.disconnect_at == Some(request.step) {
            return Err(Error::ProtocolAbort(format!(
                "peer disconnected before step {}",
                request.step
            )));
        }
        let mut response = self.responder.handle(&request);
        if let Some(tamper) = self.tamper.as_mut() {
            tamper(&request, &mut response);
        }
        Ok(response)
    }
}

/// Both parties in one process: runs initiator operations against a
/// responder backed by a shared [`MemoryShareStore`]
#[derive(Clone)]
pub struct LocalPeer {
    store: MemoryShareStore,
    config: ProtocolConfig,
}

impl LocalPeer {
    pub fn new(config: ProtocolConfig) -> Self {
        Self {
            store: MemoryShareStore::new(),
            config,
        }
    }

    pub fn store(&self) -> &MemoryShareStore {
        &self.store
    }

    pub fn channel(&self) -> MemoryChannel {
        MemoryChannel::new(Arc::new(self.store.clone()), self.config.clone())
    }

    pub async fn keygen<S: ThresholdScheme>(&self, scheme: &S, identity_id: &str) -> Result<SavedShare> {
        let mut channel = self.channel();
        let mut machine = connected(Operation::Keygen)?;
        let mut ctx = RoundContext::new(&mut channel, &mut machine, scheme.scope());
        scheme.keygen(&mut ctx, identity_id).await
    }

    pub async fn sign<S: ThresholdScheme>(
        &self,
        scheme: &S,
        share: &SavedShare,
        digest: &[u8],
    ) -> Result<Signature> {
        let mut channel = self.channel();
        let mut machine = connected(Operation::Sign)?;
        let mut ctx = RoundContext::new(&mut channel, &mut machine, scheme.scope());
        scheme.sign(&mut ctx, share, digest).await
    }

    pub async fn rotate<S: ThresholdScheme>(&self, scheme: &S, share: &SavedShare) -> Result<SavedShare> {
        let mut channel = self.channel();
        let mut machine = connected(Operation::Rotate)?;
        let mut ctx = RoundContext::new(&mut channel, &mut machine, scheme.scope());
        scheme.rotate(&mut ctx, share).await
    }

    pub async fn export<S: Exportable>(&self, scheme: &S, share: &SavedShare) -> Result<String> {
        let mut channel = self.channel();
        let mut machine = connected(Operation::Export)?;
        let mut ctx = RoundContext::new(&mut channel, &mut machine, scheme.scope());
        scheme.export(&mut ctx, share).await
    }
}

fn connected(operation: Operation) -> Result<StateMachine> {
    let mut machine = StateMachine::new(operation);
    machine.advance(OperationState::Connecting)?;
    Ok(machine)
}
