//! Operation engine: runs one operation per session with share leases,
//! timeouts and per-scope dispatch

use crate::{config::EngineConfig, lease::ShareLeases, session::Session};
use std::marker::PhantomData;
use tracing::{info, instrument, warn};
use twoparty_core::{
    ed25519::Ed25519Eddsa,
    scheme::validate_identity,
    secp256k1::Secp256k1Ecdsa,
    wire::Operation,
    Error, Exportable, OperationState, Result, RoundContext, SavedShare, Scope, Signature,
    StateMachine, ThresholdScheme,
};

/// One requested operation and its inputs
enum Job<'a> {
    Keygen { scope: Scope, identity_id: &'a str },
    Sign { share: &'a SavedShare, digest: &'a [u8] },
    Rotate { share: &'a SavedShare },
    Export { share: &'a SavedShare },
}

impl Job<'_> {
    fn operation(&self) -> Operation {
        match self {
            Job::Keygen { .. } => Operation::Keygen,
            Job::Sign { .. } => Operation::Sign,
            Job::Rotate { .. } => Operation::Rotate,
            Job::Export { .. } => Operation::Export,
        }
    }

    fn scope(&self) -> Scope {
        match self {
            Job::Keygen { scope, .. } => *scope,
            Job::Sign { share, .. } | Job::Rotate { share } | Job::Export { share } => share.scope,
        }
    }

    fn share(&self) -> Option<&SavedShare> {
        match self {
            Job::Keygen { .. } => None,
            Job::Sign { share, .. } | Job::Rotate { share } | Job::Export { share } => Some(share),
        }
    }

    /// Caller input checks that need no peer
    fn validate(&self) -> Result<()> {
        let scope = self.scope();
        if self.operation() == Operation::Export && !scope.params().supports_export {
            return Err(Error::ExportUnsupported(scope));
        }
        match self {
            Job::Keygen { identity_id, .. } => validate_identity(identity_id),
            Job::Sign { share, digest } => {
                share.validate()?;
                scope.params().validate_digest(digest)
            }
            Job::Rotate { share } | Job::Export { share } => share.validate(),
        }
    }
}

enum Outcome {
    Share(SavedShare),
    Signature(Signature),
    Exported(String),
}

impl Outcome {
    fn into_share(self) -> Result<SavedShare> {
        match self {
            Outcome::Share(share) => Ok(share),
            _ => Err(Error::Internal("operation did not produce a share".to_string())),
        }
    }
}

/// Runs operations against remote peers
pub struct Engine {
    config: EngineConfig,
    leases: ShareLeases,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            leases: ShareLeases::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn leases(&self) -> &ShareLeases {
        &self.leases
    }

    /// Typed front end for one scheme
    pub fn scheme<S: ThresholdScheme>(&self) -> SchemeClient<'_, S> {
        SchemeClient {
            engine: self,
            _scheme: PhantomData,
        }
    }

    pub async fn keygen(&self, scope: Scope, identity_id: &str, address: &str) -> Result<SavedShare> {
        self.execute(address, Job::Keygen { scope, identity_id })
            .await?
            .into_share()
    }

    pub async fn sign(&self, address: &str, share: &SavedShare, digest: &[u8]) -> Result<Signature> {
        match self.execute(address, Job::Sign { share, digest }).await? {
            Outcome::Signature(signature) => Ok(signature),
            _ => Err(Error::Internal("sign did not produce a signature".to_string())),
        }
    }

    pub async fn rotate(&self, address: &str, share: &SavedShare) -> Result<SavedShare> {
        self.execute(address, Job::Rotate { share }).await?.into_share()
    }

    /// Reconstruct the private key; only for schemes that support export
    pub async fn export(&self, address: &str, share: &SavedShare) -> Result<String> {
        match self.execute(address, Job::Export { share }).await? {
            Outcome::Exported(key) => Ok(key),
            _ => Err(Error::Internal("export did not produce a key".to_string())),
        }
    }

    #[instrument(skip(self, job), fields(operation = %job.operation(), scope = %job.scope()))]
    async fn execute(&self, address: &str, job: Job<'_>) -> Result<Outcome> {
        let operation = job.operation();
        let scope = job.scope();
        let share_id = job.share().map(|s| s.share_id.clone()).unwrap_or_default();

        job.validate()?;
        let _lease = match job.share() {
            Some(share) => Some(self.leases.acquire(&share.share_id)?),
            None => None,
        };

        info!(share_id, "Operation started");
        let mut machine = StateMachine::new(operation);
        let result = tokio::time::timeout(
            self.config.operation_timeout,
            self.run(address, &mut machine, &job),
        )
        .await
        .unwrap_or_else(|_| Err(Error::Timeout(format!("{scope} {operation}"))));

        match &result {
            Ok(_) => {
                machine.advance(OperationState::Done)?;
                info!(share_id, "Operation complete");
            }
            Err(e) => {
                machine.abort();
                warn!(share_id, kind = %e.kind(), error = %e, "Operation aborted");
            }
        }
        result
    }

    async fn run(&self, address: &str, machine: &mut StateMachine, job: &Job<'_>) -> Result<Outcome> {
        machine.advance(OperationState::Connecting)?;
        let mut session = Session::open(address, &self.config).await?;
        let result = {
            let mut ctx = RoundContext::new(&mut session, machine, job.scope());
            self.dispatch(&mut ctx, job).await
        };
        session.close().await;
        result
    }

    async fn dispatch(&self, ctx: &mut RoundContext<'_>, job: &Job<'_>) -> Result<Outcome> {
        match job.scope() {
            Scope::Secp256k1Ecdsa => {
                let scheme = Secp256k1Ecdsa::new(self.config.protocol.clone());
                match *job {
                    Job::Export { share } => scheme.export(ctx, share).await.map(Outcome::Exported),
                    _ => perform(&scheme, ctx, job).await,
                }
            }
            Scope::Ed25519Eddsa => perform(&Ed25519Eddsa, ctx, job).await,
        }
    }
}

async fn perform<S: ThresholdScheme>(
    scheme: &S,
    ctx: &mut RoundContext<'_>,
    job: &Job<'_>,
) -> Result<Outcome> {
    match *job {
        Job::Keygen { identity_id, .. } => scheme.keygen(ctx, identity_id).await.map(Outcome::Share),
        Job::Sign { share, digest } => scheme.sign(ctx, share, digest).await.map(Outcome::Signature),
        Job::Rotate { share } => scheme.rotate(ctx, share).await.map(Outcome::Share),
        Job::Export { .. } => Err(Error::ExportUnsupported(scheme.scope())),
    }
}

/// Engine front end for one scheme; shares of another scheme are rejected
/// with [`Error::ScopeMismatch`] and `export` exists only for schemes that
/// implement [`Exportable`]
pub struct SchemeClient<'e, S> {
    engine: &'e Engine,
    _scheme: PhantomData<S>,
}

impl<S: ThresholdScheme + Default> SchemeClient<'_, S> {
    fn check(&self, share: &SavedShare) -> Result<()> {
        S::default().check_scope(share)
    }

    pub fn scope(&self) -> Scope {
        S::default().scope()
    }

    pub async fn keygen(&self, identity_id: &str, address: &str) -> Result<SavedShare> {
        self.engine.keygen(self.scope(), identity_id, address).await
    }

    pub async fn sign(&self, address: &str, share: &SavedShare, digest: &[u8]) -> Result<Signature> {
        self.check(share)?;
        self.engine.sign(address, share, digest).await
    }

    pub async fn rotate(&self, address: &str, share: &SavedShare) -> Result<SavedShare> {
        self.check(share)?;
        self.engine.rotate(address, share).await
    }
}

impl<S: Exportable + Default> SchemeClient<'_, S> {
    pub async fn export(&self, address: &str, share: &SavedShare) -> Result<String> {
        self.check(share)?;
        self.engine.export(address, share).await
    }
}
