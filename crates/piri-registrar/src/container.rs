//! The dependency-injection container the registrar's step 2 constructs
//! (spec §4.6 step 2, §9 Design Notes "side-effectful DI container"): an
//! explicit `assemble` function that wires the collaborators in a fixed,
//! documented order, plus a `start`/`shutdown` lifecycle pair the top-level
//! driver invokes around the rest of the procedure. No runtime reflection —
//! construction order is just the order `assemble`'s body runs in.

use std::sync::Arc;

use async_trait::async_trait;
use piri_auth::NodeIdentity;
use piri_chain::{ChainClient, DelegatorClient};

use crate::error::PdpError;
use crate::proof_set::ProofSetService;

/// The PDP proving pipeline is an out-of-scope external collaborator (spec
/// §1); this marker trait is the narrow seam the registrar needs from it —
/// just enough to start it in `init` mode (which skips health checks that
/// would otherwise require full operation) and shut it down again.
#[async_trait]
pub trait PdpService: Send + Sync {
    async fn start_init_mode(&mut self) -> Result<(), PdpError>;
    async fn shutdown(&mut self) -> Result<(), PdpError>;
}

/// The in-process node, assembled once per registrar run: identity loaded
/// from the wallet key, and handles to every external collaborator the
/// remaining steps need.
pub struct NodeContainer<C, D, P, Pdp>
where
    C: ChainClient,
    D: DelegatorClient,
    P: ProofSetService,
    Pdp: PdpService,
{
    pub identity: NodeIdentity,
    pub chain: Arc<C>,
    pub delegator: Arc<D>,
    pub proof_sets: Arc<P>,
    pub pdp: Pdp,
    started: bool,
}

impl<C, D, P, Pdp> NodeContainer<C, D, P, Pdp>
where
    C: ChainClient,
    D: DelegatorClient,
    P: ProofSetService,
    Pdp: PdpService,
{
    /// Wires the graph in the fixed order spec'd by step 2: identity first
    /// (everything else may need to address the node by its id), then the
    /// chain/delegator/proof-set handles, then the PDP service last since
    /// starting it is the step's only side effect.
    pub fn assemble(identity: NodeIdentity, chain: Arc<C>, delegator: Arc<D>, proof_sets: Arc<P>, pdp: Pdp) -> Self {
        Self { identity, chain, delegator, proof_sets, pdp, started: false }
    }

    /// Starts the PDP service in `init` mode. Idempotent: calling `start`
    /// again on an already-started container is a no-op, so re-entering
    /// step 2 after a crash never double-starts it.
    pub async fn start(&mut self) -> Result<(), PdpError> {
        if self.started {
            return Ok(());
        }
        self.pdp.start_init_mode().await?;
        self.started = true;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), PdpError> {
        if !self.started {
            return Ok(());
        }
        self.pdp.shutdown().await?;
        self.started = false;
        Ok(())
    }
}

pub mod fake {
    //! A scripted PDP service double for registrar tests — init-mode start
    //! always succeeds, shutdown always succeeds, both record how many
    //! times they were called so re-entrancy tests can assert idempotency.

    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    pub struct FakePdpService {
        start_calls: AtomicUsize,
        shutdown_calls: AtomicUsize,
    }

    impl FakePdpService {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn start_calls(&self) -> usize {
            self.start_calls.load(Ordering::SeqCst)
        }

        pub fn shutdown_calls(&self) -> usize {
            self.shutdown_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PdpService for FakePdpService {
        async fn start_init_mode(&mut self) -> Result<(), PdpError> {
            self.start_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn shutdown(&mut self) -> Result<(), PdpError> {
            self.shutdown_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use piri_chain::fake::{FakeChain, FakeDelegator};

    use super::fake::FakePdpService;
    use super::*;
    use crate::proof_set::fake::FakeProofSetService;

    #[tokio::test]
    async fn start_is_idempotent_across_re_entrant_calls() {
        let identity = NodeIdentity::generate();
        let chain = Arc::new(FakeChain::new(1));
        let delegator = Arc::new(FakeDelegator::new(vec![]));
        let proof_sets = Arc::new(FakeProofSetService::new());
        let mut container = NodeContainer::assemble(identity, chain, delegator, proof_sets, FakePdpService::new());

        container.start().await.unwrap();
        container.start().await.unwrap();

        assert_eq!(container.pdp.start_calls(), 1);
    }

    #[tokio::test]
    async fn shutdown_before_start_is_a_no_op() {
        let identity = NodeIdentity::generate();
        let chain = Arc::new(FakeChain::new(1));
        let delegator = Arc::new(FakeDelegator::new(vec![]));
        let proof_sets = Arc::new(FakeProofSetService::new());
        let mut container = NodeContainer::assemble(identity, chain, delegator, proof_sets, FakePdpService::new());

        container.shutdown().await.unwrap();

        assert_eq!(container.pdp.shutdown_calls(), 0);
    }
}
