//! The admin router's shared state: the collaborators every handler reads
//! from, wrapped in `Arc` so `AdminState` stays cheaply `Clone` the way
//! `axum::extract::State` requires.

use std::sync::Arc;

use async_trait::async_trait;
use piri_auth::BearerAuthenticator;
use piri_chain::{ChainClient, TxHash, ValidatorClient};
use piri_config::ConfigRegistry;
use piri_installer::NodeStatus;
use piri_settlement::{SettlementError, SettlementEstimate, SettlementOrchestrator, WithdrawalEstimate};
use piri_types::{Account, Amount, RailId, WaitStatus};

use crate::log::LogController;

type PaymentResult<T> = std::result::Result<T, SettlementError>;

/// The payment surface's seam onto the settlement orchestrator. A plain
/// trait (rather than the orchestrator type itself) keeps the router
/// generic over only one type parameter instead of the orchestrator's two
/// (`ChainClient`, `ValidatorClient`), and gives tests a scriptable double.
#[async_trait]
pub trait PaymentApi: Send + Sync + 'static {
    async fn account(&self, owner: &str) -> PaymentResult<Account>;
    async fn estimate_settlement(&self, rail_id: RailId, owner: &str) -> PaymentResult<SettlementEstimate>;
    async fn settle_rail(&self, rail_id: RailId, owner: &str) -> PaymentResult<TxHash>;
    async fn rail_settlement_status(&self, rail_id: RailId) -> PaymentResult<WaitStatus>;
    async fn estimate_withdrawal(&self, owner: &str, requested: Option<Amount>) -> PaymentResult<WithdrawalEstimate>;
    async fn withdraw(&self, owner: &str, requested: Option<Amount>) -> PaymentResult<TxHash>;
    async fn withdrawal_status(&self, owner: &str) -> PaymentResult<WaitStatus>;
}

#[async_trait]
impl<C: ChainClient, V: ValidatorClient> PaymentApi for SettlementOrchestrator<C, V> {
    async fn account(&self, owner: &str) -> PaymentResult<Account> {
        self.account(owner).await
    }

    async fn estimate_settlement(&self, rail_id: RailId, owner: &str) -> PaymentResult<SettlementEstimate> {
        self.estimate_settlement(rail_id, owner).await
    }

    async fn settle_rail(&self, rail_id: RailId, owner: &str) -> PaymentResult<TxHash> {
        self.settle_rail(rail_id, owner).await
    }

    async fn rail_settlement_status(&self, rail_id: RailId) -> PaymentResult<WaitStatus> {
        self.rail_settlement_status(rail_id).await
    }

    async fn estimate_withdrawal(&self, owner: &str, requested: Option<Amount>) -> PaymentResult<WithdrawalEstimate> {
        self.estimate_withdrawal(owner, requested).await
    }

    async fn withdraw(&self, owner: &str, requested: Option<Amount>) -> PaymentResult<TxHash> {
        self.withdraw(owner, requested).await
    }

    async fn withdrawal_status(&self, owner: &str) -> PaymentResult<WaitStatus> {
        self.withdrawal_status(owner).await
    }
}

/// `GET /admin/status`: a narrow read onto whatever proving pipeline the
/// node is running. The PDP pipeline is an out-of-scope external
/// collaborator (spec.md §1); this is the seam the admin router needs to
/// serve the route the updater's `HttpNodeStatusClient` already expects.
#[async_trait]
pub trait NodeStatusSource: Send + Sync + 'static {
    async fn status(&self) -> NodeStatus;
}

/// A fixed-answer status source for nodes that haven't wired a real
/// proving-pipeline reader yet, or for tests.
pub struct StaticNodeStatusSource(pub NodeStatus);

#[async_trait]
impl NodeStatusSource for StaticNodeStatusSource {
    async fn status(&self) -> NodeStatus {
        self.0
    }
}

/// Shared state for every admin route. `P` is the payment backend
/// (normally `SettlementOrchestrator<C, V>`); `L` is the subscriber layer
/// stack the binary's `tracing_subscriber::reload::Handle` was built
/// against.
pub struct AdminState<P: PaymentApi, L> {
    pub authenticator: Arc<BearerAuthenticator>,
    pub config: Arc<ConfigRegistry>,
    pub payment: Arc<P>,
    pub log: Arc<LogController<L>>,
    pub status: Arc<dyn NodeStatusSource>,
    /// The node's own on-chain address — every payment route acts as this
    /// owner; there is no per-request owner parameter in spec.md §6's
    /// route table.
    pub owner_address: Arc<str>,
}

impl<P: PaymentApi, L> AdminState<P, L> {
    pub fn new(
        authenticator: Arc<BearerAuthenticator>,
        config: Arc<ConfigRegistry>,
        payment: Arc<P>,
        log: Arc<LogController<L>>,
        status: Arc<dyn NodeStatusSource>,
        owner_address: impl Into<Arc<str>>,
    ) -> Self {
        Self { authenticator, config, payment, log, status, owner_address: owner_address.into() }
    }
}

impl<P: PaymentApi, L> Clone for AdminState<P, L> {
    fn clone(&self) -> Self {
        Self {
            authenticator: self.authenticator.clone(),
            config: self.config.clone(),
            payment: self.payment.clone(),
            log: self.log.clone(),
            status: self.status.clone(),
            owner_address: self.owner_address.clone(),
        }
    }
}
