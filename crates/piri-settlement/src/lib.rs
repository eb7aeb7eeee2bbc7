//! Settlement / Withdrawal Orchestrator (spec.md §4.5): computes what an
//! on-chain settlement would pay, submits it through a single-writer
//! nonce-managed sender, and tracks it to confirmation via `piri-store`.
//!
//! All amounts are carried as [`piri_types::Amount`] end to end — the
//! arithmetic here never widens through a float (Design Notes §9).

use std::sync::Arc;

use piri_chain::{ChainClient, ChainError, PreparedCall, UnsignedCall, ValidatorClient};
use piri_store::{StoreError, TransactionTracker};
use piri_types::{Amount, Epoch, Rail, RailId, WaitStatus};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("caller does not own rail")]
    Forbidden,
    #[error("a settlement or withdrawal is already in flight")]
    Conflict,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

type Result<T> = std::result::Result<T, SettlementError>;

/// The off-chain-computed result of `estimate_settlement` / the amounts a
/// `settle_rail` submission recomputes before broadcasting (spec.md §4.5
/// steps 4-9).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementEstimate {
    pub unsettled_epochs: Epoch,
    pub settleable_epochs: Epoch,
    pub until_epoch: Epoch,
    pub gross: Amount,
    pub net_settleable: Amount,
    pub proof_reduction_pct: u64,
    pub network_fee: Amount,
    pub net_amount: Amount,
    pub gas_limit: u64,
    pub gas_price: Amount,
}

impl SettlementEstimate {
    /// `gas_limit * gas_price`, reported in chain-native units and never
    /// deducted from the token amount (spec.md §4.5 step 8).
    pub fn gas_cost(&self) -> Amount {
        self.gas_price.checked_mul_epochs(self.gas_limit)
    }
}

/// The off-chain-computed result of a withdrawal estimate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalEstimate {
    pub amount: Amount,
    pub gas_limit: u64,
    pub gas_price: Amount,
}

impl WithdrawalEstimate {
    pub fn gas_cost(&self) -> Amount {
        self.gas_price.checked_mul_epochs(self.gas_limit)
    }
}

/// Packs call data for `settle_rail(rail_id, until_epoch)`. The real ABI
/// encoding is an out-of-scope collaborator (spec.md §1); this is a
/// deterministic placeholder sufficient for the sender/tracker plumbing.
fn pack_settle_rail(rail_id: RailId, until_epoch: Epoch) -> Vec<u8> {
    format!("settle_rail({rail_id},{until_epoch})").into_bytes()
}

fn pack_withdraw(owner: &str, amount: &Amount) -> Vec<u8> {
    format!("withdraw({owner},{amount})").into_bytes()
}

/// Computes the settlement estimate for `rail` as of `current_epoch`,
/// given the payer's `lockup_last_settled_at` and the validator's report of
/// how much of the gross amount survives proof checks (spec.md §4.5 steps
/// 4-9). `net_settleable` should be `gross` itself when the validator call
/// failed — "best-effort" per spec.md step 6.
fn compute_estimate(rail: &Rail, current_epoch: Epoch, lockup_last_settled_at: Epoch, net_settleable: Amount) -> SettlementEstimate {
    let unsettled_epochs = if rail.is_terminated {
        rail.end_epoch.saturating_sub(rail.settled_up_to_epoch)
    } else {
        current_epoch.saturating_sub(rail.settled_up_to_epoch)
    };

    let settleable_epochs = if rail.is_terminated {
        unsettled_epochs
    } else {
        current_epoch
            .min(lockup_last_settled_at)
            .saturating_sub(rail.settled_up_to_epoch)
    };

    let until_epoch = rail.settled_up_to_epoch + settleable_epochs;
    let gross = rail.payment_rate_per_epoch.checked_mul_epochs(settleable_epochs);
    let net_settleable = if net_settleable > gross { gross.clone() } else { net_settleable };
    let proof_reduction_pct = Amount::pct_reduction(&gross, &net_settleable);
    let network_fee = net_settleable.div_ceil(200);
    let net_amount = net_settleable.saturating_sub(&network_fee);

    SettlementEstimate {
        unsettled_epochs,
        settleable_epochs,
        until_epoch,
        gross,
        net_settleable,
        proof_reduction_pct,
        network_fee,
        net_amount,
        gas_limit: 0,
        gas_price: Amount::zero(),
    }
}

/// A single-writer, nonce-managed gateway to the chain: serializes nonce
/// assignment per sender address so concurrent `settle_rail`/`withdraw`
/// calls never race (spec.md §4.5 step 4, §5 "Sender: strict FIFO per
/// sender address"). Callers never touch the nonce directly.
pub struct Sender<C: ChainClient> {
    chain: Arc<C>,
    address: String,
    // Held across the full nonce-assign -> broadcast critical section so
    // two concurrent submissions cannot be assigned the same nonce.
    guard: tokio::sync::Mutex<()>,
}

impl<C: ChainClient> Sender<C> {
    pub fn new(chain: Arc<C>, address: impl Into<String>) -> Self {
        Self { chain, address: address.into(), guard: tokio::sync::Mutex::new(()) }
    }

    pub async fn submit(&self, call: UnsignedCall) -> std::result::Result<piri_chain::TxHash, ChainError> {
        let _permit = self.guard.lock().await;
        let nonce = self.chain.next_nonce(&self.address).await?;
        let gas_limit = self.chain.estimate_gas(&call).await?;
        let gas_price = self.chain.gas_price().await?;
        let prepared = PreparedCall { to: call.to, data: call.data, nonce, gas_limit, gas_price };
        self.chain.send_raw(&prepared).await
    }
}

/// The settlement/withdrawal orchestrator: composes a chain client, a
/// validator client, the single-writer sender, and the transaction
/// tracker into the estimate/submit/status operations of spec.md §4.5.
pub struct SettlementOrchestrator<C: ChainClient, V: ValidatorClient> {
    chain: Arc<C>,
    validator: Arc<V>,
    sender: Sender<C>,
    tracker: TransactionTracker,
    rail_contract_address: String,
    account_contract_address: String,
}

impl<C: ChainClient, V: ValidatorClient> SettlementOrchestrator<C, V> {
    pub fn new(
        chain: Arc<C>,
        validator: Arc<V>,
        tracker: TransactionTracker,
        sender_address: impl Into<String>,
        rail_contract_address: impl Into<String>,
        account_contract_address: impl Into<String>,
    ) -> Self {
        let sender = Sender::new(chain.clone(), sender_address);
        Self {
            chain,
            validator,
            sender,
            tracker,
            rail_contract_address: rail_contract_address.into(),
            account_contract_address: account_contract_address.into(),
        }
    }

    /// `GET /admin/payment/account` (spec.md §6 `GetAccountInfoResponse`).
    pub async fn account(&self, owner: &str) -> Result<piri_types::Account> {
        Ok(self.chain.get_account(owner).await?)
    }

    async fn load_estimate_inputs(&self, rail_id: RailId, owner: &str) -> Result<(Rail, Epoch, Amount)> {
        let rail = self.chain.get_rail(rail_id).await?;
        if rail.to != owner {
            return Err(SettlementError::Forbidden);
        }
        let current_epoch = self.chain.current_epoch().await?;
        let payer_account = self.chain.get_account(&rail.from).await?;
        Ok((rail, current_epoch, payer_account.lockup_last_settled_at))
    }

    /// Spec.md §4.5 "Estimate algorithm", steps 1-9.
    pub async fn estimate_settlement(&self, rail_id: RailId, owner: &str) -> Result<SettlementEstimate> {
        let (rail, current_epoch, lockup_last_settled_at) = self.load_estimate_inputs(rail_id, owner).await?;
        let mut estimate = self.estimate_with_validator(&rail, current_epoch, lockup_last_settled_at).await;

        let call = UnsignedCall {
            to: self.rail_contract_address.clone(),
            data: pack_settle_rail(rail_id, estimate.until_epoch),
        };
        estimate.gas_limit = self.chain.estimate_gas(&call).await?;
        estimate.gas_price = self.chain.gas_price().await?;
        Ok(estimate)
    }

    async fn estimate_with_validator(&self, rail: &Rail, current_epoch: Epoch, lockup_last_settled_at: Epoch) -> SettlementEstimate {
        let provisional = compute_estimate(rail, current_epoch, lockup_last_settled_at, Amount::zero());
        let net = match self
            .validator
            .estimate_modified_amount(rail.rail_id, rail.settled_up_to_epoch, provisional.until_epoch, &provisional.gross)
            .await
        {
            Ok(net) => net,
            // "If the validator call fails, use gross (best-effort)" — spec.md step 6.
            Err(_) => provisional.gross.clone(),
        };
        compute_estimate(rail, current_epoch, lockup_last_settled_at, net)
    }

    /// Spec.md §4.5 "Submit (`settle_rail`)", steps 1-5.
    pub async fn settle_rail(&self, rail_id: RailId, owner: &str) -> Result<piri_chain::TxHash> {
        if self.tracker.has_pending_rail_settlement(rail_id).await? {
            return Err(SettlementError::Conflict);
        }

        let (rail, current_epoch, lockup_last_settled_at) = self.load_estimate_inputs(rail_id, owner).await?;
        let estimate = self.estimate_with_validator(&rail, current_epoch, lockup_last_settled_at).await;

        if estimate.settleable_epochs == 0 {
            return Err(SettlementError::BadRequest("nothing to settle".to_string()));
        }

        let call = UnsignedCall {
            to: self.rail_contract_address.clone(),
            data: pack_settle_rail(rail_id, estimate.until_epoch),
        };
        let tx_hash = self.sender.submit(call).await?;

        // "If the insert fails, log but do not fail the RPC — the
        // transaction is already broadcast" (spec.md step 5).
        if let Err(err) = self.tracker.track_rail_settlement(rail_id, &tx_hash.0).await {
            tracing::warn!(rail_id, tx_hash = %tx_hash, error = %err, "failed to persist rail settlement wait row after broadcast");
        }

        Ok(tx_hash)
    }

    pub async fn rail_settlement_status(&self, rail_id: RailId) -> Result<WaitStatus> {
        Ok(self.tracker.rail_settlement_status(rail_id).await?)
    }

    /// Spec.md §4.5 "Withdraw": structurally identical to settle with the
    /// amount/recipient rules swapped in.
    pub async fn estimate_withdrawal(&self, owner: &str, requested: Option<Amount>) -> Result<WithdrawalEstimate> {
        let account = self.chain.get_account(owner).await?;
        let available = account.available_to_withdraw();
        let amount = requested.unwrap_or_else(|| available.clone());
        if amount > available {
            return Err(SettlementError::BadRequest("requested amount exceeds available_to_withdraw".to_string()));
        }

        let call = UnsignedCall { to: self.account_contract_address.clone(), data: pack_withdraw(owner, &amount) };
        let gas_limit = self.chain.estimate_gas(&call).await?;
        let gas_price = self.chain.gas_price().await?;
        Ok(WithdrawalEstimate { amount, gas_limit, gas_price })
    }

    pub async fn withdraw(&self, owner: &str, requested: Option<Amount>) -> Result<piri_chain::TxHash> {
        // "There is at most one pending withdrawal per owner" (spec.md §4.5).
        if self.tracker.withdrawal_status(owner).await? == WaitStatus::Pending {
            return Err(SettlementError::Conflict);
        }

        let estimate = self.estimate_withdrawal(owner, requested).await?;
        if estimate.amount.is_zero() {
            return Err(SettlementError::BadRequest("nothing to withdraw".to_string()));
        }

        let call = UnsignedCall { to: self.account_contract_address.clone(), data: pack_withdraw(owner, &estimate.amount) };
        let tx_hash = self.sender.submit(call).await?;

        if let Err(err) = self.tracker.track_withdrawal(owner, &tx_hash.0).await {
            tracing::warn!(owner, tx_hash = %tx_hash, error = %err, "failed to persist withdrawal wait row after broadcast");
        }

        Ok(tx_hash)
    }

    pub async fn withdrawal_status(&self, owner: &str) -> Result<WaitStatus> {
        Ok(self.tracker.withdrawal_status(owner).await?)
    }
}
