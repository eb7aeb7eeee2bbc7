//! Narrow collaborator traits the settlement orchestrator (`piri-settlement`)
//! and the registrar (`piri-registrar`) compile against, standing in for the
//! Ethereum RPC, Lotus RPC, smart-contract ABIs, and delegator service that
//! spec.md §1 explicitly places out of scope.
//!
//! Real implementations of these traits are external collaborators; this
//! crate only defines the seam and a deterministic in-memory fake
//! (`fake::FakeChain`) used by the settlement arithmetic tests in spec.md §8.

use async_trait::async_trait;
use piri_types::{Account, Amount, Epoch, Rail, RailId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An opaque, broadcast transaction hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxHash(pub String);

impl std::fmt::Display for TxHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A transaction whose nonce and gas have not yet been assigned — the shape
/// the settlement orchestrator hands to the sender (spec.md §4.5 step 4).
#[derive(Debug, Clone)]
pub struct UnsignedCall {
    pub to: String,
    pub data: Vec<u8>,
}

/// A transaction with nonce and gas assigned, ready to sign and broadcast.
#[derive(Debug, Clone)]
pub struct PreparedCall {
    pub to: String,
    pub data: Vec<u8>,
    pub nonce: u64,
    pub gas_limit: u64,
    pub gas_price: Amount,
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rail {0} not found")]
    RailNotFound(RailId),
    #[error("account {0} not found")]
    AccountNotFound(String),
    #[error("gas estimation failed: {0}")]
    GasEstimationFailed(String),
    #[error("nonce assignment failed: {0}")]
    NonceFailed(String),
}

/// The chain collaborator: rail/account reads, gas and nonce estimation, and
/// raw transaction broadcast. A real implementation wraps an Ethereum or
/// Lotus RPC client; out of scope here per spec.md §1.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn current_epoch(&self) -> Result<Epoch, ChainError>;
    async fn get_rail(&self, rail_id: RailId) -> Result<Rail, ChainError>;
    async fn get_account(&self, address: &str) -> Result<Account, ChainError>;

    /// Gas units the packed call is expected to consume.
    async fn estimate_gas(&self, call: &UnsignedCall) -> Result<u64, ChainError>;

    /// Current network-suggested gas price, in chain-native units.
    async fn gas_price(&self) -> Result<Amount, ChainError>;

    /// Next unused nonce for `address`. The sender (spec.md §4.5/§5) is the
    /// only caller permitted to invoke this, serialized behind its own lock.
    async fn next_nonce(&self, address: &str) -> Result<u64, ChainError>;

    /// Signs and broadcasts a nonce/gas-assigned call, returning its hash.
    async fn send_raw(&self, call: &PreparedCall) -> Result<TxHash, ChainError>;

    /// Registers the node as a storage provider (registrar step 3).
    async fn register_provider(&self, name: &str, description: &str) -> Result<TxHash, ChainError>;

    /// Blocks until `tx_hash` has at least `min_confirmations` confirmations.
    async fn wait_for_confirmation(&self, tx_hash: &TxHash, min_confirmations: u64) -> Result<bool, ChainError>;
}

/// The validator contract collaborator: given a rail and an epoch window,
/// reports how much of the gross settleable amount survives proof checks
/// (spec.md §4.5 step 6).
#[async_trait]
pub trait ValidatorClient: Send + Sync {
    async fn estimate_modified_amount(
        &self,
        rail_id: RailId,
        from_epoch: Epoch,
        to_epoch: Epoch,
        gross: &Amount,
    ) -> Result<Amount, ChainError>;
}

/// An approval request sent to the delegator service (registrar step 4).
#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    pub operator_did: String,
    pub owner_address: String,
    pub signature: Vec<u8>,
}

/// A delegation proof returned by the delegator (registrar step 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationProof {
    pub service: String,
    pub proof: String,
}

#[derive(Debug, Error)]
pub enum DelegatorError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("approval rejected: {0}")]
    ApprovalRejected(String),
}

/// The delegator collaborator: orchestrates on-chain operator approval and
/// issues the delegation proofs the registrar needs (spec.md glossary
/// "Delegator").
#[async_trait]
pub trait DelegatorClient: Send + Sync {
    /// May block up to 5 minutes — it publishes on-chain before returning
    /// (spec.md §4.6 step 4).
    async fn request_approval(&self, request: ApprovalRequest) -> Result<(), DelegatorError>;

    async fn is_registered(&self, operator_did: &str) -> Result<bool, DelegatorError>;

    async fn register(&self, operator_did: &str) -> Result<(), DelegatorError>;

    async fn request_proofs(&self, operator_did: &str) -> Result<Vec<DelegationProof>, DelegatorError>;
}

pub mod fake {
    //! A deterministic in-memory fake of [`ChainClient`] and
    //! [`ValidatorClient`], used by the settlement arithmetic tests in
    //! spec.md §8 (scenario 3) so they compile and run without a real
    //! Ethereum/Lotus RPC stack.

    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    pub struct FakeAccountState {
        pub account: Account,
    }

    /// A fully scripted chain: epoch, rails, and accounts are seeded up
    /// front; every call is deterministic given that seed.
    pub struct FakeChain {
        epoch: Mutex<Epoch>,
        rails: Mutex<HashMap<RailId, Rail>>,
        accounts: Mutex<HashMap<String, Account>>,
        nonces: Mutex<HashMap<String, u64>>,
        gas_limit: u64,
        gas_price: Amount,
        /// When set, `estimate_modified_amount` returns this fraction (as a
        /// percent, 0..=100) of gross instead of gross unchanged.
        validator_pct_of_gross: Mutex<Option<u64>>,
        sent: Mutex<Vec<PreparedCall>>,
        next_hash: Mutex<u64>,
    }

    impl FakeChain {
        pub fn new(epoch: Epoch) -> Self {
            Self {
                epoch: Mutex::new(epoch),
                rails: Mutex::new(HashMap::new()),
                accounts: Mutex::new(HashMap::new()),
                nonces: Mutex::new(HashMap::new()),
                gas_limit: 21_000,
                gas_price: Amount::from_u64(1),
                validator_pct_of_gross: Mutex::new(None),
                sent: Mutex::new(Vec::new()),
                next_hash: Mutex::new(0),
            }
        }

        pub fn with_rail(self, rail: Rail) -> Self {
            self.rails.lock().unwrap().insert(rail.rail_id, rail);
            self
        }

        pub fn with_account(self, address: impl Into<String>, account: Account) -> Self {
            self.accounts.lock().unwrap().insert(address.into(), account);
            self
        }

        /// Forces the validator to report `pct` percent of gross as net,
        /// rather than passing gross through unchanged.
        pub fn with_validator_pct(self, pct: u64) -> Self {
            *self.validator_pct_of_gross.lock().unwrap() = Some(pct);
            self
        }

        pub fn set_epoch(&self, epoch: Epoch) {
            *self.epoch.lock().unwrap() = epoch;
        }

        pub fn sent_calls(&self) -> Vec<PreparedCall> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChainClient for FakeChain {
        async fn current_epoch(&self) -> Result<Epoch, ChainError> {
            Ok(*self.epoch.lock().unwrap())
        }

        async fn get_rail(&self, rail_id: RailId) -> Result<Rail, ChainError> {
            self.rails
                .lock()
                .unwrap()
                .get(&rail_id)
                .cloned()
                .ok_or(ChainError::RailNotFound(rail_id))
        }

        async fn get_account(&self, address: &str) -> Result<Account, ChainError> {
            self.accounts
                .lock()
                .unwrap()
                .get(address)
                .cloned()
                .ok_or_else(|| ChainError::AccountNotFound(address.to_string()))
        }

        async fn estimate_gas(&self, _call: &UnsignedCall) -> Result<u64, ChainError> {
            Ok(self.gas_limit)
        }

        async fn gas_price(&self) -> Result<Amount, ChainError> {
            Ok(self.gas_price.clone())
        }

        async fn next_nonce(&self, address: &str) -> Result<u64, ChainError> {
            let mut nonces = self.nonces.lock().unwrap();
            let entry = nonces.entry(address.to_string()).or_insert(0);
            let nonce = *entry;
            *entry += 1;
            Ok(nonce)
        }

        async fn send_raw(&self, call: &PreparedCall) -> Result<TxHash, ChainError> {
            self.sent.lock().unwrap().push(call.clone());
            let mut next = self.next_hash.lock().unwrap();
            let hash = TxHash(format!("0xfake{:08x}", *next));
            *next += 1;
            Ok(hash)
        }

        async fn register_provider(&self, _name: &str, _description: &str) -> Result<TxHash, ChainError> {
            Ok(TxHash("0xfake_register".to_string()))
        }

        async fn wait_for_confirmation(&self, _tx_hash: &TxHash, _min_confirmations: u64) -> Result<bool, ChainError> {
            Ok(true)
        }
    }

    #[async_trait]
    impl ValidatorClient for FakeChain {
        async fn estimate_modified_amount(
            &self,
            _rail_id: RailId,
            _from_epoch: Epoch,
            _to_epoch: Epoch,
            gross: &Amount,
        ) -> Result<Amount, ChainError> {
            match *self.validator_pct_of_gross.lock().unwrap() {
                None => Ok(gross.clone()),
                Some(pct) => Ok(gross.checked_mul_epochs(pct).div_ceil(100)),
            }
        }
    }

    /// A scripted, always-succeeding delegator fake for registrar tests.
    pub struct FakeDelegator {
        registered: Mutex<std::collections::HashSet<String>>,
        proofs: Vec<DelegationProof>,
    }

    impl FakeDelegator {
        pub fn new(proofs: Vec<DelegationProof>) -> Self {
            Self { registered: Mutex::new(std::collections::HashSet::new()), proofs }
        }
    }

    #[async_trait]
    impl DelegatorClient for FakeDelegator {
        async fn request_approval(&self, _request: ApprovalRequest) -> Result<(), DelegatorError> {
            Ok(())
        }

        async fn is_registered(&self, operator_did: &str) -> Result<bool, DelegatorError> {
            Ok(self.registered.lock().unwrap().contains(operator_did))
        }

        async fn register(&self, operator_did: &str) -> Result<(), DelegatorError> {
            self.registered.lock().unwrap().insert(operator_did.to_string());
            Ok(())
        }

        async fn request_proofs(&self, _operator_did: &str) -> Result<Vec<DelegationProof>, DelegatorError> {
            Ok(self.proofs.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeChain;
    use super::*;
    use piri_types::Account;

    fn sample_rail(settled_up_to_epoch: Epoch) -> Rail {
        Rail {
            rail_id: 1,
            from: "payer".to_string(),
            to: "owner".to_string(),
            operator: "op".to_string(),
            validator: "val".to_string(),
            payment_rate_per_epoch: Amount::from_u64(1_000_000_000_000_000_000),
            lockup_period: 0,
            lockup_fixed: Amount::zero(),
            settled_up_to_epoch,
            end_epoch: 1_000,
            commission_bps: 0,
            service_fee_recipient: "fee".to_string(),
            is_terminated: false,
        }
    }

    #[tokio::test]
    async fn fake_chain_reports_seeded_epoch_and_rail() {
        let chain = FakeChain::new(200).with_rail(sample_rail(100));
        assert_eq!(chain.current_epoch().await.unwrap(), 200);
        assert_eq!(chain.get_rail(1).await.unwrap().settled_up_to_epoch, 100);
    }

    #[tokio::test]
    async fn fake_chain_errors_on_unknown_rail() {
        let chain = FakeChain::new(1);
        assert!(matches!(chain.get_rail(99).await, Err(ChainError::RailNotFound(99))));
    }

    #[tokio::test]
    async fn fake_chain_assigns_monotonic_nonces_per_address() {
        let chain = FakeChain::new(1);
        assert_eq!(chain.next_nonce("a").await.unwrap(), 0);
        assert_eq!(chain.next_nonce("a").await.unwrap(), 1);
        assert_eq!(chain.next_nonce("b").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn fake_validator_passes_gross_through_by_default() {
        let chain = FakeChain::new(1);
        let gross = Amount::from_u64(100);
        let net = chain.estimate_modified_amount(1, 0, 10, &gross).await.unwrap();
        assert_eq!(net, gross);
    }

    #[tokio::test]
    async fn fake_chain_records_sent_calls() {
        let chain = FakeChain::new(1);
        let call = PreparedCall {
            to: "0xrail".to_string(),
            data: vec![1, 2, 3],
            nonce: 0,
            gas_limit: 21_000,
            gas_price: Amount::from_u64(1),
        };
        let hash = chain.send_raw(&call).await.unwrap();
        assert_eq!(hash.0, "0xfake00000000");
        assert_eq!(chain.sent_calls().len(), 1);
    }

    #[tokio::test]
    async fn fake_delegator_tracks_registration_and_returns_proofs() {
        let delegator = super::fake::FakeDelegator::new(vec![DelegationProof {
            service: "indexer".to_string(),
            proof: "abc".to_string(),
        }]);
        assert!(!delegator.is_registered("did:1").await.unwrap());
        delegator.register("did:1").await.unwrap();
        assert!(delegator.is_registered("did:1").await.unwrap());
        let proofs = delegator.request_proofs("did:1").await.unwrap();
        assert_eq!(proofs.len(), 1);
    }

    #[tokio::test]
    async fn fake_chain_account_available_to_withdraw() {
        let chain = FakeChain::new(1).with_account(
            "payer",
            Account {
                funds: Amount::from_u64(100),
                lockup_current: Amount::from_u64(40),
                lockup_rate: Amount::zero(),
                lockup_last_settled_at: 150,
            },
        );
        let account = chain.get_account("payer").await.unwrap();
        assert_eq!(account.available_to_withdraw(), Amount::from_u64(60));
    }
}
