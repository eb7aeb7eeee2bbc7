//! The proof-set collaborator registrar step 5 needs: list the operator's
//! proof sets, create one if none exist, and poll a creation transaction to
//! land. A real implementation is an out-of-scope on-chain/PDP collaborator
//! (spec §1); this crate only defines the seam plus a deterministic fake.

use async_trait::async_trait;
use piri_chain::TxHash;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An on-chain proof-set identifier (spec glossary: "Proof set").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProofSetId(pub u64);

impl std::fmt::Display for ProofSetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum ProofSetError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("proof set creation transaction {0} never landed")]
    CreationNeverLanded(String),
}

#[async_trait]
pub trait ProofSetService: Send + Sync {
    async fn list_proof_sets(&self, operator_did: &str) -> Result<Vec<ProofSetId>, ProofSetError>;

    async fn create_proof_set(&self, operator_did: &str) -> Result<TxHash, ProofSetError>;

    /// Polls until the creation transaction has landed, returning the
    /// assigned id.
    async fn poll_for_creation(&self, tx_hash: &TxHash) -> Result<ProofSetId, ProofSetError>;
}

pub mod fake {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    /// A scripted proof-set service: seed `existing` per operator up front;
    /// `create_proof_set` always succeeds and `poll_for_creation` resolves
    /// immediately to a deterministic id.
    pub struct FakeProofSetService {
        existing: Mutex<HashMap<String, Vec<ProofSetId>>>,
        next_id: Mutex<u64>,
    }

    impl FakeProofSetService {
        pub fn new() -> Self {
            Self { existing: Mutex::new(HashMap::new()), next_id: Mutex::new(1) }
        }

        pub fn with_existing(self, operator_did: impl Into<String>, ids: Vec<ProofSetId>) -> Self {
            self.existing.lock().unwrap().insert(operator_did.into(), ids);
            self
        }
    }

    impl Default for FakeProofSetService {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl ProofSetService for FakeProofSetService {
        async fn list_proof_sets(&self, operator_did: &str) -> Result<Vec<ProofSetId>, ProofSetError> {
            Ok(self.existing.lock().unwrap().get(operator_did).cloned().unwrap_or_default())
        }

        async fn create_proof_set(&self, _operator_did: &str) -> Result<TxHash, ProofSetError> {
            Ok(TxHash("0xfake_proof_set_create".to_string()))
        }

        async fn poll_for_creation(&self, _tx_hash: &TxHash) -> Result<ProofSetId, ProofSetError> {
            let mut next = self.next_id.lock().unwrap();
            let id = ProofSetId(*next);
            *next += 1;
            Ok(id)
        }
    }
}
