use piri_chain::{ChainError, DelegatorError};
use thiserror::Error;

use crate::proof_set::ProofSetError;

#[derive(Debug, Error)]
pub enum RegistrarError {
    #[error("invalid operator input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Pdp(#[from] PdpError),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Delegator(#[from] DelegatorError),

    #[error(transparent)]
    ProofSet(#[from] ProofSetError),

    /// More than one proof set already exists for this operator — spec §4.6
    /// step 5 requires manual operator cleanup rather than picking one.
    #[error("operator has {0} proof sets; manual cleanup required before init can proceed")]
    AmbiguousProofSets(usize),

    #[error("register_provider transaction did not reach required confirmation depth")]
    ConfirmationFailed,

    #[error("failed to read registration state file {path}: {source}")]
    StateUnreadable { path: String, source: std::io::Error },

    #[error("failed to parse registration state file {path}: {source}")]
    StateCorrupt { path: String, source: serde_json::Error },

    #[error("failed to persist registration state file {path}: {source}")]
    StateUnwritable { path: String, source: std::io::Error },

    #[error("failed to write final configuration document to {path}: {source}")]
    ConfigWrite { path: String, source: std::io::Error },
}

#[derive(Debug, Error)]
pub enum PdpError {
    #[error("pdp service failed to start in init mode: {0}")]
    StartFailed(String),
    #[error("pdp service failed to shut down: {0}")]
    ShutdownFailed(String),
}
