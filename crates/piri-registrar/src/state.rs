//! On-disk registration progress, re-read at the top of every step so the
//! 7-step procedure can be re-entered after a crash or an operator-aborted
//! run without redoing (or re-paying for) work already done. Mirrors the
//! per-item persisted-state-and-resume discipline the teacher's publish
//! engine uses for its own multi-step procedure: one JSON file, one
//! "already done?" check per step before any side effect runs.

use std::fs;
use std::path::{Path, PathBuf};

use piri_chain::TxHash;
use serde::{Deserialize, Serialize};

use crate::error::RegistrarError;
use crate::proof_set::ProofSetId;

pub const STATE_FILE_NAME: &str = ".piri-registrar-state.json";

/// Step-by-step progress of one registrar run. Every field defaults to
/// "not done yet" so a fresh working directory starts a fresh procedure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistrationState {
    /// Step 3: the `register_provider` tx hash, once confirmed to the
    /// required depth.
    pub provider_registered: Option<String>,
    /// Step 4: whether the delegator approval request has been sent.
    pub approval_requested: bool,
    /// Step 5: the proof set this node will use, however it was obtained.
    pub proof_set_id: Option<ProofSetId>,
    /// Step 6a: whether this operator is registered with the delegator.
    pub delegator_registered: bool,
    /// Step 6b: the proofs the delegator returned.
    pub proofs: Vec<ProofRecord>,
    /// Step 7: whether the final config document has been written.
    pub config_written: bool,
}

/// A serializable mirror of `piri_chain::DelegationProof` — kept local so
/// this crate's on-disk schema doesn't change shape if that type does.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProofRecord {
    pub service: String,
    pub proof: String,
}

impl From<piri_chain::DelegationProof> for ProofRecord {
    fn from(p: piri_chain::DelegationProof) -> Self {
        Self { service: p.service, proof: p.proof }
    }
}

impl RegistrationState {
    pub fn path_in(working_dir: &Path) -> PathBuf {
        working_dir.join(STATE_FILE_NAME)
    }

    /// Loads the state file if present; a fresh `RegistrationState` if not.
    pub fn load(working_dir: &Path) -> Result<Self, RegistrarError> {
        let path = Self::path_in(working_dir);
        let contents = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(RegistrarError::StateUnreadable { path: path.display().to_string(), source: e }),
        };
        serde_json::from_str(&contents)
            .map_err(|e| RegistrarError::StateCorrupt { path: path.display().to_string(), source: e })
    }

    pub fn save(&self, working_dir: &Path) -> Result<(), RegistrarError> {
        let path = Self::path_in(working_dir);
        let contents = serde_json::to_string_pretty(self).expect("registration state always serializes");
        fs::write(&path, contents).map_err(|e| RegistrarError::StateUnwritable { path: path.display().to_string(), source: e })
    }

    pub fn provider_registered_tx(&self) -> Option<TxHash> {
        self.provider_registered.clone().map(TxHash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_on_fresh_directory_returns_default() {
        let td = tempfile::tempdir().unwrap();
        let state = RegistrationState::load(td.path()).unwrap();
        assert_eq!(state, RegistrationState::default());
    }

    #[test]
    fn save_then_load_round_trips() {
        let td = tempfile::tempdir().unwrap();
        let mut state = RegistrationState::default();
        state.provider_registered = Some("0xabc".to_string());
        state.proof_set_id = Some(ProofSetId(7));
        state.save(td.path()).unwrap();

        let reloaded = RegistrationState::load(td.path()).unwrap();
        assert_eq!(reloaded, state);
    }

    #[test]
    fn corrupt_state_file_is_reported_not_silently_reset() {
        let td = tempfile::tempdir().unwrap();
        std::fs::write(RegistrationState::path_in(td.path()), b"not json").unwrap();
        let err = RegistrationState::load(td.path()).unwrap_err();
        assert!(matches!(err, RegistrarError::StateCorrupt { .. }));
    }
}
