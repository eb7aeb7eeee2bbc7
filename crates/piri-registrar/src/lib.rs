//! Registrar (node init): a linear, idempotent, 7-step procedure that
//! brings a fresh node from "keys on disk" to "registered, approved,
//! proof-set ready" and emits a persisted config file (spec §4.6).
//!
//! Steps 1-2 (validate operator inputs, assemble and start the
//! dependency-injection container) are [`inputs`] and [`container`];
//! steps 3-7 (on-chain registration through config rendering) are
//! [`registrar::register_node`], re-entrant against the on-disk
//! [`state::RegistrationState`] so a crashed or re-run procedure only
//! does the work that didn't already land.

mod config_doc;
mod container;
mod error;
mod inputs;
mod proof_set;
mod registrar;
mod state;

pub use config_doc::{ConfigDocumentInputs, render_config_document, write_config_document};
pub use container::{NodeContainer, PdpService};
pub use error::{PdpError, RegistrarError};
pub use inputs::{NetworkSelection, RawOperatorInputs, ValidatedInputs, validate_operator_inputs};
pub use proof_set::{ProofSetError, ProofSetId, ProofSetService};
pub use registrar::{ChainConfirmationConfig, ContractAddresses, RegisteredNode, operator_did, register_node};
pub use state::{ProofRecord, RegistrationState, STATE_FILE_NAME};
