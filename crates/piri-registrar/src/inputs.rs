//! Step 1 of the registrar procedure: "parse and validate operator inputs"
//! (spec §4.6). Everything here is pure — no I/O beyond the wallet key file
//! existence check — so re-entering this step costs nothing.

use std::path::PathBuf;

use piri_types::Network;

use crate::error::RegistrarError;

/// The operator-supplied inputs as gathered by the CLI driver, before
/// validation. `network_preset` and `base_config_file` are mutually
/// exclusive (spec §4.6 step 1).
#[derive(Debug, Clone)]
pub struct RawOperatorInputs {
    pub working_dir: PathBuf,
    pub wallet_key_path: PathBuf,
    pub owner_address: String,
    pub operator_name: String,
    pub operator_description: String,
    pub contact_email: String,
    pub server_socket: String,
    pub network_preset: Option<Network>,
    pub base_config_file: Option<PathBuf>,
}

/// Selects which network source the registrar draws endpoints and contract
/// addresses from.
#[derive(Debug, Clone)]
pub enum NetworkSelection {
    Preset(Network),
    BaseConfigFile(PathBuf),
}

/// `RawOperatorInputs` after validation — every field here is known-good.
#[derive(Debug, Clone)]
pub struct ValidatedInputs {
    pub working_dir: PathBuf,
    pub wallet_key_path: PathBuf,
    pub owner_address: String,
    pub operator_name: String,
    pub operator_description: String,
    pub contact_email: String,
    pub server_socket: String,
    pub network: NetworkSelection,
}

/// Validates `raw`, producing `ValidatedInputs` or the first violated rule.
pub fn validate_operator_inputs(raw: RawOperatorInputs) -> Result<ValidatedInputs, RegistrarError> {
    let network = match (raw.network_preset, raw.base_config_file) {
        (Some(preset), None) => NetworkSelection::Preset(preset),
        (None, Some(path)) => NetworkSelection::BaseConfigFile(path),
        (Some(_), Some(_)) => {
            return Err(RegistrarError::InvalidInput(
                "network preset and base config file are mutually exclusive".to_string(),
            ));
        }
        (None, None) => {
            return Err(RegistrarError::InvalidInput(
                "one of network preset or base config file is required".to_string(),
            ));
        }
    };

    if !raw.wallet_key_path.exists() {
        return Err(RegistrarError::InvalidInput(format!(
            "wallet key file does not exist: {}",
            raw.wallet_key_path.display()
        )));
    }

    if raw.owner_address.trim().is_empty() {
        return Err(RegistrarError::InvalidInput("owner address must not be empty".to_string()));
    }

    if raw.operator_name.trim().is_empty() {
        return Err(RegistrarError::InvalidInput("operator name must not be empty".to_string()));
    }

    if !raw.contact_email.contains('@') {
        return Err(RegistrarError::InvalidInput(format!("not a valid email: {}", raw.contact_email)));
    }

    if raw.server_socket.trim().is_empty() {
        return Err(RegistrarError::InvalidInput("server socket must not be empty".to_string()));
    }

    Ok(ValidatedInputs {
        working_dir: raw.working_dir,
        wallet_key_path: raw.wallet_key_path,
        owner_address: raw.owner_address,
        operator_name: raw.operator_name,
        operator_description: raw.operator_description,
        contact_email: raw.contact_email,
        server_socket: raw.server_socket,
        network,
    })
}
