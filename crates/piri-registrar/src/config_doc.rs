//! Step 7 of the registrar procedure: render the final configuration
//! document and write it to the operator's working directory (spec §4.6
//! step 7). Built with `toml_edit` for the same reason the persister uses
//! it — a document, not a string template, so the shape stays easy to
//! extend without hand-rolled formatting.

use std::fs;
use std::path::{Path, PathBuf};

use piri_types::Network;
use toml_edit::{ArrayOfTables, DocumentMut, Table, value};

use crate::error::RegistrarError;
use crate::proof_set::ProofSetId;
use crate::state::ProofRecord;

/// Everything step 7 needs to render; assembled from the validated inputs
/// plus whatever the earlier steps produced.
pub struct ConfigDocumentInputs<'a> {
    pub network: &'a Network,
    pub identity_file: &'a Path,
    pub working_dir: &'a Path,
    pub server_socket: &'a str,
    pub owner_address: &'a str,
    pub rail_contract_address: &'a str,
    pub account_contract_address: &'a str,
    pub proof_set_id: ProofSetId,
    pub proofs: &'a [ProofRecord],
}

pub fn render_config_document(inputs: &ConfigDocumentInputs<'_>) -> String {
    let mut doc = DocumentMut::new();

    doc["network"] = value(inputs.network.to_string());
    doc["identity_file"] = value(inputs.identity_file.display().to_string());
    doc["working_dir"] = value(inputs.working_dir.display().to_string());
    doc["server_socket"] = value(inputs.server_socket.to_string());
    doc["owner_address"] = value(inputs.owner_address.to_string());
    doc["proof_set_id"] = value(inputs.proof_set_id.0 as i64);

    let mut contracts = Table::new();
    contracts["rail"] = value(inputs.rail_contract_address.to_string());
    contracts["account"] = value(inputs.account_contract_address.to_string());
    doc["contracts"] = toml_edit::Item::Table(contracts);

    let mut proofs = ArrayOfTables::new();
    for proof in inputs.proofs {
        let mut t = Table::new();
        t["service"] = value(proof.service.clone());
        t["proof"] = value(proof.proof.clone());
        proofs.push(t);
    }
    doc["delegation_proofs"] = toml_edit::Item::ArrayOfTables(proofs);

    doc.to_string()
}

pub fn write_config_document(path: &Path, inputs: &ConfigDocumentInputs<'_>) -> Result<PathBuf, RegistrarError> {
    let rendered = render_config_document(inputs);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| RegistrarError::ConfigWrite { path: path.display().to_string(), source: e })?;
    }
    fs::write(path, rendered).map_err(|e| RegistrarError::ConfigWrite { path: path.display().to_string(), source: e })?;
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_network_paths_and_contracts() {
        let proofs = vec![ProofRecord { service: "indexer".to_string(), proof: "abc".to_string() }];
        let inputs = ConfigDocumentInputs {
            network: &Network::Calibration,
            identity_file: Path::new("/opt/piri/identity.key"),
            working_dir: Path::new("/home/op/piri"),
            server_socket: "0.0.0.0:8080",
            owner_address: "0xowner",
            rail_contract_address: "0xrail",
            account_contract_address: "0xaccount",
            proof_set_id: ProofSetId(42),
            proofs: &proofs,
        };

        let rendered = render_config_document(&inputs);
        assert!(rendered.contains("network = \"calibration\""));
        assert!(rendered.contains("proof_set_id = 42"));
        assert!(rendered.contains("[contracts]"));
        assert!(rendered.contains("rail = \"0xrail\""));
        assert!(rendered.contains("[[delegation_proofs]]"));
        assert!(rendered.contains("service = \"indexer\""));
    }

    #[test]
    fn write_creates_parent_directories() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("nested").join("piri.toml");
        let proofs = vec![];
        let inputs = ConfigDocumentInputs {
            network: &Network::Mainnet,
            identity_file: Path::new("identity.key"),
            working_dir: td.path(),
            server_socket: "127.0.0.1:9000",
            owner_address: "0xowner",
            rail_contract_address: "0xrail",
            account_contract_address: "0xaccount",
            proof_set_id: ProofSetId(1),
            proofs: &proofs,
        };

        write_config_document(&path, &inputs).unwrap();
        assert!(path.exists());
    }
}
