//! The 7-step registrar procedure itself (spec §4.6). Each step checks the
//! on-disk [`RegistrationState`] before doing anything effectful, so running
//! [`register_node`] twice against the same working directory — whether
//! because the first run crashed or because the operator re-ran the CLI on
//! purpose — only performs the work that didn't already land.

use std::path::Path;
use std::time::Duration;

use piri_auth::NodeIdentity;
use piri_chain::{ApprovalRequest, ChainClient, DelegatorClient, TxHash};
use piri_types::Network;
use tracing::info;

use crate::config_doc::{ConfigDocumentInputs, write_config_document};
use crate::container::{NodeContainer, PdpService};
use crate::error::RegistrarError;
use crate::inputs::{NetworkSelection, ValidatedInputs};
use crate::proof_set::{ProofSetId, ProofSetService};
use crate::state::{ProofRecord, RegistrationState};

/// How deep a `register_provider` confirmation must be before the registrar
/// trusts it (spec §9 Open Questions: `(MinConfidence + 2) × epoch`). Both
/// constants live in a smart-contract module out of scope here, so callers
/// read them from whatever chain-configuration collaborator they have and
/// pass the result in.
#[derive(Debug, Clone, Copy)]
pub struct ChainConfirmationConfig {
    pub min_confidence_epochs: u64,
    pub epoch_duration: Duration,
}

impl ChainConfirmationConfig {
    pub fn confirmation_depth(&self) -> u64 {
        self.min_confidence_epochs + 2
    }

    /// A rough wall-clock estimate of how long `confirmation_depth` epochs
    /// takes, for progress-marker logging only — `wait_for_confirmation`
    /// itself decides when it's actually satisfied.
    pub fn estimated_wait(&self) -> Duration {
        self.epoch_duration * self.confirmation_depth() as u32
    }
}

/// The on-chain addresses the final config document records (step 7).
pub struct ContractAddresses<'a> {
    pub rail: &'a str,
    pub account: &'a str,
}

/// What a successful run of [`register_node`] produced.
#[derive(Debug, Clone)]
pub struct RegisteredNode {
    pub operator_did: String,
    pub provider_registration_tx: TxHash,
    pub proof_set_id: ProofSetId,
    pub config_path: std::path::PathBuf,
}

/// The DID the registrar presents to the delegator and proof-set
/// collaborators: the node's public identity, namespaced so it reads as a
/// DID rather than a bare key encoding.
pub fn operator_did(identity: &NodeIdentity) -> String {
    format!("did:piri:{}", identity.node_id())
}

/// Runs steps 3 through 7 of the registrar procedure. Steps 1 (validate
/// inputs) and 2 (assemble and start the container) are the caller's
/// responsibility, since they precede this function's scope: the validated
/// inputs and a started container are both required here.
pub async fn register_node<C, D, P, Pdp>(
    inputs: &ValidatedInputs,
    container: &NodeContainer<C, D, P, Pdp>,
    confirmation: &ChainConfirmationConfig,
    contracts: &ContractAddresses<'_>,
) -> Result<RegisteredNode, RegistrarError>
where
    C: ChainClient,
    D: DelegatorClient,
    P: ProofSetService,
    Pdp: PdpService,
{
    let did = operator_did(&container.identity);
    let mut state = RegistrationState::load(&inputs.working_dir)?;

    let provider_tx = step3_register_provider(container, confirmation, &mut state, &inputs.working_dir, &inputs.operator_name, &inputs.operator_description).await?;
    step4_request_approval(container, &mut state, &inputs.working_dir, &did, &inputs.owner_address).await?;
    let proof_set_id = step5_resolve_proof_set(container, &mut state, &inputs.working_dir, &did).await?;
    step6_register_and_fetch_proofs(container, &mut state, &inputs.working_dir, &did).await?;
    let config_path = step7_render_config(inputs, &state, &did, contracts, proof_set_id).await?;

    Ok(RegisteredNode { operator_did: did, provider_registration_tx: provider_tx, proof_set_id, config_path })
}

async fn step3_register_provider<C, D, P, Pdp>(
    container: &NodeContainer<C, D, P, Pdp>,
    confirmation: &ChainConfirmationConfig,
    state: &mut RegistrationState,
    working_dir: &Path,
    name: &str,
    description: &str,
) -> Result<TxHash, RegistrarError>
where
    C: ChainClient,
    D: DelegatorClient,
    P: ProofSetService,
    Pdp: PdpService,
{
    if let Some(tx) = state.provider_registered_tx() {
        info!(tx_hash = %tx, "step 3: provider already registered");
        return Ok(tx);
    }

    info!(name, "step 3: registering as a storage provider");
    let tx = container.chain.register_provider(name, description).await?;
    let depth = confirmation.confirmation_depth();
    info!(tx_hash = %tx, depth, estimated_wait = ?confirmation.estimated_wait(), "step 3: waiting for confirmation");
    let confirmed = container.chain.wait_for_confirmation(&tx, depth).await?;
    if !confirmed {
        return Err(RegistrarError::ConfirmationFailed);
    }

    state.provider_registered = Some(tx.0.clone());
    state.save(working_dir)?;
    Ok(tx)
}

async fn step4_request_approval<C, D, P, Pdp>(
    container: &NodeContainer<C, D, P, Pdp>,
    state: &mut RegistrationState,
    working_dir: &Path,
    operator_did: &str,
    owner_address: &str,
) -> Result<(), RegistrarError>
where
    C: ChainClient,
    D: DelegatorClient,
    P: ProofSetService,
    Pdp: PdpService,
{
    if state.approval_requested {
        info!("step 4: approval already requested");
        return Ok(());
    }

    info!("step 4: requesting delegator approval (may block up to 5 minutes)");
    let signature = container.identity.sign(operator_did.as_bytes());
    container
        .delegator
        .request_approval(ApprovalRequest {
            operator_did: operator_did.to_string(),
            owner_address: owner_address.to_string(),
            signature,
        })
        .await?;

    state.approval_requested = true;
    state.save(working_dir)?;
    Ok(())
}

async fn step5_resolve_proof_set<C, D, P, Pdp>(
    container: &NodeContainer<C, D, P, Pdp>,
    state: &mut RegistrationState,
    working_dir: &Path,
    operator_did: &str,
) -> Result<ProofSetId, RegistrarError>
where
    C: ChainClient,
    D: DelegatorClient,
    P: ProofSetService,
    Pdp: PdpService,
{
    if let Some(id) = state.proof_set_id {
        info!(%id, "step 5: reusing proof set recorded from a prior run");
        return Ok(id);
    }

    let existing = container.proof_sets.list_proof_sets(operator_did).await?;
    let id = match existing.len() {
        0 => {
            info!("step 5: no proof set exists, creating one");
            let tx = container.proof_sets.create_proof_set(operator_did).await?;
            container.proof_sets.poll_for_creation(&tx).await?
        }
        1 => {
            info!(%existing[0], "step 5: reusing the operator's single existing proof set");
            existing[0]
        }
        n => return Err(RegistrarError::AmbiguousProofSets(n)),
    };

    state.proof_set_id = Some(id);
    state.save(working_dir)?;
    Ok(id)
}

async fn step6_register_and_fetch_proofs<C, D, P, Pdp>(
    container: &NodeContainer<C, D, P, Pdp>,
    state: &mut RegistrationState,
    working_dir: &Path,
    operator_did: &str,
) -> Result<(), RegistrarError>
where
    C: ChainClient,
    D: DelegatorClient,
    P: ProofSetService,
    Pdp: PdpService,
{
    if !state.delegator_registered {
        if !container.delegator.is_registered(operator_did).await? {
            info!("step 6: registering with the delegator service");
            container.delegator.register(operator_did).await?;
        } else {
            info!("step 6: already registered with the delegator service");
        }
        state.delegator_registered = true;
        state.save(working_dir)?;
    }

    if state.proofs.is_empty() {
        info!("step 6: requesting operator proofs");
        let proofs = container.delegator.request_proofs(operator_did).await?;
        state.proofs = proofs.into_iter().map(ProofRecord::from).collect();
        state.save(working_dir)?;
    }

    Ok(())
}

async fn step7_render_config(
    inputs: &ValidatedInputs,
    state: &RegistrationState,
    operator_did: &str,
    contracts: &ContractAddresses<'_>,
    proof_set_id: ProofSetId,
) -> Result<std::path::PathBuf, RegistrarError> {
    let config_path = inputs.working_dir.join("piri.toml");

    if state.config_written {
        info!(path = %config_path.display(), "step 7: config document already written");
        return Ok(config_path);
    }

    let network = resolve_network(&inputs.network)?;
    let doc_inputs = ConfigDocumentInputs {
        network: &network,
        identity_file: &inputs.wallet_key_path,
        working_dir: &inputs.working_dir,
        server_socket: &inputs.server_socket,
        owner_address: &inputs.owner_address,
        rail_contract_address: contracts.rail,
        account_contract_address: contracts.account,
        proof_set_id,
        proofs: &state.proofs,
    };

    let path = write_config_document(&config_path, &doc_inputs)?;
    info!(path = %path.display(), operator_did, "step 7: wrote final configuration document");

    let mut written = state.clone();
    written.config_written = true;
    written.save(&inputs.working_dir)?;

    Ok(path)
}

fn resolve_network(selection: &NetworkSelection) -> Result<Network, RegistrarError> {
    match selection {
        NetworkSelection::Preset(n) => Ok(*n),
        NetworkSelection::BaseConfigFile(path) => {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| RegistrarError::InvalidInput(format!("failed to read base config file {}: {e}", path.display())))?;
            let doc: toml_edit::DocumentMut = contents
                .parse()
                .map_err(|e: toml_edit::TomlError| RegistrarError::InvalidInput(format!("failed to parse base config file {}: {e}", path.display())))?;
            let network_str = doc
                .get("network")
                .and_then(|item| item.as_str())
                .ok_or_else(|| RegistrarError::InvalidInput(format!("base config file {} is missing a network key", path.display())))?;
            network_str.parse().map_err(|e: anyhow::Error| RegistrarError::InvalidInput(e.to_string()))
        }
    }
}
