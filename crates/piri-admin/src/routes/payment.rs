//! `/admin/payment/*` (spec.md §6): settlement and withdrawal control,
//! wired straight through to the `SettlementOrchestrator`. Every route acts
//! on behalf of the node's own address — there is no owner parameter in
//! the route table, the node only ever settles/withdraws its own rails.

use axum::Json;
use axum::extract::{Path, State};
use piri_types::{Amount, RailId, WaitStatus};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::{AdminState, PaymentApi};

#[derive(Debug, Serialize)]
pub struct GetAccountInfoResponse {
    pub funds: String,
    pub lockup_current: String,
    pub lockup_rate: String,
    pub lockup_last_settled_at: u64,
    pub available_to_withdraw: String,
}

pub async fn account<P, L>(State(state): State<AdminState<P, L>>) -> Result<Json<GetAccountInfoResponse>, ApiError>
where
    P: PaymentApi,
    L: 'static,
{
    let account = state.payment.account(&state.owner_address).await?;
    Ok(Json(GetAccountInfoResponse {
        available_to_withdraw: account.available_to_withdraw().to_string(),
        funds: account.funds.to_string(),
        lockup_current: account.lockup_current.to_string(),
        lockup_rate: account.lockup_rate.to_string(),
        lockup_last_settled_at: account.lockup_last_settled_at,
    }))
}

#[derive(Debug, Serialize)]
pub struct SettlementEstimateResponse {
    pub unsettled_epochs: u64,
    pub settleable_epochs: u64,
    pub until_epoch: u64,
    pub gross: String,
    pub net_settleable: String,
    pub proof_reduction_pct: u64,
    pub network_fee: String,
    pub net_amount: String,
    pub gas_limit: u64,
    pub gas_price: String,
    pub gas_cost: String,
}

pub async fn settle_estimate<P, L>(
    State(state): State<AdminState<P, L>>,
    Path(rail_id): Path<RailId>,
) -> Result<Json<SettlementEstimateResponse>, ApiError>
where
    P: PaymentApi,
    L: 'static,
{
    let estimate = state.payment.estimate_settlement(rail_id, &state.owner_address).await?;
    Ok(Json(SettlementEstimateResponse {
        unsettled_epochs: estimate.unsettled_epochs,
        settleable_epochs: estimate.settleable_epochs,
        until_epoch: estimate.until_epoch,
        gas_cost: estimate.gas_cost().to_string(),
        gross: estimate.gross.to_string(),
        net_settleable: estimate.net_settleable.to_string(),
        proof_reduction_pct: estimate.proof_reduction_pct,
        network_fee: estimate.network_fee.to_string(),
        net_amount: estimate.net_amount.to_string(),
        gas_limit: estimate.gas_limit,
        gas_price: estimate.gas_price.to_string(),
    }))
}

#[derive(Debug, Serialize)]
pub struct TxHashResponse {
    pub tx_hash: String,
}

pub async fn settle<P, L>(
    State(state): State<AdminState<P, L>>,
    Path(rail_id): Path<RailId>,
) -> Result<Json<TxHashResponse>, ApiError>
where
    P: PaymentApi,
    L: 'static,
{
    let tx_hash = state.payment.settle_rail(rail_id, &state.owner_address).await?;
    Ok(Json(TxHashResponse { tx_hash: tx_hash.to_string() }))
}

#[derive(Debug, Serialize)]
pub struct WaitStatusResponse {
    pub status: &'static str,
}

impl From<WaitStatus> for WaitStatusResponse {
    fn from(status: WaitStatus) -> Self {
        Self {
            status: match status {
                WaitStatus::None => "none",
                WaitStatus::Pending => "pending",
                WaitStatus::Confirmed => "confirmed",
            },
        }
    }
}

pub async fn settle_status<P, L>(
    State(state): State<AdminState<P, L>>,
    Path(rail_id): Path<RailId>,
) -> Result<Json<WaitStatusResponse>, ApiError>
where
    P: PaymentApi,
    L: 'static,
{
    let status = state.payment.rail_settlement_status(rail_id).await?;
    Ok(Json(status.into()))
}

#[derive(Debug, Deserialize, Default)]
pub struct WithdrawalRequest {
    pub amount: Option<String>,
}

impl WithdrawalRequest {
    fn parse_amount(&self) -> Result<Option<Amount>, ApiError> {
        self.amount
            .as_deref()
            .map(|raw| raw.parse::<Amount>().map_err(|_| ApiError::BadRequest(format!("invalid amount: {raw}"))))
            .transpose()
    }
}

#[derive(Debug, Serialize)]
pub struct WithdrawalEstimateResponse {
    pub amount: String,
    pub gas_limit: u64,
    pub gas_price: String,
    pub gas_cost: String,
}

pub async fn withdraw_estimate<P, L>(
    State(state): State<AdminState<P, L>>,
    Json(body): Json<WithdrawalRequest>,
) -> Result<Json<WithdrawalEstimateResponse>, ApiError>
where
    P: PaymentApi,
    L: 'static,
{
    let requested = body.parse_amount()?;
    let estimate = state.payment.estimate_withdrawal(&state.owner_address, requested).await?;
    Ok(Json(WithdrawalEstimateResponse {
        amount: estimate.amount.to_string(),
        gas_limit: estimate.gas_limit,
        gas_price: estimate.gas_price.to_string(),
        gas_cost: estimate.gas_cost().to_string(),
    }))
}

pub async fn withdraw<P, L>(
    State(state): State<AdminState<P, L>>,
    Json(body): Json<WithdrawalRequest>,
) -> Result<Json<TxHashResponse>, ApiError>
where
    P: PaymentApi,
    L: 'static,
{
    let requested = body.parse_amount()?;
    let tx_hash = state.payment.withdraw(&state.owner_address, requested).await?;
    Ok(Json(TxHashResponse { tx_hash: tx_hash.to_string() }))
}

pub async fn withdraw_status<P, L>(
    State(state): State<AdminState<P, L>>,
) -> Result<Json<WaitStatusResponse>, ApiError>
where
    P: PaymentApi,
    L: 'static,
{
    let status = state.payment.withdrawal_status(&state.owner_address).await?;
    Ok(Json(status.into()))
}
