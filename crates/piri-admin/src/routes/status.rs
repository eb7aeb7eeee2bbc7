//! `GET /admin/status`: the read the managed updater's
//! `HttpNodeStatusClient` polls before restarting the unit (spec.md §4.4
//! step 2).

use axum::Json;
use axum::extract::State;
use piri_installer::NodeStatus;

use crate::state::{AdminState, PaymentApi};

pub async fn get<P, L>(State(state): State<AdminState<P, L>>) -> Json<NodeStatus>
where
    P: PaymentApi,
    L: 'static,
{
    Json(state.status.status().await)
}
