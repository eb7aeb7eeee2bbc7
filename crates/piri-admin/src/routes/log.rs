//! `GET /admin/log/list`, `POST /admin/log/set`, `POST /admin/log/set-regex`.

use std::collections::HashMap;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::error::ApiError;
use crate::log::{LogLevelUpdate, LogRegexUpdate};
use crate::state::{AdminState, PaymentApi};

#[derive(Debug, Serialize)]
pub struct LogListResponse {
    pub loggers: HashMap<String, String>,
}

pub async fn list<P, L>(State(state): State<AdminState<P, L>>) -> Json<LogListResponse>
where
    P: PaymentApi,
    L: 'static,
{
    Json(LogListResponse { loggers: state.log.list() })
}

pub async fn set<P, L>(
    State(state): State<AdminState<P, L>>,
    Json(body): Json<LogLevelUpdate>,
) -> Result<(), ApiError>
where
    P: PaymentApi,
    L: 'static,
{
    state.log.set(&body.system, &body.level)
}

pub async fn set_regex<P, L>(
    State(state): State<AdminState<P, L>>,
    Json(body): Json<LogRegexUpdate>,
) -> Result<(), ApiError>
where
    P: PaymentApi,
    L: 'static,
{
    state.log.set_regex(&body.expression, &body.level)
}
