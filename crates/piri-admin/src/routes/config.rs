//! `GET/PATCH /admin/config`, `POST /admin/config/reload`.

use std::collections::HashMap;

use axum::Json;
use axum::extract::State;
use piri_types::{ChangeSource, ConfigKey};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::{AdminState, PaymentApi};

#[derive(Debug, Serialize)]
pub struct ConfigValuesResponse {
    pub values: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct ConfigPatchRequest {
    pub updates: HashMap<String, String>,
    pub persist: bool,
}

pub async fn get<P, L>(State(state): State<AdminState<P, L>>) -> Json<ConfigValuesResponse>
where
    P: PaymentApi,
    L: 'static,
{
    Json(ConfigValuesResponse { values: state.config.get_all() })
}

pub async fn patch<P, L>(
    State(state): State<AdminState<P, L>>,
    Json(body): Json<ConfigPatchRequest>,
) -> Result<(), ApiError>
where
    P: PaymentApi,
    L: 'static,
{
    let mut updates = HashMap::with_capacity(body.updates.len());
    for (key, value) in body.updates {
        let key = ConfigKey::new(key).map_err(|e| ApiError::BadRequest(e.to_string()))?;
        updates.insert(key, value);
    }
    state.config.update(updates, body.persist, ChangeSource::Api)?;
    Ok(())
}

pub async fn reload<P, L>(State(state): State<AdminState<P, L>>) -> Result<(), ApiError>
where
    P: PaymentApi,
    L: 'static,
{
    state.config.reload()?;
    Ok(())
}
