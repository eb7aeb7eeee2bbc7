//! Piri's authenticated admin HTTP surface (spec.md §6): an `axum` router,
//! gated end to end by a bearer-token filter whose signing key is the
//! node's own identity, exposing log-level, config, payment, and status
//! routes. Grounded on `ferrex-server`'s router/middleware layering — the
//! teacher has no HTTP server of its own to draw from.

mod auth;
mod error;
mod log;
mod routes;
mod state;

pub use error::ApiError;
pub use log::{LogController, LogLevelUpdate, LogRegexUpdate};
pub use routes::build_router;
pub use state::{AdminState, NodeStatusSource, PaymentApi, StaticNodeStatusSource};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use piri_auth::{BearerAuthenticator, NodeIdentity};
    use piri_chain::TxHash;
    use piri_config::{ConfigEntry, ConfigRegistry};
    use piri_installer::NodeStatus;
    use piri_schema::Schema;
    use piri_settlement::{SettlementError, SettlementEstimate, WithdrawalEstimate};
    use piri_types::{Account, Amount, ConfigKey, RailId, WaitStatus};
    use tower::ServiceExt;
    use tracing_subscriber::EnvFilter;

    use super::*;

    struct FakePayment;

    #[async_trait::async_trait]
    impl PaymentApi for FakePayment {
        async fn account(&self, _owner: &str) -> Result<Account, SettlementError> {
            Ok(Account {
                funds: Amount::from_u64(100),
                lockup_current: Amount::from_u64(40),
                lockup_rate: Amount::zero(),
                lockup_last_settled_at: 0,
            })
        }

        async fn estimate_settlement(&self, rail_id: RailId, _owner: &str) -> Result<SettlementEstimate, SettlementError> {
            if rail_id == 404 {
                return Err(SettlementError::Forbidden);
            }
            Ok(SettlementEstimate {
                unsettled_epochs: 50,
                settleable_epochs: 50,
                until_epoch: 150,
                gross: Amount::from_u64(50),
                net_settleable: Amount::from_u64(50),
                proof_reduction_pct: 0,
                network_fee: Amount::from_u64(1),
                net_amount: Amount::from_u64(49),
                gas_limit: 21000,
                gas_price: Amount::from_u64(1),
            })
        }

        async fn settle_rail(&self, _rail_id: RailId, _owner: &str) -> Result<TxHash, SettlementError> {
            Ok(TxHash("0xabc".to_string()))
        }

        async fn rail_settlement_status(&self, _rail_id: RailId) -> Result<WaitStatus, SettlementError> {
            Ok(WaitStatus::Pending)
        }

        async fn estimate_withdrawal(&self, _owner: &str, requested: Option<Amount>) -> Result<WithdrawalEstimate, SettlementError> {
            Ok(WithdrawalEstimate {
                amount: requested.unwrap_or_else(|| Amount::from_u64(60)),
                gas_limit: 21000,
                gas_price: Amount::from_u64(1),
            })
        }

        async fn withdraw(&self, _owner: &str, _requested: Option<Amount>) -> Result<TxHash, SettlementError> {
            Ok(TxHash("0xdef".to_string()))
        }

        async fn withdrawal_status(&self, _owner: &str) -> Result<WaitStatus, SettlementError> {
            Ok(WaitStatus::None)
        }
    }

    fn test_state() -> (AdminState<FakePayment, tracing_subscriber::Registry>, NodeIdentity) {
        let identity = NodeIdentity::generate();
        let authenticator = Arc::new(BearerAuthenticator::for_node(&identity));

        let config = Arc::new(ConfigRegistry::new());
        let mut entries = std::collections::HashMap::new();
        entries.insert(
            ConfigKey::new("limits.max_connections").unwrap(),
            ConfigEntry::new(piri_schema::TypedValue::UnsignedInteger(5), Schema::unsigned_integer(0, 10)),
        );
        config.register_entries(entries).unwrap();

        let filter = EnvFilter::new("info");
        let (layer, handle): (tracing_subscriber::reload::Layer<EnvFilter, tracing_subscriber::Registry>, _) =
            tracing_subscriber::reload::Layer::new(filter);
        Box::leak(Box::new(layer));
        let log = Arc::new(LogController::new(handle, "info"));

        let status = Arc::new(StaticNodeStatusSource(NodeStatus {
            upgrade_safe: true,
            is_proving: false,
            in_challenge_window: false,
            has_proven: true,
        }));

        let state = AdminState::new(authenticator, config, Arc::new(FakePayment), log, status, "owner-address");
        (state, identity)
    }

    #[tokio::test]
    async fn rejects_requests_without_a_bearer_token() {
        let (state, _identity) = test_state();
        let router = build_router(state);

        let response = router
            .oneshot(Request::builder().uri("/admin/status").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn rejects_a_token_signed_by_a_different_identity() {
        let (state, _identity) = test_state();
        let router = build_router(state);
        let token = NodeIdentity::generate().issue_bearer_token();

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/admin/status")
                    .header("authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn authenticated_status_round_trips_node_status() {
        let (state, identity) = test_state();
        let router = build_router(state);
        let token = identity.issue_bearer_token();

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/admin/status")
                    .header("authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let status: NodeStatus = serde_json::from_slice(&body).unwrap();
        assert!(status.safe_to_restart());
    }

    #[tokio::test]
    async fn settlement_estimate_forbidden_maps_to_403() {
        let (state, identity) = test_state();
        let router = build_router(state);
        let token = identity.issue_bearer_token();

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/admin/payment/settle/404/estimate")
                    .header("authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn config_get_reports_registered_values() {
        let (state, identity) = test_state();
        let router = build_router(state);
        let token = identity.issue_bearer_token();

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/admin/config")
                    .header("authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["values"]["limits.max_connections"], "5");
    }

    #[tokio::test]
    async fn config_patch_with_unknown_key_is_bad_request() {
        let (state, identity) = test_state();
        let router = build_router(state);
        let token = identity.issue_bearer_token();

        let response = router
            .oneshot(
                Request::builder()
                    .method("PATCH")
                    .uri("/admin/config")
                    .header("authorization", format!("Bearer {token}"))
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"updates":{"nonexistent":"1"},"persist":false}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
