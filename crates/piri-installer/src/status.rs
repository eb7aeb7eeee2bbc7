//! The managed updater's view into the running node's own state (spec
//! §4.4 managed update step 2): "Query node's own HTTP status endpoint:
//! require `upgrade_safe = true`. If the node reports `is_proving` or
//! `in_challenge_window && !has_proven`, abort this cycle with a
//! non-error exit."
//!
//! The admin HTTP surface (spec §6) only enumerates log/config/payment
//! routes explicitly; this status check is a distinct read the updater
//! needs before it dares restart the unit. `piri-admin` exposes it as
//! `GET /admin/status` alongside the documented routes.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub upgrade_safe: bool,
    pub is_proving: bool,
    pub in_challenge_window: bool,
    pub has_proven: bool,
}

impl NodeStatus {
    /// Whether the managed updater may proceed to restart the unit this
    /// cycle (spec §4.4 step 2).
    pub fn safe_to_restart(&self) -> bool {
        self.upgrade_safe && !self.is_proving && !(self.in_challenge_window && !self.has_proven)
    }
}

#[async_trait]
pub trait NodeStatusClient: Send + Sync {
    async fn status(&self) -> Result<NodeStatus>;
}

/// Talks to the node's own admin HTTP surface to fetch [`NodeStatus`].
#[derive(Debug, Clone)]
pub struct HttpNodeStatusClient {
    http: reqwest::Client,
    base_url: String,
    bearer_token: String,
}

impl HttpNodeStatusClient {
    pub fn new(base_url: impl Into<String>, bearer_token: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder().build().context("failed to build status HTTP client")?;
        Ok(Self { http, base_url: base_url.into(), bearer_token: bearer_token.into() })
    }
}

#[async_trait]
impl NodeStatusClient for HttpNodeStatusClient {
    async fn status(&self) -> Result<NodeStatus> {
        let url = format!("{}/admin/status", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.bearer_token)
            .send()
            .await
            .with_context(|| format!("failed to query node status at {url}"))?;
        if !response.status().is_success() {
            bail!("node status endpoint returned status {}", response.status());
        }
        response.json().await.context("failed to parse node status response")
    }
}

#[cfg(test)]
pub mod fake {
    use super::*;
    use std::sync::Mutex;

    /// A deterministic test double reporting a fixed [`NodeStatus`].
    pub struct FakeNodeStatusClient {
        status: Mutex<NodeStatus>,
    }

    impl FakeNodeStatusClient {
        pub fn new(status: NodeStatus) -> Self {
            Self { status: Mutex::new(status) }
        }

        pub fn set(&self, status: NodeStatus) {
            *self.status.lock().unwrap() = status;
        }
    }

    #[async_trait]
    impl NodeStatusClient for FakeNodeStatusClient {
        async fn status(&self) -> Result<NodeStatus> {
            Ok(*self.status.lock().unwrap())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_to_restart_requires_upgrade_safe() {
        let status = NodeStatus { upgrade_safe: false, is_proving: false, in_challenge_window: false, has_proven: true };
        assert!(!status.safe_to_restart());
    }

    #[test]
    fn safe_to_restart_blocks_while_proving() {
        let status = NodeStatus { upgrade_safe: true, is_proving: true, in_challenge_window: false, has_proven: true };
        assert!(!status.safe_to_restart());
    }

    #[test]
    fn safe_to_restart_blocks_in_unproven_challenge_window() {
        let status = NodeStatus { upgrade_safe: true, is_proving: false, in_challenge_window: true, has_proven: false };
        assert!(!status.safe_to_restart());
    }

    #[test]
    fn safe_to_restart_allows_proven_challenge_window() {
        let status = NodeStatus { upgrade_safe: true, is_proving: false, in_challenge_window: true, has_proven: true };
        assert!(status.safe_to_restart());
    }
}
