//! Node identity and bearer-token authentication for Piri's admin HTTP
//! surface.
//!
//! Spec §6: "All routes are under a common root, gated by a bearer-token
//! filter whose signing key is the node's public identity." The node holds
//! an ed25519 keypair; its public key *is* its identity, and the bearer
//! tokens the admin surface accepts are self-issued and self-verified
//! against that same keypair — there is no external identity provider in
//! scope (spec §1 Non-goals: "the UCAN invocation server" is an external
//! collaborator).

use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as BASE64;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The node's public identity: the base64 (URL-safe, unpadded) encoding of
/// its ed25519 public key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("malformed bearer token")]
    MalformedToken,
    #[error("bearer token signature is invalid")]
    InvalidSignature,
    #[error("bearer token payload could not be decoded")]
    InvalidPayload,
}

/// The node's ed25519 keypair. Holds the private half; never serialized.
pub struct NodeIdentity {
    signing_key: SigningKey,
}

impl NodeIdentity {
    /// Generates a fresh keypair (used once, at first `node init`, spec
    /// §4.6 step 1).
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    /// Restores a previously generated identity from its 32-byte seed, as
    /// persisted on disk by the Registrar.
    pub fn from_seed_bytes(seed: &[u8; 32]) -> Self {
        Self { signing_key: SigningKey::from_bytes(seed) }
    }

    pub fn seed_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn node_id(&self) -> NodeId {
        NodeId(BASE64.encode(self.verifying_key().to_bytes()))
    }

    /// Signs arbitrary bytes with the node's private key — used by the
    /// registrar to sign its own identity bytes for the delegator approval
    /// request (spec §4.6 step 4).
    pub fn sign(&self, bytes: &[u8]) -> Vec<u8> {
        self.signing_key.sign(bytes).to_bytes().to_vec()
    }

    /// Issues a bearer token: `base64(payload json).base64(signature)`,
    /// where the payload records the node id and issue time. Verified by
    /// [`BearerAuthenticator::verify`] against the same node's public key.
    pub fn issue_bearer_token(&self) -> String {
        let payload = TokenPayload {
            node_id: self.node_id(),
            issued_at: now_unix(),
        };
        let payload_json = serde_json::to_vec(&payload).expect("token payload always serializes");
        let payload_b64 = BASE64.encode(&payload_json);
        let signature: Signature = self.signing_key.sign(payload_b64.as_bytes());
        format!("{}.{}", payload_b64, BASE64.encode(signature.to_bytes()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TokenPayload {
    node_id: NodeId,
    issued_at: u64,
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Verifies bearer tokens against a fixed public key — the admin HTTP
/// middleware's authorization filter.
#[derive(Debug, Clone)]
pub struct BearerAuthenticator {
    verifying_key: VerifyingKey,
}

impl BearerAuthenticator {
    pub fn new(verifying_key: VerifyingKey) -> Self {
        Self { verifying_key }
    }

    pub fn for_node(identity: &NodeIdentity) -> Self {
        Self::new(identity.verifying_key())
    }

    /// Verifies a raw `Authorization: Bearer <token>` value (without the
    /// `Bearer ` prefix, already stripped by the caller).
    pub fn verify(&self, token: &str) -> Result<NodeId, AuthError> {
        let (payload_b64, signature_b64) = token.split_once('.').ok_or(AuthError::MalformedToken)?;

        let signature_bytes = BASE64
            .decode(signature_b64)
            .map_err(|_| AuthError::MalformedToken)?;
        let signature_bytes: [u8; 64] =
            signature_bytes.try_into().map_err(|_| AuthError::MalformedToken)?;
        let signature = Signature::from_bytes(&signature_bytes);

        self.verifying_key
            .verify(payload_b64.as_bytes(), &signature)
            .map_err(|_| AuthError::InvalidSignature)?;

        let payload_json = BASE64
            .decode(payload_b64)
            .map_err(|_| AuthError::InvalidPayload)?;
        let payload: TokenPayload =
            serde_json::from_slice(&payload_json).map_err(|_| AuthError::InvalidPayload)?;

        Ok(payload.node_id)
    }
}

/// Masks a bearer token for safe inclusion in logs: first 6 and last 4
/// characters, the rest replaced with `*`.
pub fn mask_token(token: &str) -> String {
    if token.len() <= 12 {
        return "*".repeat(token.len());
    }
    format!("{}****{}", &token[..6], &token[token.len() - 4..])
}
