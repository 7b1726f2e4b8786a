//! Wire messages for the four ceremony endpoints
//!
//! Field names follow the WebAuthn JSON conventions callers already speak
//! (camelCase, base64url strings for binary). Every outgoing message carries
//! `status` and `errorMessage`; a caller can always check those two fields
//! without knowing which endpoint answered.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::challenge;
use crate::engine::{AuditTrail, VerifiedAssertion, VerifiedAttestation};
use crate::error::CeremonyError;

/// `status` field carried by every wire message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Failed,
}

/// Request body for both options endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionsRequest {
    pub username: String,
    /// Defaults to the username when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl OptionsRequest {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            display_name: None,
        }
    }
}

/// `user` entity inside registration options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEntity {
    pub name: String,
    /// User handle, base64url
    pub id: String,
    pub display_name: String,
}

/// `rp` entity inside registration options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpEntity {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// One acceptable public-key algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PubKeyCredParam {
    #[serde(rename = "type")]
    pub kind: String,
    /// COSE algorithm identifier, e.g. -7 for ES256
    pub alg: i64,
}

impl PubKeyCredParam {
    pub fn public_key(alg: i64) -> Self {
        Self {
            kind: "public-key".to_string(),
            alg,
        }
    }
}

/// Registration options sent to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationOptions {
    pub status: Status,
    pub error_message: String,
    /// The issued challenge, base64url
    pub challenge: String,
    /// Time the caller has to answer, milliseconds
    pub timeout: u64,
    pub user: UserEntity,
    pub rp: RpEntity,
    pub pub_key_cred_params: Vec<PubKeyCredParam>,
}

/// One credential the caller may assert with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowCredential {
    /// Credential id, base64url
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl AllowCredential {
    pub fn public_key(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: "public-key".to_string(),
        }
    }
}

/// Login options sent to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetOptions {
    pub status: Status,
    pub error_message: String,
    /// The issued challenge, base64url
    pub challenge: String,
    /// Time the caller has to answer, milliseconds
    pub timeout: u64,
    pub allow_credentials: Vec<AllowCredential>,
}

/// Raw registration response, forwarded to the verification engine untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialAttestation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Credential id, base64url
    pub raw_id: String,
    pub response: AttestationResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationResponse {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    pub attestation_object: String,
}

/// Raw login response, forwarded to the verification engine untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialAssertion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Credential id the caller claims to hold, base64url
    pub raw_id: String,
    pub response: AssertionResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionResponse {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    pub authenticator_data: String,
    pub signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_handle: Option<String>,
}

/// Terminal message for both result endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerResponse {
    pub status: Status,
    pub error_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_info: Option<DebugInfo>,
}

impl ServerResponse {
    /// `{"status": "ok", "errorMessage": ""}`
    pub fn success() -> Self {
        Self {
            status: Status::Ok,
            error_message: String::new(),
            debug_info: None,
        }
    }

    /// Failed wire message. Logs the outgoing line; the wire text is the
    /// only detail the caller gets.
    pub fn failure(http_status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        warn!("responding HTTP {}: {}", http_status, message);
        Self {
            status: Status::Failed,
            error_message: message,
            debug_info: None,
        }
    }

    /// Render a ceremony error for the wire: caller-safe message, mapped
    /// HTTP status.
    pub fn from_error(err: &CeremonyError) -> (u16, Self) {
        let status = err.http_status();
        (status, Self::failure(status, err.wire_message()))
    }

    pub fn with_debug_info(mut self, debug_info: DebugInfo) -> Self {
        self.debug_info = Some(debug_info);
        self
    }
}

/// Decoded verification detail attached to result responses when
/// `dangerous_xmit_debug_info` is on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugInfo {
    pub client_data: Value,
    pub authnr_data: Value,
    pub audit: AuditTrail,
}

impl DebugInfo {
    pub fn for_attestation(verified: &VerifiedAttestation) -> Self {
        let mut authnr_data = common_authnr_data(&verified.authenticator);
        let credential = &verified.credential;
        authnr_data.insert("fmt".to_string(), json!(credential.fmt));
        authnr_data.insert(
            "aaguid".to_string(),
            json!(challenge::encode(&credential.aaguid)),
        );
        authnr_data.insert("credIdLen".to_string(), json!(credential.credential_id.len()));
        authnr_data.insert(
            "credId".to_string(),
            json!(challenge::encode(&credential.credential_id)),
        );
        authnr_data.insert(
            "credentialPublicKeyPem".to_string(),
            json!(credential.public_key_pem),
        );

        Self {
            client_data: client_data_value(&verified.client_data),
            authnr_data: Value::Object(authnr_data),
            audit: verified.audit.clone(),
        }
    }

    pub fn for_assertion(verified: &VerifiedAssertion) -> Self {
        Self {
            client_data: client_data_value(&verified.client_data),
            authnr_data: Value::Object(common_authnr_data(&verified.authenticator)),
            audit: verified.audit.clone(),
        }
    }
}

fn client_data_value(client_data: &crate::engine::ClientData) -> Value {
    let mut map = Map::new();
    map.insert("challenge".to_string(), json!(client_data.challenge));
    map.insert("origin".to_string(), json!(client_data.origin));
    map.insert("type".to_string(), json!(client_data.kind));
    if let Some(token_binding) = &client_data.token_binding {
        map.insert("tokenBinding".to_string(), token_binding.clone());
    }
    map.insert("rawClientDataJson".to_string(), json!(client_data.raw_json));
    map.insert("rawId".to_string(), json!(client_data.raw_id));
    Value::Object(map)
}

fn common_authnr_data(authenticator: &crate::engine::AuthenticatorSummary) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("rpIdHash".to_string(), json!(authenticator.rp_id_hash));
    map.insert("flags".to_string(), json!(authenticator.flags));
    map.insert("counter".to_string(), json!(authenticator.counter));
    map.insert("rawAuthnrData".to_string(), json!(authenticator.raw));
    map
}
