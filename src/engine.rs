//! Verification engine interface
//!
//! The cryptographic heavy lifting (COSE keys, signature algorithms,
//! attestation statement formats) lives behind this boundary. A ceremony
//! hands the engine the caller's raw response plus an expectation set and
//! acts on the verdict; it never parses authenticator payloads itself.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::wire::{CredentialAssertion, CredentialAttestation, PubKeyCredParam};

/// Authenticator factor policy. The ceremonies always send [`Factor::Either`]
/// and leave user-verification policy to the engine's configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Factor {
    Either,
    First,
    Second,
}

/// Parameter template for registration options. The engine proposes a
/// challenge here, but the ceremony's own generator is authoritative for
/// challenge size and expiry policy and supersedes it.
#[derive(Debug, Clone, Default)]
pub struct AttestationOptions {
    pub challenge: Vec<u8>,
    /// Public-key algorithms the engine can verify, in preference order
    pub pub_key_cred_params: Vec<PubKeyCredParam>,
}

/// Parameter template for login options. The proposed challenge is
/// superseded the same way as in [`AttestationOptions`].
#[derive(Debug, Clone, Default)]
pub struct AssertionOptions {
    pub challenge: Vec<u8>,
}

/// What a registration response must verify against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationExpectations {
    /// The challenge issued for this ceremony, raw bytes
    pub challenge: Vec<u8>,
    /// Origin that must appear in the signed client data
    pub origin: String,
    pub factor: Factor,
}

/// What a login response must verify against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionExpectations {
    /// The challenge issued for this ceremony, raw bytes
    pub challenge: Vec<u8>,
    /// Origin that must appear in the signed client data
    pub origin: String,
    pub factor: Factor,
    /// Stored public key of the claimed credential (PEM)
    pub public_key: String,
    /// Counter recorded at the previous successful ceremony. A response
    /// whose counter does not advance past this is a cloned authenticator.
    pub prev_counter: u32,
    /// Stored user handle of the claimed principal, raw bytes
    pub user_handle: Vec<u8>,
}

/// Client-data fields the engine decoded out of the response.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientData {
    /// Challenge echoed by the client, base64url
    pub challenge: String,
    pub origin: String,
    /// "webauthn.create" or "webauthn.get"
    pub kind: String,
    pub token_binding: Option<serde_json::Value>,
    /// The exact signed client-data JSON, base64url
    pub raw_json: String,
    /// Credential id the response named, base64url
    pub raw_id: String,
}

/// Authenticator-data fields common to both ceremonies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatorSummary {
    /// SHA-256 of the relying-party id, base64url
    pub rp_id_hash: String,
    /// Decoded flag names, e.g. "UP", "AT"
    pub flags: Vec<String>,
    pub counter: u32,
    /// The raw authenticator data, base64url
    pub raw: String,
}

/// Credential material recovered from a verified attestation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestedCredential {
    /// Attestation statement format, e.g. "none", "packed"
    pub fmt: String,
    pub aaguid: Vec<u8>,
    pub credential_id: Vec<u8>,
    pub public_key_pem: String,
}

/// The engine's record of which checks ran and what they noticed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditTrail {
    pub valid_expectations: bool,
    pub valid_request: bool,
    pub complete: bool,
    pub warning: Vec<String>,
    pub info: Vec<String>,
}

/// Successful verdict for a registration response.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedAttestation {
    pub client_data: ClientData,
    pub authenticator: AuthenticatorSummary,
    pub credential: AttestedCredential,
    pub audit: AuditTrail,
}

/// Successful verdict for a login response.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedAssertion {
    pub client_data: ClientData,
    pub authenticator: AuthenticatorSummary,
    pub audit: AuditTrail,
}

#[derive(Error, Debug)]
pub enum EngineError {
    /// The response failed a cryptographic or expectation check.
    #[error("{0}")]
    Rejected(String),

    /// The engine itself failed before reaching a verdict.
    #[error("engine failure: {0}")]
    Failed(String),
}

#[async_trait]
pub trait VerificationEngine: Send + Sync {
    /// Parameter template for registration options.
    async fn attestation_options(&self) -> Result<AttestationOptions, EngineError>;

    /// Verify a registration response against `expectations`.
    async fn attestation_result(
        &self,
        response: &CredentialAttestation,
        expectations: &AttestationExpectations,
    ) -> Result<VerifiedAttestation, EngineError>;

    /// Parameter template for login options.
    async fn assertion_options(&self) -> Result<AssertionOptions, EngineError>;

    /// Verify a login response against `expectations`, including the
    /// signature-counter advance.
    async fn assertion_result(
        &self,
        response: &CredentialAssertion,
        expectations: &AssertionExpectations,
    ) -> Result<VerifiedAssertion, EngineError>;
}
