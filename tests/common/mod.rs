//! Common test utilities: in-memory collaborator fakes and fixtures

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use webauthn_ceremony::challenge;
use webauthn_ceremony::directory::{
    CredentialFilter, CredentialRecord, DirectoryError, UserDirectory, UserFilter, UserRecord,
};
use webauthn_ceremony::engine::{
    AssertionExpectations, AssertionOptions, AttestationExpectations, AttestationOptions,
    AttestedCredential, AuditTrail, AuthenticatorSummary, ClientData, EngineError,
    VerificationEngine, VerifiedAssertion, VerifiedAttestation,
};
use webauthn_ceremony::session::{RegenerateError, SessionTransport};
use webauthn_ceremony::wire::{
    AssertionResponse, AttestationResponse, CredentialAssertion, CredentialAttestation,
    PubKeyCredParam,
};
use webauthn_ceremony::{CeremonyConfig, CeremonyContext};

/// In-memory user/credential directory. Duplicate usernames can be seeded
/// deliberately to simulate a broken uniqueness invariant; committing a
/// credential id that already exists is refused as a constraint violation.
#[derive(Default)]
pub struct MemoryDirectory {
    users: Mutex<Vec<UserRecord>>,
    credentials: Mutex<HashMap<String, Vec<CredentialRecord>>>,
    pub fail_commits: AtomicBool,
    pub find_calls: AtomicUsize,
    pub commit_calls: AtomicUsize,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_user(&self, username: &str, user_handle: &str) {
        self.users.lock().unwrap().push(UserRecord {
            username: username.to_string(),
            user_handle: user_handle.to_string(),
        });
    }

    pub fn seed_credential(&self, username: &str, credential: CredentialRecord) {
        self.credentials
            .lock()
            .unwrap()
            .entry(username.to_string())
            .or_default()
            .push(credential);
    }

    pub fn user_count(&self) -> usize {
        self.users.lock().unwrap().len()
    }

    pub fn credential_count(&self, username: &str) -> usize {
        self.credentials
            .lock()
            .unwrap()
            .get(username)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn stored_counter(&self, username: &str, credential_id: &str) -> Option<u32> {
        self.credentials
            .lock()
            .unwrap()
            .get(username)?
            .iter()
            .find(|credential| credential.credential_id == credential_id)
            .map(|credential| credential.signature_counter)
    }

    pub fn find_call_count(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }

    pub fn commit_call_count(&self) -> usize {
        self.commit_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UserDirectory for MemoryDirectory {
    async fn find_users(&self, filter: &UserFilter) -> Result<Vec<UserRecord>, DirectoryError> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        let users = self.users.lock().unwrap();
        Ok(users
            .iter()
            .filter(|user| match &filter.username {
                Some(username) => &user.username == username,
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn find_credentials(
        &self,
        username: &str,
        filter: &CredentialFilter,
    ) -> Result<Vec<CredentialRecord>, DirectoryError> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        let credentials = self.credentials.lock().unwrap();
        Ok(credentials
            .get(username)
            .map(|list| {
                list.iter()
                    .filter(|credential| match &filter.credential_id {
                        Some(id) => &credential.credential_id == id,
                        None => true,
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn commit_registration(
        &self,
        user: &UserRecord,
        credential: &CredentialRecord,
    ) -> Result<(), DirectoryError> {
        self.commit_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(DirectoryError::Commit("memory directory torn down".into()));
        }
        // Credential ids are unique across all users
        let duplicate = self
            .credentials
            .lock()
            .unwrap()
            .values()
            .flatten()
            .any(|existing| existing.credential_id == credential.credential_id);
        if duplicate {
            return Err(DirectoryError::Constraint(format!(
                "credential id already registered: {}",
                credential.credential_id
            )));
        }
        let mut users = self.users.lock().unwrap();
        if !users.iter().any(|existing| existing.username == user.username) {
            users.push(user.clone());
        }
        self.credentials
            .lock()
            .unwrap()
            .entry(user.username.clone())
            .or_default()
            .push(credential.clone());
        Ok(())
    }

    async fn commit_counter(
        &self,
        username: &str,
        credential_id: &str,
        counter: u32,
    ) -> Result<(), DirectoryError> {
        self.commit_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(DirectoryError::Commit("memory directory torn down".into()));
        }
        let mut credentials = self.credentials.lock().unwrap();
        let credential = credentials
            .get_mut(username)
            .and_then(|list| {
                list.iter_mut()
                    .find(|credential| credential.credential_id == credential_id)
            })
            .ok_or_else(|| DirectoryError::Query(format!("no credential {credential_id}")))?;
        credential.signature_counter = counter;
        Ok(())
    }

    async fn destroy_credential(
        &self,
        username: &str,
        credential_id: &str,
    ) -> Result<(), DirectoryError> {
        let mut credentials = self.credentials.lock().unwrap();
        if let Some(list) = credentials.get_mut(username) {
            list.retain(|credential| credential.credential_id != credential_id);
        }
        Ok(())
    }
}

/// Scriptable verification engine. Verdicts are derived from the response
/// and expectation set so tests can assert what the ceremony forwarded.
pub struct MockEngine {
    pub reject_attestations: AtomicBool,
    pub reject_assertions: AtomicBool,
    pub next_counter: AtomicU32,
    pub attestation_calls: AtomicUsize,
    pub assertion_calls: AtomicUsize,
    pub last_attestation_expectations: Mutex<Option<AttestationExpectations>>,
    pub last_assertion_expectations: Mutex<Option<AssertionExpectations>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            reject_attestations: AtomicBool::new(false),
            reject_assertions: AtomicBool::new(false),
            next_counter: AtomicU32::new(1),
            attestation_calls: AtomicUsize::new(0),
            assertion_calls: AtomicUsize::new(0),
            last_attestation_expectations: Mutex::new(None),
            last_assertion_expectations: Mutex::new(None),
        }
    }

    pub fn attestation_call_count(&self) -> usize {
        self.attestation_calls.load(Ordering::SeqCst)
    }

    pub fn assertion_call_count(&self) -> usize {
        self.assertion_calls.load(Ordering::SeqCst)
    }

    fn client_data(challenge_bytes: &[u8], origin: &str, kind: &str, raw_id: &str) -> ClientData {
        ClientData {
            challenge: challenge::encode(challenge_bytes),
            origin: origin.to_string(),
            kind: kind.to_string(),
            token_binding: None,
            raw_json: "eyJjaGFsbGVuZ2UiOiIuLi4ifQ".to_string(),
            raw_id: raw_id.to_string(),
        }
    }
}

#[async_trait]
impl VerificationEngine for MockEngine {
    async fn attestation_options(&self) -> Result<AttestationOptions, EngineError> {
        Ok(AttestationOptions {
            // Engine-proposed challenge; the ceremony must not use it
            challenge: vec![7u8; 32],
            pub_key_cred_params: vec![
                PubKeyCredParam::public_key(-7),
                PubKeyCredParam::public_key(-257),
            ],
        })
    }

    async fn attestation_result(
        &self,
        response: &CredentialAttestation,
        expectations: &AttestationExpectations,
    ) -> Result<VerifiedAttestation, EngineError> {
        self.attestation_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_attestation_expectations.lock().unwrap() = Some(expectations.clone());
        if self.reject_attestations.load(Ordering::SeqCst) {
            return Err(EngineError::Rejected("signature validation failed".into()));
        }
        let credential_id = challenge::decode(&response.raw_id)
            .map_err(|_| EngineError::Rejected("unparsable credential id".into()))?;
        Ok(VerifiedAttestation {
            client_data: Self::client_data(
                &expectations.challenge,
                &expectations.origin,
                "webauthn.create",
                &response.raw_id,
            ),
            authenticator: AuthenticatorSummary {
                rp_id_hash: "SZYN5YgOjGh0NBcPZHZgW4_krrmihjLHmVzzuoMdl2M".to_string(),
                flags: vec!["UP".to_string(), "AT".to_string()],
                counter: self.next_counter.load(Ordering::SeqCst),
                raw: "rawAuthnrData".to_string(),
            },
            credential: AttestedCredential {
                fmt: "none".to_string(),
                aaguid: vec![0xAAu8; 16],
                credential_id,
                public_key_pem: TEST_PUBLIC_KEY_PEM.to_string(),
            },
            audit: AuditTrail {
                valid_expectations: true,
                valid_request: true,
                complete: true,
                warning: vec![],
                info: vec!["attestation format: none".to_string()],
            },
        })
    }

    async fn assertion_options(&self) -> Result<AssertionOptions, EngineError> {
        Ok(AssertionOptions {
            challenge: vec![7u8; 32],
        })
    }

    async fn assertion_result(
        &self,
        response: &CredentialAssertion,
        expectations: &AssertionExpectations,
    ) -> Result<VerifiedAssertion, EngineError> {
        self.assertion_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_assertion_expectations.lock().unwrap() = Some(expectations.clone());
        if self.reject_assertions.load(Ordering::SeqCst) {
            return Err(EngineError::Rejected("signature validation failed".into()));
        }
        Ok(VerifiedAssertion {
            client_data: Self::client_data(
                &expectations.challenge,
                &expectations.origin,
                "webauthn.get",
                &response.raw_id,
            ),
            authenticator: AuthenticatorSummary {
                rp_id_hash: "SZYN5YgOjGh0NBcPZHZgW4_krrmihjLHmVzzuoMdl2M".to_string(),
                flags: vec!["UP".to_string()],
                counter: self.next_counter.load(Ordering::SeqCst),
                raw: "rawAuthnrData".to_string(),
            },
            audit: AuditTrail {
                valid_expectations: true,
                valid_request: true,
                complete: true,
                warning: vec![],
                info: vec![],
            },
        })
    }
}

/// In-memory session transport with observable rotation.
pub struct MemorySession {
    pub id: String,
    values: HashMap<String, Value>,
    pub regenerated: bool,
    pub fail_regenerate: bool,
}

impl MemorySession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            values: HashMap::new(),
            regenerated: false,
            fail_regenerate: false,
        }
    }

    pub fn field_count(&self) -> usize {
        self.values.len()
    }
}

impl SessionTransport for MemorySession {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn insert(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    fn remove(&mut self, key: &str) {
        self.values.remove(key);
    }

    fn regenerate(&mut self) -> Result<(), RegenerateError> {
        if self.fail_regenerate {
            return Err(RegenerateError("session store unavailable".to_string()));
        }
        self.id = Uuid::new_v4().to_string();
        self.values.clear();
        self.regenerated = true;
        Ok(())
    }
}

pub const TEST_PUBLIC_KEY_PEM: &str = "-----BEGIN PUBLIC KEY-----\n\
MFkwEwYHKoZIzj0CAQYIKoZIzj0DAQcDQgAERez9aO2wBAWO54MuGbEqSdWahSnG\n\
MAg35BCNkaE3j8Q+O/ZhhKqTeIKm7El70EG6ejt4sg1ZaoQ5ELg8k3ywTg==\n\
-----END PUBLIC KEY-----\n";

/// Config pointing at the origin the mock engine echoes back.
pub fn test_config() -> CeremonyConfig {
    CeremonyConfig::builder()
        .origin("https://localhost:8443")
        .build()
}

/// Context over fresh fakes, handing back the fakes for inspection.
pub fn test_context(config: CeremonyConfig) -> (CeremonyContext, Arc<MemoryDirectory>, Arc<MockEngine>) {
    let directory = Arc::new(MemoryDirectory::new());
    let engine = Arc::new(MockEngine::new());
    let ctx = CeremonyContext::new(config, directory.clone(), engine.clone());
    (ctx, directory, engine)
}

/// A registration response naming `credential_id_bytes` as its credential.
pub fn sample_attestation(credential_id_bytes: &[u8]) -> CredentialAttestation {
    CredentialAttestation {
        id: None,
        raw_id: challenge::encode(credential_id_bytes),
        response: AttestationResponse {
            client_data_json: "eyJjaGFsbGVuZ2UiOiIuLi4ifQ".to_string(),
            attestation_object: "o2NmbXRkbm9uZQ".to_string(),
        },
    }
}

/// A login response asserting with `credential_id_bytes`.
pub fn sample_assertion(credential_id_bytes: &[u8]) -> CredentialAssertion {
    CredentialAssertion {
        id: None,
        raw_id: challenge::encode(credential_id_bytes),
        response: AssertionResponse {
            client_data_json: "eyJjaGFsbGVuZ2UiOiIuLi4ifQ".to_string(),
            authenticator_data: "rawAuthnrData".to_string(),
            signature: "c2lnbmF0dXJl".to_string(),
            user_handle: None,
        },
    }
}

/// Initialize test logging once; repeat calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Assert that a result is an error matching a pattern
#[macro_export]
macro_rules! assert_error_matches {
    ($result:expr, $pattern:pat) => {
        match $result {
            Err($pattern) => (),
            Err(e) => panic!("Expected error matching {}, got {:?}", stringify!($pattern), e),
            Ok(_) => panic!("Expected error, got Ok"),
        }
    };
}
