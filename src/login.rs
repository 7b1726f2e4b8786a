//! Login ceremony
//!
//! Two-step authentication against an already-registered credential:
//! `begin` issues a challenge scoped to the user's credentials, `complete`
//! verifies the signed response, advances the stored signature counter and
//! rotates the session identifier.

use tracing::{debug, info, warn};

use crate::challenge;
use crate::directory::{CredentialFilter, CredentialRecord, UserFilter, UserRecord};
use crate::engine::{AssertionExpectations, Factor};
use crate::error::CeremonyError;
use crate::session::{self, CeremonyKind, SessionTransport};
use crate::wire::{
    AllowCredential, CredentialAssertion, DebugInfo, GetOptions, OptionsRequest, ServerResponse,
    Status,
};
use crate::CeremonyContext;

pub struct LoginCeremony {
    ctx: CeremonyContext,
}

impl LoginCeremony {
    pub fn new(ctx: CeremonyContext) -> Self {
        Self { ctx }
    }

    /// Issue a login challenge for a known user and bind it to the caller's
    /// session. The options list every credential the user may assert with.
    pub async fn begin(
        &self,
        request: &OptionsRequest,
        session: &mut dyn SessionTransport,
    ) -> Result<GetOptions, CeremonyError> {
        match self.run_begin(request, session).await {
            Ok(options) => Ok(options),
            Err(err) => {
                warn!(username = %request.username, error = %err, "login options rejected");
                Err(err)
            }
        }
    }

    async fn run_begin(
        &self,
        request: &OptionsRequest,
        session: &mut dyn SessionTransport,
    ) -> Result<GetOptions, CeremonyError> {
        debug!(username = %request.username, "login options requested");

        if request.username.is_empty() {
            return Err(CeremonyError::InvalidRequest(
                "username must not be empty".to_string(),
            ));
        }

        let user = self.resolve_user(&request.username).await?;

        // A user with nothing to assert with fails here, before any
        // challenge is generated or session state written.
        let credentials = self
            .ctx
            .directory
            .find_credentials(&user.username, &CredentialFilter::any())
            .await?;
        if credentials.is_empty() {
            return Err(CeremonyError::NoCredentials);
        }

        // The engine's template challenge is superseded by the local
        // generator, same as in registration.
        let _template = self.ctx.engine.assertion_options().await?;

        let issued = challenge::encode(&challenge::new_challenge(self.ctx.config.challenge_size));
        session::store_pending(
            session,
            CeremonyKind::Login,
            &user.username,
            &user.user_handle,
            &issued,
            session::now_ms(),
        );

        Ok(GetOptions {
            status: Status::Ok,
            error_message: String::new(),
            challenge: issued,
            timeout: self.ctx.config.timeout_ms(),
            allow_credentials: credentials
                .iter()
                .map(|credential| AllowCredential::public_key(&credential.credential_id))
                .collect(),
        })
    }

    /// Verify a login response against the pending session state, advance
    /// the credential's signature counter and rotate the session.
    ///
    /// `username` is the principal the caller claims to be completing for;
    /// it must match the one the challenge was issued to.
    pub async fn complete(
        &self,
        username: &str,
        response: &CredentialAssertion,
        session: &mut dyn SessionTransport,
    ) -> Result<ServerResponse, CeremonyError> {
        match self.run_complete(username, response, session).await {
            Ok(response) => Ok(response),
            Err(err) => {
                warn!(username = %username, error = %err, "login response rejected");
                Err(err)
            }
        }
    }

    async fn run_complete(
        &self,
        username: &str,
        response: &CredentialAssertion,
        session: &mut dyn SessionTransport,
    ) -> Result<ServerResponse, CeremonyError> {
        debug!(username = %username, "login response received");

        // Session guards run before any collaborator is consulted.
        let pending = session::require_fields(session, CeremonyKind::Login)?;
        if !session::principal_unchanged(&pending.username, username) {
            return Err(CeremonyError::PrincipalMismatch);
        }
        if session::is_expired(pending.issued_at_ms, session::now_ms(), self.ctx.config.timeout) {
            return Err(CeremonyError::Timeout(CeremonyKind::Login));
        }
        let issued_challenge = challenge::decode(&pending.challenge)?;

        let user = self.resolve_user(&pending.username).await?;
        let credential = self.resolve_credential(&user.username, &response.raw_id).await?;

        let expectations = AssertionExpectations {
            challenge: issued_challenge,
            origin: self.ctx.config.origin.clone(),
            factor: Factor::Either,
            public_key: credential.public_key.clone(),
            prev_counter: credential.signature_counter,
            user_handle: challenge::decode(&pending.user_handle)?,
        };
        let verified = self
            .ctx
            .engine
            .assertion_result(response, &expectations)
            .await
            .map_err(CeremonyError::VerificationFailed)?;

        // The engine has already checked the counter advanced past the
        // stored value; what it reports replaces that value outright.
        self.ctx
            .directory
            .commit_counter(
                &user.username,
                &credential.credential_id,
                verified.authenticator.counter,
            )
            .await
            .map_err(CeremonyError::CommitFailed)?;

        // Rotation drops every session field, the consumed challenge with
        // them. Failure is fatal to the request even though the counter
        // commit above already stands; a fixated session id must not
        // survive authentication.
        if let Err(err) = session.regenerate() {
            warn!(
                username = %user.username,
                credential_id = %credential.credential_id,
                "session rotation failed after counter commit, failing the login"
            );
            return Err(CeremonyError::SessionRotation(err));
        }

        info!(
            username = %user.username,
            credential_id = %credential.credential_id,
            counter = verified.authenticator.counter,
            flags = ?verified.authenticator.flags,
            audit_complete = verified.audit.complete,
            origin = %verified.client_data.origin,
            "login success"
        );

        let mut response = ServerResponse::success();
        if self.ctx.config.dangerous_xmit_debug_info {
            response = response.with_debug_info(DebugInfo::for_assertion(&verified));
        }
        Ok(response)
    }

    /// Exactly-one user semantics: zero is unknown, more than one means the
    /// directory's uniqueness invariant is broken.
    async fn resolve_user(&self, username: &str) -> Result<UserRecord, CeremonyError> {
        let mut users = self
            .ctx
            .directory
            .find_users(&UserFilter::by_username(username))
            .await?;
        match users.len() {
            0 => Err(CeremonyError::UserNotFound(username.to_string())),
            1 => Ok(users.remove(0)),
            _ => Err(CeremonyError::AmbiguousUser(username.to_string())),
        }
    }

    /// The credential named in the response, which must already belong to
    /// the user completing the ceremony.
    async fn resolve_credential(
        &self,
        username: &str,
        credential_id: &str,
    ) -> Result<CredentialRecord, CeremonyError> {
        let mut credentials = self
            .ctx
            .directory
            .find_credentials(username, &CredentialFilter::by_credential_id(credential_id))
            .await?;
        match credentials.len() {
            1 => Ok(credentials.remove(0)),
            _ => Err(CeremonyError::CredentialNotFound(credential_id.to_string())),
        }
    }
}
