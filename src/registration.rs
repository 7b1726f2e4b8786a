//! Registration ceremony
//!
//! Two-step enrollment of a new credential: `begin` issues a challenge and
//! binds it to the caller's session, `complete` verifies the authenticator's
//! response against that pending state and commits the credential. Between
//! the two steps nothing exists but the session fields; an abandoned
//! ceremony leaves no trace in the directory.

use tracing::{debug, info, warn};

use crate::challenge;
use crate::directory::{CredentialRecord, UserFilter, UserRecord};
use crate::engine::{AttestationExpectations, Factor};
use crate::error::CeremonyError;
use crate::session::{self, CeremonyKind, PendingCeremony, SessionTransport};
use crate::wire::{
    CreationOptions, CredentialAttestation, DebugInfo, OptionsRequest, RpEntity, ServerResponse,
    Status, UserEntity,
};
use crate::CeremonyContext;

pub struct RegistrationCeremony {
    ctx: CeremonyContext,
}

impl RegistrationCeremony {
    pub fn new(ctx: CeremonyContext) -> Self {
        Self { ctx }
    }

    /// Issue a registration challenge and bind it to the caller's session.
    ///
    /// Read-only against the directory: no user or credential row exists
    /// until a response passes verification in [`complete`].
    ///
    /// [`complete`]: RegistrationCeremony::complete
    pub async fn begin(
        &self,
        request: &OptionsRequest,
        session: &mut dyn SessionTransport,
    ) -> Result<CreationOptions, CeremonyError> {
        match self.run_begin(request, session).await {
            Ok(options) => Ok(options),
            Err(err) => {
                warn!(username = %request.username, error = %err, "registration options rejected");
                Err(err)
            }
        }
    }

    async fn run_begin(
        &self,
        request: &OptionsRequest,
        session: &mut dyn SessionTransport,
    ) -> Result<CreationOptions, CeremonyError> {
        debug!(username = %request.username, "registration options requested");

        if request.username.is_empty() {
            return Err(CeremonyError::InvalidRequest(
                "username must not be empty".to_string(),
            ));
        }

        // A known principal keeps its stored handle so re-registration adds
        // a credential instead of forking the account. Unknown principals
        // get a fresh random handle that only becomes durable on commit.
        let mut users = self
            .ctx
            .directory
            .find_users(&UserFilter::by_username(&request.username))
            .await?;
        let user_handle = match users.len() {
            0 => challenge::encode(&challenge::new_user_handle(self.ctx.config.user_handle_size)),
            1 => users.remove(0).user_handle,
            _ => return Err(CeremonyError::AmbiguousUser(request.username.clone())),
        };

        let template = self.ctx.engine.attestation_options().await?;

        // The engine proposes a challenge in its template; the local
        // generator is authoritative and supersedes it.
        let issued = challenge::encode(&challenge::new_challenge(self.ctx.config.challenge_size));
        session::store_pending(
            session,
            CeremonyKind::Registration,
            &request.username,
            &user_handle,
            &issued,
            session::now_ms(),
        );

        let display_name = request
            .display_name
            .clone()
            .unwrap_or_else(|| request.username.clone());

        Ok(CreationOptions {
            status: Status::Ok,
            error_message: String::new(),
            challenge: issued,
            timeout: self.ctx.config.timeout_ms(),
            user: UserEntity {
                name: request.username.clone(),
                id: user_handle,
                display_name,
            },
            rp: RpEntity {
                name: self.ctx.config.service_name.clone(),
                id: self.ctx.config.rp_id.clone(),
            },
            pub_key_cred_params: template.pub_key_cred_params,
        })
    }

    /// Verify a registration response against the pending session state and
    /// commit the new credential.
    ///
    /// `username` is the principal the caller claims to be completing for;
    /// it must match the one the challenge was issued to.
    pub async fn complete(
        &self,
        username: &str,
        response: &CredentialAttestation,
        session: &mut dyn SessionTransport,
    ) -> Result<ServerResponse, CeremonyError> {
        match self.run_complete(username, response, session).await {
            Ok(response) => Ok(response),
            Err(err) => {
                warn!(username = %username, error = %err, "registration response rejected");
                Err(err)
            }
        }
    }

    async fn run_complete(
        &self,
        username: &str,
        response: &CredentialAttestation,
        session: &mut dyn SessionTransport,
    ) -> Result<ServerResponse, CeremonyError> {
        debug!(username = %username, "registration response received");

        // Session guards run before any collaborator is consulted. A
        // request that fails here costs no directory or engine work.
        let pending = session::require_fields(session, CeremonyKind::Registration)?;
        if !session::principal_unchanged(&pending.username, username) {
            return Err(CeremonyError::PrincipalMismatch);
        }
        if session::is_expired(pending.issued_at_ms, session::now_ms(), self.ctx.config.timeout) {
            return Err(CeremonyError::Timeout(CeremonyKind::Registration));
        }

        let expectations = AttestationExpectations {
            challenge: challenge::decode(&pending.challenge)?,
            origin: self.ctx.config.origin.clone(),
            factor: Factor::Either,
        };
        let verified = self
            .ctx
            .engine
            .attestation_result(response, &expectations)
            .await
            .map_err(CeremonyError::VerificationFailed)?;

        let user = self.resolve_user(&pending).await?;
        let credential = CredentialRecord {
            credential_id: challenge::encode(&verified.credential.credential_id),
            public_key: verified.credential.public_key_pem.clone(),
            aaguid: challenge::encode(&verified.credential.aaguid),
            signature_counter: verified.authenticator.counter,
        };
        self.ctx
            .directory
            .commit_registration(&user, &credential)
            .await
            .map_err(CeremonyError::CommitFailed)?;

        // The challenge is spent whether or not the caller ever hears the
        // answer; a second response against it starts from SessionMissing.
        session::clear_pending(session, CeremonyKind::Registration);

        info!(
            username = %user.username,
            credential_id = %credential.credential_id,
            aaguid = %credential.aaguid,
            counter = credential.signature_counter,
            flags = ?verified.authenticator.flags,
            audit_complete = verified.audit.complete,
            origin = %verified.client_data.origin,
            "register success"
        );

        let mut response = ServerResponse::success();
        if self.ctx.config.dangerous_xmit_debug_info {
            response = response.with_debug_info(DebugInfo::for_attestation(&verified));
        }
        Ok(response)
    }

    /// Resolve the principal the verified credential attaches to. An unknown
    /// username is admitted only under open registration, using the handle
    /// minted at `begin`.
    async fn resolve_user(&self, pending: &PendingCeremony) -> Result<UserRecord, CeremonyError> {
        let mut users = self
            .ctx
            .directory
            .find_users(&UserFilter::by_username(&pending.username))
            .await?;
        match users.len() {
            0 if self.ctx.config.dangerous_open_registration => Ok(UserRecord {
                username: pending.username.clone(),
                user_handle: pending.user_handle.clone(),
            }),
            0 => Err(CeremonyError::UserNotFound(pending.username.clone())),
            1 => Ok(users.remove(0)),
            _ => Err(CeremonyError::AmbiguousUser(pending.username.clone())),
        }
    }
}
