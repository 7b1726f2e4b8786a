//! Ceremony error taxonomy
//!
//! Every failure a ceremony can produce is one variant here. Variants carry
//! enough context for the server log; [`CeremonyError::wire_message`] decides
//! what of that the caller is allowed to see.

use thiserror::Error;

use crate::directory::DirectoryError;
use crate::engine::EngineError;
use crate::session::{CeremonyKind, RegenerateError};

#[derive(Error, Debug)]
pub enum CeremonyError {
    /// A wire or session value that is not canonical base64url without padding.
    #[error("malformed base64 value: {0}")]
    MalformedEncoding(#[from] base64::DecodeError),

    /// A required session field is absent or has the wrong type. The session
    /// transport is broken or was never established for this caller.
    #[error("could not find session field '{0}'; are cookies disabled?")]
    SessionMissing(&'static str),

    /// The response arrived after the challenge window closed.
    #[error("{0} request timed out")]
    Timeout(CeremonyKind),

    /// The username in the response is not the one the challenge was issued to.
    #[error("username does not match the principal that requested the challenge")]
    PrincipalMismatch,

    #[error("user not found: {0}")]
    UserNotFound(String),

    /// More than one directory row matched a unique username.
    #[error("multiple users found with the username: {0}")]
    AmbiguousUser(String),

    /// Login was requested for a user with nothing registered to assert with.
    #[error("no credentials available")]
    NoCredentials,

    #[error("error finding credential ID: {0}")]
    CredentialNotFound(String),

    /// The verification engine examined the response and refused it.
    #[error("verification failed: {0}")]
    VerificationFailed(#[source] EngineError),

    /// A verified result could not be made durable.
    #[error("directory commit failed: {0}")]
    CommitFailed(#[source] DirectoryError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Directory lookup failure outside the commit path.
    #[error("directory error: {0}")]
    Directory(#[from] DirectoryError),

    /// The engine itself failed before reaching a verdict.
    #[error("verification engine error: {0}")]
    Engine(#[from] EngineError),

    /// Post-login session rotation failed. Fatal to the request even though
    /// verification succeeded.
    #[error("session regeneration failed: {0}")]
    SessionRotation(#[from] RegenerateError),
}

impl CeremonyError {
    /// HTTP status the wire layer should pair with this error. Failures the
    /// caller can influence map to 400, collaborator failures to 500.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::CommitFailed(_)
            | Self::Directory(_)
            | Self::Engine(_)
            | Self::SessionRotation(_) => 500,
            _ => 400,
        }
    }

    /// Caller-safe text for the wire `errorMessage` field. Collaborator
    /// errors keep their detail in the log and go out as a fixed phrase.
    pub fn wire_message(&self) -> String {
        match self {
            Self::VerificationFailed(_) => "verification failed".to_string(),
            Self::CommitFailed(_) | Self::Directory(_) => "directory operation failed".to_string(),
            Self::Engine(_) => "verification engine unavailable".to_string(),
            Self::SessionRotation(_) => "session regeneration failed".to_string(),
            other => other.to_string(),
        }
    }
}
