//! webauthn-ceremony - WebAuthn ceremony orchestration
//!
//! Runs the two WebAuthn ceremonies, registration and login, as stateful
//! challenge/response protocols in front of an external verification
//! engine. This crate owns challenge generation, session binding, expiry,
//! principal checks and result commits; key storage and cryptographic
//! verification stay behind the [`UserDirectory`] and
//! [`VerificationEngine`] seams the embedding application implements.

pub mod challenge;
pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
pub mod login;
pub mod registration;
pub mod session;
pub mod wire;

pub use config::CeremonyConfig;
pub use directory::{CredentialRecord, UserDirectory, UserRecord};
pub use engine::VerificationEngine;
pub use error::CeremonyError;
pub use login::LoginCeremony;
pub use registration::RegistrationCeremony;
pub use session::SessionTransport;
pub use wire::{OptionsRequest, ServerResponse};

use std::sync::Arc;

/// Shared handles every ceremony operates on
#[derive(Clone)]
pub struct CeremonyContext {
    pub config: Arc<CeremonyConfig>,
    pub directory: Arc<dyn UserDirectory>,
    pub engine: Arc<dyn VerificationEngine>,
}

impl CeremonyContext {
    pub fn new(
        config: CeremonyConfig,
        directory: Arc<dyn UserDirectory>,
        engine: Arc<dyn VerificationEngine>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            directory,
            engine,
        }
    }

    /// Both ceremonies over the same context.
    pub fn ceremonies(&self) -> (RegistrationCeremony, LoginCeremony) {
        (
            RegistrationCeremony::new(self.clone()),
            LoginCeremony::new(self.clone()),
        )
    }
}
