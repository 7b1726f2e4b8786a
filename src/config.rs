//! Configuration for the ceremony layer

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CeremonyConfig {
    /// Relying-party display name shown in authenticator prompts
    pub service_name: String,

    /// Relying-party identifier, usually the effective domain. Omitted from
    /// the wire when unset so the client falls back to its own origin.
    pub rp_id: Option<String>,

    /// Origin the verification engine must find inside signed client data
    pub origin: String,

    /// Window between challenge issuance and the matching response
    pub timeout: Duration,

    /// Challenge length in bytes
    pub challenge_size: usize,

    /// User handle length in bytes for principals seen for the first time
    pub user_handle_size: usize,

    /// Create unknown users at registration instead of rejecting them.
    /// Anyone who can reach the endpoint can mint an account; leave this off
    /// unless the deployment really is open enrollment.
    pub dangerous_open_registration: bool,

    /// Attach decoded client data, authenticator data and the audit trail to
    /// result responses. Debugging aid only; exposes material callers have
    /// no business seeing.
    pub dangerous_xmit_debug_info: bool,
}

impl Default for CeremonyConfig {
    fn default() -> Self {
        Self {
            service_name: "ANONYMOUS SERVICE".to_string(),
            rp_id: None,
            origin: "https://localhost".to_string(),
            timeout: Duration::from_secs(60),
            challenge_size: 64,
            user_handle_size: 16,
            dangerous_open_registration: false,
            dangerous_xmit_debug_info: false,
        }
    }
}

impl CeremonyConfig {
    pub fn builder() -> CeremonyConfigBuilder {
        CeremonyConfigBuilder {
            config: CeremonyConfig::default(),
        }
    }

    /// Timeout in milliseconds, the unit wire messages carry. Saturates
    /// instead of truncating a duration too large for the field.
    pub fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

pub struct CeremonyConfigBuilder {
    config: CeremonyConfig,
}

impl CeremonyConfigBuilder {
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.config.service_name = name.into();
        self
    }

    pub fn rp_id(mut self, rp_id: impl Into<String>) -> Self {
        self.config.rp_id = Some(rp_id.into());
        self
    }

    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.config.origin = origin.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn challenge_size(mut self, size_bytes: usize) -> Self {
        self.config.challenge_size = size_bytes;
        self
    }

    pub fn user_handle_size(mut self, size_bytes: usize) -> Self {
        self.config.user_handle_size = size_bytes;
        self
    }

    pub fn dangerous_open_registration(mut self, enabled: bool) -> Self {
        self.config.dangerous_open_registration = enabled;
        self
    }

    pub fn dangerous_xmit_debug_info(mut self, enabled: bool) -> Self {
        self.config.dangerous_xmit_debug_info = enabled;
        self
    }

    pub fn build(self) -> CeremonyConfig {
        self.config
    }
}

impl CeremonyConfig {
    /// Load configuration from environment and files
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let mut config = config::Config::builder();

        // Start with default
        config = config.add_source(config::Config::try_from(&CeremonyConfig::default())?);

        // Layer on .env file
        if let Ok(_) = dotenvy::dotenv() {
            config = config.add_source(config::Environment::with_prefix("CEREMONY"));
        }

        // Layer on config file if exists
        if std::path::Path::new("ceremony.toml").exists() {
            config = config.add_source(config::File::with_name("ceremony"));
        }

        config.build()?.try_deserialize()
    }
}
