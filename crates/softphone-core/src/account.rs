//! Account and registration types
//!
//! An account is a configured SIP identity plus its registration lifecycle.
//! The adapter never decides registration outcomes itself: `login()` asks the
//! engine to register, and every state change afterwards arrives as a
//! registration notification.
//!
//! # Registration lifecycle
//!
//! Typical flow driven by the engine:
//! `None` → `Progress` → `Ok` → (`Progress` on refresh) → `Cleared`/`Failed`
//!
//! ```rust
//! use softphone_core::account::{AccountConfig, TransportType};
//!
//! let config = AccountConfig::new("sip:alice@example.org")
//!     .with_credentials("alice", "secret")
//!     .with_transport(TransportType::Tls);
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.domain().as_deref(), Some("example.org"));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AdapterError, AdapterResult};

entity_id! {
    /// Opaque engine handle for an account
    AccountId
}

/// Transport preference for SIP signalling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    #[default]
    Udp,
    Tcp,
    Tls,
}

impl std::fmt::Display for TransportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportType::Udp => write!(f, "UDP"),
            TransportType::Tcp => write!(f, "TCP"),
            TransportType::Tls => write!(f, "TLS"),
        }
    }
}

/// Check that `uri` is a `sip:`/`sips:` URI with a user and a host
pub fn validate_sip_uri(uri: &str) -> AdapterResult<()> {
    let url = Url::parse(uri).map_err(|e| AdapterError::invalid_identity(uri, e.to_string()))?;

    if url.scheme() != "sip" && url.scheme() != "sips" {
        return Err(AdapterError::invalid_identity(
            uri,
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }

    // sip URIs are opaque to `url`, so user@host lives in the path
    match url.path().split_once('@') {
        Some((user, host)) if !user.is_empty() && !host.is_empty() => Ok(()),
        _ => Err(AdapterError::invalid_identity(uri, "expected user@host")),
    }
}

/// Login parameters for a SIP account
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Public identity, e.g. `sip:alice@example.org`
    pub identity: String,
    /// Authentication username (defaults to the identity user part)
    pub username: Option<String>,
    /// Authentication password
    pub password: Option<String>,
    /// Registrar domain (defaults to the identity host)
    pub domain: Option<String>,
    /// Transport used to reach the registrar
    #[serde(default)]
    pub transport: TransportType,
}

// Password stays out of logs.
impl std::fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConfig")
            .field("identity", &self.identity)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("domain", &self.domain)
            .field("transport", &self.transport)
            .finish()
    }
}

impl AccountConfig {
    /// Create a configuration for an identity with UDP transport and no credentials
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            username: None,
            password: None,
            domain: None,
            transport: TransportType::Udp,
        }
    }

    /// Set authentication credentials
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set the registrar domain
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Set the transport
    pub fn with_transport(mut self, transport: TransportType) -> Self {
        self.transport = transport;
        self
    }

    /// Check that the identity is a `sip:`/`sips:` URI with a user and a host
    pub fn validate(&self) -> AdapterResult<()> {
        validate_sip_uri(&self.identity)
    }

    /// User part of the identity
    pub fn user(&self) -> Option<String> {
        self.identity_parts().map(|(user, _)| user)
    }

    /// Registrar domain, falling back to the identity host
    pub fn domain(&self) -> Option<String> {
        self.domain
            .clone()
            .or_else(|| self.identity_parts().map(|(_, host)| host))
    }

    fn identity_parts(&self) -> Option<(String, String)> {
        let url = Url::parse(&self.identity).ok()?;
        let (user, host) = url.path().split_once('@')?;
        let host = host.split(';').next().unwrap_or(host);
        Some((user.to_string(), host.to_string()))
    }

    /// Drop the stored secret, keeping the identity
    pub fn clear_credentials(&mut self) {
        self.password = None;
    }
}

/// Registration state reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegistrationState {
    None,
    Progress,
    Ok,
    Cleared,
    Failed,
    /// A state this crate does not know about
    #[serde(other)]
    Unknown,
}

impl RegistrationState {
    /// Decode the engine's numeric state code
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => RegistrationState::None,
            1 => RegistrationState::Progress,
            2 => RegistrationState::Ok,
            3 => RegistrationState::Cleared,
            4 => RegistrationState::Failed,
            _ => RegistrationState::Unknown,
        }
    }

    /// Terminal states reset the account to an unauthenticated baseline
    pub fn is_terminal(&self) -> bool {
        matches!(self, RegistrationState::Failed | RegistrationState::Cleared)
    }
}

impl std::fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            RegistrationState::None => "Not registered",
            RegistrationState::Progress => "Registering",
            RegistrationState::Ok => "Registered",
            RegistrationState::Cleared => "Logged out",
            RegistrationState::Failed => "Registration failed",
            RegistrationState::Unknown => "Unknown",
        };
        f.write_str(text)
    }
}

/// Locally tracked account
#[derive(Debug, Clone)]
pub struct AccountInfo {
    /// Engine handle returned by the register request
    pub account_id: AccountId,
    pub config: AccountConfig,
    pub state: RegistrationState,
    /// Last engine-provided message
    pub last_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub registered_at: Option<DateTime<Utc>>,
    /// Logout requested, waiting for `Cleared`
    pub logout_pending: bool,
    /// Cleared after a logout; the engine handle is dead
    pub logged_out: bool,
}

impl AccountInfo {
    pub fn new(account_id: AccountId, config: AccountConfig) -> Self {
        Self {
            account_id,
            config,
            state: RegistrationState::None,
            last_message: None,
            created_at: Utc::now(),
            registered_at: None,
            logout_pending: false,
            logged_out: false,
        }
    }
}
