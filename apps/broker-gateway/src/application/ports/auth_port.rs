//! Authentication Port
//!
//! The entry point every broker plugin must provide. The interactive part
//! of broker login (OAuth redirect, TOTP entry) happens outside this crate;
//! an authenticator validates what the caller collected and binds it into
//! a [`BrokerSession`] that adapters are created from.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::plugin::BrokerId;

/// Credential fields a broker may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialField {
    /// Application key.
    ApiKey,
    /// Application secret.
    ApiSecret,
    /// Broker client / user code.
    ClientId,
    /// Request token, TOTP, or pre-issued access token.
    AuthToken,
}

impl CredentialField {
    /// Field name for errors.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ApiKey => "api_key",
            Self::ApiSecret => "api_secret",
            Self::ClientId => "client_id",
            Self::AuthToken => "auth_token",
        }
    }
}

/// Broker credentials supplied by the caller.
#[derive(Clone, Default)]
pub struct Credentials {
    api_key: String,
    api_secret: String,
    client_id: Option<String>,
    auth_token: Option<String>,
}

impl Credentials {
    /// Create credentials from an API key pair.
    #[must_use]
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            client_id: None,
            auth_token: None,
        }
    }

    /// Attach the broker client code.
    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Attach the request token / TOTP / access token.
    #[must_use]
    pub fn with_auth_token(mut self, auth_token: impl Into<String>) -> Self {
        self.auth_token = Some(auth_token.into());
        self
    }

    /// Get the API key.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Get the API secret.
    #[must_use]
    pub fn api_secret(&self) -> &str {
        &self.api_secret
    }

    /// Get the client code.
    #[must_use]
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    /// Get the auth token.
    #[must_use]
    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    /// Value of a field, `None` when absent or blank.
    #[must_use]
    pub fn field(&self, field: CredentialField) -> Option<&str> {
        let value = match field {
            CredentialField::ApiKey => Some(self.api_key.as_str()),
            CredentialField::ApiSecret => Some(self.api_secret.as_str()),
            CredentialField::ClientId => self.client_id(),
            CredentialField::AuthToken => self.auth_token(),
        };
        value.filter(|v| !v.trim().is_empty())
    }

    /// Fail on the first required field that is absent or blank.
    pub fn require(&self, fields: &[CredentialField]) -> Result<(), AuthError> {
        match fields.iter().find(|field| self.field(**field).is_none()) {
            Some(field) => Err(AuthError::MissingField(field.as_str())),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"[REDACTED]")
            .field("api_secret", &"[REDACTED]")
            .field("client_id", &self.client_id)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// An authenticated broker session.
#[derive(Clone)]
pub struct BrokerSession {
    /// Broker the session belongs to.
    pub broker: BrokerId,
    /// Local session identifier.
    pub session_id: Uuid,
    /// Broker client code, when the broker has one.
    pub client_id: Option<String>,
    /// Token presented on every broker call.
    pub access_token: String,
    /// When the session was established.
    pub issued_at: DateTime<Utc>,
}

impl BrokerSession {
    /// Create a session issued now.
    #[must_use]
    pub fn new(broker: BrokerId, access_token: impl Into<String>, client_id: Option<String>) -> Self {
        Self {
            broker,
            session_id: Uuid::new_v4(),
            client_id,
            access_token: access_token.into(),
            issued_at: Utc::now(),
        }
    }
}

impl std::fmt::Debug for BrokerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerSession")
            .field("broker", &self.broker)
            .field("session_id", &self.session_id)
            .field("client_id", &self.client_id)
            .field("access_token", &"[REDACTED]")
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// Authentication failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// A required credential field was not supplied.
    #[error("Missing credential: {0}")]
    MissingField(&'static str),

    /// The broker rejected the credentials.
    #[error("Authentication rejected by {broker}: {reason}")]
    Rejected {
        /// Broker identifier.
        broker: String,
        /// Broker-provided reason.
        reason: String,
    },

    /// The authentication request could not be completed.
    #[error("Authentication unavailable: {0}")]
    Unavailable(String),
}

/// Broker login entry point.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Exchange credentials for a session.
    async fn authenticate(&self, credentials: &Credentials) -> Result<BrokerSession, AuthError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_debug_redacts_secrets() {
        let creds = Credentials::new("key123", "secret456")
            .with_client_id("AB1234")
            .with_auth_token("totp-999");
        let debug = format!("{creds:?}");

        assert!(!debug.contains("key123"));
        assert!(!debug.contains("secret456"));
        assert!(!debug.contains("totp-999"));
        assert!(debug.contains("AB1234"));
    }

    #[test]
    fn require_reports_first_missing_field() {
        let creds = Credentials::new("key", "").with_client_id("AB1234");

        assert!(creds.require(&[CredentialField::ApiKey, CredentialField::ClientId]).is_ok());
        assert_eq!(
            creds.require(&[CredentialField::ApiSecret, CredentialField::AuthToken]),
            Err(AuthError::MissingField("api_secret"))
        );
    }

    #[test]
    fn blank_optional_fields_count_as_missing() {
        let creds = Credentials::new("key", "secret").with_auth_token("   ");
        assert_eq!(creds.field(CredentialField::AuthToken), None);
    }

    #[test]
    fn session_debug_redacts_token() {
        let session = BrokerSession::new(
            BrokerId::parse("kotak").unwrap(),
            "eyJhbGciOi",
            Some("AB1234".to_string()),
        );
        let debug = format!("{session:?}");
        assert!(!debug.contains("eyJhbGciOi"));
        assert!(debug.contains("kotak"));
    }
}
