//! Shared plugin helpers: the token authenticator most Indian brokers use
//! after an out-of-band login, and field conversions for native payloads.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::application::ports::{
    AuthError, Authenticator, BrokerSession, CredentialField, Credentials, ParseError,
};
use crate::domain::plugin::BrokerId;

// =============================================================================
// Authentication
// =============================================================================

/// Authenticates with a session token issued by the broker's login flow.
///
/// The token is validated for presence only; the broker rejects stale
/// tokens on the first streaming or REST call.
#[derive(Debug, Clone)]
pub struct TokenAuthenticator {
    broker: BrokerId,
    required: &'static [CredentialField],
}

impl TokenAuthenticator {
    /// Create an authenticator requiring `required` in addition to the token.
    #[must_use]
    pub const fn new(broker: BrokerId, required: &'static [CredentialField]) -> Self {
        Self { broker, required }
    }
}

#[async_trait]
impl Authenticator for TokenAuthenticator {
    async fn authenticate(&self, credentials: &Credentials) -> Result<BrokerSession, AuthError> {
        credentials.require(self.required)?;
        let token = credentials
            .field(CredentialField::AuthToken)
            .ok_or(AuthError::MissingField(CredentialField::AuthToken.as_str()))?;

        Ok(BrokerSession::new(
            self.broker.clone(),
            token,
            credentials.client_id().map(ToString::to_string),
        ))
    }
}

// =============================================================================
// Field Conversion
// =============================================================================

/// Require a field.
pub fn required<T>(value: Option<T>, field: &'static str) -> Result<T, ParseError> {
    value.ok_or(ParseError::MissingField(field))
}

/// Non-negative whole quantity.
pub fn quantity(value: Decimal, field: &'static str) -> Result<u64, ParseError> {
    value
        .trunc()
        .to_u64()
        .ok_or_else(|| ParseError::InvalidField {
            field,
            reason: format!("{value} is not a quantity"),
        })
}

/// Quantity the broker may omit. Absent stays `None`, never zero.
pub fn optional_quantity(
    value: Option<Decimal>,
    field: &'static str,
) -> Result<Option<u64>, ParseError> {
    value.map(|value| quantity(value, field)).transpose()
}

/// Text code the broker may omit or send blank.
#[must_use]
pub fn optional_code(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|code| !code.is_empty())
}

/// Positive price, `None` when absent or zero (brokers send 0 for "no bid").
#[must_use]
pub fn optional_price(value: Option<Decimal>) -> Option<Decimal> {
    value.filter(|price| !price.is_zero())
}

/// Epoch seconds to a timestamp, or receive time when absent.
pub fn epoch_seconds(value: Option<i64>, field: &'static str) -> Result<DateTime<Utc>, ParseError> {
    match value {
        None | Some(0) => Ok(Utc::now()),
        Some(secs) => DateTime::from_timestamp(secs, 0).ok_or_else(|| ParseError::InvalidField {
            field,
            reason: format!("{secs} is out of range"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn broker() -> BrokerId {
        BrokerId::parse("kotak").unwrap()
    }

    #[tokio::test]
    async fn token_authenticator_issues_session() {
        let auth = TokenAuthenticator::new(broker(), &[CredentialField::ClientId]);
        let credentials = Credentials::new("key", "secret")
            .with_client_id("AB123")
            .with_auth_token("jwt");

        let session = auth.authenticate(&credentials).await.unwrap();
        assert_eq!(session.access_token, "jwt");
        assert_eq!(session.client_id.as_deref(), Some("AB123"));
        assert_eq!(session.broker, broker());
    }

    #[tokio::test]
    async fn token_authenticator_reports_missing_fields() {
        let auth = TokenAuthenticator::new(broker(), &[CredentialField::ClientId]);

        let err = auth
            .authenticate(&Credentials::new("key", "secret").with_auth_token("jwt"))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::MissingField("client_id"));

        let err = auth
            .authenticate(&Credentials::new("key", "secret").with_client_id("AB123"))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::MissingField("auth_token"));
    }

    #[test]
    fn quantity_rejects_negative() {
        assert_eq!(quantity(Decimal::from(25), "qty").unwrap(), 25);
        assert!(matches!(
            quantity(Decimal::from(-1), "qty"),
            Err(ParseError::InvalidField { field: "qty", .. })
        ));
    }

    #[test]
    fn absent_quantity_is_not_zero() {
        assert_eq!(optional_quantity(None, "v").unwrap(), None);
        assert_eq!(optional_quantity(Some(Decimal::ZERO), "v").unwrap(), Some(0));
        assert!(optional_quantity(Some(Decimal::from(-3)), "v").is_err());
    }

    #[test]
    fn blank_code_is_absent() {
        assert_eq!(optional_code(Some("  ")), None);
        assert_eq!(optional_code(None), None);
        assert_eq!(optional_code(Some(" NRML ")), Some("NRML"));
    }

    #[test]
    fn zero_price_is_absent() {
        assert_eq!(optional_price(Some(Decimal::ZERO)), None);
        assert_eq!(
            optional_price(Some(Decimal::from_str("10.5").unwrap())),
            Some(Decimal::from_str("10.5").unwrap())
        );
    }

    #[test]
    fn epoch_seconds_converts() {
        let ts = epoch_seconds(Some(1_700_000_000), "ft").unwrap();
        assert_eq!(ts.timestamp(), 1_700_000_000);
        assert!(epoch_seconds(Some(i64::MAX), "ft").is_err());
    }
}
