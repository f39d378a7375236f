//! User identity and short-lived authentication tokens.

use std::{
    fmt,
    time::{SystemTime, UNIX_EPOCH},
};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque user key bound to a session, typically an email address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

/// Returned when constructing an [`Identity`] from a blank string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("identity must not be empty")]
pub struct EmptyIdentity;

impl Identity {
    /// Create an identity from a user key.
    ///
    /// # Errors
    /// Returns `EmptyIdentity` if the key is blank.
    pub fn new(key: impl Into<String>) -> Result<Self, EmptyIdentity> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(EmptyIdentity);
        }
        Ok(Self(key))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Identity {
    type Error = EmptyIdentity;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Token error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("Token issuance failed: {0}")]
    Issuance(String),
    #[error("Token issued for {actual}, expected {expected}")]
    IdentityMismatch { expected: Identity, actual: String },
    #[error("Token expired at {expired_at}")]
    Expired { expired_at: u64 },
}

/// Claims carried by a JWT-shaped token value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub iat: Option<u64>,
    #[serde(default)]
    pub exp: Option<u64>,
}

/// Short-lived authentication token for one initialization attempt.
///
/// Not `Clone`: the token is moved into exactly one session open.
pub struct Token {
    value: String,
    issued_for: Identity,
}

impl Token {
    #[must_use]
    pub fn new(value: impl Into<String>, issued_for: Identity) -> Self {
        Self {
            value: value.into(),
            issued_for,
        }
    }

    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    #[must_use]
    pub const fn issued_for(&self) -> &Identity {
        &self.issued_for
    }

    /// Consume the token, yielding its raw value.
    #[must_use]
    pub fn into_value(self) -> String {
        self.value
    }

    /// Decode the claims segment when the value is a JWT.
    ///
    /// Returns `None` for opaque tokens or undecodable payloads.
    #[must_use]
    pub fn claims(&self) -> Option<TokenClaims> {
        let mut parts = self.value.split('.');
        let (_header, payload, _signature) = (parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() {
            return None;
        }
        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Check that this token may open a session for `identity` at `now`
    /// (Unix epoch seconds).
    ///
    /// # Errors
    /// Returns `IdentityMismatch` if the token was issued for someone else
    /// (either by its declared identity or its `email` claim, compared
    /// case-insensitively), or `Expired`
    /// if its `exp` claim is not in the future.
    pub fn validate_for(&self, identity: &Identity, now: u64) -> Result<(), TokenError> {
        if &self.issued_for != identity {
            return Err(TokenError::IdentityMismatch {
                expected: identity.clone(),
                actual: self.issued_for.to_string(),
            });
        }

        let Some(claims) = self.claims() else {
            return Ok(());
        };

        if let Some(email) = claims.email {
            // Email addresses are matched without regard to ASCII case.
            if !email.eq_ignore_ascii_case(identity.as_str()) {
                return Err(TokenError::IdentityMismatch {
                    expected: identity.clone(),
                    actual: email,
                });
            }
        }

        match claims.exp {
            Some(exp) if exp <= now => Err(TokenError::Expired { expired_at: exp }),
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("value", &"<redacted>")
            .field("issued_for", &self.issued_for)
            .finish()
    }
}

/// Current Unix epoch seconds.
#[must_use]
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwt(claims: &serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("{header}.{payload}.signature")
    }

    fn alice() -> Identity {
        Identity::new("alice@example.com").unwrap()
    }

    #[test]
    fn test_blank_identity_rejected() {
        assert_eq!(Identity::new("  "), Err(EmptyIdentity));
        assert!(serde_json::from_str::<Identity>("\"\"").is_err());
    }

    #[test]
    fn test_claims_decoded_from_jwt() {
        let token = Token::new(
            jwt(&serde_json::json!({"email": "alice@example.com", "iat": 10, "exp": 20})),
            alice(),
        );
        let claims = token.claims().unwrap();
        assert_eq!(claims.email.as_deref(), Some("alice@example.com"));
        assert_eq!(claims.exp, Some(20));
    }

    #[test]
    fn test_opaque_token_has_no_claims() {
        let token = Token::new("opaque-value", alice());
        assert!(token.claims().is_none());
        assert!(token.validate_for(&alice(), 100).is_ok());
    }

    #[test]
    fn test_expired_token_rejected() {
        let token = Token::new(jwt(&serde_json::json!({"exp": 50})), alice());
        assert_eq!(
            token.validate_for(&alice(), 50),
            Err(TokenError::Expired { expired_at: 50 })
        );
        assert!(token.validate_for(&alice(), 49).is_ok());
    }

    #[test]
    fn test_token_for_other_identity_rejected() {
        let bob = Identity::new("bob@example.com").unwrap();
        let token = Token::new("opaque", bob);
        assert!(matches!(
            token.validate_for(&alice(), 0),
            Err(TokenError::IdentityMismatch { .. })
        ));

        let token = Token::new(jwt(&serde_json::json!({"email": "bob@example.com"})), alice());
        assert!(matches!(
            token.validate_for(&alice(), 0),
            Err(TokenError::IdentityMismatch { actual, .. }) if actual == "bob@example.com"
        ));
    }

    #[test]
    fn test_email_claim_ignores_case() {
        let token = Token::new(
            jwt(&serde_json::json!({"email": "Alice@Example.com"})),
            alice(),
        );
        assert!(token.validate_for(&alice(), 0).is_ok());
    }

    #[test]
    fn test_debug_redacts_value() {
        let token = Token::new("secret-value", alice());
        let rendered = format!("{token:?}");
        assert!(!rendered.contains("secret-value"));
        assert!(rendered.contains("alice@example.com"));
    }
}
