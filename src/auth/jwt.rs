//! GitHub App JSON Web Tokens.
//!
//! A GitHub App authenticates as itself with a short-lived RS256 JWT whose
//! issuer is the app ID. These tokens are only used to list installations
//! and to exchange for installation access tokens.
//!
//! Tokens are minted fresh for every use. Each token is valid for exactly
//! 60 seconds from the moment it is signed, so nothing is cached.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use super::AuthError;
use crate::types::AppId;

/// Lifetime of an app token, in seconds.
pub const TOKEN_LIFETIME_SECS: i64 = 60;

/// The GitHub App identity: its ID and RSA private key.
///
/// Built once at startup and shared by every token generator.
#[derive(Clone)]
pub struct AppCredential {
    app_id: AppId,
    key: EncodingKey,
}

impl AppCredential {
    /// Parses a PEM-encoded RSA private key (PKCS#1 or PKCS#8).
    ///
    /// Fails with [`AuthError::InvalidKey`] if the key material is not a valid
    /// RSA key. There is no point retrying this; the key must be fixed.
    pub fn from_pem(app_id: AppId, pem: &[u8]) -> Result<Self, AuthError> {
        let key = EncodingKey::from_rsa_pem(pem).map_err(AuthError::InvalidKey)?;
        Ok(Self { app_id, key })
    }

    /// Returns the app ID.
    pub fn app_id(&self) -> AppId {
        self.app_id
    }
}

impl fmt::Debug for AppCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppCredential")
            .field("app_id", &self.app_id)
            .finish_non_exhaustive()
    }
}

/// Claims carried by an app token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppClaims {
    /// Issued-at, seconds since the Unix epoch.
    pub iat: i64,
    /// Expiry, seconds since the Unix epoch.
    pub exp: i64,
    /// Issuer: the app ID.
    pub iss: AppId,
}

/// A signed app token and the window it is valid for.
#[derive(Clone, PartialEq, Eq)]
pub struct SignedToken {
    token: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    issuer: AppId,
}

impl SignedToken {
    /// The compact JWS string, suitable for an `Authorization: Bearer` header.
    pub fn as_str(&self) -> &str {
        &self.token
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn issuer(&self) -> AppId {
        self.issuer
    }

    /// Length of the validity window. Always 60 seconds.
    pub fn validity(&self) -> TimeDelta {
        self.expires_at - self.issued_at
    }
}

impl fmt::Debug for SignedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedToken")
            .field("issuer", &self.issuer)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Mints app tokens from a captured [`AppCredential`].
#[derive(Debug, Clone)]
pub struct TokenGenerator {
    credential: Arc<AppCredential>,
}

impl TokenGenerator {
    pub fn new(credential: AppCredential) -> Self {
        Self {
            credential: Arc::new(credential),
        }
    }

    /// Returns the app ID tokens are issued for.
    pub fn app_id(&self) -> AppId {
        self.credential.app_id
    }

    /// Signs a new token valid for 60 seconds from now.
    pub fn generate(&self) -> Result<SignedToken, AuthError> {
        self.generate_at(Utc::now())
    }

    /// Signs a new token valid for 60 seconds from `now`.
    ///
    /// Sub-second precision is dropped because JWT timestamps are whole seconds.
    pub fn generate_at(&self, now: DateTime<Utc>) -> Result<SignedToken, AuthError> {
        let iat = now.timestamp();
        let claims = AppClaims {
            iat,
            exp: iat + TOKEN_LIFETIME_SECS,
            iss: self.credential.app_id,
        };

        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::RS256),
            &claims,
            &self.credential.key,
        )
        .map_err(AuthError::Signing)?;

        let issued_at = DateTime::from_timestamp(claims.iat, 0).unwrap_or(now);
        let expires_at = issued_at + TimeDelta::seconds(TOKEN_LIFETIME_SECS);

        Ok(SignedToken {
            token,
            issued_at,
            expires_at,
            issuer: claims.iss,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TEST_PRIVATE_KEY, TEST_PUBLIC_KEY, test_credential};
    use jsonwebtoken::{DecodingKey, Validation};
    use proptest::prelude::*;

    fn decode(token: &SignedToken) -> AppClaims {
        let key = DecodingKey::from_rsa_pem(TEST_PUBLIC_KEY.as_bytes()).unwrap();
        let mut validation = Validation::new(Algorithm::RS256);
        // Tokens minted at fixed past instants are expired by now.
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        jsonwebtoken::decode::<AppClaims>(token.as_str(), &key, &validation)
            .unwrap()
            .claims
    }

    #[test]
    fn token_verifies_with_public_key() {
        let generator = TokenGenerator::new(test_credential(42));
        let token = generator.generate().unwrap();

        let claims = decode(&token);
        assert_eq!(claims.iss, AppId(42));
        assert_eq!(claims.exp - claims.iat, TOKEN_LIFETIME_SECS);
        assert_eq!(token.issuer(), AppId(42));
    }

    #[test]
    fn header_is_rs256() {
        let generator = TokenGenerator::new(test_credential(1));
        let token = generator.generate().unwrap();
        let header = jsonwebtoken::decode_header(token.as_str()).unwrap();
        assert_eq!(header.alg, Algorithm::RS256);
    }

    #[test]
    fn tokens_at_different_instants_differ() {
        let generator = TokenGenerator::new(test_credential(7));
        let t0 = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let t1 = t0 + TimeDelta::seconds(1);

        let a = generator.generate_at(t0).unwrap();
        let b = generator.generate_at(t1).unwrap();

        assert_ne!(a.as_str(), b.as_str());
        assert_eq!(a.validity(), TimeDelta::seconds(60));
        assert_eq!(b.validity(), TimeDelta::seconds(60));
    }

    #[test]
    fn invalid_key_is_rejected() {
        let result = AppCredential::from_pem(AppId(1), b"not a key");
        assert!(matches!(result, Err(AuthError::InvalidKey(_))));
    }

    #[test]
    fn debug_does_not_leak_token() {
        let generator = TokenGenerator::new(test_credential(3));
        let token = generator.generate().unwrap();
        let rendered = format!("{:?}", token);
        assert!(!rendered.contains(token.as_str()));
        assert!(!format!("{:?}", generator).contains("PRIVATE KEY"));
        assert!(TEST_PRIVATE_KEY.contains("PRIVATE KEY"));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn validity_window_is_always_sixty_seconds(secs in 0i64..4_000_000_000) {
            let generator = TokenGenerator::new(test_credential(99));
            let now = DateTime::from_timestamp(secs, 0).unwrap();
            let token = generator.generate_at(now).unwrap();

            prop_assert_eq!(token.validity(), TimeDelta::seconds(60));
            prop_assert_eq!(token.issued_at(), now);
            let claims = decode(&token);
            prop_assert_eq!(claims.iat, secs);
            prop_assert_eq!(claims.exp, secs + 60);
        }
    }
}
