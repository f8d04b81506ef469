//! Signed bearer tokens binding an email to a validity window

use chrono::{Duration, Utc};

use crate::error::MarketError;
use crate::utils::TimeStamp;

/// Tokens expire one hour after issuance.
pub const TOKEN_VALIDITY_SECS: i64 = 60 * 60;

/// The identity assertion carried inside a token. Never persisted;
/// decoded fresh on every verification.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Claims {
    #[n(0)]
    pub email: String,
    #[n(1)]
    pub issued_at: TimeStamp<Utc>,
    #[n(2)]
    pub expires_at: TimeStamp<Utc>,
}

/// Issues and verifies bearer tokens keyed by a shared secret.
///
/// Verification is stateless: there is no revocation list, expiry is the
/// only invalidation mechanism, and any holder can act as the identified
/// user for the token's lifetime.
pub struct TokenService {
    secret: Vec<u8>,
    validity: Duration,
}

impl TokenService {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self::with_validity(secret, Duration::seconds(TOKEN_VALIDITY_SECS))
    }

    /// Custom validity window; [`TokenService::new`] with its fixed 1-hour
    /// window is the production setting.
    pub fn with_validity(secret: impl Into<Vec<u8>>, validity: Duration) -> Self {
        Self {
            secret: secret.into(),
            validity,
        }
    }

    /// Mint a signed token binding `email` for the validity window.
    pub fn issue(&self, email: &str) -> Result<String, MarketError> {
        let issued_at = Utc::now();
        let claims = Claims {
            email: email.to_owned(),
            issued_at: issued_at.into(),
            expires_at: (issued_at + self.validity).into(),
        };

        let payload =
            minicbor::to_vec(&claims).map_err(|e| MarketError::Signing(anyhow::anyhow!(e)))?;
        let signature = self.sign(&payload);

        Ok(format!("{}.{}", hex::encode(&payload), signature))
    }

    /// Check the signature, then expiry; yields the decoded identity for
    /// downstream guards on success.
    pub fn verify(&self, token: &str) -> Result<Claims, MarketError> {
        if token.is_empty() {
            return Err(MarketError::Unauthenticated("missing bearer token"));
        }

        let (payload_hex, signature) = token
            .split_once('.')
            .ok_or(MarketError::Unauthenticated("malformed bearer token"))?;
        let payload = hex::decode(payload_hex)
            .map_err(|_| MarketError::Unauthenticated("malformed bearer token"))?;

        if self.sign(&payload) != signature {
            return Err(MarketError::Unauthenticated("token signature mismatch"));
        }

        let claims: Claims = minicbor::decode(&payload)
            .map_err(|_| MarketError::Unauthenticated("malformed bearer token"))?;

        if claims.expires_at <= Utc::now().into() {
            return Err(MarketError::Unauthenticated("token expired"));
        }

        Ok(claims)
    }

    // keyed digest over secret || payload, hex output like every other hash here
    fn sign(&self, payload: &[u8]) -> String {
        let mut keyed = self.secret.clone();
        keyed.extend_from_slice(payload);
        sha256::digest(keyed.as_slice())
    }
}
