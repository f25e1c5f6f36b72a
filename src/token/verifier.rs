use super::signer::digest;
use super::{now_unix_seconds, Scope, SigningKey, TokenClaims, TokenError, TOKEN_VERSION};
use base64ct::{Base64UrlUnpadded, Encoding};
use std::sync::Arc;
use subtle::ConstantTimeEq;

#[derive(Debug, Clone)]
pub struct TokenVerifier {
    key: Arc<SigningKey>,
}

impl TokenVerifier {
    #[must_use]
    pub fn new(key: Arc<SigningKey>) -> Self {
        Self { key }
    }

    /// Verify a token against the current time.
    ///
    /// # Errors
    /// Returns the first failing check, in order: structure, signature,
    /// claims encoding, expiry, scope.
    pub fn verify(&self, token: &str, expected_scope: Scope) -> Result<TokenClaims, TokenError> {
        self.verify_at(token, expected_scope, now_unix_seconds())
    }

    /// Same as [`TokenVerifier::verify`] with an explicit clock.
    ///
    /// # Errors
    /// See [`TokenVerifier::verify`].
    pub fn verify_at(
        &self,
        token: &str,
        expected_scope: Scope,
        now_unix_seconds: i64,
    ) -> Result<TokenClaims, TokenError> {
        let mut parts = token.trim().split('.');
        let claims_b64 = parts.next().ok_or(TokenError::MalformedToken)?;
        let digest_b64 = parts.next().ok_or(TokenError::MalformedToken)?;
        if parts.next().is_some() || claims_b64.is_empty() || digest_b64.is_empty() {
            return Err(TokenError::MalformedToken);
        }

        let claims_bytes =
            Base64UrlUnpadded::decode_vec(claims_b64).map_err(|_| TokenError::MalformedToken)?;

        // A digest that does not even decode cannot match.
        let supplied =
            Base64UrlUnpadded::decode_vec(digest_b64).map_err(|_| TokenError::InvalidSignature)?;
        let expected = digest(&self.key, claims_b64).ok_or(TokenError::InvalidSignature)?;
        if !ct_eq_bytes(&expected, &supplied) {
            return Err(TokenError::InvalidSignature);
        }

        let claims: TokenClaims =
            serde_json::from_slice(&claims_bytes).map_err(|_| TokenError::MalformedToken)?;
        if claims.v != TOKEN_VERSION || claims.exp <= claims.iat {
            return Err(TokenError::MalformedToken);
        }

        if claims.exp <= now_unix_seconds {
            return Err(TokenError::ExpiredToken);
        }

        if claims.scope != expected_scope {
            return Err(TokenError::ScopeMismatch);
        }

        Ok(claims)
    }
}

/// Length check first, then constant-time comparison of equal-length buffers.
fn ct_eq_bytes(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    bool::from(a.ct_eq(b))
}
