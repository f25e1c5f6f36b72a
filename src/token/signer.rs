use super::{now_unix_seconds, Scope, SignError, SigningKey, TokenClaims, TOKEN_VERSION};
use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use regex::Regex;
use sha2::Sha256;
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Seven days.
pub const DEFAULT_MAX_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;

/// A freshly minted token and the claims it carries.
///
/// The caller persists an `onboarding_tokens` row from `claims` before handing
/// `token` to the mailer.
#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub claims: TokenClaims,
}

#[derive(Debug, Clone)]
pub struct TokenSigner {
    key: Arc<SigningKey>,
    max_ttl_seconds: i64,
}

impl TokenSigner {
    #[must_use]
    pub fn new(key: Arc<SigningKey>) -> Self {
        Self {
            key,
            max_ttl_seconds: DEFAULT_MAX_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_max_ttl_seconds(mut self, seconds: i64) -> Self {
        self.max_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn max_ttl_seconds(&self) -> i64 {
        self.max_ttl_seconds
    }

    /// Mint a token valid for `ttl_seconds` from now.
    ///
    /// # Errors
    /// Returns an error if the subject is not a valid identifier or the ttl is
    /// outside `1..=max_ttl_seconds`.
    pub fn sign(
        &self,
        subject_id: &str,
        scope: Scope,
        ttl_seconds: i64,
    ) -> Result<SignedToken, SignError> {
        self.sign_at(subject_id, scope, ttl_seconds, now_unix_seconds())
    }

    /// Same as [`TokenSigner::sign`] with an explicit issue time.
    ///
    /// # Errors
    /// See [`TokenSigner::sign`].
    pub fn sign_at(
        &self,
        subject_id: &str,
        scope: Scope,
        ttl_seconds: i64,
        now_unix_seconds: i64,
    ) -> Result<SignedToken, SignError> {
        let subject_id = subject_id.trim();
        if !valid_subject_id(subject_id) {
            return Err(SignError::InvalidSubject);
        }
        if ttl_seconds <= 0 || ttl_seconds > self.max_ttl_seconds {
            return Err(SignError::InvalidTtl {
                ttl_seconds,
                max_seconds: self.max_ttl_seconds,
            });
        }

        let claims = TokenClaims {
            v: TOKEN_VERSION,
            jti: Uuid::new_v4(),
            sub: subject_id.to_string(),
            scope,
            iat: now_unix_seconds,
            exp: now_unix_seconds.saturating_add(ttl_seconds),
        };

        let token = encode(&self.key, &claims)?;

        Ok(SignedToken { token, claims })
    }
}

/// Serialize and sign claims into the `claims.digest` wire form.
pub(super) fn encode(key: &SigningKey, claims: &TokenClaims) -> Result<String, SignError> {
    let json = serde_json::to_vec(claims)?;
    let claims_b64 = Base64UrlUnpadded::encode_string(&json);
    let digest = digest(key, &claims_b64).ok_or(SignError::Key)?;
    let digest_b64 = Base64UrlUnpadded::encode_string(&digest);

    Ok(format!("{claims_b64}.{digest_b64}"))
}

/// HMAC-SHA256 over the encoded claims segment.
pub(super) fn digest(key: &SigningKey, claims_segment: &str) -> Option<[u8; 32]> {
    let mut mac = HmacSha256::new_from_slice(key.expose()).ok()?;
    mac.update(claims_segment.as_bytes());
    let mut output = [0u8; 32];
    output.copy_from_slice(&mac.finalize().into_bytes());
    Some(output)
}

pub(crate) fn valid_subject_id(subject_id: &str) -> bool {
    static SUBJECT_RE: OnceLock<Option<Regex>> = OnceLock::new();
    SUBJECT_RE
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.:@-]{0,127}$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(subject_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn signer() -> Result<TokenSigner> {
        let key = SigningKey::new(vec![7u8; 32])?;
        Ok(TokenSigner::new(Arc::new(key)))
    }

    #[test]
    fn sign_produces_two_segments() -> Result<()> {
        let signed = signer()?.sign("practice-42", Scope::Onboarding, 3600)?;
        let parts: Vec<&str> = signed.token.split('.').collect();
        assert_eq!(parts.len(), 2);
        assert!(parts.iter().all(|p| !p.is_empty()));
        // 32-byte digest, unpadded base64url
        assert_eq!(parts[1].len(), 43);
        Ok(())
    }

    #[test]
    fn sign_sets_claims() -> Result<()> {
        let signed = signer()?.sign_at(" practice-42 ", Scope::SettingsUpdate, 60, 1_000)?;
        assert_eq!(signed.claims.sub, "practice-42");
        assert_eq!(signed.claims.scope, Scope::SettingsUpdate);
        assert_eq!(signed.claims.iat, 1_000);
        assert_eq!(signed.claims.exp, 1_060);
        assert_eq!(signed.claims.v, TOKEN_VERSION);
        Ok(())
    }

    #[test]
    fn token_ids_are_unique() -> Result<()> {
        let signer = signer()?;
        let a = signer.sign("p1", Scope::Onboarding, 60)?;
        let b = signer.sign("p1", Scope::Onboarding, 60)?;
        assert_ne!(a.claims.jti, b.claims.jti);
        assert_ne!(a.token, b.token);
        Ok(())
    }

    #[test]
    fn same_claims_same_digest() -> Result<()> {
        let key = SigningKey::new(vec![9u8; 48])?;
        let claims = TokenClaims {
            v: TOKEN_VERSION,
            jti: Uuid::nil(),
            sub: "p1".to_string(),
            scope: Scope::Onboarding,
            iat: 10,
            exp: 20,
        };
        assert_eq!(encode(&key, &claims)?, encode(&key, &claims)?);

        let other_key = SigningKey::new(vec![8u8; 48])?;
        assert_ne!(encode(&key, &claims)?, encode(&other_key, &claims)?);
        Ok(())
    }

    #[test]
    fn ttl_bounds_enforced() -> Result<()> {
        let signer = signer()?.with_max_ttl_seconds(3600);
        assert!(matches!(
            signer.sign("p1", Scope::Onboarding, 0),
            Err(SignError::InvalidTtl { ttl_seconds: 0, .. })
        ));
        assert!(matches!(
            signer.sign("p1", Scope::Onboarding, -5),
            Err(SignError::InvalidTtl { .. })
        ));
        assert!(matches!(
            signer.sign("p1", Scope::Onboarding, 3601),
            Err(SignError::InvalidTtl {
                max_seconds: 3600,
                ..
            })
        ));
        assert!(signer.sign("p1", Scope::Onboarding, 3600).is_ok());
        Ok(())
    }

    #[test]
    fn subject_validation() -> Result<()> {
        let signer = signer()?;
        for bad in ["", "   ", "-leading-dash", "has space", "semi;colon"] {
            assert!(
                matches!(
                    signer.sign(bad, Scope::Onboarding, 60),
                    Err(SignError::InvalidSubject)
                ),
                "{bad:?} should be rejected"
            );
        }
        assert!(signer
            .sign(&"a".repeat(129), Scope::Onboarding, 60)
            .is_err());
        for good in ["p1", "practice_42", "org:clinic.west", "owner@clinic-1"] {
            assert!(valid_subject_id(good), "{good:?} should be accepted");
        }
        Ok(())
    }
}
