//! Signed onboarding tokens.
//!
//! A token is `base64url(claims).base64url(hmac_sha256(secret, claims_segment))`.
//! Claims are JSON with a fixed field order so the same claims always produce the
//! same digest for a given secret. Signing and verification are pure: no I/O and
//! no shared mutable state besides the read-only key.

mod error;
pub mod secret;
mod signer;
mod verifier;

pub use error::{SignError, TokenError};
pub use secret::{FileSecret, SecretProvider, SigningKey, StaticSecret};
pub use signer::{SignedToken, TokenSigner, DEFAULT_MAX_TTL_SECONDS};
pub use verifier::TokenVerifier;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use utoipa::ToSchema;
use uuid::Uuid;

pub const TOKEN_VERSION: u8 = 1;

/// Action a token authorizes. A token minted for one scope is rejected for any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Onboarding,
    SettingsUpdate,
}

impl Scope {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Onboarding => "onboarding",
            Self::SettingsUpdate => "settings_update",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = SignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "onboarding" => Ok(Self::Onboarding),
            "settings_update" => Ok(Self::SettingsUpdate),
            other => Err(SignError::InvalidScope(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    pub v: u8,
    /// Token id, matches `onboarding_tokens.id`.
    pub jti: Uuid,
    /// Subject (practice) the token was issued for.
    pub sub: String,
    pub scope: Scope,
    pub iat: i64,
    pub exp: i64,
}

impl TokenClaims {
    #[must_use]
    pub fn token_id(&self) -> Uuid {
        self.jti
    }

    #[must_use]
    pub fn subject_id(&self) -> &str {
        &self.sub
    }
}

/// Current wall-clock time as unix seconds.
#[must_use]
pub fn now_unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_wire_names() {
        assert_eq!(Scope::Onboarding.as_str(), "onboarding");
        assert_eq!(Scope::SettingsUpdate.to_string(), "settings_update");
        assert_eq!("onboarding".parse::<Scope>().ok(), Some(Scope::Onboarding));
        assert_eq!(
            " settings_update ".parse::<Scope>().ok(),
            Some(Scope::SettingsUpdate)
        );
        assert!(matches!(
            "billing".parse::<Scope>(),
            Err(SignError::InvalidScope(name)) if name == "billing"
        ));
    }

    #[test]
    fn scope_serializes_snake_case() -> anyhow::Result<()> {
        let value = serde_json::to_value(Scope::SettingsUpdate)?;
        assert_eq!(value, serde_json::json!("settings_update"));
        Ok(())
    }

    #[test]
    fn now_is_after_2020() {
        assert!(now_unix_seconds() > 1_577_836_800);
    }
}
