//! Persisted token state and exactly-once redemption.
//!
//! Verification proves a token was minted by us; the store proves it has not
//! been used yet. Consumption is a single check-then-set inside one
//! transaction, so concurrent requests for the same token serialize on the
//! record and exactly one of them wins.

mod issuer;
mod memory;
mod postgres;

pub use issuer::{scope_path, IssueError, IssuedLink, Issuer};
pub use memory::MemoryTokenStore;
pub use postgres::PgTokenStore;

use crate::token::{Scope, TokenClaims};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RedemptionError {
    #[error("token not found")]
    NotFound,
    #[error("token already consumed")]
    AlreadyConsumed,
    #[error("token expired")]
    Expired,
    #[error("token id already exists")]
    DuplicateId,
    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

/// Row in `onboarding_tokens`. Timestamps are unix seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnboardingTokenRecord {
    pub id: Uuid,
    pub subject_id: String,
    pub scope: Scope,
    pub created_at: i64,
    pub expires_at: i64,
    pub consumed_at: Option<i64>,
}

impl OnboardingTokenRecord {
    /// Record matching freshly signed claims.
    #[must_use]
    pub fn from_claims(claims: &TokenClaims) -> Self {
        Self {
            id: claims.jti,
            subject_id: claims.sub.clone(),
            scope: claims.scope,
            created_at: claims.iat,
            expires_at: claims.exp,
            consumed_at: None,
        }
    }

    #[must_use]
    pub fn is_consumed(&self) -> bool {
        self.consumed_at.is_some()
    }
}

/// Current practice settings used to prefill the follow-up form.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct PracticeSettings {
    pub practice_name: Option<String>,
    pub contact_email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub website: Option<String>,
    pub timezone: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RedemptionSnapshot {
    pub subject_id: String,
    pub scope: Scope,
    pub settings: PracticeSettings,
}

/// Transactional access to `onboarding_tokens` plus read access to settings.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Persist the record for a newly issued token.
    async fn insert(&self, record: &OnboardingTokenRecord) -> Result<(), RedemptionError>;

    /// Classify a token like [`TokenStore::redeem`] without consuming it.
    async fn inspect(
        &self,
        token_id: Uuid,
        subject_id: &str,
    ) -> Result<RedemptionSnapshot, RedemptionError>;

    /// Consume a token exactly once and return the prefill snapshot.
    async fn redeem(
        &self,
        token_id: Uuid,
        subject_id: &str,
    ) -> Result<RedemptionSnapshot, RedemptionError>;

    async fn record(
        &self,
        token_id: Uuid,
    ) -> Result<Option<OnboardingTokenRecord>, RedemptionError>;

    async fn ping(&self) -> Result<(), RedemptionError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TOKEN_VERSION;

    #[test]
    fn record_from_claims_copies_timestamps() {
        let claims = TokenClaims {
            v: TOKEN_VERSION,
            jti: Uuid::new_v4(),
            sub: "p1".to_string(),
            scope: Scope::SettingsUpdate,
            iat: 100,
            exp: 200,
        };
        let record = OnboardingTokenRecord::from_claims(&claims);
        assert_eq!(record.id, claims.jti);
        assert_eq!(record.subject_id, "p1");
        assert_eq!(record.scope, Scope::SettingsUpdate);
        assert_eq!((record.created_at, record.expires_at), (100, 200));
        assert!(!record.is_consumed());
    }

    #[test]
    fn storage_error_keeps_context() {
        let err = RedemptionError::from(
            anyhow::anyhow!("connection refused").context("failed to consume token"),
        );
        assert_eq!(
            err.to_string(),
            "storage error: failed to consume token: connection refused"
        );
    }
}
