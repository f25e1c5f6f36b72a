use super::{OnboardingTokenRecord, RedemptionError, TokenStore};
use crate::token::{Scope, SignError, TokenSigner};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument};
use url::Url;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum IssueError {
    #[error(transparent)]
    Sign(#[from] SignError),
    #[error(transparent)]
    Store(#[from] RedemptionError),
    #[error("invalid link base url: {0}")]
    Url(#[from] url::ParseError),
}

/// Link ready to be embedded in an outgoing message.
#[derive(Debug, Clone)]
pub struct IssuedLink {
    pub token: String,
    pub token_id: Uuid,
    pub url: Url,
    pub expires_at: i64,
}

/// Mints a token and persists its record; no token leaves without a record.
#[derive(Clone)]
pub struct Issuer {
    signer: TokenSigner,
    store: Arc<dyn TokenStore>,
    link_base_url: Url,
}

impl Issuer {
    #[must_use]
    pub fn new(signer: TokenSigner, store: Arc<dyn TokenStore>, link_base_url: Url) -> Self {
        Self {
            signer,
            store,
            link_base_url,
        }
    }

    /// # Errors
    /// Returns an error if the request is rejected by the signer, the record
    /// cannot be stored, or the link cannot be built.
    #[instrument(skip(self))]
    pub async fn issue(
        &self,
        subject_id: &str,
        scope: Scope,
        ttl_seconds: i64,
    ) -> Result<IssuedLink, IssueError> {
        let signed = self.signer.sign(subject_id, scope, ttl_seconds)?;
        let url = link_url(&self.link_base_url, scope, &signed.token)?;

        self.store
            .insert(&OnboardingTokenRecord::from_claims(&signed.claims))
            .await?;

        info!(token_id = %signed.claims.jti, "onboarding link issued");

        Ok(IssuedLink {
            token: signed.token,
            token_id: signed.claims.jti,
            url,
            expires_at: signed.claims.exp,
        })
    }
}

/// Route prefix serving tokens of the given scope.
#[must_use]
pub fn scope_path(scope: Scope) -> &'static str {
    match scope {
        Scope::Onboarding => "onboard",
        Scope::SettingsUpdate => "settings",
    }
}

fn link_url(base: &Url, scope: Scope, token: &str) -> Result<Url, url::ParseError> {
    let base = base.as_str().trim_end_matches('/');
    Url::parse(&format!("{base}/{}/{token}", scope_path(scope)))
}
