//! # Onboard (single-use signed links)
//!
//! `onboard` lets a practice complete a one-time administrative step, initial
//! onboarding or a settings update, from an emailed link instead of a password.
//!
//! A link carries an HMAC-signed token:
//!
//! ```text
//! base64url(claims JSON) "." base64url(HMAC-SHA256(secret, claims segment))
//! ```
//!
//! ## Lifecycle
//!
//! 1. **Issue:** [`redemption::Issuer`] signs claims with [`token::TokenSigner`]
//!    and persists an `onboarding_tokens` row keyed by the token id (`jti`).
//! 2. **Check:** `GET /onboard/{token}` verifies the token offline and reads the
//!    row without consuming it, returning the prefill snapshot.
//! 3. **Redeem:** `POST /onboard/{token}` verifies again and consumes the row in
//!    one transaction. Of any number of concurrent redeems, exactly one wins.
//! 4. **Resolve:** [`client::resolve`] maps whatever the transport produced onto
//!    one of six client states.
//!
//! Settings-update links follow the same path under `/settings/{token}`. A
//! token minted for one scope is rejected on the other route.

pub mod api;
pub mod cli;
pub mod client;
pub mod redemption;
pub mod token;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{ensure, Context, Result};
    use std::fs;
    use std::path::PathBuf;

    // Normalize SQL to avoid brittle formatting checks in schema tests.
    fn canonical_schema() -> Result<String> {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("sql/schema.sql");
        let sql = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read SQL file at {}", path.display()))?;
        Ok(sql
            .chars()
            .filter(|ch| !ch.is_whitespace())
            .map(|ch| ch.to_ascii_lowercase())
            .collect())
    }

    #[test]
    fn schema_sql_integrity() -> Result<()> {
        let canonical = canonical_schema()?;
        for expected in [
            "createtableifnotexistsonboarding_tokens",
            "iduuidprimarykey",
            "consumed_attimestamptz",
            "createtableifnotexistspractice_settings",
            "'onboarding','settings_update'",
        ] {
            ensure!(canonical.contains(expected), "schema is missing {expected}");
        }
        Ok(())
    }

    #[test]
    fn user_agent_names_package() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(!GIT_COMMIT_HASH.is_empty());
    }
}
