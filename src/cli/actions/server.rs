use crate::api::{self, LogSettingsSink, OnboardState};
use crate::cli::globals::GlobalArgs;
use crate::redemption::PgTokenStore;
use crate::token::TokenVerifier;
use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::{sync::Arc, time::Duration};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub frontend_base_url: Url,
    pub globals: GlobalArgs,
}

pub(crate) async fn connect(dsn: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(dsn)
        .await
        .context("Failed to connect to database")
}

/// Handle the server action
/// # Errors
/// Returns an error if the key cannot be loaded, the database is unreachable
/// or the server fails to start
pub async fn execute(args: Args) -> Result<()> {
    let key = Arc::new(args.globals.signing_key()?);

    let pool = connect(&args.dsn).await?;

    let state = Arc::new(OnboardState::new(
        TokenVerifier::new(key),
        Arc::new(PgTokenStore::new(pool)),
        Arc::new(LogSettingsSink),
        args.frontend_base_url,
    ));

    api::new(args.port, state).await
}
