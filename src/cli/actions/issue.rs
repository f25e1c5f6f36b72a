use crate::cli::{actions::server::connect, globals::GlobalArgs};
use crate::redemption::{Issuer, PgTokenStore};
use crate::token::{Scope, TokenSigner};
use anyhow::Result;
use std::sync::Arc;
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub dsn: String,
    pub subject: String,
    pub scope: Scope,
    pub ttl_seconds: i64,
    pub link_base_url: Url,
    pub globals: GlobalArgs,
}

/// Mint a link, record it and print it to stdout.
/// # Errors
/// Returns an error if the key cannot be loaded, the request is rejected or
/// the record cannot be stored
pub async fn execute(args: Args) -> Result<()> {
    let key = Arc::new(args.globals.signing_key()?);
    let signer = TokenSigner::new(key).with_max_ttl_seconds(args.globals.max_ttl_seconds);

    let pool = connect(&args.dsn).await?;
    let issuer = Issuer::new(signer, Arc::new(PgTokenStore::new(pool)), args.link_base_url);

    let link = issuer
        .issue(&args.subject, args.scope, args.ttl_seconds)
        .await?;

    println!("{}", link.url);
    println!("token_id: {}", link.token_id);
    println!("expires_at: {}", link.expires_at);

    Ok(())
}
