use crate::token::{
    FileSecret, SecretProvider, SigningKey, StaticSecret, DEFAULT_MAX_TTL_SECONDS,
};
use anyhow::{anyhow, Result};
use secrecy::SecretString;
use std::path::PathBuf;

/// Settings shared by every subcommand.
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub signing_secret: Option<SecretString>,
    pub signing_secret_file: Option<PathBuf>,
    pub max_ttl_seconds: i64,
}

impl Default for GlobalArgs {
    fn default() -> Self {
        Self {
            signing_secret: None,
            signing_secret_file: None,
            max_ttl_seconds: DEFAULT_MAX_TTL_SECONDS,
        }
    }
}

impl GlobalArgs {
    /// Pick the configured key source. Exactly one must be set.
    /// # Errors
    /// Returns an error if neither or both key sources are configured
    pub fn secret_provider(&self) -> Result<Box<dyn SecretProvider>> {
        match (&self.signing_secret, &self.signing_secret_file) {
            (Some(secret), None) => Ok(Box::new(StaticSecret::new(secret.clone()))),
            (None, Some(path)) => Ok(Box::new(FileSecret::new(path.clone()))),
            (Some(_), Some(_)) => Err(anyhow!(
                "--signing-secret and --signing-secret-file are mutually exclusive"
            )),
            (None, None) => Err(anyhow!(
                "missing required argument: --signing-secret or --signing-secret-file"
            )),
        }
    }

    /// # Errors
    /// Returns an error if the key cannot be loaded
    pub fn signing_key(&self) -> Result<SigningKey> {
        self.secret_provider()?.signing_key()
    }
}
