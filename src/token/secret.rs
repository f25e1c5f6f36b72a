//! Signing key loading.
//!
//! The key is read once at process start and handed to the signer and verifier
//! behind an `Arc`. Swapping it means changing configuration and restarting.

use anyhow::{anyhow, Context, Result};
use secrecy::{ExposeSecret, SecretSlice, SecretString};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, instrument};

/// Shortest accepted HMAC key.
pub const MIN_KEY_BYTES: usize = 32;

#[derive(Debug)]
pub struct SigningKey(SecretSlice<u8>);

impl SigningKey {
    /// # Errors
    /// Returns an error if the key is shorter than [`MIN_KEY_BYTES`].
    pub fn new(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < MIN_KEY_BYTES {
            return Err(anyhow!(
                "signing secret must be at least {MIN_KEY_BYTES} bytes, got {}",
                bytes.len()
            ));
        }
        Ok(Self(SecretSlice::from(bytes)))
    }

    pub(crate) fn expose(&self) -> &[u8] {
        self.0.expose_secret()
    }
}

/// Source of the signing key.
pub trait SecretProvider: Send + Sync {
    /// # Errors
    /// Returns an error if the key cannot be read or is too short.
    fn signing_key(&self) -> Result<SigningKey>;
}

/// Key passed in directly, e.g. from `ONBOARD_SIGNING_SECRET`.
#[derive(Debug, Clone)]
pub struct StaticSecret(SecretString);

impl StaticSecret {
    #[must_use]
    pub fn new(secret: SecretString) -> Self {
        Self(secret)
    }
}

impl SecretProvider for StaticSecret {
    fn signing_key(&self) -> Result<SigningKey> {
        SigningKey::new(self.0.expose_secret().as_bytes().to_vec())
    }
}

/// Key read from a mounted file. A single trailing newline is ignored.
#[derive(Debug, Clone)]
pub struct FileSecret {
    path: PathBuf,
}

impl FileSecret {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SecretProvider for FileSecret {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn signing_key(&self) -> Result<SigningKey> {
        let mut bytes = fs::read(&self.path)
            .with_context(|| format!("Failed to read signing secret: {}", self.path.display()))?;

        if bytes.last() == Some(&b'\n') {
            bytes.pop();
            if bytes.last() == Some(&b'\r') {
                bytes.pop();
            }
        }

        debug!("signing secret loaded from file");

        SigningKey::new(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn short_key_rejected() {
        let provider = StaticSecret::new(SecretString::from("too-short".to_string()));
        let err = provider.signing_key().err();
        assert!(err.is_some_and(|e| e.to_string().contains("at least 32 bytes")));
    }

    #[test]
    fn static_secret_exposes_bytes() -> Result<()> {
        let secret = "k".repeat(MIN_KEY_BYTES);
        let key = StaticSecret::new(SecretString::from(secret.clone())).signing_key()?;
        assert_eq!(key.expose(), secret.as_bytes());
        Ok(())
    }

    #[test]
    fn debug_does_not_leak_key() -> Result<()> {
        let key = SigningKey::new(b"super-secret-value-that-is-long-enough".to_vec())?;
        assert!(!format!("{key:?}").contains("super-secret"));
        Ok(())
    }

    #[test]
    fn file_secret_strips_trailing_newline() -> Result<()> {
        let path = std::env::temp_dir().join(format!("onboard-secret-{}", uuid::Uuid::new_v4()));
        let secret = "f".repeat(40);
        {
            let mut file = fs::File::create(&path)?;
            writeln!(file, "{secret}")?;
        }
        let key = FileSecret::new(&path).signing_key();
        let _ = fs::remove_file(&path);
        assert_eq!(key?.expose(), secret.as_bytes());
        Ok(())
    }

    #[test]
    fn file_secret_missing_file() {
        let provider = FileSecret::new("/nonexistent/onboard/secret");
        let err = provider.signing_key().err();
        assert!(err.is_some_and(|e| e.to_string().contains("Failed to read signing secret")));
    }
}
