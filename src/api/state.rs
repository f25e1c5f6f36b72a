use super::settings::SettingsSink;
use crate::redemption::TokenStore;
use crate::token::TokenVerifier;
use std::sync::Arc;
use url::Url;

/// Shared handler state, built once at startup.
#[derive(Clone)]
pub struct OnboardState {
    verifier: TokenVerifier,
    store: Arc<dyn TokenStore>,
    sink: Arc<dyn SettingsSink>,
    frontend_base_url: Url,
}

impl OnboardState {
    #[must_use]
    pub fn new(
        verifier: TokenVerifier,
        store: Arc<dyn TokenStore>,
        sink: Arc<dyn SettingsSink>,
        frontend_base_url: Url,
    ) -> Self {
        Self {
            verifier,
            store,
            sink,
            frontend_base_url,
        }
    }

    pub(crate) fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    pub(crate) fn store(&self) -> &dyn TokenStore {
        self.store.as_ref()
    }

    pub(crate) fn sink(&self) -> &dyn SettingsSink {
        self.sink.as_ref()
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &Url {
        &self.frontend_base_url
    }
}
