//! In-process token store.
//!
//! Suitable for a single process (tests, local development). Every
//! check-then-set happens under one lock acquisition. Deployments running more
//! than one process must use [`super::PgTokenStore`].

use super::{
    OnboardingTokenRecord, PracticeSettings, RedemptionError, RedemptionSnapshot, TokenStore,
};
use crate::token::now_unix_seconds;
use anyhow::anyhow;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, instrument};
use uuid::Uuid;

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<Uuid, OnboardingTokenRecord>,
    settings: HashMap<String, PracticeSettings>,
}

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    inner: Mutex<Inner>,
}

impl MemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the prefill settings for a subject.
    ///
    /// # Errors
    /// Returns an error if the store lock is poisoned.
    pub fn put_settings(
        &self,
        subject_id: &str,
        settings: PracticeSettings,
    ) -> Result<(), RedemptionError> {
        self.lock()?.settings.insert(subject_id.to_string(), settings);
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, RedemptionError> {
        self.inner
            .lock()
            .map_err(|_| RedemptionError::Storage(anyhow!("token store lock poisoned")))
    }
}

impl Inner {
    fn classify(
        &self,
        token_id: Uuid,
        subject_id: &str,
        now: i64,
    ) -> Result<&OnboardingTokenRecord, RedemptionError> {
        let record = self
            .records
            .get(&token_id)
            .filter(|record| record.subject_id == subject_id)
            .ok_or(RedemptionError::NotFound)?;

        if record.is_consumed() {
            return Err(RedemptionError::AlreadyConsumed);
        }
        if record.expires_at <= now {
            return Err(RedemptionError::Expired);
        }
        Ok(record)
    }

    fn snapshot(&self, record: &OnboardingTokenRecord) -> RedemptionSnapshot {
        RedemptionSnapshot {
            subject_id: record.subject_id.clone(),
            scope: record.scope,
            settings: self
                .settings
                .get(&record.subject_id)
                .cloned()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn insert(&self, record: &OnboardingTokenRecord) -> Result<(), RedemptionError> {
        let mut inner = self.lock()?;
        if inner.records.contains_key(&record.id) {
            return Err(RedemptionError::DuplicateId);
        }
        inner.records.insert(record.id, record.clone());
        Ok(())
    }

    #[instrument(skip(self))]
    async fn inspect(
        &self,
        token_id: Uuid,
        subject_id: &str,
    ) -> Result<RedemptionSnapshot, RedemptionError> {
        let inner = self.lock()?;
        let record = inner.classify(token_id, subject_id, now_unix_seconds())?;
        Ok(inner.snapshot(record))
    }

    #[instrument(skip(self))]
    async fn redeem(
        &self,
        token_id: Uuid,
        subject_id: &str,
    ) -> Result<RedemptionSnapshot, RedemptionError> {
        let now = now_unix_seconds();
        let mut inner = self.lock()?;
        let snapshot = {
            let record = inner.classify(token_id, subject_id, now)?;
            inner.snapshot(record)
        };

        if let Some(record) = inner.records.get_mut(&token_id) {
            record.consumed_at = Some(now);
        }
        debug!("token consumed");

        Ok(snapshot)
    }

    async fn record(
        &self,
        token_id: Uuid,
    ) -> Result<Option<OnboardingTokenRecord>, RedemptionError> {
        Ok(self.lock()?.records.get(&token_id).cloned())
    }

    async fn ping(&self) -> Result<(), RedemptionError> {
        self.lock().map(|_| ())
    }
}
