//! Postgres-backed token store.
//!
//! Redemption locks the token row with `SELECT ... FOR UPDATE` inside a
//! transaction, so concurrent requests from any number of processes serialize
//! on the row. The consuming `UPDATE` is additionally guarded by
//! `consumed_at IS NULL` and must affect exactly one row.

use super::{
    OnboardingTokenRecord, PracticeSettings, RedemptionError, RedemptionSnapshot, TokenStore,
};
use crate::token::Scope;
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use sqlx::{postgres::PgRow, Connection, PgPool, Postgres, Row, Transaction};
use tracing::{debug, instrument, Instrument};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct PgTokenStore {
    pool: PgPool,
}

impl PgTokenStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Lock state of a token row as seen inside the redemption transaction.
struct LockedToken {
    subject_id: String,
    scope: Scope,
    consumed: bool,
    expired: bool,
}

impl LockedToken {
    fn from_row(row: &PgRow) -> Result<Self, RedemptionError> {
        let scope: String = row.get("scope");
        Ok(Self {
            subject_id: row.get("subject_id"),
            scope: parse_scope(&scope)?,
            consumed: row.get("consumed"),
            expired: row.get("expired"),
        })
    }

    fn check(&self, subject_id: &str) -> Result<(), RedemptionError> {
        if self.subject_id != subject_id {
            return Err(RedemptionError::NotFound);
        }
        if self.consumed {
            return Err(RedemptionError::AlreadyConsumed);
        }
        if self.expired {
            return Err(RedemptionError::Expired);
        }
        Ok(())
    }
}

fn parse_scope(value: &str) -> Result<Scope, RedemptionError> {
    value
        .parse::<Scope>()
        .map_err(|err| RedemptionError::Storage(anyhow!("unexpected scope in database: {err}")))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

async fn lock_token(
    tx: &mut Transaction<'_, Postgres>,
    token_id: Uuid,
    for_update: bool,
) -> Result<Option<LockedToken>, RedemptionError> {
    // The expiry comparison uses the database clock; persisted state is authoritative.
    let query = if for_update {
        r"
        SELECT subject_id,
               scope,
               consumed_at IS NOT NULL AS consumed,
               expires_at <= NOW() AS expired
        FROM onboarding_tokens
        WHERE id = $1
        FOR UPDATE
        "
    } else {
        r"
        SELECT subject_id,
               scope,
               consumed_at IS NOT NULL AS consumed,
               expires_at <= NOW() AS expired
        FROM onboarding_tokens
        WHERE id = $1
        "
    };
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_id)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to lookup onboarding token")?;

    row.as_ref().map(LockedToken::from_row).transpose()
}

async fn fetch_settings(
    tx: &mut Transaction<'_, Postgres>,
    subject_id: &str,
) -> Result<PracticeSettings, RedemptionError> {
    let query = r"
        SELECT practice_name, contact_email, phone, address, website, timezone
        FROM practice_settings
        WHERE subject_id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(subject_id)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to lookup practice settings")?;

    Ok(row
        .map(|row| PracticeSettings {
            practice_name: row.get("practice_name"),
            contact_email: row.get("contact_email"),
            phone: row.get("phone"),
            address: row.get("address"),
            website: row.get("website"),
            timezone: row.get("timezone"),
        })
        .unwrap_or_default())
}

#[async_trait]
impl TokenStore for PgTokenStore {
    #[instrument(skip(self, record), fields(token_id = %record.id))]
    async fn insert(&self, record: &OnboardingTokenRecord) -> Result<(), RedemptionError> {
        let query = r"
            INSERT INTO onboarding_tokens
                (id, subject_id, scope, created_at, expires_at)
            VALUES ($1, $2, $3, TO_TIMESTAMP($4::BIGINT), TO_TIMESTAMP($5::BIGINT))
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(record.id)
            .bind(&record.subject_id)
            .bind(record.scope.as_str())
            .bind(record.created_at)
            .bind(record.expires_at)
            .execute(&self.pool)
            .instrument(span)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(RedemptionError::DuplicateId),
            Err(err) => Err(anyhow::Error::new(err)
                .context("failed to insert onboarding token")
                .into()),
        }
    }

    #[instrument(skip(self))]
    async fn inspect(
        &self,
        token_id: Uuid,
        subject_id: &str,
    ) -> Result<RedemptionSnapshot, RedemptionError> {
        // Read-only transaction so the record and settings are read consistently.
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin inspect transaction")?;

        let result = read_snapshot(&mut tx, token_id, subject_id).await;

        let _ = tx.rollback().await;
        result
    }

    #[instrument(skip(self))]
    async fn redeem(
        &self,
        token_id: Uuid,
        subject_id: &str,
    ) -> Result<RedemptionSnapshot, RedemptionError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin redeem transaction")?;

        let result = consume(&mut tx, token_id, subject_id).await;

        match result {
            Ok(snapshot) => {
                tx.commit().await.context("commit redeem transaction")?;
                debug!("token consumed");
                Ok(snapshot)
            }
            Err(err) => {
                // Discard any partial update.
                let _ = tx.rollback().await;
                Err(err)
            }
        }
    }

    #[instrument(skip(self))]
    async fn record(
        &self,
        token_id: Uuid,
    ) -> Result<Option<OnboardingTokenRecord>, RedemptionError> {
        let query = r"
            SELECT id,
                   subject_id,
                   scope,
                   EXTRACT(EPOCH FROM created_at)::BIGINT AS created_at,
                   EXTRACT(EPOCH FROM expires_at)::BIGINT AS expires_at,
                   EXTRACT(EPOCH FROM consumed_at)::BIGINT AS consumed_at
            FROM onboarding_tokens
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(token_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to fetch onboarding token")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let scope: String = row.get("scope");
        Ok(Some(OnboardingTokenRecord {
            id: row.get("id"),
            subject_id: row.get("subject_id"),
            scope: parse_scope(&scope)?,
            created_at: row.get("created_at"),
            expires_at: row.get("expires_at"),
            consumed_at: row.get("consumed_at"),
        }))
    }

    async fn ping(&self) -> Result<(), RedemptionError> {
        let acquire_span = tracing::info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self
            .pool
            .acquire()
            .instrument(acquire_span)
            .await
            .context("failed to acquire database connection")?;

        let ping_span =
            tracing::info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping()
            .instrument(ping_span)
            .await
            .context("failed to ping database")?;

        Ok(())
    }
}

async fn read_snapshot(
    tx: &mut Transaction<'_, Postgres>,
    token_id: Uuid,
    subject_id: &str,
) -> Result<RedemptionSnapshot, RedemptionError> {
    let token = lock_token(tx, token_id, false)
        .await?
        .ok_or(RedemptionError::NotFound)?;
    token.check(subject_id)?;
    let settings = fetch_settings(tx, subject_id).await?;

    Ok(RedemptionSnapshot {
        subject_id: token.subject_id,
        scope: token.scope,
        settings,
    })
}

async fn consume(
    tx: &mut Transaction<'_, Postgres>,
    token_id: Uuid,
    subject_id: &str,
) -> Result<RedemptionSnapshot, RedemptionError> {
    let token = lock_token(tx, token_id, true)
        .await?
        .ok_or(RedemptionError::NotFound)?;
    token.check(subject_id)?;

    let query = r"
        UPDATE onboarding_tokens
        SET consumed_at = NOW()
        WHERE id = $1
          AND consumed_at IS NULL
          AND expires_at > NOW()
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let updated = sqlx::query(query)
        .bind(token_id)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to consume onboarding token")?
        .rows_affected();

    if updated != 1 {
        return Err(RedemptionError::AlreadyConsumed);
    }

    // Read before commit: if this fails the consumption is rolled back.
    let settings = fetch_settings(tx, subject_id).await?;

    Ok(RedemptionSnapshot {
        subject_id: token.subject_id,
        scope: token.scope,
        settings,
    })
}
