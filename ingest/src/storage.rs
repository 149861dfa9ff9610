use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use thiserror::Error;

use crate::event::EventRecord;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("connection failed with: {error}")]
    ConnectionError { error: sqlx::Error },
    #[error("{command} query failed with: {error}")]
    QueryError {
        command: &'static str,
        error: sqlx::Error,
    },
}

/// The two persistence operations the writer pool needs: mutating a
/// subscriber's engagement state and appending to the audit log. Each call
/// is independently atomic; there is no transaction spanning events.
#[async_trait]
pub trait StorageGateway {
    /// Record when a subscriber last opened a message.
    async fn mark_opened(
        &self,
        email: &str,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Record when a subscriber last clicked a link, and which one. Both
    /// columns move together in a single statement.
    async fn mark_clicked(
        &self,
        email: &str,
        occurred_at: DateTime<Utc>,
        url: &str,
    ) -> Result<(), StorageError>;

    /// Append one immutable audit row for the event.
    async fn append_audit(
        &self,
        record: &EventRecord,
        occurred_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> Result<(), StorageError>;
}

pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|error| StorageError::ConnectionError { error })?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl StorageGateway for PostgresStorage {
    async fn mark_opened(
        &self,
        email: &str,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE email_subscriptions SET opened_at = $1 WHERE email = $2")
            .bind(occurred_at)
            .bind(email)
            .execute(&self.pool)
            .await
            .map_err(|error| StorageError::QueryError {
                command: "UPDATE opened_at",
                error,
            })?;

        Ok(())
    }

    async fn mark_clicked(
        &self,
        email: &str,
        occurred_at: DateTime<Utc>,
        url: &str,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE email_subscriptions SET (clicked_at, last_clicked_url) = ($1, $2) WHERE email = $3",
        )
        .bind(occurred_at)
        .bind(url)
        .bind(email)
        .execute(&self.pool)
        .await
        .map_err(|error| StorageError::QueryError {
            command: "UPDATE clicked_at",
            error,
        })?;

        Ok(())
    }

    async fn append_audit(
        &self,
        record: &EventRecord,
        occurred_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r#"
INSERT INTO sendgrid_events
    (created_at, updated_at, email, category, smtp_id, sg_message_id, ip, useragent, happened_at, event, url)
VALUES
    ($1, $1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(created_at)
        .bind(&record.email)
        .bind(&record.category)
        .bind(&record.smtp_id)
        .bind(&record.sg_message_id)
        .bind(&record.ip)
        .bind(&record.useragent)
        .bind(occurred_at)
        .bind(&record.event)
        .bind(&record.url)
        .execute(&self.pool)
        .await
        .map_err(|error| StorageError::QueryError {
            command: "INSERT",
            error,
        })?;

        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubscriberState {
    pub opened_at: Option<DateTime<Utc>>,
    pub clicked_at: Option<DateTime<Utc>>,
    pub last_clicked_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct AuditRow {
    pub event: String,
    pub email: String,
    pub url: String,
    pub category: String,
    pub smtp_id: String,
    pub sg_message_id: String,
    pub ip: String,
    pub useragent: String,
    pub happened_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// In-memory gateway for tests and local debugging. Don't run this in
/// production.
#[derive(Default)]
pub struct MemoryStorage {
    inner: Mutex<MemoryStorageInner>,
}

#[derive(Default)]
struct MemoryStorageInner {
    subscribers: HashMap<String, SubscriberState>,
    audit: Vec<AuditRow>,
}

impl MemoryStorage {
    pub fn subscriber(&self, email: &str) -> Option<SubscriberState> {
        self.inner.lock().unwrap().subscribers.get(email).cloned()
    }

    pub fn audit_rows(&self) -> Vec<AuditRow> {
        self.inner.lock().unwrap().audit.clone()
    }
}

#[async_trait]
impl StorageGateway for MemoryStorage {
    async fn mark_opened(
        &self,
        email: &str,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .subscribers
            .entry(email.to_string())
            .or_default()
            .opened_at = Some(occurred_at);

        Ok(())
    }

    async fn mark_clicked(
        &self,
        email: &str,
        occurred_at: DateTime<Utc>,
        url: &str,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        let state = inner.subscribers.entry(email.to_string()).or_default();
        state.clicked_at = Some(occurred_at);
        state.last_clicked_url = Some(url.to_string());

        Ok(())
    }

    async fn append_audit(
        &self,
        record: &EventRecord,
        occurred_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        inner.audit.push(AuditRow {
            event: record.event.clone(),
            email: record.email.clone(),
            url: record.url.clone(),
            category: record.category.clone(),
            smtp_id: record.smtp_id.clone(),
            sg_message_id: record.sg_message_id.clone(),
            ip: record.ip.clone(),
            useragent: record.useragent.clone(),
            happened_at: occurred_at,
            created_at,
        });

        Ok(())
    }
}
