//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `CreationLedger` port from the `core` crate. It appends rows to the
//! `creations` table in PostgreSQL using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use creation_core::domain::{CallerId, CreationKind, CreationRecord, NewCreation};
use creation_core::ports::{CreationLedger, PortError, PortResult};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `CreationLedger` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct CreationRow {
    id: Uuid,
    user_id: String,
    prompt: String,
    content: String,
    #[sqlx(rename = "type")]
    kind: String,
    publish: bool,
    created_at: DateTime<Utc>,
}

impl CreationRow {
    fn to_domain(self) -> PortResult<CreationRecord> {
        let kind = CreationKind::parse(&self.kind).ok_or_else(|| {
            PortError::Unexpected(format!("Unknown creation type '{}'", self.kind))
        })?;
        Ok(CreationRecord {
            id: self.id,
            owner: CallerId::new(self.user_id),
            prompt: self.prompt,
            content: self.content,
            kind,
            publish: self.publish,
            created_at: self.created_at,
        })
    }
}

//=========================================================================================
// `CreationLedger` Trait Implementation
//=========================================================================================

#[async_trait]
impl CreationLedger for DbAdapter {
    async fn append(&self, creation: NewCreation) -> PortResult<CreationRecord> {
        let row = sqlx::query_as::<_, CreationRow>(
            "INSERT INTO creations (id, user_id, prompt, content, type, publish) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id, user_id, prompt, content, type, publish, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(creation.owner.as_str())
        .bind(&creation.prompt)
        .bind(&creation.content)
        .bind(creation.kind.as_str())
        .bind(creation.publish)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        row.to_domain()
    }
}
