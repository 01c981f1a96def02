//! Durable VPS records in SQLite.

use crate::error::{Result, VpsError};
use crate::record::{Principal, VpsRecord, VpsStatus};
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::instrument;

/// Fields changed by one [`VpsStore::update`]. `None` leaves a column as is;
/// `runtime_handle: Some(None)` clears the handle.
#[derive(Debug, Clone, Default)]
pub struct RecordUpdate {
    pub status: Option<VpsStatus>,
    pub runtime_handle: Option<Option<String>>,
}

impl RecordUpdate {
    pub fn status(status: VpsStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Bind a new container and its status in one write.
    pub fn bound(status: VpsStatus, handle: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            runtime_handle: Some(Some(handle.into())),
        }
    }

    /// The container is gone: mark the record as failed and drop its handle.
    pub fn lost() -> Self {
        Self {
            status: Some(VpsStatus::Error),
            runtime_handle: Some(None),
        }
    }
}

#[derive(Clone)]
pub struct VpsStore {
    pool: SqlitePool,
}

impl VpsStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a new record. A duplicate name is a validation error.
    #[instrument(skip_all, fields(vps = %name))]
    pub async fn insert(
        &self,
        name: &str,
        owner: &str,
        support: &str,
        runtime_handle: Option<&str>,
        status: VpsStatus,
    ) -> Result<VpsRecord> {
        let now = Utc::now().timestamp();

        let row = sqlx::query_as::<_, VpsRow>(
            r#"
            INSERT INTO vps (name, owner, support, runtime_handle, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(name)
        .bind(owner)
        .bind(support)
        .bind(runtime_handle)
        .bind(status)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                VpsError::Validation(format!("a VPS named '{name}' already exists"))
            }
            other => VpsError::Database(other),
        })?;

        Ok(row.into())
    }

    /// Look a record up by numeric id or by name.
    pub async fn get(&self, key: &str) -> Result<VpsRecord> {
        let row = match key.parse::<i64>() {
            Ok(id) => {
                sqlx::query_as::<_, VpsRow>("SELECT * FROM vps WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?
            }
            Err(_) => {
                sqlx::query_as::<_, VpsRow>("SELECT * FROM vps WHERE name = ?")
                    .bind(key)
                    .fetch_optional(&self.pool)
                    .await?
            }
        };

        row.map(Into::into)
            .ok_or_else(|| VpsError::NotFound(key.to_string()))
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Option<VpsRecord>> {
        let row = sqlx::query_as::<_, VpsRow>("SELECT * FROM vps WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Into::into))
    }

    /// Records visible to `principal`: everything for admins, own records otherwise.
    pub async fn list_for(&self, principal: &Principal) -> Result<Vec<VpsRecord>> {
        if principal.is_admin() {
            return self.list_all().await;
        }

        let rows = sqlx::query_as::<_, VpsRow>("SELECT * FROM vps WHERE owner = ? ORDER BY id")
            .bind(&principal.identity)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn list_all(&self) -> Result<Vec<VpsRecord>> {
        let rows = sqlx::query_as::<_, VpsRow>("SELECT * FROM vps ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Apply `update` to the record named `name` and return the new state.
    #[instrument(skip_all, fields(vps = %name))]
    pub async fn update(&self, name: &str, update: RecordUpdate) -> Result<VpsRecord> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE vps SET updated_at = ");
        query.push_bind(Utc::now().timestamp());

        if let Some(status) = update.status {
            query.push(", status = ").push_bind(status);
        }
        if let Some(handle) = update.runtime_handle {
            query.push(", runtime_handle = ").push_bind(handle);
        }

        query.push(" WHERE name = ").push_bind(name);
        query.push(" RETURNING *");

        let row = query
            .build_query_as::<VpsRow>()
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| VpsError::NotFound(name.to_string()))?;

        Ok(row.into())
    }

    #[instrument(skip_all, fields(vps = %name))]
    pub async fn delete(&self, name: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM vps WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(VpsError::NotFound(name.to_string()));
        }

        Ok(())
    }
}

// Internal row type for sqlx
#[derive(sqlx::FromRow)]
struct VpsRow {
    id: i64,
    name: String,
    owner: String,
    support: String,
    runtime_handle: Option<String>,
    status: VpsStatus,
    created_at: i64,
    updated_at: i64,
}

impl From<VpsRow> for VpsRecord {
    fn from(row: VpsRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            owner: row.owner,
            support: row.support,
            runtime_handle: row.runtime_handle,
            status: row.status,
            created_at: timestamp(row.created_at),
            updated_at: timestamp(row.updated_at),
        }
    }
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}
