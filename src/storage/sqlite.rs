//! Embedded SQLite store.
//!
//! Same contract as the PostgreSQL [`Database`](super::Database), backed by a
//! local file or an in-memory database. Creates its own tables on open.

use std::collections::BTreeMap;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::{debug, info};

use super::batch::{push_link_status_update, push_view_count_update};
use super::schema::SQLITE_SCHEMA;
use super::{LinkStore, PostStore, StorageError};
use crate::entity::{Link, LinkOverview, LinkStatus, Post};

/// SQLite implementation of the post and link stores.
#[derive(Clone)]
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    /// Opens (creating if needed) the database file at `path`.
    pub async fn open(path: &str) -> Result<Self, StorageError> {
        let opts = SqliteConnectOptions::from_str(&format!("sqlite://{}", path))
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        let db = Self { pool };
        db.create_schema().await?;

        info!(path = path, "SQLite store opened");
        Ok(db)
    }

    /// Opens a private in-memory database.
    ///
    /// The pool is pinned to one connection that never expires; every
    /// connection to `:memory:` would otherwise see its own empty database.
    pub async fn in_memory() -> Result<Self, StorageError> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        let db = Self { pool };
        db.create_schema().await?;
        Ok(db)
    }

    async fn create_schema(&self) -> Result<(), StorageError> {
        sqlx::query(SQLITE_SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Inserts or replaces a post.
    pub async fn insert_post(&self, post: &Post) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT OR REPLACE INTO posts (id, title, view_count, updated_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(post.id)
        .bind(&post.title)
        .bind(post.view_count)
        .bind(post.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Retrieves a post by its ID.
    pub async fn get_post(&self, id: i64) -> Result<Post, StorageError> {
        let row = sqlx::query("SELECT id, title, view_count, updated_at FROM posts WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("Post {}", id)))?;

        Ok(Post {
            id: row.get("id"),
            title: row.get("title"),
            view_count: row.get("view_count"),
            updated_at: row.get("updated_at"),
        })
    }

    /// Inserts or replaces a link.
    pub async fn insert_link(&self, link: &Link) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT OR REPLACE INTO links (id, name, url, description, enabled, sort_order, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(link.id)
        .bind(&link.name)
        .bind(&link.url)
        .bind(&link.description)
        .bind(link.enabled as i64)
        .bind(link.sort_order as i64)
        .bind(link.status.as_i16() as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Retrieves a link by its ID.
    pub async fn get_link(&self, id: i64) -> Result<Link, StorageError> {
        let row = sqlx::query(
            "SELECT id, name, url, description, enabled, sort_order, status FROM links WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StorageError::NotFound(format!("Link {}", id)))?;

        Ok(link_from_row(&row))
    }
}

fn link_from_row(row: &sqlx::sqlite::SqliteRow) -> Link {
    Link {
        id: row.get("id"),
        name: row.get("name"),
        url: row.get("url"),
        description: row.get("description"),
        enabled: row.get::<i64, _>("enabled") != 0,
        sort_order: row.get::<i64, _>("sort_order") as i32,
        status: LinkStatus::from_i16(row.get::<i64, _>("status") as i16),
    }
}

#[async_trait]
impl PostStore for SqliteDatabase {
    async fn apply_view_count_deltas(
        &self,
        deltas: &BTreeMap<i64, i64>,
    ) -> Result<u64, StorageError> {
        if deltas.is_empty() {
            return Ok(0);
        }

        let mut qb = QueryBuilder::<Sqlite>::new("");
        push_view_count_update(&mut qb, deltas);
        let result = qb.build().execute(&self.pool).await?;

        debug!(
            posts = deltas.len(),
            rows = result.rows_affected(),
            "Applied view count deltas"
        );
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl LinkStore for SqliteDatabase {
    async fn list_links(&self) -> Result<Vec<Link>, StorageError> {
        let rows = sqlx::query(
            "SELECT id, name, url, description, enabled, sort_order, status
             FROM links WHERE deleted_at IS NULL ORDER BY sort_order, id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(link_from_row).collect())
    }

    async fn apply_link_statuses(
        &self,
        updates: &BTreeMap<i64, LinkStatus>,
    ) -> Result<u64, StorageError> {
        if updates.is_empty() {
            return Ok(0);
        }

        let mut qb = QueryBuilder::<Sqlite>::new("");
        push_link_status_update(&mut qb, updates);
        let result = qb.build().execute(&self.pool).await?;

        Ok(result.rows_affected())
    }

    async fn overview(&self) -> Result<LinkOverview, StorageError> {
        let row = sqlx::query(
            "SELECT COUNT(id) AS total,
                    COALESCE(SUM(CASE WHEN status = ?1 THEN 1 ELSE 0 END), 0) AS normal,
                    COALESCE(SUM(CASE WHEN enabled != 0 THEN 1 ELSE 0 END), 0) AS enabled
             FROM links",
        )
        .bind(LinkStatus::Normal.as_i16() as i64)
        .fetch_one(&self.pool)
        .await?;

        Ok(LinkOverview::from_counts(
            row.get("total"),
            row.get("normal"),
            row.get("enabled"),
        ))
    }
}
