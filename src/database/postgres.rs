//! PostgreSQL post store.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use tracing::{debug, info};

use super::models::{NewPost, Post, PostChanges};
use super::store::{PostStore, PostTransaction};
use crate::error::StoreError;

const CREATE_POSTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS posts (
    id          BIGSERIAL PRIMARY KEY,
    title       TEXT NOT NULL,
    content     TEXT NOT NULL,
    image       TEXT NULL,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

const POST_COLUMNS: &str = "id, title, content, image, created_at, updated_at";

/// Post store backed by a Postgres connection pool.
#[derive(Debug, Clone)]
pub struct PgPostStore {
    pool: PgPool,
}

impl PgPostStore {
    /// Connect to Postgres with the given URL and pool size.
    ///
    /// # Errors
    /// Returns error if connection fails.
    pub async fn connect(url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        info!("Successfully connected to Postgres");

        Ok(Self { pool })
    }

    /// Create the `posts` table if it does not exist yet.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(CREATE_POSTS_TABLE).execute(&self.pool).await?;
        debug!("posts table ready");
        Ok(())
    }
}

#[async_trait]
impl PostStore for PgPostStore {
    async fn begin(&self) -> Result<Box<dyn PostTransaction>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgPostTransaction { tx }))
    }

    async fn find(&self, id: i64) -> Result<Option<Post>, StoreError> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1");
        let post = sqlx::query_as::<_, Post>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(post)
    }

    async fn find_all(&self) -> Result<Vec<Post>, StoreError> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts ORDER BY id");
        let posts = sqlx::query_as::<_, Post>(&sql).fetch_all(&self.pool).await?;
        debug!("Loaded {} posts from Postgres", posts.len());
        Ok(posts)
    }
}

/// One open Postgres transaction.
struct PgPostTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl PostTransaction for PgPostTransaction {
    async fn insert(&mut self, post: NewPost) -> Result<Post, StoreError> {
        let sql = format!(
            "INSERT INTO posts (title, content, image) VALUES ($1, $2, $3) RETURNING {POST_COLUMNS}"
        );
        let created = sqlx::query_as::<_, Post>(&sql)
            .bind(post.title)
            .bind(post.content)
            .bind(post.image)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(created)
    }

    async fn find_for_update(&mut self, id: i64) -> Result<Option<Post>, StoreError> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1 FOR UPDATE");
        let post = sqlx::query_as::<_, Post>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(post)
    }

    async fn update(&mut self, id: i64, changes: &PostChanges) -> Result<Post, StoreError> {
        let sql = format!(
            "UPDATE posts SET title = $1, content = $2, image = COALESCE($3, image), updated_at = now() \
             WHERE id = $4 RETURNING {POST_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, Post>(&sql)
            .bind(&changes.title)
            .bind(&changes.content)
            .bind(&changes.image)
            .bind(id)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(updated)
    }

    async fn delete(&mut self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
