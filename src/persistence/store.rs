//! SQLite-based persistence store

use crate::core::{Deploy, DeployId, DeployStatus, Stack, StackCapabilities};
use crate::persistence::{check_transition, DeployStore, StoreError};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

const DEPLOY_COLUMNS: &str =
    "id, stack, until_commit, status, output, created_at, started_at, finished_at";

const STACK_COLUMNS: &str =
    "name, supports_rollback, supports_fetch_deployed_revision, deployed_revision, updated_at";

/// SQLite deploy store
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `db_path`; `:memory:` is accepted
    pub async fn new(db_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path))
            .context("Invalid database path")?
            .create_if_missing(true);

        // Every connection to :memory: gets its own database
        let max_connections = if db_path == ":memory:" { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Open a database file, creating its parent directory
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        Self::new(&path.to_string_lossy()).await
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS stacks (
                name TEXT PRIMARY KEY,
                supports_rollback INTEGER NOT NULL DEFAULT 0,
                supports_fetch_deployed_revision INTEGER NOT NULL DEFAULT 0,
                deployed_revision TEXT,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS deploys (
                id TEXT PRIMARY KEY,
                stack TEXT NOT NULL,
                until_commit TEXT NOT NULL,
                status TEXT NOT NULL,
                output TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                started_at TEXT,
                finished_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_deploys_stack ON deploys(stack);
            CREATE INDEX IF NOT EXISTS idx_deploys_created_at ON deploys(created_at);
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to initialize schema")?;

        Ok(())
    }

    /// Convert DateTime<Utc> to NaiveDateTime for SQLite
    fn to_naive(dt: DateTime<Utc>) -> NaiveDateTime {
        dt.naive_utc()
    }

    /// Convert NaiveDateTime to DateTime<Utc>
    fn from_naive(dt: NaiveDateTime) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(dt, Utc)
    }

    fn deploy_from_row(row: &SqliteRow) -> Result<Deploy> {
        let status: String = row.try_get("status")?;
        Ok(Deploy {
            id: Uuid::parse_str(&row.try_get::<String, _>("id")?)?,
            stack: row.try_get("stack")?,
            until_commit: row.try_get("until_commit")?,
            status: DeployStatus::from_str(&status).map_err(anyhow::Error::msg)?,
            output: row.try_get("output")?,
            created_at: Self::from_naive(row.try_get("created_at")?),
            started_at: row
                .try_get::<Option<NaiveDateTime>, _>("started_at")?
                .map(Self::from_naive),
            finished_at: row
                .try_get::<Option<NaiveDateTime>, _>("finished_at")?
                .map(Self::from_naive),
        })
    }

    fn stack_from_row(row: &SqliteRow) -> Result<Stack> {
        Ok(Stack {
            name: row.try_get("name")?,
            supports_rollback: row.try_get("supports_rollback")?,
            supports_fetch_deployed_revision: row.try_get("supports_fetch_deployed_revision")?,
            deployed_revision: row.try_get("deployed_revision")?,
            updated_at: Self::from_naive(row.try_get("updated_at")?),
        })
    }

    async fn load_stack(&self, name: &str) -> Result<Option<Stack>> {
        let row = sqlx::query(&format!("SELECT {STACK_COLUMNS} FROM stacks WHERE name = ?1"))
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load stack")?;

        row.as_ref().map(Self::stack_from_row).transpose()
    }
}

#[async_trait::async_trait]
impl DeployStore for SqliteStore {
    async fn create_stack(&self, name: &str) -> Result<Stack, StoreError> {
        let stack = Stack::new(name);
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO stacks
            (name, supports_rollback, supports_fetch_deployed_revision, deployed_revision, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&stack.name)
        .bind(stack.supports_rollback)
        .bind(stack.supports_fetch_deployed_revision)
        .bind(stack.deployed_revision.clone())
        .bind(Self::to_naive(stack.updated_at))
        .execute(&self.pool)
        .await
        .context("Failed to create stack")?;

        self.load_stack(name)
            .await?
            .ok_or_else(|| StoreError::StackNotFound(name.to_string()))
    }

    async fn find_stack(&self, name: &str) -> Result<Option<Stack>, StoreError> {
        Ok(self.load_stack(name).await?)
    }

    async fn list_stacks(&self) -> Result<Vec<Stack>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {STACK_COLUMNS} FROM stacks ORDER BY name ASC"))
            .fetch_all(&self.pool)
            .await
            .context("Failed to list stacks")?;

        Ok(rows
            .iter()
            .map(Self::stack_from_row)
            .collect::<Result<Vec<_>>>()?)
    }

    async fn update_capabilities(
        &self,
        stack: &str,
        capabilities: StackCapabilities,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE stacks
            SET supports_rollback = ?1, supports_fetch_deployed_revision = ?2, updated_at = ?3
            WHERE name = ?4
            "#,
        )
        .bind(capabilities.rollback)
        .bind(capabilities.fetch_deployed_revision)
        .bind(Self::to_naive(Utc::now()))
        .bind(stack)
        .execute(&self.pool)
        .await
        .context("Failed to update capabilities")?;

        if result.rows_affected() == 0 {
            return Err(StoreError::StackNotFound(stack.to_string()));
        }
        Ok(())
    }

    async fn update_deployed_revision(&self, stack: &str, revision: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE stacks SET deployed_revision = ?1, updated_at = ?2 WHERE name = ?3",
        )
        .bind(revision)
        .bind(Self::to_naive(Utc::now()))
        .bind(stack)
        .execute(&self.pool)
        .await
        .context("Failed to update deployed revision")?;

        if result.rows_affected() == 0 {
            return Err(StoreError::StackNotFound(stack.to_string()));
        }
        Ok(())
    }

    async fn create_deploy(&self, deploy: &Deploy) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "INSERT INTO deploys ({DEPLOY_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
        ))
        .bind(deploy.id.to_string())
        .bind(&deploy.stack)
        .bind(&deploy.until_commit)
        .bind(deploy.status.as_str())
        .bind(&deploy.output)
        .bind(Self::to_naive(deploy.created_at))
        .bind(deploy.started_at.map(Self::to_naive))
        .bind(deploy.finished_at.map(Self::to_naive))
        .execute(&self.pool)
        .await
        .context("Failed to create deploy")?;

        Ok(())
    }

    async fn find_deploy(&self, id: DeployId) -> Result<Option<Deploy>, StoreError> {
        let row = sqlx::query(&format!("SELECT {DEPLOY_COLUMNS} FROM deploys WHERE id = ?1"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load deploy")?;

        Ok(row.as_ref().map(Self::deploy_from_row).transpose()?)
    }

    async fn list_deploys(&self, stack: Option<&str>, limit: usize) -> Result<Vec<Deploy>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = match stack {
            Some(stack) => {
                sqlx::query(&format!(
                    "SELECT {DEPLOY_COLUMNS} FROM deploys WHERE stack = ?1 ORDER BY created_at DESC LIMIT ?2"
                ))
                .bind(stack)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {DEPLOY_COLUMNS} FROM deploys ORDER BY created_at DESC LIMIT ?1"
                ))
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
        }
        .context("Failed to list deploys")?;

        Ok(rows
            .iter()
            .map(Self::deploy_from_row)
            .collect::<Result<Vec<_>>>()?)
    }

    async fn transition_status(
        &self,
        id: DeployId,
        from: DeployStatus,
        to: DeployStatus,
    ) -> Result<bool, StoreError> {
        check_transition(id, from, to)?;

        let now = Self::to_naive(Utc::now());
        let started_at = (to == DeployStatus::Running).then_some(now);
        let finished_at = to.is_terminal().then_some(now);

        let result = sqlx::query(
            r#"
            UPDATE deploys
            SET status = ?1,
                started_at = COALESCE(?2, started_at),
                finished_at = COALESCE(?3, finished_at)
            WHERE id = ?4 AND status = ?5
            "#,
        )
        .bind(to.as_str())
        .bind(started_at)
        .bind(finished_at)
        .bind(id.to_string())
        .bind(from.as_str())
        .execute(&self.pool)
        .await
        .context("Failed to update deploy status")?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        // Distinguish a lost race from a missing row
        if self.find_deploy(id).await?.is_none() {
            return Err(StoreError::DeployNotFound(id));
        }
        Ok(false)
    }

    async fn append_output(&self, id: DeployId, chunk: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE deploys SET output = output || ?1 WHERE id = ?2")
            .bind(chunk)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to append deploy output")?;

        if result.rows_affected() == 0 {
            return Err(StoreError::DeployNotFound(id));
        }
        Ok(())
    }
}
