use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use linkhop_core::{
    Backend, BatchReport, LinkRecord, NewLink, Result, ShortCode, StorageError, User, UserId,
};
use sqlx::mysql::{MySqlPoolOptions, MySqlRow};
use sqlx::{Connection, MySql, MySqlPool, QueryBuilder, Row};
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

const USERS_DDL: &str = include_str!("../ddl/mysql/users.sql");
const URLS_DDL: &str = include_str!("../ddl/mysql/urls.sql");

const ORIGIN_URL_IDX: &str = "origin_url_idx";

const INSERT_URL: &str = r#"
    INSERT INTO urls (uuid, short_url, origin_url, user_id, is_deleted)
    VALUES (?, ?, ?, ?, FALSE)
"#;

/// Pool size and per-call time limits for [`MySqlBackend`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct MySqlBackendOptions {
    #[builder(default = 10)]
    pub max_connections: u32,
    /// Upper bound for every query, insert and transaction.
    #[builder(default = Duration::from_secs(3))]
    pub statement_timeout: Duration,
    #[builder(default = Duration::from_secs(1))]
    pub health_timeout: Duration,
    #[builder(default = Duration::from_secs(5))]
    pub schema_timeout: Duration,
}

impl Default for MySqlBackendOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// MySQL implementation of the backend contract.
///
/// Links live in `urls` and users in `users`, both created by
/// [`Backend::restore`]. URLs are stored as `TEXT`; a unique index on their
/// SHA-256 makes a second submission of the same URL report
/// [`StorageError::Conflict`]. Deletion
/// flips `is_deleted` on rows owned by the caller; rows are never removed.
#[derive(Debug, Clone)]
pub struct MySqlBackend {
    pool: MySqlPool,
    options: MySqlBackendOptions,
}

impl MySqlBackend {
    /// Creates a backend from an existing MySQL connection pool.
    pub fn new(pool: MySqlPool, options: MySqlBackendOptions) -> Self {
        Self { pool, options }
    }

    /// Creates a backend by opening a new MySQL connection pool.
    pub async fn connect(database_url: &str, options: MySqlBackendOptions) -> Result<Self> {
        let pool = bounded(options.schema_timeout, "connect", async {
            MySqlPoolOptions::new()
                .max_connections(options.max_connections)
                .acquire_timeout(options.statement_timeout)
                .connect(database_url)
                .await
                .map_err(map_sqlx_error)
        })
        .await?;

        Ok(Self::new(pool, options))
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    pub fn options(&self) -> &MySqlBackendOptions {
        &self.options
    }
}

/// Runs a storage call under `limit`; running out of time is a failure.
async fn bounded<T, F>(limit: Duration, op: &'static str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(StorageError::Timeout(format!(
            "{op} did not finish within {}ms",
            limit.as_millis()
        ))),
    }
}

/// Returns the violated key (or the server message) for unique violations.
fn unique_violation(err: &sqlx::Error) -> Option<String> {
    let db = err.as_database_error()?;
    if !db.is_unique_violation() {
        return None;
    }
    Some(
        db.constraint()
            .map(str::to_owned)
            .unwrap_or_else(|| db.message().to_owned()),
    )
}

fn map_insert_error(err: sqlx::Error, link: &NewLink) -> StorageError {
    match unique_violation(&err) {
        Some(key) if key.contains(ORIGIN_URL_IDX) => {
            StorageError::Conflict(link.original_url.clone())
        }
        Some(_) => StorageError::IdTaken(link.code.to_string()),
        None => map_sqlx_error(err),
    }
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Configuration(_)
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

fn parse_code(raw: String) -> Result<ShortCode> {
    ShortCode::new(raw).map_err(|e| StorageError::InvalidData(e.to_string()))
}

fn link_from_row(row: &MySqlRow) -> Result<LinkRecord> {
    let short_url: String = row.try_get("short_url").map_err(map_sqlx_error)?;
    let user_id: Option<i64> = row.try_get("user_id").map_err(map_sqlx_error)?;

    Ok(LinkRecord {
        uuid: row.try_get("uuid").map_err(map_sqlx_error)?,
        code: parse_code(short_url)?,
        original_url: row.try_get("origin_url").map_err(map_sqlx_error)?,
        owner: user_id.map(UserId::new),
        deleted: row.try_get("is_deleted").map_err(map_sqlx_error)?,
    })
}

#[async_trait]
impl Backend for MySqlBackend {
    async fn restore(&self) -> Result<()> {
        bounded(self.options.schema_timeout, "restore", async {
            sqlx::query(USERS_DDL)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
            sqlx::query(URLS_DDL)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
            Ok(())
        })
        .await?;

        info!("mysql schema ready");
        Ok(())
    }

    async fn add(&self, link: NewLink) -> Result<()> {
        bounded(self.options.statement_timeout, "add", async {
            sqlx::query(INSERT_URL)
                .bind(link.uuid.as_str())
                .bind(link.code.as_str())
                .bind(link.original_url.as_str())
                .bind(link.owner.get())
                .execute(&self.pool)
                .await
                .map_err(|e| map_insert_error(e, &link))?;
            Ok(())
        })
        .await
    }

    async fn add_batch(&self, links: Vec<NewLink>) -> Result<BatchReport> {
        if links.is_empty() {
            return Ok(BatchReport::default());
        }

        bounded(self.options.statement_timeout, "add_batch", async {
            let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
            let mut stored = Vec::with_capacity(links.len());

            for link in &links {
                let inserted = sqlx::query(INSERT_URL)
                    .bind(link.uuid.as_str())
                    .bind(link.code.as_str())
                    .bind(link.original_url.as_str())
                    .bind(link.owner.get())
                    .execute(&mut *tx)
                    .await;

                if let Err(e) = inserted {
                    let err = map_insert_error(e, link);
                    warn!(code = %link.code, error = %err, "rolling back batch");
                    tx.rollback().await.map_err(map_sqlx_error)?;
                    return Err(err);
                }
                stored.push(link.code.clone());
            }

            tx.commit().await.map_err(map_sqlx_error)?;
            debug!(count = stored.len(), "committed batch");

            Ok(BatchReport {
                stored,
                failed: Vec::new(),
            })
        })
        .await
    }

    async fn get(&self, code: &ShortCode) -> Result<String> {
        let row = bounded(self.options.statement_timeout, "get", async {
            sqlx::query(
                r#"
                SELECT origin_url, is_deleted
                FROM urls
                WHERE short_url = ?
                LIMIT 1
                "#,
            )
            .bind(code.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)
        })
        .await?;

        let Some(row) = row else {
            return Err(StorageError::NotFound(code.to_string()));
        };

        let deleted: bool = row.try_get("is_deleted").map_err(map_sqlx_error)?;
        if deleted {
            return Err(StorageError::Deleted(code.to_string()));
        }

        row.try_get("origin_url").map_err(map_sqlx_error)
    }

    async fn delete_batch(&self, owner: UserId, codes: &[ShortCode]) -> Result<usize> {
        if codes.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<MySql> = QueryBuilder::new(
            "UPDATE urls SET is_deleted = TRUE WHERE is_deleted = FALSE AND user_id = ",
        );
        builder.push_bind(owner.get());
        builder.push(" AND short_url IN (");
        let mut separated = builder.separated(", ");
        for code in codes {
            separated.push_bind(code.as_str().to_owned());
        }
        separated.push_unseparated(")");

        let result = bounded(self.options.statement_timeout, "delete_batch", async {
            builder
                .build()
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)
        })
        .await?;

        Ok(result.rows_affected() as usize)
    }

    async fn get_by_origin_url(&self, original_url: &str) -> Result<ShortCode> {
        let row = bounded(self.options.statement_timeout, "get_by_origin_url", async {
            sqlx::query(
                r#"
                SELECT short_url
                FROM urls
                WHERE origin_hash = UNHEX(SHA2(?, 256)) AND origin_url = ?
                LIMIT 1
                "#,
            )
            .bind(original_url)
            .bind(original_url)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)
        })
        .await?;

        let Some(row) = row else {
            return Err(StorageError::NotFound(original_url.to_owned()));
        };

        parse_code(row.try_get("short_url").map_err(map_sqlx_error)?)
    }

    async fn list_by_owner(&self, owner: UserId) -> Result<Vec<LinkRecord>> {
        let rows = bounded(self.options.statement_timeout, "list_by_owner", async {
            sqlx::query(
                r#"
                SELECT uuid, short_url, origin_url, user_id, is_deleted
                FROM urls
                WHERE user_id = ?
                "#,
            )
            .bind(owner.get())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)
        })
        .await?;

        rows.iter().map(link_from_row).collect()
    }

    async fn health_check(&self) -> Result<()> {
        bounded(self.options.health_timeout, "health_check", async {
            let mut conn = self.pool.acquire().await.map_err(map_sqlx_error)?;
            conn.ping().await.map_err(map_sqlx_error)
        })
        .await
    }

    async fn create_user(&self) -> Result<User> {
        let result = bounded(self.options.statement_timeout, "create_user", async {
            sqlx::query("INSERT INTO users (cookie) VALUES (NULL)")
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)
        })
        .await?;

        let id = i64::try_from(result.last_insert_id())
            .map_err(|e| StorageError::InvalidData(format!("user id out of range: {e}")))?;

        Ok(User {
            id: UserId::new(id),
            token: None,
        })
    }

    async fn find_user_by_id(&self, id: UserId) -> Result<Option<User>> {
        let row = bounded(self.options.statement_timeout, "find_user_by_id", async {
            sqlx::query("SELECT id, cookie FROM users WHERE id = ? LIMIT 1")
                .bind(id.get())
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)
        })
        .await?;

        row.map(|row| -> Result<User> {
            Ok(User {
                id: UserId::new(row.try_get("id").map_err(map_sqlx_error)?),
                token: row.try_get("cookie").map_err(map_sqlx_error)?,
            })
        })
        .transpose()
    }

    async fn set_user_token(&self, id: UserId, token: &str) -> Result<()> {
        bounded(self.options.statement_timeout, "set_user_token", async {
            let updated = sqlx::query("UPDATE users SET cookie = ? WHERE id = ?")
                .bind(token)
                .bind(id.get())
                .execute(&self.pool)
                .await;

            match updated {
                Ok(_) => Ok(()),
                Err(e) if unique_violation(&e).is_some() => Err(StorageError::Conflict(format!(
                    "session token already bound to another user than {id}"
                ))),
                Err(e) => Err(map_sqlx_error(e)),
            }
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}
