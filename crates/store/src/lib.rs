use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use survey_contracts::answers::{decode_answers, encode_answers};
use survey_contracts::{Answers, Response};

const SELECT_COLUMNS: &str = "SELECT id, created_at, source, metadata, answers, email, ip FROM responses";

#[derive(Debug)]
pub enum StoreError {
    Timeout,
    Io(std::io::Error),
    Sqlx(sqlx::Error),
    Encode(serde_json::Error),
    Corrupt { id: i64 },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Timeout => write!(f, "store operation timed out"),
            StoreError::Io(err) => write!(f, "store io error: {}", err),
            StoreError::Sqlx(err) => write!(f, "store sql error: {}", err),
            StoreError::Encode(err) => write!(f, "failed to encode answers: {}", err),
            StoreError::Corrupt { id } => {
                write!(f, "stored answers for response {} are not a JSON object", id)
            }
        }
    }
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(value: sqlx::Error) -> Self {
        StoreError::Sqlx(value)
    }
}

/// Fields of a response about to be appended. The id is assigned by the store.
pub struct NewResponse<'a> {
    pub created_at: &'a str,
    pub source: &'a str,
    pub metadata: &'a str,
    pub answers: &'a Answers,
    pub email: &'a str,
    pub ip: &'a str,
}

/// Append-only response table backed by a single SQLite file.
///
/// Clones share one connection pool. SQLite serializes writers itself and
/// every write is a single-row insert, so no locking happens here.
#[derive(Clone)]
pub struct ResponseStore {
    pool: SqlitePool,
    op_timeout: Duration,
}

impl ResponseStore {
    pub async fn open(path: &Path, op_timeout: Duration) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(StoreError::Io)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(op_timeout);

        let pool = tokio::time::timeout(
            Duration::from_secs(2),
            SqlitePoolOptions::new()
                .max_connections(8)
                .connect_with(options),
        )
        .await
        .map_err(|_| StoreError::Timeout)??;

        Ok(Self { pool, op_timeout })
    }

    pub async fn open_and_migrate(path: &Path, op_timeout: Duration) -> Result<Self, StoreError> {
        let store = Self::open(path, op_timeout).await?;
        store.migrate().await?;
        tracing::info!(db_file = %path.display(), "response store ready");
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        tokio::time::timeout(Duration::from_secs(10), migrate(&self.pool))
            .await
            .map_err(|_| StoreError::Timeout)??;
        Ok(())
    }

    pub async fn insert(&self, record: NewResponse<'_>) -> Result<i64, StoreError> {
        let answers = encode_answers(record.answers).map_err(StoreError::Encode)?;

        let result = tokio::time::timeout(
            self.op_timeout,
            sqlx::query(
                "INSERT INTO responses (created_at, source, metadata, answers, email, ip) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(record.created_at)
            .bind(record.source)
            .bind(record.metadata)
            .bind(&answers)
            .bind(record.email)
            .bind(record.ip)
            .execute(&self.pool),
        )
        .await
        .map_err(|_| StoreError::Timeout)??;

        Ok(result.last_insert_rowid())
    }

    /// Newest-first listing. A non-empty `filter` keeps rows whose metadata or
    /// serialized answers contain it literally; `%` and `_` carry no meaning.
    pub async fn list_all(&self, filter: Option<&str>) -> Result<Vec<Response>, StoreError> {
        let needle = filter.filter(|f| !f.is_empty());

        let rows = tokio::time::timeout(self.op_timeout, async {
            match needle {
                Some(needle) => {
                    let sql = format!(
                        "{} WHERE instr(answers, ?) > 0 OR instr(metadata, ?) > 0 ORDER BY id DESC",
                        SELECT_COLUMNS
                    );
                    sqlx::query(&sql)
                        .bind(needle)
                        .bind(needle)
                        .fetch_all(&self.pool)
                        .await
                }
                None => {
                    let sql = format!("{} ORDER BY id DESC", SELECT_COLUMNS);
                    sqlx::query(&sql).fetch_all(&self.pool).await
                }
            }
        })
        .await
        .map_err(|_| StoreError::Timeout)??;

        rows.iter().map(response_from_row).collect()
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Response>, StoreError> {
        let sql = format!("{} WHERE id = ?", SELECT_COLUMNS);
        let row = tokio::time::timeout(
            self.op_timeout,
            sqlx::query(&sql).bind(id).fetch_optional(&self.pool),
        )
        .await
        .map_err(|_| StoreError::Timeout)??;

        row.as_ref().map(response_from_row).transpose()
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        let row = tokio::time::timeout(
            self.op_timeout,
            sqlx::query("SELECT COUNT(*) AS n FROM responses").fetch_one(&self.pool),
        )
        .await
        .map_err(|_| StoreError::Timeout)??;

        Ok(row.try_get::<i64, _>("n")?)
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        tokio::time::timeout(
            self.op_timeout,
            sqlx::query("SELECT 1").execute(&self.pool),
        )
        .await
        .map_err(|_| StoreError::Timeout)??;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn response_from_row(row: &SqliteRow) -> Result<Response, StoreError> {
    let id: i64 = row.try_get("id")?;
    let answers_raw: String = row.try_get("answers")?;
    let answers = decode_answers(&answers_raw).map_err(|_| StoreError::Corrupt { id })?;

    Ok(Response {
        id,
        created_at: row.try_get("created_at")?,
        source: row.try_get("source")?,
        metadata: row.try_get("metadata")?,
        answers,
        email: row.try_get("email")?,
        ip: row.try_get("ip")?,
    })
}

pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
