//! SQL Gateway
//!
//! Owns the single libsql connection of an open data space. The connection sits
//! behind a `tokio::sync::Mutex`, which is the one logical execution queue:
//! a standalone statement holds the lock for its own duration, a
//! [`Transaction`] holds it from [`SqlGateway::begin`] until
//! [`Transaction::finish`].
//!
//! # Transactions
//!
//! ```no_run
//! # use dataspace_core::db::{SqlGateway, SqlExecutor, Statement, DatabaseError};
//! # use std::time::Duration;
//! # #[tokio::main]
//! # async fn main() -> Result<(), DatabaseError> {
//! let gateway = SqlGateway::open(":memory:", Duration::from_secs(5)).await?;
//! let tx = gateway.begin().await?;
//! let result = tx.execute(&Statement::text("DELETE FROM ds__docs")?).await;
//! tx.finish(result).await?;
//! # Ok(())
//! # }
//! ```
//!
//! `finish` commits on `Ok` and rolls back on `Err`, handing the original error
//! back unchanged. A transaction dropped without `finish` marks the gateway and
//! the next caller rolls it back before running anything.

use crate::db::error::DatabaseError;
use crate::db::schema;
use crate::db::statement::{SqlRow, SqlValue, Statement};
use async_trait::async_trait;
use libsql::{Builder, Connection, Database};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

/// Path understood by libsql as a private in-memory database
pub const MEMORY_PATH: &str = ":memory:";

/// Anything statements can be run against: the gateway itself or an open
/// transaction.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn query(&self, stmt: &Statement) -> Result<Vec<SqlRow>, DatabaseError>;

    /// Returns the number of rows changed
    async fn execute(&self, stmt: &Statement) -> Result<u64, DatabaseError>;

    async fn query_optional(&self, stmt: &Statement) -> Result<Option<SqlRow>, DatabaseError> {
        Ok(self.query(stmt).await?.into_iter().next())
    }
}

pub struct SqlGateway {
    // Kept alive for the lifetime of `conn`
    _db: Database,
    conn: Mutex<Connection>,
    dangling: AtomicBool,
    db_path: PathBuf,
}

impl fmt::Debug for SqlGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlGateway")
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}

impl SqlGateway {
    /// Open (or create) the database at `db_path` and initialize the metadata
    /// tables.
    ///
    /// This will:
    /// 1. Ensure the parent directory exists
    /// 2. Open the database with the libsql local builder
    /// 3. Apply pragmas (WAL for file databases, busy timeout, foreign keys)
    /// 4. Create the `ds__*` tables if they do not exist
    pub async fn open(
        db_path: impl Into<PathBuf>,
        busy_timeout: Duration,
    ) -> Result<Self, DatabaseError> {
        let db_path = db_path.into();
        let in_memory = db_path.as_os_str() == MEMORY_PATH;

        if db_path.as_os_str().is_empty() {
            return Err(DatabaseError::invalid_path(db_path));
        }

        if !in_memory {
            if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                if !parent.exists() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        if e.kind() == std::io::ErrorKind::PermissionDenied {
                            DatabaseError::permission_denied(db_path.clone())
                        } else {
                            DatabaseError::DirectoryCreationFailed(e)
                        }
                    })?;
                }
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        if !in_memory {
            execute_pragma(&conn, "PRAGMA journal_mode = WAL").await?;
        }
        execute_pragma(
            &conn,
            &format!("PRAGMA busy_timeout = {}", busy_timeout.as_millis()),
        )
        .await?;
        execute_pragma(&conn, "PRAGMA foreign_keys = ON").await?;

        schema::initialize_schema(&conn).await?;
        tracing::info!("Opened data space database at {}", db_path.display());

        Ok(Self {
            _db: db,
            conn: Mutex::new(conn),
            dangling: AtomicBool::new(false),
            db_path,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Wait for the execution queue, rolling back any transaction that was
    /// dropped without being finished.
    async fn lock(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        let conn = self.conn.lock().await;
        if self.dangling.swap(false, Ordering::SeqCst) && !conn.is_autocommit() {
            tracing::warn!("Rolling back transaction that was dropped without finishing");
            conn.execute("ROLLBACK", ()).await?;
        }
        Ok(conn)
    }

    /// Start a transaction, holding the connection until it is finished
    pub async fn begin(&self) -> Result<Transaction<'_>, DatabaseError> {
        let conn = self.lock().await?;
        tracing::debug!("BEGIN");
        conn.execute("BEGIN", ()).await?;
        Ok(Transaction {
            conn,
            dangling: &self.dangling,
            forward: Vec::new(),
            inverse_groups: Vec::new(),
            finished: false,
        })
    }

    /// Run `statements` in order inside one transaction, reporting the percent
    /// completed after each one. Returns the total number of changed rows.
    pub async fn execute_batch<F>(
        &self,
        statements: &[Statement],
        mut progress: F,
    ) -> Result<u64, DatabaseError>
    where
        F: FnMut(u8) + Send,
    {
        let tx = self.begin().await?;
        let mut result = Ok(0u64);
        for (idx, stmt) in statements.iter().enumerate() {
            match tx.execute(stmt).await {
                Ok(n) => {
                    if let Ok(total) = result.as_mut() {
                        *total += n;
                    }
                    progress(percent(idx + 1, statements.len()));
                }
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        tx.finish(result).await
    }
}

#[async_trait]
impl SqlExecutor for SqlGateway {
    async fn query(&self, stmt: &Statement) -> Result<Vec<SqlRow>, DatabaseError> {
        let conn = self.lock().await?;
        run_query(&conn, stmt).await
    }

    async fn execute(&self, stmt: &Statement) -> Result<u64, DatabaseError> {
        let conn = self.lock().await?;
        run_execute(&conn, stmt).await
    }
}

/// Statements executed in a transaction together with the statements that undo
/// them, newest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Journal {
    pub forward: Vec<Statement>,
    pub inverse: Vec<Statement>,
}

impl Journal {
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}

/// An open transaction on the gateway's connection
pub struct Transaction<'a> {
    conn: MutexGuard<'a, Connection>,
    dangling: &'a AtomicBool,
    forward: Vec<Statement>,
    inverse_groups: Vec<Vec<Statement>>,
    finished: bool,
}

impl Transaction<'_> {
    /// Execute a mutation and journal it together with the statements that
    /// revert it.
    pub async fn apply(
        &mut self,
        forward: Statement,
        inverse: Vec<Statement>,
    ) -> Result<u64, DatabaseError> {
        let changed = run_execute(&self.conn, &forward).await?;
        self.forward.push(forward);
        self.inverse_groups.push(inverse);
        Ok(changed)
    }

    /// Run previously journaled statements without journaling them again
    pub async fn replay(&self, statements: &[Statement]) -> Result<(), DatabaseError> {
        for stmt in statements {
            run_execute(&self.conn, stmt).await?;
        }
        Ok(())
    }

    /// Everything applied so far; inverse statements come out in reverse order
    pub fn take_journal(&mut self) -> Journal {
        let forward = std::mem::take(&mut self.forward);
        let inverse = std::mem::take(&mut self.inverse_groups)
            .into_iter()
            .rev()
            .flatten()
            .collect();
        Journal { forward, inverse }
    }

    /// Commit if `result` is `Ok`, roll back otherwise.
    ///
    /// The body's error is returned unchanged. Only a failing COMMIT or
    /// ROLLBACK produces [`DatabaseError::TransactionAborted`].
    pub async fn finish<T, E>(mut self, result: Result<T, E>) -> Result<T, E>
    where
        E: From<DatabaseError> + fmt::Display,
    {
        self.finished = true;
        match result {
            Ok(value) => {
                tracing::debug!("COMMIT");
                if let Err(commit_err) = self.conn.execute("COMMIT", ()).await {
                    let context = match self.rollback().await {
                        Ok(()) => format!("commit failed: {commit_err}"),
                        Err(rb) => format!("commit failed: {commit_err}; rollback failed: {rb}"),
                    };
                    return Err(DatabaseError::transaction_aborted(context).into());
                }
                Ok(value)
            }
            Err(err) => {
                tracing::warn!("Rolling back transaction: {}", err);
                if let Err(rb) = self.rollback().await {
                    return Err(DatabaseError::transaction_aborted(format!(
                        "{err}; rollback failed: {rb}"
                    ))
                    .into());
                }
                Err(err)
            }
        }
    }

    async fn rollback(&self) -> Result<(), libsql::Error> {
        // the engine may already have rolled back on its own
        if self.conn.is_autocommit() {
            return Ok(());
        }
        self.conn.execute("ROLLBACK", ()).await.map(|_| ())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.dangling.store(true, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl SqlExecutor for Transaction<'_> {
    async fn query(&self, stmt: &Statement) -> Result<Vec<SqlRow>, DatabaseError> {
        run_query(&self.conn, stmt).await
    }

    async fn execute(&self, stmt: &Statement) -> Result<u64, DatabaseError> {
        run_execute(&self.conn, stmt).await
    }
}

async fn run_query(conn: &Connection, stmt: &Statement) -> Result<Vec<SqlRow>, DatabaseError> {
    tracing::debug!(sql = stmt.sql(), params = stmt.params().len(), "query");
    let mut rows = conn.query(stmt.sql(), stmt.libsql_params()).await?;

    let column_count = rows.column_count();
    let columns: Vec<String> = (0..column_count)
        .map(|idx| rows.column_name(idx).unwrap_or_default().to_string())
        .collect();

    let mut out = Vec::new();
    while let Some(row) = rows.next().await? {
        let mut values = Vec::with_capacity(columns.len());
        for idx in 0..column_count {
            values.push(SqlValue::from(row.get_value(idx)?));
        }
        out.push(SqlRow::new(columns.clone(), values));
    }
    Ok(out)
}

async fn run_execute(conn: &Connection, stmt: &Statement) -> Result<u64, DatabaseError> {
    tracing::debug!(sql = stmt.sql(), params = stmt.params().len(), "execute");
    Ok(conn.execute(stmt.sql(), stmt.libsql_params()).await?)
}

/// PRAGMA statements return rows, so they go through `query`
async fn execute_pragma(conn: &Connection, pragma: &str) -> Result<(), DatabaseError> {
    conn.query(pragma, ()).await.map_err(|e| {
        DatabaseError::initialization_failed(format!("Failed to execute '{}': {}", pragma, e))
    })?;
    Ok(())
}

pub(crate) fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done * 100) / total).min(100) as u8
}
