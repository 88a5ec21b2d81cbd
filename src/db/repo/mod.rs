//! Repository layer for database operations.
//!
//! Methods are organized across submodules by table:
//! - `actions.rs` - the append-only action log
//! - `aggregates.rs` - ownership and player stats
//! - `leaderboard.rs` - ranked listings and totals
//!
//! Functions taking a `&mut SqliteConnection` run inside a caller-owned
//! transaction (see [`Repository::begin`]).

mod actions;
mod aggregates;
mod leaderboard;

use sqlx::sqlite::{Sqlite, SqlitePool};
use sqlx::Transaction;

pub use actions::LastActionTimes;

/// Repository for database operations.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    /// Start a transaction for multi-statement writes.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
        self.pool.begin().await
    }

    /// Cheap connectivity probe.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn decode_error(msg: impl Into<String>) -> sqlx::Error {
    let msg: String = msg.into();
    sqlx::Error::Decode(msg.into())
}

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Repository;
    use crate::db::init_db;
    use tempfile::TempDir;

    pub async fn setup_test_db() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        (Repository::new(pool), temp_dir)
    }
}
