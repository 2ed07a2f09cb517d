//! Minimal async database layer for leadgate (sqlite + sqlx)
//!
//! Usage:
//! let db = Db::connect("sqlite://leadgate.db?mode=rwc", 5).await?;
//! apply_migration_files(Arc::new(db.clone()), "migrations").await?;
//! db.insert_lead(&lead).await?
use crate::models::{LeadStore, NewLead, NewPlanOrder};
use log::{debug, info, warn};
use sha2::{Digest, Sha256};
pub use sqlx::FromRow;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Executor, SqlitePool};
use std::fs;
use std::sync::Arc;
use walkdir::WalkDir;

/// An async database pool wrapper.
#[derive(Clone)]
pub struct Db {
    pool: SqlitePool,
}

// Helper function to hash a migration file
fn hash(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl Db {
    /// Connect (or create) a SQLite database at the given URI
    pub async fn connect(uri: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        info!("Connecting to SQLite database at URI: {}", uri);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(uri)
            .await?;
        info!("Connected to SQLite database: {}", uri);
        Ok(Db { pool })
    }

    /// A private in-memory database. One connection, so every statement sees the same data.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Ok(Db { pool })
    }

    /// Execute an arbitrary SQL statement, e.g. DDL.
    pub async fn execute(&self, sql: &str) -> Result<(), sqlx::Error> {
        debug!("Executing SQL: {}", sql);
        let result = self.pool.execute(sql).await;
        if let Err(e) = &result {
            log::error!("SQL execution failed: {}", e);
        }
        result.map(|_| ())
    }

    /// Fetch all rows and map to a type implementing `FromRow`.
    pub async fn fetch_all<T: for<'r> FromRow<'r, sqlx::sqlite::SqliteRow> + Send + Unpin>(
        &self,
        sql: &str,
    ) -> Result<Vec<T>, sqlx::Error> {
        debug!("Fetching rows with SQL: {}", sql);
        let result = sqlx::query_as(sql).fetch_all(&self.pool).await;
        match &result {
            Ok(rows) => debug!("Fetched {} rows", rows.len()),
            Err(e) => log::error!("Row fetch failed: {}", e),
        }
        result
    }

    /// Close the pool; later calls fail with `PoolClosed`.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait::async_trait]
impl LeadStore for Db {
    async fn insert_lead(&self, lead: &NewLead) -> Result<i64, sqlx::Error> {
        let done = sqlx::query(
            "INSERT INTO customers (
                software, source, name, company_name, email, phone,
                address, area, city, post_code, country, note,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&lead.software)
        .bind(&lead.source)
        .bind(&lead.name)
        .bind(&lead.company_name)
        .bind(&lead.email)
        .bind(&lead.phone)
        .bind(&lead.address)
        .bind(&lead.area)
        .bind(&lead.city)
        .bind(&lead.post_code)
        .bind(&lead.country)
        .bind(&lead.note)
        .bind(&lead.created_at)
        .bind(&lead.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(done.last_insert_rowid())
    }

    async fn insert_plan_order(&self, order: &NewPlanOrder) -> Result<i64, sqlx::Error> {
        let done = sqlx::query(
            "INSERT INTO plans (
                software, source, name, company_name, email, phone,
                address, area, city, post_code, country, plan,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&order.software)
        .bind(&order.source)
        .bind(&order.name)
        .bind(&order.company_name)
        .bind(&order.email)
        .bind(&order.phone)
        .bind(&order.address)
        .bind(&order.area)
        .bind(&order.city)
        .bind(&order.post_code)
        .bind(&order.country)
        .bind(&order.plan)
        .bind(&order.created_at)
        .bind(&order.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(done.last_insert_rowid())
    }
}

/// Applies file-based migrations located in the `migrations_dir` directory.
/// Each migration file should be a *.sql file.
/// Already-applied migrations are skipped based on filename tracking in __leadgate_migrations;
/// an applied file whose contents changed since is reported, never re-run.
/// Returns the number of files applied by this call.
pub async fn apply_migration_files(db: Arc<Db>, migrations_dir: &str) -> Result<usize, sqlx::Error> {
    db.execute(
        "CREATE TABLE IF NOT EXISTS __leadgate_migrations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            filename TEXT UNIQUE NOT NULL,
            checksum TEXT NOT NULL,
            applied_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
    )
    .await?;

    // List .sql files in migrations directory, sorted by filename
    let mut files: Vec<_> = WalkDir::new(migrations_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|f| f.file_type().is_file())
        .filter(|f| f.path().extension().map(|e| e == "sql").unwrap_or(false))
        .collect();
    files.sort_by_key(|f| f.file_name().to_os_string());

    let mut applied_now = 0;
    for entry in files {
        let filename = entry.file_name().to_string_lossy().to_string();
        let sql = fs::read_to_string(entry.path()).map_err(sqlx::Error::Io)?;
        let checksum = hash(&sql);

        let applied: Option<(String,)> =
            sqlx::query_as("SELECT checksum FROM __leadgate_migrations WHERE filename = ?")
                .bind(&filename)
                .fetch_optional(&db.pool)
                .await?;
        if let Some((recorded,)) = applied {
            if recorded != checksum {
                warn!(
                    "Migration `{}` changed after it was applied; leaving schema as is.",
                    filename
                );
            } else {
                debug!("Migration `{}` already applied.", filename);
            }
            continue;
        }

        info!("Applying migration file: {}", filename);
        db.execute(&sql).await?;
        sqlx::query("INSERT INTO __leadgate_migrations (filename, checksum) VALUES (?, ?)")
            .bind(&filename)
            .bind(&checksum)
            .execute(&db.pool)
            .await?;
        info!("Migration `{}` applied.", filename);
        applied_now += 1;
    }

    Ok(applied_now)
}
