//! # Database Migration Runner
//!
//! Applies the timestamp-ordered `.sql` files from `migrations/` under a
//! PostgreSQL advisory lock, so competing workers starting at the same
//! moment cannot race the schema into a half-built state. Applied versions
//! are recorded in `stepflow_schema_migrations`; re-running is a no-op.

use sqlx::{PgPool, Row};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Advisory lock key for schema mutation; shared by every worker binary.
const MIGRATION_LOCK_KEY: i64 = 7_247_116_523_401_889;

/// Represents a single migration file
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version timestamp (YYYYMMDDHHMMSS)
    pub version: String,
    /// Human-readable migration name
    pub name: String,
    /// Full path to the SQL file
    pub path: PathBuf,
}

pub struct DatabaseMigrations;

impl DatabaseMigrations {
    /// Run all pending migrations from the default `migrations/` directory
    pub async fn run_all(pool: &PgPool) -> Result<(), sqlx::Error> {
        Self::run_from_dir(pool, Path::new("migrations")).await
    }

    /// Run all pending migrations discovered in `dir`
    pub async fn run_from_dir(pool: &PgPool, dir: &Path) -> Result<(), sqlx::Error> {
        let migrations = Self::discover(dir)?;

        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(pool)
            .await?;

        let result = Self::apply_all(pool, &migrations).await;

        sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(pool)
            .await?;

        result
    }

    async fn apply_all(pool: &PgPool, migrations: &BTreeMap<String, Migration>) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS stepflow_schema_migrations (
                 version VARCHAR(14) PRIMARY KEY,
                 applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
             )",
        )
        .execute(pool)
        .await?;

        for migration in migrations.values() {
            let applied = sqlx::query(
                "SELECT EXISTS (SELECT 1 FROM stepflow_schema_migrations WHERE version = $1) AS applied",
            )
            .bind(&migration.version)
            .fetch_one(pool)
            .await?
            .get::<bool, _>("applied");

            if applied {
                continue;
            }

            tracing::info!(
                version = %migration.version,
                name = %migration.name,
                "Applying migration"
            );

            let sql = fs::read_to_string(&migration.path).map_err(sqlx::Error::Io)?;
            let mut tx = pool.begin().await?;
            sqlx::raw_sql(&sql).execute(&mut *tx).await?;
            sqlx::query("INSERT INTO stepflow_schema_migrations (version) VALUES ($1)")
                .bind(&migration.version)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
        }

        Ok(())
    }

    /// Discover migration files named `<version>_<name>.sql`, ordered by
    /// version
    fn discover(dir: &Path) -> Result<BTreeMap<String, Migration>, sqlx::Error> {
        let mut migrations = BTreeMap::new();

        if !dir.exists() {
            return Ok(migrations);
        }

        for entry in fs::read_dir(dir).map_err(sqlx::Error::Io)? {
            let entry = entry.map_err(sqlx::Error::Io)?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("sql") {
                continue;
            }

            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Some((version, name)) = stem.split_once('_') else {
                continue;
            };
            if version.len() != 14 || !version.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }

            migrations.insert(
                version.to_string(),
                Migration {
                    version: version.to_string(),
                    name: name.to_string(),
                    path,
                },
            );
        }

        Ok(migrations)
    }
}
