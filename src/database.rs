use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::anyhow;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::config::{Language, ToolchainConfig};
use crate::judge::TestCase;
use crate::session::SessionState;

const DATABASE_NAME: &str = "psjudge.sqlite3";

pub fn get_db_path() -> anyhow::Result<PathBuf> {
    use directories::ProjectDirs;

    let proj_dirs = ProjectDirs::from("", "", "psjudge")
        .ok_or_else(|| anyhow!("Unable to find user directory"))?;
    let data_dir = proj_dirs.data_local_dir();

    fs::create_dir_all(data_dir)?;

    Ok(data_dir.join(DATABASE_NAME))
}

pub async fn init_db(db_path: impl AsRef<Path>) -> sqlx::Result<SqlitePool> {
    let db_url = format!("sqlite://{}?mode=rwc", db_path.as_ref().display()); // rwc = read/write/create
    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(0)
        .connect(&db_url)
        .await?;

    for pragma_sql in &[
        "PRAGMA busy_timeout = 2000;",
        "PRAGMA journal_mode = WAL;",
        "PRAGMA synchronous = NORMAL;",
    ] {
        sqlx::query(pragma_sql).execute(&db_pool).await?;
    }

    let mut tx = db_pool.begin().await?;

    // Both tables hold a single row with id 0
    for sql in &[
        r"
        CREATE TABLE IF NOT EXISTS settings (
            id            INTEGER  PRIMARY KEY CHECK (id = 0),
            toolchains    TEXT     NOT NULL,
            updated_time  TEXT     NOT NULL
        );",
        r"
        CREATE TABLE IF NOT EXISTS session (
            id            INTEGER  PRIMARY KEY CHECK (id = 0),
            state         TEXT     NOT NULL,
            updated_time  TEXT     NOT NULL
        );",
    ] {
        sqlx::query(sql).execute(tx.as_mut()).await?;
    }

    tx.commit().await?;

    log::info!("Initialized database at {}", db_path.as_ref().display());

    Ok(db_pool)
}

pub fn remove_db(db_path: impl AsRef<Path>) {
    // WAL and SHM files might not exist
    let wal_path = format!("{}-wal", db_path.as_ref().display());
    let shm_path = format!("{}-shm", db_path.as_ref().display());
    let _ = fs::remove_file(wal_path);
    let _ = fs::remove_file(shm_path);

    if let Err(e) = fs::remove_file(&db_path) {
        log::warn!(
            "Unable to remove database at {}: {e}",
            db_path.as_ref().display()
        );
    } else {
        log::info!("Removed database at {}", db_path.as_ref().display());
    }
}

pub async fn load_toolchains(pool: Arc<SqlitePool>) -> anyhow::Result<Option<ToolchainConfig>> {
    let row = sqlx::query("SELECT toolchains FROM settings WHERE id = 0")
        .fetch_optional(pool.as_ref())
        .await?;
    decode_column(row, "toolchains")
}

pub async fn save_toolchains(
    toolchains: &ToolchainConfig,
    pool: Arc<SqlitePool>,
) -> anyhow::Result<()> {
    let encoded = encode(toolchains)?;
    sqlx::query(
        r#"
        INSERT INTO settings (id, toolchains, updated_time) VALUES (0, ?, ?)
        ON CONFLICT(id) DO UPDATE SET toolchains = excluded.toolchains, updated_time = excluded.updated_time
        "#,
    )
    .bind(encoded)
    .bind(crate::create_timestamp())
    .execute(pool.as_ref())
    .await?;

    log::debug!("Saved toolchain settings");
    Ok(())
}

pub async fn load_session(pool: Arc<SqlitePool>) -> anyhow::Result<Option<SessionState>> {
    let row = sqlx::query("SELECT state FROM session WHERE id = 0")
        .fetch_optional(pool.as_ref())
        .await?;
    decode_column(row, "state")
}

pub async fn save_session(session: &SessionState, pool: Arc<SqlitePool>) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;
    write_session(session, &mut tx).await?;
    tx.commit().await?;

    log::debug!("Saved session");
    Ok(())
}

/// Stores a finished run: the judged language and source become the session's
/// current code, next to the verdicts they produced
pub async fn save_judged_run(
    language: &str,
    source_code: &str,
    cases: &[TestCase],
    pool: Arc<SqlitePool>,
) -> anyhow::Result<()> {
    let language: Language = language.parse()?;
    let mut tx = pool.begin().await?;

    let row = sqlx::query("SELECT state FROM session WHERE id = 0")
        .fetch_optional(tx.as_mut())
        .await?;
    let mut session: SessionState = decode_column(row, "state")?.unwrap_or_default();
    session.language = language;
    session.codes.insert(language, source_code.to_string());
    session.test_cases = cases.to_vec();
    write_session(&session, &mut tx).await?;

    tx.commit().await?;

    log::debug!("Saved {} test case result(s) for {language}", cases.len());
    Ok(())
}

async fn write_session(
    session: &SessionState,
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
) -> anyhow::Result<()> {
    let encoded = encode(session)?;
    sqlx::query(
        r#"
        INSERT INTO session (id, state, updated_time) VALUES (0, ?, ?)
        ON CONFLICT(id) DO UPDATE SET state = excluded.state, updated_time = excluded.updated_time
        "#,
    )
    .bind(encoded)
    .bind(crate::create_timestamp())
    .execute(tx.as_mut())
    .await?;
    Ok(())
}

fn encode<T: Serialize>(value: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string(value)?)
}

fn decode_column<T: DeserializeOwned>(
    row: Option<sqlx::sqlite::SqliteRow>,
    column: &str,
) -> anyhow::Result<Option<T>> {
    let Some(row) = row else {
        return Ok(None);
    };
    let raw: String = row.try_get(column)?;
    Ok(Some(serde_json::from_str(&raw)?))
}
