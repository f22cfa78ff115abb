use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;
use crate::models::Collection;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index on an already-open pool. Idempotent.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Tag catalog, keyed by unique display name
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tags (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Taggable collections share one shape. tags_json may be NULL for
    // rows written before tagging existed.
    for collection in Collection::ALL {
        let table = collection.table();
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                body TEXT NOT NULL DEFAULT '',
                tags_json TEXT,
                metadata_json TEXT NOT NULL DEFAULT '{{}}',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#
        ))
        .execute(pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_updated_at ON {table}(updated_at DESC)"
        ))
        .execute(pool)
        .await?;
    }

    Ok(())
}
