use anyhow::Result;
use sqlx::SqlitePool;

/// Create the notes table with its core columns if it does not exist yet.
///
/// Columns beyond the core set are added later by the store on demand, so
/// this never alters an existing table.
pub async fn run_migrations(pool: &SqlitePool, table: &str) -> Result<()> {
    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS "{table}" (
            key TEXT PRIMARY KEY,
            slug TEXT,
            topic TEXT,
            title TEXT,
            url TEXT,
            body TEXT,
            html TEXT,
            summary TEXT,
            created TEXT,
            created_utc TEXT,
            updated TEXT,
            updated_utc TEXT
        )
        "#
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        r#"CREATE INDEX IF NOT EXISTS "idx_{table}_created_utc" ON "{table}"(created_utc DESC)"#
    ))
    .execute(pool)
    .await?;

    Ok(())
}
