//! SQLite-backed [`RecordStore`] implementation.
//!
//! One table (default `til`) keyed by `key`. The core columns are created by
//! [`migrate::run_migrations`](crate::migrate::run_migrations); any further
//! columns are added with `ALTER TABLE` the first time a record carries them.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, SqliteConnection, SqlitePool, TypeInfo, ValueRef};
use std::collections::BTreeMap;

use super::{check_identifier, RecordStore};
use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::models::NoteRecord;

/// A column value ready to bind.
#[derive(Debug, Clone, PartialEq)]
enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl SqlValue {
    fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => SqlValue::Null,
            serde_json::Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::Integer(i),
                None => SqlValue::Real(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => SqlValue::Text(s.clone()),
            other => SqlValue::Text(other.to_string()),
        }
    }

    fn from_opt(value: &Option<String>) -> Self {
        match value {
            Some(s) => SqlValue::Text(s.clone()),
            None => SqlValue::Null,
        }
    }

    /// Column type used when this value introduces a new column.
    fn column_type(&self) -> &'static str {
        match self {
            SqlValue::Integer(_) => "INTEGER",
            SqlValue::Real(_) => "FLOAT",
            SqlValue::Null | SqlValue::Text(_) => "TEXT",
        }
    }
}

/// SQLite implementation of the [`RecordStore`] trait.
pub struct SqliteRecordStore {
    pool: SqlitePool,
    table: String,
}

impl SqliteRecordStore {
    /// Connect to the configured database and make sure the table exists.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        Self::with_pool(pool, &config.db.table).await
    }

    pub async fn with_pool(pool: SqlitePool, table: &str) -> Result<Self> {
        check_identifier(table)?;
        migrate::run_migrations(&pool, table).await?;
        Ok(Self {
            pool,
            table: table.to_string(),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Current column names, in table order.
    pub async fn columns(&self) -> Result<Vec<String>> {
        let mut conn = self.pool.acquire().await?;
        table_columns(&mut conn, &self.table).await
    }
}

async fn table_columns(conn: &mut SqliteConnection, table: &str) -> Result<Vec<String>> {
    let rows = sqlx::query(&format!(r#"PRAGMA table_info("{}")"#, table))
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows.iter().map(|r| r.get::<String, _>("name")).collect())
}

/// Flatten a record into (column, value) pairs, core columns first.
fn record_values(record: &NoteRecord) -> Result<Vec<(String, SqlValue)>> {
    let mut values = vec![
        ("key".to_string(), SqlValue::Text(record.key.clone())),
        ("slug".to_string(), SqlValue::Text(record.slug.clone())),
        ("topic".to_string(), SqlValue::Text(record.topic.clone())),
        ("title".to_string(), SqlValue::Text(record.title.clone())),
        ("url".to_string(), SqlValue::Text(record.url.clone())),
        ("body".to_string(), SqlValue::Text(record.body.clone())),
        ("html".to_string(), SqlValue::from_opt(&record.html)),
        ("summary".to_string(), SqlValue::from_opt(&record.summary)),
        ("created".to_string(), SqlValue::from_opt(&record.created)),
        ("created_utc".to_string(), SqlValue::from_opt(&record.created_utc)),
        ("updated".to_string(), SqlValue::from_opt(&record.updated)),
        ("updated_utc".to_string(), SqlValue::from_opt(&record.updated_utc)),
    ];

    for (name, value) in &record.extra {
        if NoteRecord::CORE_FIELDS.contains(&name.as_str()) {
            anyhow::bail!("Extra field '{}' shadows a core column", name);
        }
        check_identifier(name)?;
        values.push((name.clone(), SqlValue::from_json(value)));
    }

    Ok(values)
}

fn row_to_record(row: &SqliteRow) -> Result<NoteRecord> {
    let mut fields: BTreeMap<String, serde_json::Value> = BTreeMap::new();

    for (i, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(i)?;
        if raw.is_null() {
            continue;
        }
        let type_name = raw.type_info().name().to_string();
        let value = match type_name.as_str() {
            "INTEGER" => serde_json::Value::from(row.try_get::<i64, _>(i)?),
            "REAL" => serde_json::Value::from(row.try_get::<f64, _>(i)?),
            "BLOB" => serde_json::Value::from(
                String::from_utf8_lossy(&row.try_get::<Vec<u8>, _>(i)?).into_owned(),
            ),
            _ => serde_json::Value::from(row.try_get::<String, _>(i)?),
        };
        fields.insert(column.name().to_string(), value);
    }

    let mut take = |name: &str| -> Option<String> {
        match fields.remove(name) {
            Some(serde_json::Value::String(s)) => Some(s),
            Some(other) => Some(other.to_string()),
            None => None,
        }
    };

    Ok(NoteRecord {
        key: take("key").unwrap_or_default(),
        slug: take("slug").unwrap_or_default(),
        topic: take("topic").unwrap_or_default(),
        title: take("title").unwrap_or_default(),
        url: take("url").unwrap_or_default(),
        body: take("body").unwrap_or_default(),
        html: take("html"),
        summary: take("summary"),
        created: take("created"),
        created_utc: take("created_utc"),
        updated: take("updated"),
        updated_utc: take("updated_utc"),
        extra: fields,
    })
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn upsert(&self, record: &NoteRecord) -> Result<()> {
        let mut values = record_values(record)?;
        let mut tx = self.pool.begin().await?;

        let existing = table_columns(&mut tx, &self.table).await?;
        for (name, value) in &values {
            if !existing.iter().any(|c| c == name) {
                tracing::info!(table = %self.table, column = %name, "adding column");
                sqlx::query(&format!(
                    r#"ALTER TABLE "{}" ADD COLUMN "{}" {}"#,
                    self.table,
                    name,
                    value.column_type()
                ))
                .execute(&mut *tx)
                .await?;
            }
        }

        // Full replace: extra columns this record does not carry are cleared.
        for column in &existing {
            if !values.iter().any(|(name, _)| name == column) {
                values.push((column.clone(), SqlValue::Null));
            }
        }

        let columns: Vec<String> = values.iter().map(|(n, _)| format!("\"{}\"", n)).collect();
        let placeholders = vec!["?"; values.len()].join(", ");
        let updates: Vec<String> = columns
            .iter()
            .filter(|c| c.as_str() != "\"key\"")
            .map(|c| format!("{c} = excluded.{c}"))
            .collect();

        let sql = format!(
            r#"INSERT INTO "{}" ({}) VALUES ({}) ON CONFLICT(key) DO UPDATE SET {}"#,
            self.table,
            columns.join(", "),
            placeholders,
            updates.join(", ")
        );

        let mut query = sqlx::query(&sql);
        for (_, value) in values {
            query = match value {
                SqlValue::Null => query.bind(Option::<String>::None),
                SqlValue::Integer(i) => query.bind(i),
                SqlValue::Real(f) => query.bind(f),
                SqlValue::Text(s) => query.bind(s),
            };
        }
        query.execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<NoteRecord>> {
        let row = sqlx::query(&format!(r#"SELECT * FROM "{}" WHERE key = ?"#, self.table))
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn list(&self) -> Result<Vec<NoteRecord>> {
        let rows = sqlx::query(&format!(
            r#"SELECT * FROM "{}" ORDER BY created_utc DESC, key"#,
            self.table
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }

    async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(&format!(r#"SELECT COUNT(*) FROM "{}""#, self.table))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn temp_store(tmp: &TempDir) -> SqliteRecordStore {
        let mut config = Config::default();
        config.db.path = tmp.path().join("tils.db");
        SqliteRecordStore::open(&config).await.unwrap()
    }

    fn record(key: &str, body: &str) -> NoteRecord {
        NoteRecord {
            key: key.to_string(),
            slug: "slug".into(),
            topic: "topic".into(),
            title: "Title".into(),
            url: format!("https://example.com/{}", key),
            body: body.to_string(),
            html: Some(format!("<p>{}</p>", body)),
            summary: Some(body.to_string()),
            ..NoteRecord::default()
        }
    }

    #[tokio::test]
    async fn test_get_missing_key_is_none() {
        let tmp = TempDir::new().unwrap();
        let store = temp_store(&tmp).await;
        assert!(store.get("nope.md").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_inserts_then_replaces() {
        let tmp = TempDir::new().unwrap();
        let store = temp_store(&tmp).await;

        store.upsert(&record("rust_a.md", "one")).await.unwrap();
        store.upsert(&record("rust_a.md", "two")).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        let got = store.get("rust_a.md").await.unwrap().unwrap();
        assert_eq!(got.body, "two");
        assert_eq!(got.html.as_deref(), Some("<p>two</p>"));
        assert!(got.created.is_none());
    }

    #[tokio::test]
    async fn test_new_fields_extend_the_schema() {
        let tmp = TempDir::new().unwrap();
        let store = temp_store(&tmp).await;

        let mut rec = record("a.md", "x");
        rec.extra
            .insert("reading_minutes".into(), serde_json::json!(3));
        rec.extra
            .insert("score".into(), serde_json::json!(0.5));
        rec.extra
            .insert("tags".into(), serde_json::json!(["a", "b"]));
        store.upsert(&rec).await.unwrap();

        let columns = store.columns().await.unwrap();
        assert!(columns.contains(&"reading_minutes".to_string()));
        assert!(columns.contains(&"tags".to_string()));

        let got = store.get("a.md").await.unwrap().unwrap();
        assert_eq!(got.extra["reading_minutes"], serde_json::json!(3));
        assert_eq!(got.extra["score"], serde_json::json!(0.5));
        assert_eq!(got.extra["tags"], serde_json::json!("[\"a\",\"b\"]"));
    }

    #[tokio::test]
    async fn test_replace_clears_extra_columns_not_carried() {
        let tmp = TempDir::new().unwrap();
        let store = temp_store(&tmp).await;

        let mut rec = record("a.md", "x");
        rec.extra.insert("draft".into(), serde_json::json!(true));
        store.upsert(&rec).await.unwrap();

        store.upsert(&record("a.md", "y")).await.unwrap();
        let got = store.get("a.md").await.unwrap().unwrap();
        assert!(got.extra.is_empty());
        assert_eq!(got.body, "y");
    }

    #[tokio::test]
    async fn test_invalid_extra_field_leaves_row_untouched() {
        let tmp = TempDir::new().unwrap();
        let store = temp_store(&tmp).await;
        store.upsert(&record("a.md", "old")).await.unwrap();

        let mut bad = record("a.md", "new");
        bad.extra.insert("bad name".into(), serde_json::json!(1));
        assert!(store.upsert(&bad).await.is_err());

        let mut shadow = record("a.md", "new");
        shadow.extra.insert("body".into(), serde_json::json!("x"));
        assert!(store.upsert(&shadow).await.is_err());

        let got = store.get("a.md").await.unwrap().unwrap();
        assert_eq!(got.body, "old");
    }

    #[tokio::test]
    async fn test_list_is_newest_first() {
        let tmp = TempDir::new().unwrap();
        let store = temp_store(&tmp).await;

        let mut old = record("old.md", "o");
        old.created_utc = Some("2020-01-01T00:00:00+00:00".into());
        let mut new = record("new.md", "n");
        new.created_utc = Some("2023-01-01T00:00:00+00:00".into());
        store.upsert(&old).await.unwrap();
        store.upsert(&new).await.unwrap();

        let keys: Vec<String> = store.list().await.unwrap().into_iter().map(|r| r.key).collect();
        assert_eq!(keys, vec!["new.md", "old.md"]);
    }
}
