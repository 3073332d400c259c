//! Full-text index over the notes table.
//!
//! The index is an external-content FTS5 table (`<table>_fts`) that stores
//! only tokens; the text itself stays in the notes table. Insert, update and
//! delete triggers keep it in step with every write after it is enabled, and
//! [`SearchIndex::enable_full_text`] can rebuild it from scratch at any time.

use anyhow::{bail, Result};
use sqlx::{Row, SqlitePool};

use crate::models::SearchHit;
use crate::store::check_identifier;

pub const DEFAULT_FIELDS: &[&str] = &["title", "body"];
pub const DEFAULT_TOKENIZER: &str = "porter";

pub struct SearchIndex {
    pool: SqlitePool,
    table: String,
}

impl SearchIndex {
    pub fn new(pool: SqlitePool, table: &str) -> Self {
        Self {
            pool,
            table: table.to_string(),
        }
    }

    fn fts_table(&self) -> String {
        format!("{}_fts", self.table)
    }

    /// (Re)create the FTS table and its triggers for `fields`, then
    /// repopulate it from the notes table.
    ///
    /// Any previous index definition is dropped first, so repeated calls
    /// leave exactly one copy of each row indexed.
    pub async fn enable_full_text(&self, fields: &[&str], tokenizer: &str) -> Result<()> {
        if fields.is_empty() {
            bail!("Full-text index needs at least one field");
        }
        for field in fields {
            check_identifier(field)?;
        }
        if tokenizer.is_empty()
            || !tokenizer
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ' ')
        {
            bail!("Invalid tokenizer: '{}'", tokenizer);
        }

        let table = &self.table;
        let fts = self.fts_table();
        let cols = fields
            .iter()
            .map(|f| format!("\"{}\"", f))
            .collect::<Vec<_>>()
            .join(", ");
        let new_vals = fields
            .iter()
            .map(|f| format!("new.\"{}\"", f))
            .collect::<Vec<_>>()
            .join(", ");
        let old_vals = fields
            .iter()
            .map(|f| format!("old.\"{}\"", f))
            .collect::<Vec<_>>()
            .join(", ");

        let statements = vec![
            format!(r#"DROP TRIGGER IF EXISTS "{table}_ai""#),
            format!(r#"DROP TRIGGER IF EXISTS "{table}_ad""#),
            format!(r#"DROP TRIGGER IF EXISTS "{table}_au""#),
            format!(r#"DROP TABLE IF EXISTS "{fts}""#),
            format!(
                r#"CREATE VIRTUAL TABLE "{fts}" USING fts5({cols}, content='{table}', content_rowid='rowid', tokenize='{tokenizer}')"#
            ),
            format!(
                r#"CREATE TRIGGER "{table}_ai" AFTER INSERT ON "{table}" BEGIN
                    INSERT INTO "{fts}" (rowid, {cols}) VALUES (new.rowid, {new_vals});
                END"#
            ),
            format!(
                r#"CREATE TRIGGER "{table}_ad" AFTER DELETE ON "{table}" BEGIN
                    INSERT INTO "{fts}" ("{fts}", rowid, {cols}) VALUES ('delete', old.rowid, {old_vals});
                END"#
            ),
            format!(
                r#"CREATE TRIGGER "{table}_au" AFTER UPDATE ON "{table}" BEGIN
                    INSERT INTO "{fts}" ("{fts}", rowid, {cols}) VALUES ('delete', old.rowid, {old_vals});
                    INSERT INTO "{fts}" (rowid, {cols}) VALUES (new.rowid, {new_vals});
                END"#
            ),
            format!(r#"INSERT INTO "{fts}" ("{fts}") VALUES ('rebuild')"#),
        ];

        let mut tx = self.pool.begin().await?;
        for statement in &statements {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;

        tracing::info!(table = %fts, fields = %cols, tokenizer, "full-text index rebuilt");
        Ok(())
    }

    pub async fn is_enabled(&self) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name = ?",
        )
        .bind(self.fts_table())
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Ranked keyword search. Every whitespace-separated term must match.
    pub async fn search(&self, query: &str, limit: i64) -> Result<Vec<SearchHit>> {
        let Some(match_expr) = to_match_expression(query) else {
            return Ok(Vec::new());
        };
        if !self.is_enabled().await? {
            bail!("Search index has not been built yet. Run `til build` first.");
        }

        let table = &self.table;
        let fts = self.fts_table();
        let rows = sqlx::query(&format!(
            r#"
            SELECT t.key AS key, t.title AS title, t.url AS url,
                   snippet("{fts}", -1, '[', ']', '...', 12) AS snippet,
                   bm25("{fts}") AS score
            FROM "{fts}"
            JOIN "{table}" t ON t.rowid = "{fts}".rowid
            WHERE "{fts}" MATCH ?
            ORDER BY score
            LIMIT ?
            "#
        ))
        .bind(&match_expr)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| SearchHit {
                key: row.get("key"),
                title: row.get::<Option<String>, _>("title").unwrap_or_default(),
                url: row.get::<Option<String>, _>("url").unwrap_or_default(),
                snippet: row.get::<Option<String>, _>("snippet").unwrap_or_default(),
                // bm25 is lower-is-better; flip so callers can sort descending.
                score: -row.get::<f64, _>("score"),
            })
            .collect())
    }
}

/// Quote each term so punctuation in user input is never FTS syntax.
fn to_match_expression(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|t| t.replace('"', ""))
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::NoteRecord;
    use crate::store::{RecordStore, SqliteRecordStore};
    use tempfile::TempDir;

    async fn setup(tmp: &TempDir) -> (SqliteRecordStore, SearchIndex) {
        let mut config = Config::default();
        config.db.path = tmp.path().join("tils.db");
        let store = SqliteRecordStore::open(&config).await.unwrap();
        let index = SearchIndex::new(store.pool().clone(), store.table());
        (store, index)
    }

    fn note(key: &str, title: &str, body: &str) -> NoteRecord {
        NoteRecord {
            key: key.into(),
            title: title.into(),
            body: body.into(),
            ..NoteRecord::default()
        }
    }

    async fn keys(index: &SearchIndex, q: &str) -> Vec<String> {
        index
            .search(q, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|h| h.key)
            .collect()
    }

    #[test]
    fn test_match_expression_quotes_terms() {
        assert_eq!(
            to_match_expression("rust  \"async\" OR"),
            Some("\"rust\" \"async\" \"OR\"".to_string())
        );
        assert_eq!(to_match_expression("  \"\" "), None);
    }

    #[tokio::test]
    async fn test_index_covers_existing_rows() {
        let tmp = TempDir::new().unwrap();
        let (store, index) = setup(&tmp).await;
        store.upsert(&note("a.md", "Alpha", "first")).await.unwrap();

        index.enable_full_text(DEFAULT_FIELDS, DEFAULT_TOKENIZER).await.unwrap();
        assert_eq!(keys(&index, "Alpha").await, vec!["a.md"]);
    }

    #[tokio::test]
    async fn test_triggers_track_updates() {
        let tmp = TempDir::new().unwrap();
        let (store, index) = setup(&tmp).await;
        index.enable_full_text(DEFAULT_FIELDS, DEFAULT_TOKENIZER).await.unwrap();

        store.upsert(&note("a.md", "Alpha", "first")).await.unwrap();
        assert_eq!(keys(&index, "alpha").await, vec!["a.md"]);

        store
            .upsert(&note("a.md", "Alpha", "now mentions Beta"))
            .await
            .unwrap();
        assert_eq!(keys(&index, "Beta").await, vec!["a.md"]);
        assert!(keys(&index, "first").await.is_empty());
    }

    #[tokio::test]
    async fn test_enable_twice_does_not_duplicate() {
        let tmp = TempDir::new().unwrap();
        let (store, index) = setup(&tmp).await;
        store.upsert(&note("a.md", "Alpha", "x")).await.unwrap();

        index.enable_full_text(DEFAULT_FIELDS, DEFAULT_TOKENIZER).await.unwrap();
        index.enable_full_text(DEFAULT_FIELDS, DEFAULT_TOKENIZER).await.unwrap();
        assert_eq!(keys(&index, "alpha").await.len(), 1);
    }

    #[tokio::test]
    async fn test_porter_stemming() {
        let tmp = TempDir::new().unwrap();
        let (store, index) = setup(&tmp).await;
        store
            .upsert(&note("a.md", "Notes", "running migrations"))
            .await
            .unwrap();
        index.enable_full_text(DEFAULT_FIELDS, DEFAULT_TOKENIZER).await.unwrap();
        assert_eq!(keys(&index, "migration run").await, vec!["a.md"]);
    }

    #[tokio::test]
    async fn test_search_before_build_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let (_store, index) = setup(&tmp).await;
        assert!(!index.is_enabled().await.unwrap());
        assert!(index.search("x", 5).await.is_err());
        assert!(index.search("   ", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_bad_field_names() {
        let tmp = TempDir::new().unwrap();
        let (_store, index) = setup(&tmp).await;
        assert!(index.enable_full_text(&["title;"], "porter").await.is_err());
        assert!(index.enable_full_text(&[], "porter").await.is_err());
        assert!(index.enable_full_text(&["title"], "porter'").await.is_err());
    }
}
