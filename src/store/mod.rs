//! Storage abstraction for note records.
//!
//! The [`RecordStore`] trait covers what the build pipeline and the read
//! surfaces (search, serve, snapshot) need from a keyed record store. The
//! SQLite implementation lives in [`sqlite`].

pub mod sqlite;

pub use sqlite::SqliteRecordStore;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::models::NoteRecord;

/// Keyed, persistent collection of [`NoteRecord`]s.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](RecordStore::upsert) | Insert or fully replace the row at `record.key` |
/// | [`get`](RecordStore::get) | Point lookup; `None` when the key is unknown |
/// | [`list`](RecordStore::list) | All records, newest first |
/// | [`count`](RecordStore::count) | Number of rows |
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert or replace a record atomically.
    ///
    /// Fields in `record.extra` that have no column yet are added to the
    /// schema first. Existing extra columns that the record does not carry
    /// are cleared.
    async fn upsert(&self, record: &NoteRecord) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<NoteRecord>>;

    async fn list(&self) -> Result<Vec<NoteRecord>>;

    async fn count(&self) -> Result<i64>;
}

/// Reject anything that is not a plain SQL identifier, since column and
/// table names are interpolated into statements.
pub(crate) fn check_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if !valid {
        bail!("Invalid field name: '{}'", name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifiers() {
        assert!(check_identifier("reading_time").is_ok());
        assert!(check_identifier("_private").is_ok());
        assert!(check_identifier("").is_err());
        assert!(check_identifier("9lives").is_err());
        assert!(check_identifier("a\"; DROP TABLE til; --").is_err());
        assert!(check_identifier("with space").is_err());
    }
}
