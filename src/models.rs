//! Core data models used throughout til-index.
//!
//! These types represent the notes, their git timings, and the stored
//! records that flow through the build pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A Markdown note read from `<topic>/<slug>.md`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteSource {
    /// Path relative to the tree root, always `/`-separated.
    pub path: String,
    pub topic: String,
    pub slug: String,
    pub title: String,
    pub body: String,
}

impl NoteSource {
    /// Split raw file contents into title and body.
    ///
    /// The first line is the title with leading `#` markers and surrounding
    /// whitespace stripped; the rest of the file, trimmed, is the body.
    pub fn parse(path: &str, contents: &str) -> Self {
        let (first, rest) = match contents.split_once('\n') {
            Some((first, rest)) => (first, rest),
            None => (contents, ""),
        };
        let title = first.trim_start_matches('#').trim().to_string();
        let body = rest.trim().to_string();

        let topic = path.split('/').next().unwrap_or_default().to_string();
        let slug = path
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .trim_end_matches(".md")
            .to_string();

        Self {
            path: path.to_string(),
            topic,
            slug,
            title,
            body,
        }
    }

    /// Store key for this note: the relative path with `/` replaced by `_`.
    pub fn key(&self) -> String {
        note_key(&self.path)
    }
}

/// Flatten a relative note path into its store key.
///
/// Distinct paths can collide (`a_b/c.md` and `a/b_c.md` both give
/// `a_b_c.md`); the pipeline logs a warning when that happens.
pub fn note_key(path: &str) -> String {
    path.replace('/', "_")
}

/// First and last commit timestamps for one path, as RFC 3339 strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionTiming {
    pub created: String,
    pub created_utc: String,
    pub updated: String,
    pub updated_utc: String,
}

/// A row of the `til` table.
///
/// The named fields are the fixed core schema. `extra` carries any
/// additional columns; unknown columns found on read land there too, so
/// the schema only ever grows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoteRecord {
    pub key: String,
    pub slug: String,
    pub topic: String,
    pub title: String,
    pub url: String,
    pub body: String,
    pub html: Option<String>,
    pub summary: Option<String>,
    pub created: Option<String>,
    pub created_utc: Option<String>,
    pub updated: Option<String>,
    pub updated_utc: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl NoteRecord {
    /// Core columns, in table order.
    pub const CORE_FIELDS: &'static [&'static str] = &[
        "key",
        "slug",
        "topic",
        "title",
        "url",
        "body",
        "html",
        "summary",
        "created",
        "created_utc",
        "updated",
        "updated_utc",
    ];

    pub fn apply_timing(&mut self, timing: &VersionTiming) {
        self.created = Some(timing.created.clone());
        self.created_utc = Some(timing.created_utc.clone());
        self.updated = Some(timing.updated.clone());
        self.updated_utc = Some(timing.updated_utc.clone());
    }

    /// Whether a previously rendered artifact is stored for this record.
    pub fn has_html(&self) -> bool {
        self.html.as_deref().is_some_and(|h| !h.is_empty())
    }
}

/// Outcome counters for one build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub discovered: usize,
    pub rendered: usize,
    pub cached: usize,
    pub upserted: usize,
}

/// A hit from the full-text index.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub key: String,
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strips_heading_markers() {
        let note = NoteSource::parse("rust/lifetimes.md", "## Lifetimes  \n\nBody text.\n\n");
        assert_eq!(note.title, "Lifetimes");
        assert_eq!(note.body, "Body text.");
        assert_eq!(note.topic, "rust");
        assert_eq!(note.slug, "lifetimes");
    }

    #[test]
    fn test_parse_title_only() {
        let note = NoteSource::parse("git/bisect.md", "# Bisect");
        assert_eq!(note.title, "Bisect");
        assert_eq!(note.body, "");
    }

    #[test]
    fn test_key_flattens_separators() {
        let note = NoteSource::parse("sqlite/fts5.md", "# FTS5\nx");
        assert_eq!(note.key(), "sqlite_fts5.md");
    }

    #[test]
    fn test_key_collision_is_possible() {
        assert_eq!(note_key("a_b/c.md"), note_key("a/b_c.md"));
    }

    #[test]
    fn test_has_html() {
        let mut record = NoteRecord::default();
        assert!(!record.has_html());
        record.html = Some(String::new());
        assert!(!record.has_html());
        record.html = Some("<p>x</p>".into());
        assert!(record.has_html());
    }
}
