//! Build pipeline orchestration.
//!
//! Coordinates one full build: git timings → discovery → per note
//! (parse, cache check, render, summarize, merge timings, upsert) → one
//! full-text index refresh at the end. Everything runs strictly in order,
//! one note at a time.
//!
//! ```text
//! Discovered → Parsed → CacheChecked → Rendered | CacheHit → Summarized → Merged → Stored
//! ```
//!
//! A render failure aborts the build. Notes stored before the failure stay
//! in the store; nothing is rolled back across notes.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;

use crate::config::Config;
use crate::discover::discover_notes;
use crate::fts::{SearchIndex, DEFAULT_FIELDS, DEFAULT_TOKENIZER};
use crate::history;
use crate::models::{BuildReport, NoteRecord, VersionTiming};
use crate::render::{should_render, Renderer};
use crate::store::{RecordStore, SqliteRecordStore};
use crate::summary::summarize;

/// Check the checkout, then open the configured store and build into it.
///
/// The clean-tree check and history walk run before the database is
/// opened, so a dirty tree never creates or touches the store. The
/// database's own files are not counted as dirty when they live inside
/// the checkout.
pub async fn run_build(
    root: &Path,
    config: &Config,
    renderer: &dyn Renderer,
) -> Result<BuildReport> {
    let ignore = database_paths(root, &config.db.path);
    let timings = history::extract_ignoring(root, &config.history.git_ref, &ignore)?;

    let store = SqliteRecordStore::open(config).await?;
    let index = SearchIndex::new(store.pool().clone(), store.table());
    build_database(root, config, &timings, renderer, &store, &index).await
}

/// Repository-relative paths of the database file and its SQLite side
/// files, or nothing when the database is outside `root`.
fn database_paths(root: &Path, db_path: &Path) -> Vec<String> {
    let relative = db_path
        .strip_prefix(root)
        .ok()
        .map(Path::to_path_buf)
        .or_else(|| {
            let root = root.canonicalize().ok()?;
            let parent = db_path.parent()?.canonicalize().ok()?;
            let absolute = parent.join(db_path.file_name()?);
            absolute.strip_prefix(&root).ok().map(Path::to_path_buf)
        });
    let Some(relative) = relative else {
        return Vec::new();
    };

    let base = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    ["", "-wal", "-shm", "-journal"]
        .iter()
        .map(|suffix| format!("{}{}", base, suffix))
        .collect()
}

/// Build the notes under `root` into `store`, using `timings` from
/// [`history::extract`] taken before the store was opened.
pub async fn build_database(
    root: &Path,
    config: &Config,
    timings: &HashMap<String, VersionTiming>,
    renderer: &dyn Renderer,
    store: &dyn RecordStore,
    index: &SearchIndex,
) -> Result<BuildReport> {
    tracing::info!(root = %root.display(), git_ref = %config.history.git_ref, "building database");

    let notes = discover_notes(root)?;

    let mut report = BuildReport {
        discovered: notes.len(),
        ..BuildReport::default()
    };
    let mut seen_keys: HashMap<String, String> = HashMap::new();

    for file in &notes {
        let note = file.read()?;
        let key = note.key();

        if let Some(other) = seen_keys.insert(key.clone(), note.path.clone()) {
            tracing::warn!(key = %key, first = %other, second = %note.path, "two notes map to the same key; the later one wins");
        }

        let previous = store
            .get(&key)
            .await
            .with_context(|| format!("Failed to look up {}", key))?;
        let previous_body = previous.as_ref().map(|r| r.body.as_str());
        let previous_html = previous.as_ref().and_then(|r| r.html.clone());

        let mut record = NoteRecord {
            key: key.clone(),
            slug: note.slug.clone(),
            topic: note.topic.clone(),
            title: note.title.clone(),
            url: config.note_url(&note.path),
            body: note.body.clone(),
            ..NoteRecord::default()
        };
        // Keep any extra fields merged in by other tools.
        if let Some(prev) = &previous {
            record.extra = prev.extra.clone();
        }

        let previous_html_present = previous.as_ref().is_some_and(|r| r.has_html());
        let html = if should_render(&note.body, previous_body, previous_html_present) {
            let html = renderer
                .render(&note.body)
                .await
                .with_context(|| format!("Could not render {}", note.path))?;
            tracing::info!(path = %note.path, renderer = renderer.name(), "rendered html");
            report.rendered += 1;
            Some(html)
        } else {
            tracing::debug!(path = %note.path, "cache hit");
            report.cached += 1;
            None
        };

        let summary_source = html
            .as_deref()
            .filter(|h| !h.is_empty())
            .or(previous_html.as_deref())
            .unwrap_or("");
        record.summary = Some(summarize(summary_source));
        record.html = html.or(previous_html);

        match timings.get(&note.path) {
            Some(timing) => record.apply_timing(timing),
            None => tracing::warn!(path = %note.path, "no git history for note"),
        }

        store
            .upsert(&record)
            .await
            .with_context(|| format!("Failed to store {}", note.path))?;
        report.upserted += 1;
    }

    index
        .enable_full_text(DEFAULT_FIELDS, DEFAULT_TOKENIZER)
        .await
        .context("Failed to rebuild the full-text index")?;

    Ok(report)
}
