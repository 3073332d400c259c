use anyhow::{bail, Context, Result};
use globset::{GlobBuilder, GlobMatcher};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::models::NoteSource;

/// Notes live exactly two levels down: `<topic>/<slug>.md`.
const NOTE_GLOB: &str = "*/*.md";

/// A note file found under the root.
#[derive(Debug, Clone)]
pub struct NoteFile {
    pub path: PathBuf,
    /// `/`-separated path relative to the root.
    pub relative: String,
}

impl NoteFile {
    pub fn read(&self) -> Result<NoteSource> {
        let contents = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read note: {}", self.path.display()))?;
        Ok(NoteSource::parse(&self.relative, &contents))
    }
}

/// All `<topic>/<slug>.md` files under `root`, sorted by relative path.
pub fn discover_notes(root: &Path) -> Result<Vec<NoteFile>> {
    if !root.is_dir() {
        bail!("Notes root does not exist: {}", root.display());
    }

    let matcher = note_matcher()?;
    let mut notes = Vec::new();

    let walker = WalkDir::new(root)
        .min_depth(2)
        .max_depth(2)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || e.file_name() != ".git");

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if !matcher.is_match(&rel_str) {
            continue;
        }

        notes.push(NoteFile {
            path: path.to_path_buf(),
            relative: rel_str,
        });
    }

    // Sort for deterministic ordering
    notes.sort_by(|a, b| a.relative.cmp(&b.relative));

    Ok(notes)
}

fn note_matcher() -> Result<GlobMatcher> {
    Ok(GlobBuilder::new(NOTE_GLOB)
        .literal_separator(true)
        .build()?
        .compile_matcher())
}
