//! Static snapshot of the note store.
//!
//! Writes a directory that can be served by any static file host:
//! `index.html` linking every note grouped by topic, one
//! `<topic>/<slug>.html` page per note, and `notes.json` with the listing
//! data for client-side use.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::models::NoteRecord;
use crate::store::RecordStore;

#[derive(Serialize)]
struct SnapshotNote<'a> {
    key: &'a str,
    topic: &'a str,
    slug: &'a str,
    title: &'a str,
    url: &'a str,
    path: String,
    summary: Option<&'a str>,
    created_utc: Option<&'a str>,
    updated_utc: Option<&'a str>,
}

/// Write the snapshot into `out_dir`, returning the number of note pages.
pub async fn write_snapshot(store: &dyn RecordStore, out_dir: &Path) -> Result<usize> {
    let notes = store.list().await?;
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory: {}", out_dir.display()))?;

    let mut by_topic: BTreeMap<&str, Vec<&NoteRecord>> = BTreeMap::new();
    for note in &notes {
        let page = out_dir.join(&note.topic).join(format!("{}.html", note.slug));
        if let Some(parent) = page.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&page, note_page(note))
            .with_context(|| format!("Failed to write {}", page.display()))?;
        by_topic.entry(note.topic.as_str()).or_default().push(note);
    }

    std::fs::write(out_dir.join("index.html"), index_page(&by_topic))?;

    let listing: Vec<SnapshotNote> = notes
        .iter()
        .map(|n| SnapshotNote {
            key: &n.key,
            topic: &n.topic,
            slug: &n.slug,
            title: &n.title,
            url: &n.url,
            path: page_href(n),
            summary: n.summary.as_deref(),
            created_utc: n.created_utc.as_deref(),
            updated_utc: n.updated_utc.as_deref(),
        })
        .collect();
    std::fs::write(
        out_dir.join("notes.json"),
        serde_json::to_string_pretty(&listing)?,
    )?;

    tracing::info!(pages = notes.len(), out = %out_dir.display(), "snapshot written");
    Ok(notes.len())
}

fn page_href(note: &NoteRecord) -> String {
    format!("{}/{}.html", note.topic, note.slug)
}

fn note_page(note: &NoteRecord) -> String {
    let mut dates = String::new();
    if let Some(created) = &note.created_utc {
        dates.push_str(&format!("<p class=\"created\">Created {}</p>\n", escape_html(created)));
    }
    if let Some(updated) = &note.updated_utc {
        if note.created_utc.as_ref() != Some(updated) {
            dates.push_str(&format!("<p class=\"updated\">Updated {}</p>\n", escape_html(updated)));
        }
    }

    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n</head>\n<body>\n\
         <p><a href=\"../index.html\">TIL</a> / {topic}</p>\n<h1>{title}</h1>\n{html}\n{dates}\
         <p><a href=\"{url}\">Source</a></p>\n</body>\n</html>\n",
        title = escape_html(&note.title),
        topic = escape_html(&note.topic),
        html = note.html.as_deref().unwrap_or(""),
        dates = dates,
        url = escape_html(&note.url),
    )
}

fn index_page(by_topic: &BTreeMap<&str, Vec<&NoteRecord>>) -> String {
    let mut sections = String::new();
    for (topic, notes) in by_topic {
        sections.push_str(&format!("<h2>{}</h2>\n<ul>\n", escape_html(topic)));
        for note in notes {
            sections.push_str(&format!(
                "<li><a href=\"{}\">{}</a></li>\n",
                escape_html(&page_href(note)),
                escape_html(&note.title)
            ));
        }
        sections.push_str("</ul>\n");
    }

    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>TIL</title>\n</head>\n<body>\n<h1>TIL</h1>\n{}</body>\n</html>\n",
        sections
    )
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
