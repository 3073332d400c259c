//! # til-index
//!
//! Incremental builder for a "today I learned" notes repository.
//!
//! Notes live in a git checkout as `<topic>/<slug>.md`. A build walks the
//! git history for per-file created/updated times, renders each note's
//! Markdown to HTML (skipping notes whose body has not changed since the
//! last build), extracts a one-paragraph summary, and upserts everything into
//! a SQLite table with an FTS5 index over title and body.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────┐   ┌───────────┐
//! │ git history │──▶│     Pipeline     │──▶│  SQLite   │
//! │  + notes    │   │ render + summary │   │ til + FTS │
//! └─────────────┘   └──────────────────┘   └─────┬─────┘
//!                                                │
//!                        ┌───────────────────────┼──────────┐
//!                        ▼                       ▼          ▼
//!                   ┌─────────┐            ┌──────────┐ ┌──────────┐
//!                   │   CLI   │            │   HTTP   │ │ snapshot │
//!                   │  (til)  │            │   JSON   │ │  (HTML)  │
//!                   └─────────┘            └──────────┘ └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! til --root ~/til build            # render and index every note
//! til --root ~/til search "sqlite"  # keyword search
//! til --root ~/til serve            # JSON API on 127.0.0.1:8001
//! til --root ~/til snapshot ./site  # static HTML export
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`discover`] | Finding `<topic>/<slug>.md` notes |
//! | [`history`] | Created/updated times from git |
//! | [`render`] | Markdown renderers and the render cache check |
//! | [`summary`] | First-paragraph summaries |
//! | [`store`] | Record store with additive schema |
//! | [`fts`] | Full-text index and search |
//! | [`pipeline`] | Build orchestration |
//! | [`server`] | JSON HTTP API |
//! | [`snapshot`] | Static HTML export |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`error`] | Typed failure kinds |

pub mod config;
pub mod db;
pub mod discover;
pub mod error;
pub mod fts;
pub mod history;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod render;
pub mod server;
pub mod snapshot;
pub mod store;
pub mod summary;
