//! Typed failures of the build pipeline.
//!
//! Most code in this crate returns `anyhow::Result`; the variants here are
//! the ones a caller may want to match on (via `downcast_ref`) to tell a
//! dirty checkout apart from a rejected credential or an exhausted retry
//! budget.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// The working tree has modified, staged or untracked files.
    #[error("The repository at {0} has uncommitted changes or untracked files")]
    DirtyRepository(PathBuf),

    /// The notes root is inside a repository but not at its top level.
    #[error("{path} is not the top level of its git repository (it is under '{prefix}')")]
    NotTopLevel { path: PathBuf, prefix: String },

    #[error("git {command} failed: {stderr}")]
    Git { command: String, stderr: String },

    #[error("Failed to parse git output: {0}")]
    GitParse(String),

    /// The render endpoint answered 401. Never retried.
    #[error("401 Unauthorized error rendering markdown")]
    RenderAuth,

    #[error("Could not render markdown after {attempts} attempts - last response was {status} {headers}")]
    RenderRetriesExhausted {
        attempts: u32,
        status: String,
        headers: String,
    },
}
