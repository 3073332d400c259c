//! Created/updated timestamps mined from git history.
//!
//! One pass over `git log` covers the whole tree: commits are read oldest
//! first, the first commit touching a path fixes its `created` time and the
//! last one fixes `updated`. The walk refuses to run against a working tree
//! with local modifications or untracked files.

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Utc};
use std::collections::HashMap;
use std::path::Path;
use std::process::Command;

use crate::error::PipelineError;
use crate::models::VersionTiming;

/// Separates commits in the `git log` output.
const RECORD_SEP: char = '\x1e';

/// Timings for every path touched by a commit reachable from `git_ref`.
///
/// `repo_path` must be the repository top level. Paths are relative to it
/// and `/`-separated. Fails with [`PipelineError::DirtyRepository`] before
/// reading any history if the working tree is not clean.
pub fn extract(repo_path: &Path, git_ref: &str) -> Result<HashMap<String, VersionTiming>> {
    extract_ignoring(repo_path, git_ref, &[])
}

/// Like [`extract`], but changes to the repository-relative paths in
/// `ignore` do not count as dirty. Used for the notes database when it is
/// stored inside the checkout.
pub fn extract_ignoring(
    repo_path: &Path,
    git_ref: &str,
    ignore: &[String],
) -> Result<HashMap<String, VersionTiming>> {
    ensure_top_level(repo_path)?;
    ensure_clean_ignoring(repo_path, ignore)?;

    let log = run_git(
        repo_path,
        &[
            "-c",
            "core.quotepath=off",
            "log",
            "--reverse",
            "--no-renames",
            "--diff-merges=first-parent",
            "--name-only",
            "-z",
            "--format=%x1e%cI",
            git_ref,
            "--",
        ],
    )?;

    let commits = parse_log(&log)?;
    let mut timings: HashMap<String, VersionTiming> = HashMap::new();

    for (committed, paths) in &commits {
        let local = committed.to_rfc3339();
        let utc = committed.with_timezone(&Utc).to_rfc3339();

        for path in paths {
            let timing = timings
                .entry(path.clone())
                .or_insert_with(|| VersionTiming {
                    created: local.clone(),
                    created_utc: utc.clone(),
                    updated: String::new(),
                    updated_utc: String::new(),
                });
            // Oldest-first order makes the final write the most recent commit.
            timing.updated = local.clone();
            timing.updated_utc = utc.clone();
        }
    }

    tracing::debug!(
        commits = commits.len(),
        paths = timings.len(),
        "extracted git timings"
    );
    Ok(timings)
}

/// Fail unless `repo_path` is the top level of its repository. Log paths
/// are top-level relative, so a subdirectory would match no note.
pub fn ensure_top_level(repo_path: &Path) -> Result<()> {
    let prefix = run_git(repo_path, &["rev-parse", "--show-prefix"])?;
    let prefix = prefix.trim();
    if !prefix.is_empty() {
        return Err(PipelineError::NotTopLevel {
            path: repo_path.to_path_buf(),
            prefix: prefix.to_string(),
        }
        .into());
    }
    Ok(())
}

/// Fail unless `git status` reports nothing: no staged, unstaged or
/// untracked changes.
pub fn ensure_clean(repo_path: &Path) -> Result<()> {
    ensure_clean_ignoring(repo_path, &[])
}

fn ensure_clean_ignoring(repo_path: &Path, ignore: &[String]) -> Result<()> {
    let status = run_git(
        repo_path,
        &["status", "--porcelain", "--untracked-files=all"],
    )?;

    let dirty = status
        .lines()
        .filter(|line| !line.trim().is_empty())
        .any(|line| {
            let path = line.get(3..).unwrap_or_default();
            !ignore.iter().any(|ignored| ignored == path)
        });
    if dirty {
        return Err(PipelineError::DirtyRepository(repo_path.to_path_buf()).into());
    }
    Ok(())
}

fn run_git(repo_path: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_path)
        .output()
        .with_context(|| "Failed to execute git. Is git installed?")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let command = args
            .iter()
            .find(|a| !a.starts_with('-') && !a.contains('='))
            .copied()
            .unwrap_or("command");
        return Err(PipelineError::Git {
            command: command.to_string(),
            stderr: stderr.trim().to_string(),
        }
        .into());
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

type CommitPaths = (DateTime<FixedOffset>, Vec<String>);

/// Parse `-z --format=%x1e%cI --name-only` output into (commit time, paths).
///
/// Each record is `<date>\0\n<path>\0<path>\0...`. Paths are NUL
/// terminated and never quoted, so any byte but NUL may appear in them.
fn parse_log(log: &str) -> Result<Vec<CommitPaths>> {
    let mut commits = Vec::new();

    for record in log.split(RECORD_SEP) {
        let mut fields = record.split('\0');
        let date_field = fields.next().unwrap_or_default().trim();
        if date_field.is_empty() {
            continue;
        }

        let committed = DateTime::parse_from_rfc3339(date_field)
            .map_err(|e| PipelineError::GitParse(format!("bad commit date '{}': {}", date_field, e)))?;

        let paths = fields
            .enumerate()
            .map(|(i, field)| match i {
                // The header line ends before the first path.
                0 => field.strip_prefix('\n').unwrap_or(field),
                _ => field,
            })
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();

        commits.push((committed, paths));
    }

    Ok(commits)
}

#[cfg(test)]
pub(crate) mod test_repo {
    //! Helpers for building throwaway git repositories with fixed commit dates.

    use std::path::Path;
    use std::process::Command;

    pub fn git(dir: &Path, args: &[&str]) {
        git_at(dir, args, "2020-01-01T00:00:00+00:00");
    }

    pub fn git_at(dir: &Path, args: &[&str], date: &str) {
        let output = Command::new("git")
            .args(args)
            .current_dir(dir)
            .env("GIT_AUTHOR_DATE", date)
            .env("GIT_COMMITTER_DATE", date)
            .env("GIT_AUTHOR_NAME", "Test")
            .env("GIT_AUTHOR_EMAIL", "test@example.com")
            .env("GIT_COMMITTER_NAME", "Test")
            .env("GIT_COMMITTER_EMAIL", "test@example.com")
            .output()
            .expect("git should be installed");
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    pub fn init(dir: &Path) {
        git(dir, &["init", "-q", "-b", "main"]);
        git(dir, &["config", "commit.gpgsign", "false"]);
        std::fs::write(dir.join(".gitignore"), "*.db\n*.db-*\n").unwrap();
        git(dir, &["add", ".gitignore"]);
        git(dir, &["commit", "-q", "-m", "ignore database"]);
    }

    pub fn write_and_commit(dir: &Path, rel: &str, contents: &str, date: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
        git_at(dir, &["add", rel], date);
        git_at(dir, &["commit", "-q", "-m", rel], date);
    }
}
