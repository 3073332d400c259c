//! Markdown rendering and the render-cache decision.
//!
//! Defines the [`Renderer`] trait and its two implementations:
//! - **[`RemoteRenderer`]**: POSTs the note body to a Markdown rendering
//!   endpoint (GitHub's `/markdown` API by default) with a bounded retry budget.
//! - **[`LocalRenderer`]**: converts in-process with pulldown-cmark; no network.
//!
//! Exactly one is active per deployment, chosen by `render.strategy` through
//! [`create_renderer`].
//!
//! # Retry Strategy
//!
//! The remote renderer treats credentials and everything else differently:
//! - HTTP 200 → accept the body as HTML
//! - HTTP 401 → fail immediately, no sleep
//! - any other status, or a network error → sleep the backoff, try again
//! - after `max_attempts` tries → fail with the last status and headers

mod local;
mod remote;

pub use local::LocalRenderer;
pub use remote::{RemoteRenderer, RetryPolicy};

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RenderConfig;

/// Converts a Markdown note body to HTML.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Short strategy name for logs (`"remote"`, `"local"`).
    fn name(&self) -> &str;

    async fn render(&self, body: &str) -> Result<String>;
}

/// Waits out a retry backoff. Injected so tests can count sleeps without
/// spending the time.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Whether a note must be rendered again.
///
/// True iff the body differs from the stored body or nothing rendered is
/// stored yet. A missing previous record means both are absent.
pub fn should_render(
    current_body: &str,
    previous_body: Option<&str>,
    previous_html_present: bool,
) -> bool {
    previous_body != Some(current_body) || !previous_html_present
}

/// Build the renderer selected by `render.strategy`.
pub fn create_renderer(config: &RenderConfig) -> Result<Box<dyn Renderer>> {
    match config.strategy.as_str() {
        "remote" => Ok(Box::new(RemoteRenderer::new(
            config,
            Arc::new(TokioSleeper),
        )?)),
        "local" => Ok(Box::new(LocalRenderer::new())),
        other => bail!("Unknown render strategy: {}", other),
    }
}
