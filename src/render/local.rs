use anyhow::Result;
use async_trait::async_trait;
use pulldown_cmark::{html, Options, Parser};

use super::Renderer;

/// In-process CommonMark renderer with the usual GitHub extensions.
#[derive(Debug)]
pub struct LocalRenderer {
    options: Options,
}

impl LocalRenderer {
    pub fn new() -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_FOOTNOTES);
        Self { options }
    }

    pub fn render_sync(&self, body: &str) -> String {
        let parser = Parser::new_ext(body, self.options);
        let mut out = String::with_capacity(body.len() * 3 / 2);
        html::push_html(&mut out, parser);
        out
    }
}

impl Default for LocalRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Renderer for LocalRenderer {
    fn name(&self) -> &str {
        "local"
    }

    async fn render(&self, body: &str) -> Result<String> {
        Ok(self.render_sync(body))
    }
}
