use pulldown_cmark::{html, Options, Parser};

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("file is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}

/// Turns raw file bytes into an HTML fragment.
///
/// Implementations must be pure: sessions call them from their watch loops
/// with no coordination, and a failure is shown to viewers rather than retried.
pub trait Renderer: Send + Sync {
    fn render(&self, source: &[u8]) -> Result<String, RenderError>;
}

/// CommonMark renderer with the GitHub-flavoured extensions enabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownRenderer;

impl MarkdownRenderer {
    fn options() -> Options {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_FOOTNOTES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        options
    }
}

impl Renderer for MarkdownRenderer {
    fn render(&self, source: &[u8]) -> Result<String, RenderError> {
        let text = std::str::from_utf8(source)?;
        let parser = Parser::new_ext(text, Self::options());
        let mut out = String::with_capacity(text.len() * 3 / 2);
        html::push_html(&mut out, parser);
        Ok(out)
    }
}
