//! Document sources and Markdown document assembly.

use std::borrow::Cow;

use askama::Template;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use imagesize::ImageType;
use thiserror::Error;

const DEFAULT_COVER_MIME: &str = "image/png";
const DOCUMENT_TITLE: &str = "Documento";

#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("document source is empty")]
    EmptySource,
    #[error("invalid cover image: {0}")]
    InvalidCoverImage(String),
    #[error("template rendering failed: {0}")]
    Template(#[from] askama::Error),
}

/// Decoded and validated cover image, kept as base64 for embedding in a data URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverImage {
    mime: String,
    encoded: String,
}

impl CoverImage {
    /// Accepts raw base64 or a `data:<mime>;base64,<payload>` URL.
    pub fn from_base64(input: &str) -> Result<Self, AssemblyError> {
        let trimmed = input.trim();
        let (declared_mime, payload) = match trimmed.strip_prefix("data:") {
            Some(rest) => {
                let (meta, data) = rest.split_once(',').ok_or_else(|| {
                    AssemblyError::InvalidCoverImage("data URL has no payload".to_string())
                })?;
                let mime = meta.strip_suffix(";base64").ok_or_else(|| {
                    AssemblyError::InvalidCoverImage("data URL must be base64 encoded".to_string())
                })?;
                (Some(mime), data)
            }
            None => (None, trimmed),
        };

        let encoded: String = payload.split_whitespace().collect();
        let bytes = STANDARD
            .decode(encoded.as_bytes())
            .map_err(|err| AssemblyError::InvalidCoverImage(err.to_string()))?;
        if bytes.is_empty() {
            return Err(AssemblyError::InvalidCoverImage(
                "image payload is empty".to_string(),
            ));
        }

        let mime = match declared_mime {
            Some(mime) if mime.starts_with("image/") => mime.to_string(),
            _ => sniff_mime(&bytes).to_string(),
        };

        Ok(Self { mime, encoded })
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.encoded)
    }
}

fn sniff_mime(bytes: &[u8]) -> &'static str {
    match imagesize::image_type(bytes) {
        Ok(ImageType::Png) => "image/png",
        Ok(ImageType::Jpeg) => "image/jpeg",
        Ok(ImageType::Gif) => "image/gif",
        Ok(ImageType::Webp) => "image/webp",
        Ok(ImageType::Bmp) => "image/bmp",
        _ => DEFAULT_COVER_MIME,
    }
}

/// What a conversion renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSource {
    /// Complete markup, rendered as is.
    Html(String),
    /// Markdown with LaTeX math, assembled into a document before rendering.
    Markdown {
        text: String,
        cover: Option<CoverImage>,
    },
}

impl DocumentSource {
    pub fn html(markup: impl Into<String>) -> Self {
        Self::Html(markup.into())
    }

    pub fn markdown(text: impl Into<String>, cover: Option<CoverImage>) -> Self {
        Self::Markdown {
            text: text.into(),
            cover,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Html(_) => "html",
            Self::Markdown { .. } => "markdown",
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            Self::Html(markup) => markup.trim().is_empty(),
            Self::Markdown { text, .. } => text.trim().is_empty(),
        }
    }

    /// Whether the loaded page signals completion through the render marker.
    ///
    /// Only assembled Markdown documents do; caller-supplied markup is opaque.
    pub fn writes_completion_marker(&self) -> bool {
        matches!(self, Self::Markdown { .. })
    }

    /// Markup to load into the engine.
    pub fn to_html(&self) -> Result<Cow<'_, str>, AssemblyError> {
        if self.is_blank() {
            return Err(AssemblyError::EmptySource);
        }
        match self {
            Self::Html(markup) => Ok(Cow::Borrowed(markup)),
            Self::Markdown { text, cover } => {
                assemble_markdown_document(text, cover.as_ref()).map(Cow::Owned)
            }
        }
    }
}

#[derive(Template)]
#[template(path = "document.html")]
struct MarkdownDocumentTemplate<'a> {
    title: &'a str,
    cover_src: Option<String>,
    markdown_literal: String,
}

/// Build the HTML shell that converts `text` client-side and marks completion.
pub fn assemble_markdown_document(
    text: &str,
    cover: Option<&CoverImage>,
) -> Result<String, AssemblyError> {
    let template = MarkdownDocumentTemplate {
        title: DOCUMENT_TITLE,
        cover_src: cover.map(CoverImage::data_url),
        markdown_literal: escape_template_literal(text),
    };
    Ok(template.render()?)
}

/// Escape `text` for interpolation inside a JavaScript template literal.
///
/// Backslashes, backticks and `$` are escaped so the literal evaluates to `text`
/// verbatim. `</` becomes `<\/` and `<!--` becomes `<\!--`, so the text can neither
/// close the enclosing `<script>` nor switch the tokenizer into escaped script data.
pub fn escape_template_literal(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + text.len() / 8);
    for (index, ch) in text.char_indices() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '`' => escaped.push_str("\\`"),
            '$' => escaped.push_str("\\$"),
            '<' if text[index + 1..].starts_with('/') || text[index + 1..].starts_with("!--") => {
                escaped.push_str("<\\")
            }
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    // 1x1 transparent PNG.
    const PNG_BASE64: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNkYAAAAAYAAjCB0C8AAAAASUVORK5CYII=";

    #[test]
    fn escapes_template_literal_metacharacters() {
        assert_eq!(escape_template_literal(r"\frac{a}{b}"), r"\\frac{a}{b}");
        assert_eq!(escape_template_literal("`code`"), r"\`code\`");
        assert_eq!(escape_template_literal("${window.x} $x$"), r"\${window.x} \$x\$");
        assert_eq!(escape_template_literal("a</script>b"), r"a<\/script>b");
        assert_eq!(escape_template_literal("a < b"), "a < b");
        assert_eq!(escape_template_literal("x <!-- y"), r"x <\!-- y");
        assert_eq!(escape_template_literal("<!doctype"), "<!doctype");
        assert_eq!(escape_template_literal("olá, mundo"), "olá, mundo");
    }

    #[test]
    fn cover_image_accepts_raw_base64_and_sniffs_png() {
        let cover = CoverImage::from_base64(PNG_BASE64).expect("valid png");
        assert_eq!(cover.mime(), "image/png");
        assert!(cover.data_url().starts_with("data:image/png;base64,iVBOR"));
    }

    #[test]
    fn cover_image_keeps_declared_mime_from_data_url() {
        let input = format!("data:image/jpeg;base64,{PNG_BASE64}");
        let cover = CoverImage::from_base64(&input).expect("valid data url");
        assert_eq!(cover.mime(), "image/jpeg");
    }

    #[test]
    fn cover_image_tolerates_wrapped_base64() {
        let wrapped = format!("{}\n{}", &PNG_BASE64[..20], &PNG_BASE64[20..]);
        assert!(CoverImage::from_base64(&wrapped).is_ok());
    }

    #[test]
    fn cover_image_rejects_garbage() {
        assert!(matches!(
            CoverImage::from_base64("not base64 at all!"),
            Err(AssemblyError::InvalidCoverImage(_))
        ));
        assert!(matches!(
            CoverImage::from_base64("data:image/png,raw"),
            Err(AssemblyError::InvalidCoverImage(_))
        ));
        assert!(matches!(
            CoverImage::from_base64(""),
            Err(AssemblyError::InvalidCoverImage(_))
        ));
    }

    #[test]
    fn blank_sources_are_rejected() {
        assert!(matches!(
            DocumentSource::html("   \n").to_html(),
            Err(AssemblyError::EmptySource)
        ));
        assert!(matches!(
            DocumentSource::markdown("", None).to_html(),
            Err(AssemblyError::EmptySource)
        ));
    }

    #[test]
    fn only_markdown_sources_write_the_completion_marker() {
        assert!(DocumentSource::markdown("x", None).writes_completion_marker());
        assert!(!DocumentSource::html("<p>x</p>").writes_completion_marker());
    }

    #[test]
    fn html_sources_pass_through_untouched() {
        let source = DocumentSource::html("<h1>Oi</h1>");
        assert_eq!(source.to_html().expect("html").as_ref(), "<h1>Oi</h1>");
    }

    #[test]
    fn markdown_document_embeds_escaped_text_and_marker() {
        let html = assemble_markdown_document("# Título\n\n$E = mc^2$ and `x`", None)
            .expect("assembled");

        assert!(html.contains(r"# Título"));
        assert!(html.contains(r"\$E = mc^2\$ and \`x\`"));
        assert!(html.contains(crate::application::wait::RENDER_COMPLETE_ATTRIBUTE));
        assert!(html.contains("id=\"content\""));
        assert!(!html.contains("class=\"cover\""));
    }

    #[test]
    fn comment_openers_cannot_hide_the_closing_script_tag() {
        let html = assemble_markdown_document("nota <!-- <script> fim", None).expect("assembled");

        assert!(!html.contains("<!-- <script>"));
        assert!(html.contains(r"nota <\!-- <script> fim"));
    }

    #[test]
    fn markdown_document_includes_cover_page_when_present() {
        let cover = CoverImage::from_base64(PNG_BASE64).expect("cover");
        let html = assemble_markdown_document("texto", Some(&cover)).expect("assembled");

        assert!(html.contains("class=\"cover\""));
        assert!(html.contains("data:image/png;base64,iVBOR"));
        let cover_at = html.find("class=\"cover\"").expect("cover section");
        let content_at = html.find("id=\"content\"").expect("content section");
        assert!(cover_at < content_at);
    }
}
