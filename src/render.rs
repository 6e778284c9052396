use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use chromiumoxide::{Browser, BrowserConfig};
use comrak::{markdown_to_html, Options};
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, error, warn};

use crate::capabilities::Capabilities;

/// Fixed page size and margins for the rendered document, in inches.
#[derive(Debug, Clone, Copy)]
pub struct PageGeometry {
    pub width_in: f64,
    pub height_in: f64,
    pub margin_in: f64,
}

impl PageGeometry {
    /// US Letter with one-inch margins.
    pub fn letter() -> Self {
        Self {
            width_in: 8.5,
            height_in: 11.0,
            margin_in: 1.0,
        }
    }
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self::letter()
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no Chromium-based browser is available for PDF rendering")]
    Unavailable,
    #[error("PDF rendering failed: {0}")]
    Failed(String),
    #[error("HTML saved for manual printing at {0}")]
    FallbackToManual(PathBuf),
    #[error("failed to persist fallback HTML: {0}")]
    Io(#[from] std::io::Error),
}

/// Converts Markdown to an HTML body with the print-oriented extension set:
/// tables, strikethrough, heading anchors, and hard line breaks. Fenced code
/// blocks are part of the base syntax.
pub fn markdown_to_body(markdown: &str) -> String {
    let mut options = Options::default();
    options.extension.table = true;
    options.extension.strikethrough = true;
    options.extension.header_ids = Some(String::new());
    options.render.hardbreaks = true;
    markdown_to_html(markdown, &options)
}

/// Wraps an HTML body in a full document with the print stylesheet and an
/// escaped `<title>`.
pub fn wrap_document(body: &str, title: &str, geometry: &PageGeometry) -> String {
    format!(
        r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width={width}in, initial-scale=1.0">
<title>{title}</title>
<style>
{css}
</style>
</head>
<body>
<article class="markdown-body">
{body}
</article>
</body>
</html>"#,
        width = geometry.width_in,
        title = html_escape::encode_text(title),
        css = print_css(geometry),
        body = body,
    )
}

/// Converts a Markdown source into a complete printable HTML document.
pub fn markdown_to_document(markdown: &str, title: &str, geometry: &PageGeometry) -> String {
    wrap_document(&markdown_to_body(markdown), title, geometry)
}

/// Compact print stylesheet resembling GitHub's markdown rendering: page
/// geometry, typographic scale, annotated link targets, and page-break
/// avoidance inside headings, code blocks, and tables.
fn print_css(geometry: &PageGeometry) -> String {
    format!(
        r#"@page {{ size: {w}in {h}in; margin: {m}in; }}
body {{
    font-family: "Segoe UI", "Helvetica Neue", Arial, sans-serif;
    font-size: 11pt;
    color: #222;
    line-height: 1.45;
    background: white;
    padding: 0;
    margin: 0;
}}
article {{ max-width: {article}in; margin: 0 auto; padding: 0; }}
h1 {{ font-size: 20pt; margin-top: 0.6em; margin-bottom: 0.3em; font-weight: 700; }}
h2 {{ font-size: 16pt; margin-top: 0.6em; margin-bottom: 0.3em; font-weight: 700; }}
h3 {{ font-size: 13pt; margin-top: 0.5em; margin-bottom: 0.2em; font-weight: 700; }}
pre, code {{ font-family: Consolas, "Courier New", monospace; background: #f6f8fa; border: 1px solid #e1e4e8; padding: 0.2em 0.4em; border-radius: 3px; }}
pre {{ padding: 0.6em; overflow: auto; }}
table {{ border-collapse: collapse; width: 100%; margin: 0.5em 0; }}
th, td {{ border: 1px solid #dfe2e5; padding: 0.4em; text-align: left; vertical-align: top; }}
a {{ color: #0366d6; text-decoration: none; }}
a[href]:after {{ content: " (" attr(href) ")"; font-size: 85%; color: #444; }}
ul, ol {{ margin: 0.4em 0 0.8em 1.2em; }}
h1, h2, h3, pre, table {{ page-break-inside: avoid; }}"#,
        w = geometry.width_in,
        h = geometry.height_in,
        m = geometry.margin_in,
        article = geometry.width_in - 2.0 * geometry.margin_in,
    )
}

/// Renders HTML documents to fixed-geometry PDFs through a headless
/// Chromium-based browser found by the capability probe.
pub struct Renderer {
    chromium: Option<PathBuf>,
    geometry: PageGeometry,
}

impl Renderer {
    pub fn new(caps: &Capabilities, geometry: PageGeometry) -> Self {
        Self {
            chromium: caps.chromium.clone(),
            geometry,
        }
    }

    /// Renders `html` into a PDF at `out_pdf`.
    pub async fn render_pdf(&self, html: &str, out_pdf: &Path) -> Result<(), RenderError> {
        let chromium = self.chromium.as_ref().ok_or(RenderError::Unavailable)?;

        let config = BrowserConfig::builder()
            .chrome_executable(chromium)
            .build()
            .map_err(RenderError::Failed)?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| RenderError::Failed(format!("failed to launch browser: {e}")))?;

        let handle = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if let Err(err) = h {
                    // Only log if it's not a common websocket deserialization error
                    let err_str = err.to_string();
                    if !err_str.contains("data did not match any variant")
                        && !err_str.contains("untagged enum Message")
                    {
                        error!("Browser handler error: {}", err);
                    } else {
                        debug!("Chrome protocol message ignored: {}", err);
                    }
                }
            }
        });

        let result = self.print_page(&browser, html, out_pdf).await;

        browser.close().await.ok();
        handle.abort();

        result
    }

    async fn print_page(
        &self,
        browser: &Browser,
        html: &str,
        out_pdf: &Path,
    ) -> Result<(), RenderError> {
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| RenderError::Failed(format!("failed to create page: {e}")))?;

        page.set_content(html)
            .await
            .map_err(|e| RenderError::Failed(format!("failed to set page content: {e}")))?;

        // Give the page a moment to settle before printing
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;

        let params = PrintToPdfParams {
            paper_width: Some(self.geometry.width_in),
            paper_height: Some(self.geometry.height_in),
            margin_top: Some(self.geometry.margin_in),
            margin_right: Some(self.geometry.margin_in),
            margin_bottom: Some(self.geometry.margin_in),
            margin_left: Some(self.geometry.margin_in),
            print_background: Some(true),
            prefer_css_page_size: Some(true),
            ..Default::default()
        };

        let pdf_data = page
            .pdf(params)
            .await
            .map_err(|e| RenderError::Failed(format!("failed to generate PDF: {e}")))?;

        fs::write(out_pdf, pdf_data)
            .await
            .map_err(|e| RenderError::Failed(format!("failed to write PDF: {e}")))?;

        Ok(())
    }

    /// Renders to `out_pdf`, or degrades to saving the HTML at `out_html`
    /// for manual printing when the browser is missing or rendering breaks.
    pub async fn render_or_fallback(
        &self,
        html: &str,
        out_pdf: &Path,
        out_html: &Path,
    ) -> Result<(), RenderError> {
        match self.render_pdf(html, out_pdf).await {
            Ok(()) => Ok(()),
            Err(RenderError::Unavailable) => {
                warn!("No Chromium-based browser found. Saving HTML preview for manual printing.");
                fs::write(out_html, html).await?;
                Err(RenderError::FallbackToManual(out_html.to_path_buf()))
            }
            Err(RenderError::Failed(reason)) => {
                warn!("PDF rendering failed: {}", reason);
                warn!("Falling back to saving HTML for manual printing.");
                fs::write(out_html, html).await?;
                Err(RenderError::FallbackToManual(out_html.to_path_buf()))
            }
            Err(other) => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headings_and_body_text_survive_conversion() {
        let body = markdown_to_body("# Title\n\nBody text.");
        assert!(body.contains(">Title</h1>"));
        assert!(body.contains("<p>Body text.</p>"));
    }

    #[test]
    fn tables_and_fenced_code_are_rendered() {
        let body = markdown_to_body(
            "| Name | Value |\n|------|-------|\n| rate | 42 |\n\n```\nlet x = 1;\n```\n",
        );
        assert!(body.contains("<table>"));
        assert!(body.contains("<td>rate</td>"));
        assert!(body.contains("<td>42</td>"));
        assert!(body.contains("<pre"));
        assert!(body.contains("let x = 1;"));
    }

    #[test]
    fn soft_line_breaks_become_hard_breaks() {
        let body = markdown_to_body("first line\nsecond line");
        assert!(body.contains("<br />"));
    }

    #[test]
    fn title_is_html_escaped() {
        let doc = wrap_document("<p>hi</p>", "<Untrusted> & Co", &PageGeometry::letter());
        assert!(doc.contains("<title>&lt;Untrusted&gt; &amp; Co</title>"));
        assert!(!doc.contains("<title><Untrusted>"));
    }

    #[test]
    fn stylesheet_carries_the_page_geometry() {
        let doc = markdown_to_document("# h", "doc", &PageGeometry::letter());
        assert!(doc.contains("size: 8.5in 11in; margin: 1in;"));
        assert!(doc.contains("page-break-inside: avoid"));
        assert!(doc.contains("attr(href)"));
    }

    #[tokio::test]
    async fn missing_browser_degrades_to_saved_html() {
        let renderer = Renderer::new(&Capabilities::default(), PageGeometry::letter());
        let dir = tempfile::tempdir().unwrap();
        let out_pdf = dir.path().join("doc.pdf");
        let out_html = dir.path().join("doc.html");
        let html = markdown_to_document("# Title\n\nBody text.", "doc", &PageGeometry::letter());

        let err = renderer
            .render_or_fallback(&html, &out_pdf, &out_html)
            .await
            .unwrap_err();

        match err {
            RenderError::FallbackToManual(path) => {
                assert_eq!(path, out_html);
                let saved = std::fs::read_to_string(&path).unwrap();
                assert_eq!(saved, html);
            }
            other => panic!("expected manual-print fallback, got: {other}"),
        }
        assert!(!out_pdf.exists());
    }
}
