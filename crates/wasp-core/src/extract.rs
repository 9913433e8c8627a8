//! HTML title and content extraction.
//!
//! The indexer only relies on the [`HtmlExtractor`] contract: markup in,
//! optional title and content out, or a failure for markup that cannot be
//! used. [`ScraperExtractor`] is the default implementation; any closure
//! with the right signature can stand in for it.

use crate::error::{Result, WaspError};
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};

/// Text extracted from one HTML page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedDocument {
    /// Page title, if the page has a non-empty one
    pub title: Option<String>,

    /// Readable body text, if there is any
    pub content: Option<String>,
}

impl ExtractedDocument {
    /// True when neither title nor content carry text.
    pub fn is_empty(&self) -> bool {
        self.title.as_deref().map_or(true, str::is_empty)
            && self.content.as_deref().map_or(true, str::is_empty)
    }
}

/// Turns HTML into a title and readable content.
pub trait HtmlExtractor: Send + Sync {
    fn extract(&self, html: &str) -> Result<ExtractedDocument>;
}

impl<F> HtmlExtractor for F
where
    F: Fn(&str) -> Result<ExtractedDocument> + Send + Sync,
{
    fn extract(&self, html: &str) -> Result<ExtractedDocument> {
        self(html)
    }
}

/// Elements whose text is never part of the content.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "head", "title"];

/// Elements that start a new line of content.
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "fieldset",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr",
    "li", "main", "nav", "ol", "p", "pre", "section", "table", "td", "th", "tr", "ul",
];

/// Default extractor built on `scraper`.
///
/// - title: the first `<title>`, whitespace collapsed
/// - content: body text with block elements on their own lines, image
///   `alt` text included, link targets left out
#[derive(Debug, Clone, Copy, Default)]
pub struct ScraperExtractor;

impl ScraperExtractor {
    pub fn new() -> Self {
        ScraperExtractor
    }
}

impl HtmlExtractor for ScraperExtractor {
    fn extract(&self, html: &str) -> Result<ExtractedDocument> {
        if html.trim().is_empty() {
            return Err(WaspError::ExtractionFailure {
                reason: "empty document".to_string(),
            });
        }

        let document = Html::parse_document(html);
        let title_selector = selector("title")?;
        let body_selector = selector("body")?;

        let title = document
            .select(&title_selector)
            .next()
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .filter(|t| !t.is_empty());

        let root = document
            .select(&body_selector)
            .next()
            .unwrap_or_else(|| document.root_element());
        let mut raw = String::new();
        render_text(root, &mut raw);

        let content = raw
            .lines()
            .map(collapse_whitespace)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        Ok(ExtractedDocument {
            title,
            content: (!content.is_empty()).then_some(content),
        })
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| WaspError::ExtractionFailure {
        reason: format!("selector {:?}: {:?}", css, e),
    })
}

fn render_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                let name = el.name();
                if SKIPPED_ELEMENTS.contains(&name) {
                    continue;
                }
                if name == "img" {
                    if let Some(alt) = el.attr("alt") {
                        out.push(' ');
                        out.push_str(alt);
                        out.push(' ');
                    }
                    continue;
                }
                let block = BLOCK_ELEMENTS.contains(&name);
                if block {
                    out.push('\n');
                }
                if let Some(child_el) = ElementRef::wrap(child) {
                    render_text(child_el, out);
                }
                if block {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}
