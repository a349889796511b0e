//! HTML link extraction
//!
//! # Link Extraction Rules
//!
//! **Include:**
//! - `href` attributes (`<a>`, `<link>`, `<area>`), including `<a download>`
//! - `src` attributes (`<script>`, `<img>`, `<iframe>`, `<source>`, `<embed>`)
//!
//! **Exclude:**
//! - `javascript:`, `mailto:`, `tel:` links
//! - Data URIs
//! - Fragment-only links
//!
//! Relative links resolve against `<base href>` when the page declares one.

use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Extracts absolute http(s) links from an HTML body
///
/// Links are returned in document order without duplicates.
///
/// # Example
///
/// ```
/// use harvest_engine::crawler::extract_links;
/// use url::Url;
///
/// let html = r#"<a href="/docs">Docs</a><img src="logo.png">"#;
/// let base = Url::parse("https://example.com/index.html").unwrap();
/// let links = extract_links(html, &base);
/// assert_eq!(links, vec!["https://example.com/docs", "https://example.com/logo.png"]);
/// ```
pub fn extract_links(html: &str, page_url: &Url) -> Vec<String> {
    let document = Html::parse_document(html);
    let base_url = declared_base(&document, page_url).unwrap_or_else(|| page_url.clone());

    let mut seen = HashSet::new();
    let mut links = Vec::new();

    let Ok(selector) = Selector::parse("[href], [src]") else {
        return links;
    };

    for element in document.select(&selector) {
        let value = element.value();
        if value.name() == "base" {
            continue;
        }
        for attr in ["href", "src"] {
            if let Some(absolute) = value.attr(attr).and_then(|v| resolve_link(v, &base_url)) {
                if seen.insert(absolute.clone()) {
                    links.push(absolute);
                }
            }
        }
    }

    links
}

fn declared_base(document: &Html, page_url: &Url) -> Option<Url> {
    let selector = Selector::parse("base[href]").ok()?;
    let href = document.select(&selector).next()?.value().attr("href")?;
    page_url.join(href.trim()).ok()
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    let absolute = base_url.join(href).ok()?;
    match absolute.scheme() {
        "http" | "https" => Some(absolute.to_string()),
        _ => None,
    }
}
