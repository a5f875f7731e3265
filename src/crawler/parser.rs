//! HTML parser for extracting links to follow
//!
//! Only `<a href>` anchors are considered. Fragment-only and `javascript:`
//! hrefs are skipped; everything else is resolved against the page's origin
//! root and kept if it lands on http(s).

use super::fetcher::RenderedPage;
use crate::url::{origin_root, resolve_http};
use scraper::{Html, Selector};
use std::collections::BTreeSet;
use url::Url;

/// Extracts the unique set of absolute link targets on `page`
///
/// # Example
///
/// ```
/// use site_gleaner::crawler::extract_links;
/// use site_gleaner::RenderedPage;
/// use url::Url;
///
/// let page = RenderedPage::from_html(
///     Url::parse("https://example.test/pages/a.html").unwrap(),
///     r#"<a href="/b">B</a><a href="">Self</a><a href="javascript:void(0)">No</a>"#,
/// );
/// let links = extract_links(&page);
/// assert!(links.contains("https://example.test/b"));
/// assert_eq!(links.len(), 2);
/// ```
pub fn extract_links(page: &RenderedPage) -> BTreeSet<String> {
    let document = Html::parse_document(&page.html);
    collect_links(&document, &page.url)
}

pub(crate) fn collect_links(document: &Html, page_url: &Url) -> BTreeSet<String> {
    let base = origin_root(page_url);
    let mut links = BTreeSet::new();

    if let Ok(a_selector) = Selector::parse("a[href]") {
        for element in document.select(&a_selector) {
            if let Some(href) = element.value().attr("href") {
                if let Some(absolute_url) = resolve_link(href, &base) {
                    links.insert(absolute_url);
                }
            }
        }
    }

    links
}

/// Resolves a link href to an absolute URL
///
/// Returns None if the link should be excluded:
/// - fragment-only hrefs (same page anchors)
/// - `javascript:` hrefs
/// - URLs that fail to resolve or resolve to a non-http(s) scheme
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.starts_with('#') {
        return None;
    }

    if href
        .get(..11)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("javascript:"))
    {
        return None;
    }

    // An empty href refers to the base itself
    if href.is_empty() {
        return Some(base_url.to_string());
    }

    resolve_http(base_url, href).map(|url| url.to_string())
}
