//! Image reference extraction
//!
//! Collects every image a rendered page references:
//! - `<img src>` and `<img srcset>`
//! - `<picture><source srcset>`
//! - `url(...)` references in inline `style` attributes mentioning `background-image`
//! - computed `background-image` values captured with the snapshot
//! - `<link rel="preload|prefetch" as="image">`
//!
//! Only absolute http(s) URLs survive; `data:` and other schemes are dropped.

use super::fetcher::RenderedPage;
use crate::url::{origin_root, resolve_http};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::BTreeSet;
use url::Url;

static CSS_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"url\(\s*['"]?([^'")]+)['"]?\s*\)"#).expect("CSS url() pattern"));

static CSS_RULE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([^{}]+)\{([^{}]*)\}").expect("CSS rule pattern"));

static CSS_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("CSS comment pattern"));

/// Accumulates resolved image URLs
struct ImageSet {
    origin: Url,
    urls: BTreeSet<String>,
}

impl ImageSet {
    fn new(page_url: &Url) -> Self {
        Self {
            origin: origin_root(page_url),
            urls: BTreeSet::new(),
        }
    }

    fn insert(&mut self, base: Option<&Url>, raw: &str) {
        let raw = raw.trim();
        if raw.starts_with("data:") {
            return;
        }
        let base = base.unwrap_or(&self.origin);
        if let Some(url) = resolve_http(base, raw) {
            self.urls.insert(url.to_string());
        }
    }

    fn insert_css(&mut self, css: &str) {
        for raw in css_urls(css) {
            self.insert(None, raw);
        }
    }
}

/// Extracts the unique set of absolute image URLs referenced by `page`
///
/// `<img src>` resolves against the document URL; every other source
/// resolves against the page's origin root.
pub fn extract_images(page: &RenderedPage) -> BTreeSet<String> {
    let document = Html::parse_document(&page.html);
    collect_images(&document, page)
}

pub(crate) fn collect_images(document: &Html, page: &RenderedPage) -> BTreeSet<String> {
    let mut images = ImageSet::new(&page.url);

    if let Ok(img) = Selector::parse("img") {
        for element in document.select(&img) {
            if let Some(src) = element.value().attr("src") {
                images.insert(Some(&page.url), src);
            }
            if let Some(srcset) = element.value().attr("srcset") {
                for candidate in srcset_urls(srcset) {
                    images.insert(None, candidate);
                }
            }
        }
    }

    if let Ok(source) = Selector::parse("picture source[srcset]") {
        for element in document.select(&source) {
            if let Some(srcset) = element.value().attr("srcset") {
                for candidate in srcset_urls(srcset) {
                    images.insert(None, candidate);
                }
            }
        }
    }

    if let Ok(styled) = Selector::parse(r#"[style*="background-image"]"#) {
        for element in document.select(&styled) {
            if let Some(style) = element.value().attr("style") {
                images.insert_css(style);
            }
        }
    }

    for background in &page.computed_backgrounds {
        if background.trim() != "none" {
            images.insert_css(background);
        }
    }

    if let Ok(hint) =
        Selector::parse(r#"link[rel="preload"][as="image"], link[rel="prefetch"][as="image"]"#)
    {
        for element in document.select(&hint) {
            if let Some(href) = element.value().attr("href") {
                images.insert(None, href);
            }
        }
    }

    images.urls
}

/// URL part of each `srcset` candidate
///
/// A candidate URL runs up to the next whitespace, so commas inside it (as in
/// `data:` URLs) do not split it. Descriptors (`2x`, `640w`) are dropped.
pub fn srcset_urls(srcset: &str) -> Vec<&str> {
    let mut urls = Vec::new();
    let mut rest = srcset;

    loop {
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == ',');
        if rest.is_empty() {
            break;
        }

        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let (candidate, tail) = rest.split_at(end);
        rest = if candidate.ends_with(',') {
            tail
        } else {
            tail.find(',').map(|i| &tail[i + 1..]).unwrap_or("")
        };

        let url = candidate.trim_end_matches(',');
        if !url.is_empty() {
            urls.push(url);
        }
    }
    urls
}

/// Every `url(...)` reference in a CSS fragment, quotes removed
pub fn css_urls(css: &str) -> impl Iterator<Item = &str> {
    CSS_URL
        .captures_iter(css)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|url| !url.is_empty())
}

/// Background declarations from `<style>` blocks and `style` attributes in `html`
///
/// Stands in for computed styles when no browser renders the page: a rule
/// contributes its `background`/`background-image` values if its selector
/// matches at least one element. At-rules are unwrapped one level, so rules
/// inside `@media` blocks are considered as well. Inline `style` attributes
/// contribute their own background declarations, shorthand included.
pub fn stylesheet_backgrounds(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut backgrounds = Vec::new();

    if let Ok(style) = Selector::parse("style") {
        backgrounds.extend(style_block_backgrounds(&document, &style));
    }

    if let Ok(styled) = Selector::parse("[style]") {
        for element in document.select(&styled) {
            if let Some(style) = element.value().attr("style") {
                backgrounds.extend(background_values(style).into_iter().map(str::to_string));
            }
        }
    }

    backgrounds
}

fn style_block_backgrounds(document: &Html, style: &Selector) -> Vec<String> {
    let mut backgrounds = Vec::new();
    for element in document.select(style) {
        let css: String = element.text().collect();
        let css = CSS_COMMENT.replace_all(&css, "");

        for rule in CSS_RULE.captures_iter(&css) {
            let selector_text = rule[1].trim();
            if selector_text.is_empty() || selector_text.starts_with('@') {
                continue;
            }

            let values = background_values(&rule[2]);
            if values.is_empty() {
                continue;
            }

            let Ok(selector) = Selector::parse(selector_text) else {
                continue;
            };
            if document.select(&selector).next().is_some() {
                backgrounds.extend(values.into_iter().map(str::to_string));
            }
        }
    }
    backgrounds
}

fn background_values(declarations: &str) -> Vec<&str> {
    declarations
        .split(';')
        .filter_map(|decl| decl.split_once(':'))
        .filter(|(property, value)| {
            let property = property.trim().to_ascii_lowercase();
            (property == "background" || property == "background-image") && value.contains("url(")
        })
        .map(|(_, value)| value.trim())
        .collect()
}
