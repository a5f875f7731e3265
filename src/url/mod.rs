//! URL handling module for Site-Gleaner
//!
//! This module provides URL normalization, origin helpers and the relative
//! reference resolution shared by the image and link extractors.

mod normalize;

pub use normalize::{normalize_parsed, normalize_url};

use url::Url;

/// Returns the root URL of `url`'s origin (`scheme://host[:port]/`)
///
/// Extracted references are resolved against this rather than the full page
/// URL, matching how the rendered-DOM snapshot scripts resolved them.
pub fn origin_root(url: &Url) -> Url {
    let mut root = url.clone();
    root.set_path("/");
    root.set_query(None);
    root.set_fragment(None);
    let _ = root.set_username("");
    let _ = root.set_password(None);
    root
}

/// Returns true if both URLs share scheme, host and port
pub fn same_origin(a: &Url, b: &Url) -> bool {
    a.origin() == b.origin()
}

/// Resolves a raw reference against `base`, keeping only http(s) results
///
/// Returns None for empty input, resolution failures and any other scheme.
pub fn resolve_http(base: &Url, raw: &str) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    match base.join(raw) {
        Ok(resolved) if resolved.scheme() == "http" || resolved.scheme() == "https" => {
            Some(resolved)
        }
        _ => None,
    }
}
