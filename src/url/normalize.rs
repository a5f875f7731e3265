use crate::UrlError;
use url::Url;

/// List of tracking query parameters to remove during normalization
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "mc_eid",
];

/// Normalizes a URL into the form used as the visited-set key
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Require an `http` or `https` scheme and a host
/// 3. Lowercase the host (done by the parser)
/// 4. Collapse repeated slashes and remove dot segments; empty path becomes `/`
/// 5. Remove the fragment
/// 6. Remove tracking query parameters, sort the rest by key
/// 7. Remove an empty query string
///
/// The scheme, port and trailing slash are preserved so the normalized URL
/// still names the same origin and resource.
///
/// # Examples
///
/// ```
/// use site_gleaner::url::normalize_url;
///
/// let url = normalize_url("https://EXAMPLE.test//a/../b?utm_source=x#top").unwrap();
/// assert_eq!(url.as_str(), "https://example.test/b");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;
    normalize_parsed(url)
}

/// Normalizes an already-parsed URL
pub fn normalize_parsed(mut url: Url) -> Result<Url, UrlError> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    if url.host_str().is_none() {
        return Err(UrlError::MissingHost);
    }

    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);

    url.set_fragment(None);

    if let Some(query) = url.query() {
        let params = filter_and_sort_query_params(query).join("&");
        if params.is_empty() {
            url.set_query(None);
        } else {
            url.set_query(Some(&params));
        }
    }

    Ok(url)
}

/// Normalizes a URL path by collapsing empty and dot segments
fn normalize_path(path: &str) -> String {
    if path.is_empty() || path == "/" {
        return "/".to_string();
    }

    let trailing_slash = path.ends_with('/');
    let mut normalized_segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                normalized_segments.pop();
            }
            _ => normalized_segments.push(segment),
        }
    }

    if normalized_segments.is_empty() {
        return "/".to_string();
    }

    let mut result = format!("/{}", normalized_segments.join("/"));
    if trailing_slash {
        result.push('/');
    }
    result
}

/// Filters out tracking parameters and sorts remaining query parameters
///
/// Pairs are kept byte-for-byte as written (no decoding or form
/// re-encoding) and sorted by key, then value.
fn filter_and_sort_query_params(query: &str) -> Vec<&str> {
    let mut params: Vec<&str> = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| !is_tracking_param(split_pair(pair).0))
        .collect();

    params.sort_by(|a, b| split_pair(a).cmp(&split_pair(b)));
    params
}

fn split_pair(pair: &str) -> (&str, &str) {
    pair.split_once('=').unwrap_or((pair, ""))
}

fn is_tracking_param(key: &str) -> bool {
    TRACKING_PARAMS.contains(&key) || key.starts_with("utm_")
}
