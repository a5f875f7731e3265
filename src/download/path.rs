//! Local path derivation for downloaded images
//!
//! A URL maps to `<folder>/<decoded path segments>/<sanitized name>`, all
//! relative to the output root. The mapping never produces a path that can
//! leave the output root.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use url::Url;

/// File extensions treated as images, in inference order
pub const IMAGE_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".webp", ".svg", ".bmp", ".ico", ".tiff", ".avif",
];

/// Extension appended when neither the name nor the URL suggests one
pub const DEFAULT_EXTENSION: &str = ".jpg";

const MAX_FILE_NAME_BYTES: usize = 200;
const HASH_SUFFIX_LEN: usize = 12;

/// Relative output path for `url`, optionally under a per-page `folder`
///
/// # Example
///
/// ```
/// use site_gleaner::download::local_path;
/// use std::path::PathBuf;
/// use url::Url;
///
/// let url = Url::parse("https://example.test/img/Brand%20Logo.png?v=3").unwrap();
/// assert_eq!(local_path(&url, None), PathBuf::from("img/Brand Logo.png"));
/// ```
pub fn local_path(url: &Url, folder: Option<&str>) -> PathBuf {
    let raw = match url.path() {
        "" | "/" => "/index",
        other => other,
    };

    let decoded = percent_decode(raw);
    let mut segments: Vec<String> = decoded
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .map(replace_unsafe)
        .collect();

    let mut file_name = segments.pop().unwrap_or_else(|| "index".to_string());
    if !has_image_extension(&file_name) {
        file_name.push_str(infer_extension(url.as_str()));
    }
    let file_name = truncate_file_name(sanitize_file_name(&file_name));

    let mut path = PathBuf::new();
    if let Some(folder) = folder.map(replace_unsafe).filter(|f| !f.is_empty() && f != "." && f != "..") {
        path.push(folder);
    }
    for segment in segments {
        path.push(segment);
    }
    path.push(file_name);
    path
}

/// Returns true if `name` ends in a recognized image extension
pub fn has_image_extension(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// First image extension mentioned anywhere in `url`, else [`DEFAULT_EXTENSION`]
pub fn infer_extension(url: &str) -> &'static str {
    let lower = url.to_ascii_lowercase();
    IMAGE_EXTENSIONS
        .iter()
        .copied()
        .find(|ext| lower.contains(ext))
        .unwrap_or(DEFAULT_EXTENSION)
}

/// `logo.jpg` -> `logo_<n>.jpg`
pub fn with_suffix(path: &Path, n: usize) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, n, ext.to_string_lossy()),
        None => format!("{}_{}", stem, n),
    };
    path.with_file_name(name)
}

/// First of `path`, `path_1`, `path_2`, ... that `is_taken` rejects
pub fn unique_path(path: PathBuf, is_taken: impl Fn(&Path) -> bool) -> PathBuf {
    if !is_taken(&path) {
        return path;
    }
    let mut n = 1;
    loop {
        let candidate = with_suffix(&path, n);
        if !is_taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

fn percent_decode(raw: &str) -> String {
    String::from_utf8_lossy(&urlencoding::decode_binary(raw.as_bytes())).into_owned()
}

/// Replaces characters that are invalid in path segments on common filesystems
fn replace_unsafe(segment: &str) -> String {
    segment
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Restricts a file name to ASCII letters, digits, `_`, `-`, `.` and space
fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Shortens over-long names, keeping the extension and adding a hash of the
/// full name so distinct long names stay distinct
///
/// Expects an ASCII name, as produced by [`sanitize_file_name`].
fn truncate_file_name(name: String) -> String {
    if name.len() <= MAX_FILE_NAME_BYTES || !name.is_ascii() {
        return name;
    }

    let digest = hex::encode(Sha256::digest(name.as_bytes()));
    let hash = &digest[..HASH_SUFFIX_LEN];

    let (stem, ext) = match name.rfind('.') {
        Some(dot) if name.len() - dot <= 16 => name.split_at(dot),
        _ => (name.as_str(), ""),
    };
    let keep = MAX_FILE_NAME_BYTES - ext.len() - hash.len() - 1;
    format!("{}_{}{}", &stem[..keep.min(stem.len())], hash, ext)
}
