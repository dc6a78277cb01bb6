//! Filename extraction, sanitization, and in-run collision handling.

use std::collections::HashSet;
use std::path::{Component, Path};

use tracing::debug;
use url::Url;

/// Directory name used when a page URL has no usable path segment.
pub const FALLBACK_DIRECTORY_NAME: &str = "game";

/// File name used when a link URL has no usable path segment.
pub const FALLBACK_FILE_NAME: &str = "download.bin";

/// Sanitizes a filename for filesystem safety.
///
/// Replaces characters that are invalid on common filesystems
/// (`/ \ : * ? " < > |`) and control characters with `_`, and rewrites
/// `.`/`..` so the result can never escape its directory.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }

    if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized
            .chars()
            .map(|c| if c == '.' { '_' } else { c })
            .collect()
    }
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

/// Returns the last non-empty path segment of `url`, percent-decoded.
///
/// The query string and fragment are never part of the result.
#[must_use]
pub fn last_path_segment(url: &Url) -> Option<String> {
    let last = url
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .next_back()?;
    let decoded = urlencoding::decode(last).unwrap_or_else(|e| {
        debug!(segment = %last, error = %e, "URL decoding failed, using raw segment");
        last.into()
    });
    let trimmed = decoded.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Derives a safe file name for a link URL, falling back to [`FALLBACK_FILE_NAME`].
#[must_use]
pub fn filename_from_url(url: &Url) -> String {
    last_path_segment(url)
        .map(|segment| sanitize_filename(&segment))
        .filter(|name| !name.trim_matches('_').is_empty())
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string())
}

/// Derives the per-page subdirectory name, falling back to [`FALLBACK_DIRECTORY_NAME`].
#[must_use]
pub fn directory_name_from_url(url: &Url) -> String {
    last_path_segment(url)
        .map(|segment| sanitize_filename(&segment))
        .filter(|name| !name.trim_matches('_').is_empty())
        .unwrap_or_else(|| FALLBACK_DIRECTORY_NAME.to_string())
}

/// Hands out file names that are unique within one run.
///
/// The first claim of a name returns it unchanged; later claims get a numeric
/// suffix before the extension: `file.zip`, `file_2.zip`, `file_3.zip`, ...
/// Comparison ignores ASCII case so the result is also safe on
/// case-insensitive filesystems. Existing files on disk are deliberately not
/// consulted: they are resume candidates, not collisions.
#[derive(Debug, Default)]
pub struct UniqueNames {
    taken: HashSet<String>,
}

impl UniqueNames {
    /// Creates an empty name set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves a name without claiming it for a file (e.g. the journal file).
    pub fn reserve(&mut self, name: &str) {
        self.taken.insert(name.to_ascii_lowercase());
    }

    /// Claims `name`, returning it or a disambiguated variant.
    pub fn claim(&mut self, name: &str) -> String {
        if self.taken.insert(name.to_ascii_lowercase()) {
            return name.to_string();
        }

        let (stem, ext) = split_extension(name);
        let mut suffix = 2usize;
        loop {
            let candidate = format!("{stem}_{suffix}{ext}");
            if self.taken.insert(candidate.to_ascii_lowercase()) {
                debug!(original = %name, renamed = %candidate, "disambiguated colliding file name");
                return candidate;
            }
            suffix += 1;
        }
    }
}

/// Splits `name` into stem and extension (with its dot); dotfiles have no extension.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(pos) if pos > 0 => (&name[..pos], &name[pos..]),
        _ => (name, ""),
    }
}
