//! Destination name resolution
//!
//! Turns a desired file name into one that is safe and collision-free inside
//! a target directory. Resolution is deterministic given the directory
//! contents: sanitize the name, return it unchanged if unused, otherwise
//! probe `base(0).suffix`, `base(1).suffix`, … until a free candidate is
//! found. The engine resolves each task's name exactly once, at first
//! admission; restarts reuse the stored result without re-probing.

use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use url::Url;

/// Upper bound on collision probing before falling back to a timestamped name
const MAX_PROBE_ATTEMPTS: usize = 9999;

/// Characters never allowed in a resolved file name
fn forbidden_chars() -> &'static Regex {
    static FORBIDDEN: OnceLock<Regex> = OnceLock::new();
    FORBIDDEN.get_or_init(|| {
        #[allow(clippy::expect_used)]
        Regex::new(r#"[<>:"/\\*?|]"#).expect("pattern is a compile-time literal")
    })
}

/// Strip forbidden characters and surrounding whitespace from a file name
pub fn sanitize(name: &str) -> String {
    forbidden_chars().replace_all(name, "").trim().to_string()
}

/// Derive a desired file name from the final path segment of a URL
///
/// The segment is percent-decoded and sanitized; `fallback` is returned when
/// the URL yields nothing usable (no path, empty segment, or a segment that
/// sanitizes away completely).
pub fn derive_from_url(url: &Url, fallback: &str) -> String {
    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("");
    let decoded = urlencoding::decode(segment)
        .map(|cow| cow.into_owned())
        .unwrap_or_else(|_| segment.to_string());
    let cleaned = sanitize(&decoded);
    if cleaned.is_empty() {
        fallback.to_string()
    } else {
        cleaned
    }
}

/// Resolve a collision-free file name for `desired` inside `dir`
///
/// `default_extension` is used when the desired name has no suffix and a
/// collision forces probing; `fallback` replaces names that sanitize to
/// nothing. Only the name is returned; the caller joins it onto `dir`.
pub fn resolve(dir: &Path, desired: &str, default_extension: &str, fallback: &str) -> String {
    let mut name = sanitize(desired);
    if name.is_empty() {
        name = fallback.to_string();
    }

    if !dir.join(&name).exists() {
        return name;
    }

    let (base, suffix) = match name.rsplit_once('.') {
        Some((base, suffix)) if !suffix.is_empty() => (base.to_string(), suffix.to_string()),
        Some((base, _)) => (base.to_string(), default_extension.to_string()),
        None => (name.clone(), default_extension.to_string()),
    };

    for attempt in 0..MAX_PROBE_ATTEMPTS {
        let candidate = format!("{base}({attempt}).{suffix}");
        if !dir.join(&candidate).exists() {
            return candidate;
        }
    }

    // Practically unreachable; a timestamp keeps the result unique anyway
    let timestamp = chrono::Utc::now().timestamp();
    format!("{base}({timestamp}).{suffix}")
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    fn touch(dir: &TempDir, name: &str) {
        File::create(dir.path().join(name)).unwrap();
    }

    // --- sanitize ---

    #[test]
    fn sanitize_removes_every_forbidden_character() {
        assert_eq!(sanitize(r#"a<b>c:d"e/f\g*h?i|j"#), "abcdefghij");
    }

    #[test]
    fn sanitize_trims_surrounding_whitespace() {
        assert_eq!(sanitize("  report.pdf  "), "report.pdf");
    }

    #[test]
    fn sanitize_keeps_ordinary_names_untouched() {
        assert_eq!(sanitize("archive-2024_v1.tar.gz"), "archive-2024_v1.tar.gz");
    }

    #[test]
    fn sanitize_can_empty_a_name_entirely() {
        assert_eq!(
            sanitize(r#" <*?> "#),
            "",
            "a name of only forbidden characters and spaces must sanitize to empty"
        );
    }

    // --- resolve ---

    #[test]
    fn unused_name_is_returned_unchanged() {
        let dir = TempDir::new().unwrap();
        assert_eq!(resolve(dir.path(), "a.txt", "txt", "download"), "a.txt");
    }

    #[test]
    fn first_collision_yields_index_zero() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "a.txt");
        assert_eq!(resolve(dir.path(), "a.txt", "txt", "download"), "a(0).txt");
    }

    #[test]
    fn occupied_candidates_are_skipped_in_order() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "a.txt");
        touch(&dir, "a(0).txt");
        assert_eq!(resolve(dir.path(), "a.txt", "txt", "download"), "a(1).txt");

        touch(&dir, "a(1).txt");
        assert_eq!(resolve(dir.path(), "a.txt", "txt", "download"), "a(2).txt");
    }

    #[test]
    fn suffix_splits_at_the_last_dot() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "data.tar.gz");
        assert_eq!(
            resolve(dir.path(), "data.tar.gz", "txt", "download"),
            "data.tar(0).gz",
            "only the substring after the last dot is the suffix"
        );
    }

    #[test]
    fn suffixless_name_gains_the_default_extension_on_collision() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "notes");
        assert_eq!(resolve(dir.path(), "notes", "txt", "download"), "notes(0).txt");
    }

    #[test]
    fn trailing_dot_counts_as_no_suffix() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "notes.");
        assert_eq!(resolve(dir.path(), "notes.", "txt", "download"), "notes(0).txt");
    }

    #[test]
    fn forbidden_characters_are_stripped_before_probing() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            resolve(dir.path(), r#"re:port?.pdf"#, "txt", "download"),
            "report.pdf"
        );
    }

    #[test]
    fn fully_sanitized_away_name_falls_back() {
        let dir = TempDir::new().unwrap();
        assert_eq!(resolve(dir.path(), "???", "txt", "download"), "download");
    }

    #[test]
    fn probing_applies_to_the_fallback_name_too() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "download");
        assert_eq!(
            resolve(dir.path(), "***", "txt", "download"),
            "download(0).txt"
        );
    }

    // --- derive_from_url ---

    #[test]
    fn url_name_comes_from_the_final_path_segment() {
        let url = Url::parse("http://example.com/files/report.pdf").unwrap();
        assert_eq!(derive_from_url(&url, "download"), "report.pdf");
    }

    #[test]
    fn url_name_is_percent_decoded() {
        let url = Url::parse("http://example.com/files/annual%20report.pdf").unwrap();
        assert_eq!(derive_from_url(&url, "download"), "annual report.pdf");
    }

    #[test]
    fn url_with_trailing_slash_falls_back() {
        let url = Url::parse("http://example.com/files/").unwrap();
        assert_eq!(
            derive_from_url(&url, "download"),
            "download",
            "an empty final segment yields the fallback name"
        );
    }

    #[test]
    fn bare_host_url_falls_back() {
        let url = Url::parse("http://example.com").unwrap();
        assert_eq!(derive_from_url(&url, "download"), "download");
    }

    #[test]
    fn url_segment_is_sanitized_after_decoding() {
        let url = Url::parse("http://example.com/a%3Cb%3E.txt").unwrap();
        assert_eq!(
            derive_from_url(&url, "download"),
            "ab.txt",
            "decoded angle brackets must be stripped like any other forbidden character"
        );
    }
}
