//! Base-URL and path normalization shared by the engine and site parsers.

use url::Url;

/// Strips every trailing `/` from a base URL.
///
/// ```
/// use scrapist_core::scraper::normalize_base_url;
///
/// assert_eq!(normalize_base_url("https://example.com///"), "https://example.com");
/// ```
#[must_use]
pub fn normalize_base_url(base: &str) -> String {
    base.trim_end_matches('/').to_string()
}

/// Joins path segments under a single leading slash.
///
/// Empty and `.` segments vanish, `..` pops the previous segment, backslashes
/// count as separators and trailing slashes are stripped. The root itself
/// normalizes to the empty string. Idempotent.
///
/// ```
/// use scrapist_core::scraper::join_url_path;
///
/// assert_eq!(join_url_path(["anime/", "/ongoing//", "page/2/"]), "/anime/ongoing/page/2");
/// assert_eq!(join_url_path(["/"]), "");
/// ```
#[must_use]
pub fn join_url_path<I, S>(segments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut parts: Vec<String> = Vec::new();
    for segment in segments {
        let segment = segment.as_ref().replace('\\', "/");
        for part in segment.split('/') {
            match part {
                "" | "." => {}
                ".." => {
                    parts.pop();
                }
                other => parts.push(other.to_string()),
            }
        }
    }

    if parts.is_empty() {
        String::new()
    } else {
        format!("/{}", parts.join("/"))
    }
}

/// Normalizes a single target path. Shorthand for `join_url_path([path])`.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    join_url_path([path])
}

/// Resolves a request target against the base URL.
///
/// Absolute URLs pass through and an empty path yields the base. Anything
/// else stays under the base, so `/ongoing` on `https://h/anime` becomes
/// `https://h/anime/ongoing`, the same URL the fetch context requests.
/// Falls back to plain concatenation when the base does not parse.
#[must_use]
pub fn resolve_request_url(base: &str, path_or_url: &str) -> String {
    if path_or_url.starts_with("http") {
        return path_or_url.to_string();
    }
    if path_or_url.is_empty() {
        return base.to_string();
    }

    let relative = path_or_url.trim_start_matches('/');
    let base = base.trim_end_matches('/');
    Url::parse(&format!("{base}/"))
        .and_then(|parsed| parsed.join(relative))
        .map_or_else(|_| format!("{base}/{relative}"), String::from)
}

/// Path component of an absolute URL; `/` when it does not parse.
#[must_use]
pub fn url_path(url: &str) -> String {
    Url::parse(url).map_or_else(|_| "/".to_string(), |parsed| parsed.path().to_string())
}

/// Builds an absolute source URL for an in-site link.
///
/// A value already containing `base` is re-rooted on it, a `/path` is
/// appended to it, and anything else (including `None`) yields `base`.
#[must_use]
pub fn source_url(base: &str, url_or_path: Option<&str>) -> String {
    match url_or_path {
        Some(value) if !base.is_empty() && value.contains(base) => {
            format!("{base}{}", value.replacen(base, "", 1))
        }
        Some(value) if value.starts_with('/') => format!("{base}{value}"),
        _ => base.to_string(),
    }
}

/// API-side link: the scraper's base path joined with `segments`.
#[must_use]
pub fn href<S: AsRef<str>>(base_path: &str, segments: &[S]) -> String {
    join_url_path(std::iter::once(base_path).chain(segments.iter().map(AsRef::as_ref)))
}

/// Whether `target` has the same origin (scheme, host, port) as `base`.
#[must_use]
pub fn same_origin(base: &str, target: &str) -> bool {
    match (Url::parse(base), Url::parse(target)) {
        (Ok(base), Ok(target)) => base.origin() == target.origin(),
        _ => false,
    }
}
