//! Small text helpers for site parsers: slugs, iframe sources, token cipher.

use std::sync::LazyLock;

use regex::Regex;

/// Returned by [`iframe_src`] when the markup has no iframe.
pub const NO_IFRAME: &str = "No iframe found";

const TOKEN_ALPHABET: &[u8; 62] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const TOKEN_SHIFT: usize = 5;

#[allow(clippy::expect_used)]
static IFRAME_SRC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<iframe[^>]+src="([^"]+)""#).expect("iframe regex is valid") // Static pattern, safe to panic
});

/// Last non-empty `/`-separated segment, trimmed.
///
/// ```
/// use scrapist_core::scraper::slug_from_url;
///
/// assert_eq!(slug_from_url("https://example.com/anime/naruto-sub-indo/"), "naruto-sub-indo");
/// ```
#[must_use]
pub fn slug_from_url(url: &str) -> String {
    url.split('/')
        .filter(|segment| !segment.is_empty())
        .next_back()
        .map(|segment| segment.trim().to_string())
        .unwrap_or_default()
}

/// `src` of the first `<iframe>` in a fragment, or [`NO_IFRAME`].
#[must_use]
pub fn iframe_src(html: &str) -> String {
    IFRAME_SRC
        .captures(html)
        .and_then(|captures| captures.get(1))
        .map_or_else(|| NO_IFRAME.to_string(), |src| src.as_str().to_string())
}

/// Trimmed text, empty when absent.
#[must_use]
pub fn clean_text(value: Option<&str>) -> String {
    value.map(str::trim).unwrap_or_default().to_string()
}

/// Parses a number; absent, unparseable and zero values all yield `None`.
#[must_use]
pub fn parse_number(value: Option<&str>) -> Option<f64> {
    value
        .map(str::trim)
        .and_then(|text| text.parse::<f64>().ok())
        .filter(|number| *number != 0.0 && number.is_finite())
}

/// `"Total Episode"` becomes `"totalEpisode"`; `!@#$%^&*` are dropped.
#[must_use]
pub fn to_camel_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (index, word) in text.split(' ').enumerate() {
        if index == 0 {
            out.push_str(&word.to_lowercase());
            continue;
        }
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out.retain(|c| !matches!(c, '!' | '@' | '#' | '$' | '%' | '^' | '&' | '*'));
    out
}

/// Obfuscates a token by rotating each ASCII alphanumeric character five
/// places through `A-Za-z0-9`. Everything else passes through.
#[must_use]
pub fn encode_token(input: &str) -> String {
    rotate(input, TOKEN_SHIFT)
}

/// Inverse of [`encode_token`].
#[must_use]
pub fn decode_token(input: &str) -> String {
    rotate(input, TOKEN_ALPHABET.len() - TOKEN_SHIFT)
}

fn rotate(input: &str, shift: usize) -> String {
    input
        .chars()
        .map(|c| {
            let position = u8::try_from(c)
                .ok()
                .and_then(|byte| TOKEN_ALPHABET.iter().position(|candidate| *candidate == byte));
            match position {
                Some(index) => char::from(TOKEN_ALPHABET[(index + shift) % TOKEN_ALPHABET.len()]),
                None => c,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_from_url() {
        assert_eq!(slug_from_url("/anime/one-piece"), "one-piece");
        assert_eq!(slug_from_url("https://x.test/a/b///"), "b");
        assert_eq!(slug_from_url(""), "");
    }

    #[test]
    fn test_iframe_src() {
        let html = r#"<div><IFRAME width="640" src="https://player.test/e/abc" allowfullscreen></iframe></div>"#;
        assert_eq!(iframe_src(html), "https://player.test/e/abc");
        assert_eq!(iframe_src("<p>nothing</p>"), NO_IFRAME);
    }

    #[test]
    fn test_clean_text_and_parse_number() {
        assert_eq!(clean_text(Some("  Naruto \n")), "Naruto");
        assert_eq!(clean_text(None), "");
        assert_eq!(parse_number(Some(" 12 ")), Some(12.0));
        assert_eq!(parse_number(Some("8.5")), Some(8.5));
        assert_eq!(parse_number(Some("0")), None);
        assert_eq!(parse_number(Some("n/a")), None);
        assert_eq!(parse_number(None), None);
    }

    #[test]
    fn test_to_camel_case() {
        assert_eq!(to_camel_case("Total Episode"), "totalEpisode");
        assert_eq!(to_camel_case("Tanggal Rilis!"), "tanggalRilis");
        assert_eq!(to_camel_case("Studio"), "studio");
    }

    #[test]
    fn test_encode_token_shifts_by_five() {
        assert_eq!(encode_token("ABC"), "FGH");
        assert_eq!(encode_token("xyz"), "234");
        assert_eq!(encode_token("9"), "E");
    }

    #[test]
    fn test_non_alphanumerics_pass_through() {
        assert_eq!(encode_token("a-b_c/é?"), "f-g_h/é?");
        assert_eq!(decode_token("f-g_h/é?"), "a-b_c/é?");
    }

    #[test]
    fn test_token_cipher_roundtrips() {
        for input in ["", "Zz9", "episode-12?id=abc", "ÜnïcødeAZ09", "https://x.test/e/AbC123"] {
            assert_eq!(decode_token(&encode_token(input)), input);
            assert_eq!(encode_token(&decode_token(input)), input);
        }
    }
}
