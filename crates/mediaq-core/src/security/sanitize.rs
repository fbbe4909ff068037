//! URL sanitization against command injection.
//!
//! The raw string, its percent-decoded form and the NFKC normalization of the
//! decoded form are all scanned, so `%3B` or a full-width semicolon cannot
//! smuggle a metacharacter past the check.

use unicode_normalization::UnicodeNormalization;
use url::Url;

use super::reject::{RejectReason, Rejection};

pub const MAX_URL_LEN: usize = 2048;

const FORBIDDEN: &[char] = &[
    ';', '|', '&', '$', '`', '\\', '\n', '\r', '(', ')', '{', '}', '<', '>', '\0',
];

fn first_forbidden(s: &str) -> Option<char> {
    s.chars().find(|c| FORBIDDEN.contains(c))
}

/// Accepts only absolute http(s) URLs with a host and no shell metacharacters
/// in any of the three views. Returns the parsed URL.
pub fn sanitize_url(raw: &str) -> Result<Url, Rejection> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Rejection::new(RejectReason::MalformedUrl, "empty URL"));
    }
    if trimmed.len() > MAX_URL_LEN {
        return Err(Rejection::new(
            RejectReason::MalformedUrl,
            format!("URL longer than {MAX_URL_LEN} bytes"),
        ));
    }

    let bytes = urlencoding::decode_binary(trimmed.as_bytes());
    let decoded = String::from_utf8_lossy(&bytes);
    let normalized: String = decoded.nfkc().collect();
    for view in [trimmed, decoded.as_ref(), normalized.as_str()] {
        if let Some(c) = first_forbidden(view) {
            return Err(Rejection::new(
                RejectReason::UnsafeUrl,
                format!("forbidden character {:?}", c),
            ));
        }
    }

    let url = Url::parse(trimmed)
        .map_err(|e| Rejection::new(RejectReason::MalformedUrl, e.to_string()))?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(Rejection::new(
                RejectReason::UnsupportedScheme,
                format!("scheme {other:?}"),
            ))
        }
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(Rejection::new(RejectReason::MalformedUrl, "missing host"));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_https() {
        let url = sanitize_url("https://www.example.com/watch?v=abc123").unwrap();
        assert_eq!(url.host_str(), Some("www.example.com"));
        assert!(sanitize_url("  http://example.com/clip  ").is_ok());
    }

    #[test]
    fn rejects_shell_metacharacters() {
        for bad in [
            "https://x.test/v?id=1;rm -rf /",
            "https://x.test/v|cat",
            "https://x.test/$(id)",
            "https://x.test/`id`",
            "https://x.test/v?a=1&b=2",
            "https://x.test/a\\b",
            "https://x.test/{a}",
            "https://x.test/<script>",
        ] {
            let err = sanitize_url(bad).unwrap_err();
            assert_eq!(err.reason, RejectReason::UnsafeUrl, "{bad}");
        }
    }

    #[test]
    fn rejects_percent_encoded_bypass() {
        let err = sanitize_url("https://x.test/v%3Brm%20-rf").unwrap_err();
        assert_eq!(err.reason, RejectReason::UnsafeUrl);
        let err = sanitize_url("https://x.test/v%0Aid").unwrap_err();
        assert_eq!(err.reason, RejectReason::UnsafeUrl);
    }

    #[test]
    fn rejects_fullwidth_bypass() {
        // U+FF1B FULLWIDTH SEMICOLON normalizes to ';' under NFKC.
        let err = sanitize_url("https://x.test/v\u{FF1B}id").unwrap_err();
        assert_eq!(err.reason, RejectReason::UnsafeUrl);
        let err = sanitize_url("https://x.test/%EF%BC%9Bid").unwrap_err();
        assert_eq!(err.reason, RejectReason::UnsafeUrl);
    }

    #[test]
    fn rejects_other_schemes() {
        for bad in ["file:///etc/passwd", "ftp://x.test/a", "javascript:alert"] {
            let err = sanitize_url(bad).unwrap_err();
            assert_eq!(err.reason, RejectReason::UnsupportedScheme, "{bad}");
        }
    }

    #[test]
    fn rejects_malformed() {
        assert_eq!(
            sanitize_url("").unwrap_err().reason,
            RejectReason::MalformedUrl
        );
        assert_eq!(
            sanitize_url("not a url").unwrap_err().reason,
            RejectReason::MalformedUrl
        );
        let long = format!("https://x.test/{}", "a".repeat(MAX_URL_LEN));
        assert_eq!(
            sanitize_url(&long).unwrap_err().reason,
            RejectReason::MalformedUrl
        );
    }

    #[test]
    fn same_input_same_reason() {
        let a = sanitize_url("https://x.test/v?id=1;rm -rf /").unwrap_err();
        let b = sanitize_url("https://x.test/v?id=1;rm -rf /").unwrap_err();
        assert_eq!(a, b);
    }
}
