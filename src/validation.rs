use url::Url;

use crate::error::{AppError, AppResult};

// =============================================================================
// Batch Parsing
// =============================================================================

/// Line separator of a URL batch. A trailing `\r` on each line is dropped too.
pub const LINE_SEPARATOR: char = '\n';

/// Parse a string that must be an absolute URL with a scheme and a host.
///
/// `test-1.xyz` fails (no scheme), as do `mailto:` style URLs (no host).
fn parse_absolute(candidate: &str) -> Option<Url> {
    Url::parse(candidate)
        .ok()
        .filter(|url| !url.scheme().is_empty() && url.host().is_some())
}

/// Parse a request body into the batch of URLs to fetch.
///
/// Rules:
/// - One URL per line; `\r\n` line endings are accepted
/// - Empty lines are skipped
/// - Every remaining line must be an absolute URL, otherwise the whole batch
///   is rejected with [`AppError::InvalidUrl`] naming the first bad line
/// - More than `max_urls` URLs is rejected with [`AppError::BadRequest`]
///
/// Every line is validated before the count is checked, so an invalid line
/// anywhere in an oversized batch still yields [`AppError::InvalidUrl`].
///
/// An empty body yields an empty batch.
pub fn parse_url_batch(body: &str, max_urls: usize) -> AppResult<Vec<Url>> {
    let mut urls = Vec::new();

    for line in body.split(LINE_SEPARATOR) {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            continue;
        }

        let url = parse_absolute(line).ok_or_else(|| AppError::InvalidUrl(line.to_string()))?;
        urls.push(url);
    }

    if urls.len() > max_urls {
        return Err(AppError::BadRequest(format!(
            "Batch cannot contain more than {max_urls} URLs (got {})",
            urls.len()
        )));
    }

    Ok(urls)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_urls() {
        assert!(parse_absolute("https://test-1.com").is_some());
        assert!(parse_absolute("http://127.0.0.1:8080/path?q=1").is_some());
        assert!(parse_absolute("http://[::1]/").is_some());
    }

    #[test]
    fn test_not_absolute_urls() {
        assert!(parse_absolute("test-1.xyz").is_none());
        assert!(parse_absolute("/relative/path").is_none());
        assert!(parse_absolute("mailto:someone@test.com").is_none());
        assert!(parse_absolute("").is_none());
        assert!(parse_absolute("https://").is_none());
    }

    #[test]
    fn test_parse_batch() {
        let urls = parse_url_batch("https://test-1.com\nhttps://test-2.com/a", 10).unwrap();

        assert_eq!(urls.len(), 2);
        assert_eq!(urls[0].as_str(), "https://test-1.com/");
        assert_eq!(urls[1].as_str(), "https://test-2.com/a");
    }

    #[test]
    fn test_parse_batch_skips_empty_lines() {
        let urls = parse_url_batch("\nhttps://test-1.com\n\n\nhttps://test-2.com\n", 10).unwrap();
        assert_eq!(urls.len(), 2);
    }

    #[test]
    fn test_parse_batch_accepts_crlf() {
        let urls = parse_url_batch("https://test-1.com\r\nhttps://test-2.com\r\n", 10).unwrap();

        assert_eq!(urls.len(), 2);
        assert_eq!(urls[0].host_str(), Some("test-1.com"));
    }

    #[test]
    fn test_parse_empty_body() {
        assert!(parse_url_batch("", 10).unwrap().is_empty());
        assert!(parse_url_batch("\n\r\n", 10).unwrap().is_empty());
    }

    #[test]
    fn test_parse_batch_rejects_invalid_line() {
        let err = parse_url_batch("https://test-1.com\ntest-1.xyz\nnot a url", 10).unwrap_err();

        assert!(matches!(&err, AppError::InvalidUrl(line) if line == "test-1.xyz"));
        assert!(err.to_string().contains("'test-1.xyz' is not a URL"));
    }

    #[test]
    fn test_parse_batch_at_limit() {
        let body = ["https://test-1.com"; 3].join("\n");
        assert_eq!(parse_url_batch(&body, 3).unwrap().len(), 3);
    }

    #[test]
    fn test_parse_batch_over_limit() {
        let body = ["https://test-1.com"; 4].join("\n");

        let err = parse_url_batch(&body, 3).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert!(err.to_string().contains("more than 3 URLs"));
    }

    #[test]
    fn test_invalid_line_wins_over_url_limit() {
        let mut lines = vec!["https://test-1.com"; 4];
        lines.push("test-1.xyz");

        let err = parse_url_batch(&lines.join("\n"), 3).unwrap_err();
        assert!(matches!(&err, AppError::InvalidUrl(line) if line == "test-1.xyz"));
    }
}
