//! URL helpers for manual submissions

use url::Url;

/// Normalize a user-provided URL by prepending `https://` when the scheme is
/// missing. Anything else is passed through for downstream validation.
#[must_use]
pub fn normalize_submission_url(url: &str) -> String {
    if Url::parse(url).is_ok() {
        return url.to_string();
    }
    format!("https://{url}")
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("https://youtube.com/watch?v=abc", "https://youtube.com/watch?v=abc")]
    #[test_case("http://example.com", "http://example.com")]
    #[test_case("youtube.com/watch?v=abc", "https://youtube.com/watch?v=abc")]
    #[test_case("www.patreon.com/posts/123", "https://www.patreon.com/posts/123")]
    fn normalizes(input: &str, expected: &str) {
        assert_eq!(normalize_submission_url(input), expected);
    }
}
