//! Feed identifier validation

/// Check a feed id against the allowed shape: 1-255 chars of
/// `[A-Za-z0-9_-]`.
#[must_use]
pub fn is_valid_feed_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 255
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("my_feed", true)]
    #[test_case("feed-01", true)]
    #[test_case("F", true)]
    #[test_case("", false)]
    #[test_case("feed with spaces", false)]
    #[test_case("feed/../../etc", false)]
    #[test_case("feed.xml", false)]
    fn validates_feed_ids(id: &str, expected: bool) {
        assert_eq!(is_valid_feed_id(id), expected);
    }

    #[test]
    fn rejects_overlong_ids() {
        assert!(!is_valid_feed_id(&"a".repeat(256)));
        assert!(is_valid_feed_id(&"a".repeat(255)));
    }
}
