//! Per-run log correlation

use chrono::Utc;

/// Build the correlation id carried by every log line of one pipeline run.
///
/// Attached as a span field so all events for a single job share it.
#[must_use]
pub fn new_context_id(feed_id: &str) -> String {
    format!("{feed_id}-{}", Utc::now().timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embeds_feed_id() {
        let ctx = new_context_id("my_feed");
        assert!(ctx.starts_with("my_feed-"));
        assert!(ctx["my_feed-".len()..].parse::<i64>().is_ok());
    }
}
