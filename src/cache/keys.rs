//! Key layout for buffered view counters.

/// Builds and parses `"<namespace>:post:view_count:<post_id>"` keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewCountKeys {
    namespace: String,
}

impl Default for ViewCountKeys {
    fn default() -> Self {
        Self::new("blog")
    }
}

impl ViewCountKeys {
    const SUFFIX: &'static str = "post:view_count";

    /// Creates a key builder for the given namespace.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// Namespace prefix.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Counter key for a post.
    pub fn key(&self, post_id: i64) -> String {
        format!("{}:{}:{}", self.namespace, Self::SUFFIX, post_id)
    }

    /// Scan pattern matching every counter in the namespace.
    pub fn pattern(&self) -> String {
        format!("{}:{}:*", self.namespace, Self::SUFFIX)
    }

    /// Extracts the post ID from the trailing segment of a counter key.
    ///
    /// Returns `None` for keys with fewer than four `:`-separated segments
    /// or a trailing segment that is not a positive integer.
    pub fn parse_post_id(key: &str) -> Option<i64> {
        if key.split(':').count() < 4 {
            return None;
        }
        let id: i64 = key.rsplit(':').next()?.parse().ok()?;
        (id > 0).then_some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_and_pattern() {
        let keys = ViewCountKeys::default();
        assert_eq!(keys.key(7), "blog:post:view_count:7");
        assert_eq!(keys.pattern(), "blog:post:view_count:*");

        let keys = ViewCountKeys::new("staging");
        assert_eq!(keys.key(42), "staging:post:view_count:42");
    }

    #[test]
    fn test_parse_post_id() {
        assert_eq!(ViewCountKeys::parse_post_id("blog:post:view_count:7"), Some(7));
        assert_eq!(ViewCountKeys::parse_post_id("blog:post:view_count:abc"), None);
        assert_eq!(ViewCountKeys::parse_post_id("blog:post:view_count:"), None);
        assert_eq!(ViewCountKeys::parse_post_id("blog:post:view_count:0"), None);
        assert_eq!(ViewCountKeys::parse_post_id("blog:post:view_count:-3"), None);
        assert_eq!(ViewCountKeys::parse_post_id("view_count:7"), None);
    }

    #[test]
    fn test_roundtrip_through_key() {
        let keys = ViewCountKeys::new("blog");
        assert_eq!(ViewCountKeys::parse_post_id(&keys.key(123456)), Some(123456));
    }
}
