//! Post rows as seen by the view-count flush.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A published post.
///
/// `view_count` is only ever advanced by the view-count flush job, using an
/// additive update; application code never writes it directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// Primary key.
    pub id: i64,
    /// Post title.
    pub title: String,
    /// Durable view counter.
    pub view_count: i64,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Post {
    /// Creates a post with a zero view count.
    pub fn new(id: i64, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            view_count: 0,
            updated_at: Utc::now(),
        }
    }

    /// Sets the starting view count.
    pub fn with_view_count(mut self, view_count: i64) -> Self {
        self.view_count = view_count;
        self
    }
}
