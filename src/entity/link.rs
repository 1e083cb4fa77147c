//! Outbound links and their health status.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Reachability of a link as last observed by the health-check job.
///
/// Stored as a `SMALLINT`: `1` for normal, `2` for abnormal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    /// The last probe answered with a 2xx status.
    Normal,
    /// The last probe failed, timed out, answered non-2xx, or was never sent.
    Abnormal,
}

impl LinkStatus {
    /// Column encoding of this status.
    pub fn as_i16(self) -> i16 {
        match self {
            LinkStatus::Normal => 1,
            LinkStatus::Abnormal => 2,
        }
    }

    /// Decodes the column value. Unknown values are treated as abnormal.
    pub fn from_i16(value: i16) -> Self {
        match value {
            1 => LinkStatus::Normal,
            _ => LinkStatus::Abnormal,
        }
    }

    /// Status label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            LinkStatus::Normal => "normal",
            LinkStatus::Abnormal => "abnormal",
        }
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A friend/outbound link listed on the blog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Primary key.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Target URL; only `https` targets are probed.
    pub url: String,
    /// Optional description.
    pub description: Option<String>,
    /// Whether the link is shown publicly.
    pub enabled: bool,
    /// Display ordering.
    pub sort_order: i32,
    /// Current health status.
    pub status: LinkStatus,
}

impl Link {
    /// Creates an enabled link in the `Normal` state.
    pub fn new(id: i64, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            url: url.into(),
            description: None,
            enabled: true,
            sort_order: 0,
            status: LinkStatus::Normal,
        }
    }

    /// Sets the stored status.
    pub fn with_status(mut self, status: LinkStatus) -> Self {
        self.status = status;
        self
    }

    /// Sets the enabled flag.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Aggregate counts for the link dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkOverview {
    /// All links.
    pub total: i64,
    /// Links currently `Normal`.
    pub normal: i64,
    /// Links currently `Abnormal`.
    pub abnormal: i64,
    /// Links not yet enabled.
    pub pending: i64,
}

impl LinkOverview {
    /// Derives the overview from raw counts.
    pub fn from_counts(total: i64, normal: i64, enabled: i64) -> Self {
        Self {
            total,
            normal,
            abnormal: total - normal,
            pending: total - enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_status_column_encoding() {
        assert_eq!(LinkStatus::Normal.as_i16(), 1);
        assert_eq!(LinkStatus::Abnormal.as_i16(), 2);
        assert_eq!(LinkStatus::from_i16(1), LinkStatus::Normal);
        assert_eq!(LinkStatus::from_i16(2), LinkStatus::Abnormal);
        assert_eq!(LinkStatus::from_i16(0), LinkStatus::Abnormal);
    }

    #[test]
    fn test_link_overview_from_counts() {
        let overview = LinkOverview::from_counts(10, 7, 8);
        assert_eq!(overview.total, 10);
        assert_eq!(overview.normal, 7);
        assert_eq!(overview.abnormal, 3);
        assert_eq!(overview.pending, 2);
    }

    #[test]
    fn test_link_builder() {
        let link = Link::new(3, "ok", "https://ok.example")
            .with_status(LinkStatus::Abnormal)
            .with_enabled(false);
        assert_eq!(link.id, 3);
        assert_eq!(link.status, LinkStatus::Abnormal);
        assert!(!link.enabled);
    }
}
