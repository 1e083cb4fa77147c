//! Table layout the jobs rely on.
//!
//! The production PostgreSQL schema is owned by the CRUD service; only the
//! embedded SQLite store creates its own tables, from [`SQLITE_SCHEMA`].

/// SQLite schema for local runs and tests.
pub const SQLITE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS posts (
    id          INTEGER PRIMARY KEY,
    title       TEXT    NOT NULL,
    view_count  INTEGER NOT NULL DEFAULT 0,
    updated_at  TEXT    NOT NULL DEFAULT (datetime('now')),
    deleted_at  TEXT
);

CREATE TABLE IF NOT EXISTS links (
    id          INTEGER PRIMARY KEY,
    name        TEXT    NOT NULL,
    url         TEXT    NOT NULL UNIQUE,
    description TEXT,
    enabled     INTEGER NOT NULL DEFAULT 0,
    sort_order  INTEGER NOT NULL DEFAULT 0,
    status      INTEGER NOT NULL DEFAULT 1,
    deleted_at  TEXT
);

CREATE INDEX IF NOT EXISTS idx_links_status ON links(status);
"#;

/// Table names in the schema.
pub mod tables {
    /// Posts table name.
    pub const POSTS: &str = "posts";
    /// Links table name.
    pub const LINKS: &str = "links";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_schema_covers_tables() {
        assert!(SQLITE_SCHEMA.contains(&format!("TABLE IF NOT EXISTS {}", tables::POSTS)));
        assert!(SQLITE_SCHEMA.contains(&format!("TABLE IF NOT EXISTS {}", tables::LINKS)));
        assert!(SQLITE_SCHEMA.contains("view_count"));
        assert_eq!(SQLITE_SCHEMA.matches("deleted_at  TEXT").count(), 2);
    }
}
