pub const SCHEMA: &str = r#"
-- Release records: one JSON document per pushed/built revision.
-- The record column holds the full GitInfo; created_at is duplicated out of
-- the document for inspection with plain SQL.
CREATE TABLE IF NOT EXISTS releases (
    namespace TEXT NOT NULL,
    app TEXT NOT NULL,
    revision TEXT NOT NULL,
    record TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (namespace, app, revision)
);
"#;
