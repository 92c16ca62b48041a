pub const SCHEMA: &str = r#"
-- collections table: one JSON payload per (collection, scope)
CREATE TABLE IF NOT EXISTS collections (
    key TEXT PRIMARY KEY,
    collection TEXT NOT NULL,
    scope_key TEXT NOT NULL,
    payload TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_collections_collection ON collections(collection);
"#;
