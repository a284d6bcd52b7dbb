//! SQLite schema for the relation graph.
//!
//! - `nodes` holds one row per synset, keyed by its string id
//! - `node_labels` models the multi-valued semantic labels
//! - `edges` holds asserted and engine-created edges; the unique key on
//!   `(source, target, relation)` makes duplicate triples unrepresentable
//! - `graph_state` is a single row carrying the readiness flags

/// Migration v1: nodes, edges and readiness flags.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS nodes (
    node_key INTEGER PRIMARY KEY,
    id TEXT NOT NULL UNIQUE CHECK (length(trim(id)) > 0)
);

CREATE TABLE IF NOT EXISTS node_labels (
    node_id TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    label TEXT NOT NULL CHECK (length(trim(label)) > 0),
    PRIMARY KEY (node_id, label)
);

CREATE TABLE IF NOT EXISTS edges (
    edge_key INTEGER PRIMARY KEY,
    source TEXT NOT NULL REFERENCES nodes(id),
    target TEXT NOT NULL REFERENCES nodes(id),
    relation TEXT NOT NULL CHECK (length(trim(relation)) > 0),
    relation_type TEXT NOT NULL CHECK (
        relation_type IN ('taxonomic', 'partWhole', 'association', 'complementary', 'label')
    ),
    depth INTEGER NOT NULL CHECK (depth >= 1),
    provenance TEXT NOT NULL,
    UNIQUE (source, target, relation)
);

CREATE TABLE IF NOT EXISTS graph_state (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL,
    to_validate INTEGER NOT NULL DEFAULT 0 CHECK (to_validate IN (0, 1)),
    to_normalize INTEGER NOT NULL DEFAULT 0 CHECK (to_normalize IN (0, 1)),
    to_augment INTEGER NOT NULL DEFAULT 0 CHECK (to_augment IN (0, 1))
);

INSERT OR IGNORE INTO graph_state (id, schema_version) VALUES (1, 0);
";

/// Migration v2: secondary indexes for per-node and per-layer scans.
pub const MIGRATION_V2_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target);
CREATE INDEX IF NOT EXISTS idx_edges_relation_depth ON edges(relation, depth, edge_key);
CREATE INDEX IF NOT EXISTS idx_edges_source_relation ON edges(source, relation);
";

/// Indexes expected after all migrations.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_edges_target",
    "idx_edges_relation_depth",
    "idx_edges_source_relation",
];
