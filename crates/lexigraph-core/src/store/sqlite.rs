//! SQLite-backed [`GraphStore`].
//!
//! Runtime pragmas match the rest of the toolchain:
//! - `journal_mode = WAL` so readers are not blocked by a running phase
//! - `busy_timeout = 5s` to absorb transient lock contention
//! - `foreign_keys = ON` so edges can only reference stored nodes
//!
//! Writes go straight to the connection inside the open transaction, which
//! gives read-your-own-writes for free. `flush` is therefore only a batch
//! boundary marker.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use rusqlite::types::{Type, Value};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use tracing::{debug, trace};

use super::{EdgeFilter, GraphStore, Page, RowKey, migrations};
use crate::error::{Result, StoreError};
use crate::model::{Edge, Node};
use crate::relation::RelationType;
use crate::state::GraphState;

/// Busy timeout used for graph DB connections.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// rusqlite-backed graph store.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    in_unit_of_work: bool,
    pending_writes: usize,
}

impl SqliteStore {
    /// Open (or create) the graph database, apply runtime pragmas, and migrate
    /// the schema to the latest version.
    ///
    /// # Errors
    ///
    /// Returns an error if opening, configuring, or migrating the database
    /// fails.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(StoreError::Io)?;
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn, true)
    }

    /// Open a database previously created with [`SqliteStore::open`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotInitialized`] when `path` does not exist.
    pub fn open_existing(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(StoreError::NotInitialized(path.to_path_buf()).into());
        }
        Self::open(path)
    }

    /// Fresh private in-memory store, mostly for tests and dry runs.
    ///
    /// # Errors
    ///
    /// Returns an error if configuring or migrating the database fails.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, false)
    }

    fn from_connection(mut conn: Connection, wal: bool) -> Result<Self> {
        configure_connection(&conn, wal)?;
        let version = migrations::migrate(&mut conn)?;
        if version != migrations::LATEST_SCHEMA_VERSION {
            return Err(StoreError::SchemaMismatch {
                found: version,
                expected: migrations::LATEST_SCHEMA_VERSION,
            }
            .into());
        }
        Ok(Self {
            conn,
            in_unit_of_work: false,
            pending_writes: 0,
        })
    }

    /// Underlying connection, for read-only inspection.
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Content hash over nodes, labels, edges and readiness flags.
    ///
    /// Two stores with the same fingerprint hold the same graph regardless of
    /// insertion order.
    ///
    /// # Errors
    ///
    /// Propagates SQLite read failures.
    pub fn fingerprint(&self) -> Result<String> {
        let mut hasher = blake3::Hasher::new();

        let mut stmt = self
            .conn
            .prepare("SELECT id FROM nodes ORDER BY id")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            hash_field(&mut hasher, b'n', &id);
        }

        let mut stmt = self
            .conn
            .prepare("SELECT node_id, label FROM node_labels ORDER BY node_id, label")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let node: String = row.get(0)?;
            let label: String = row.get(1)?;
            hash_field(&mut hasher, b'l', &node);
            hash_field(&mut hasher, b'=', &label);
        }

        let mut stmt = self.conn.prepare(
            "SELECT source, target, relation, relation_type, depth, provenance
             FROM edges ORDER BY source, target, relation",
        )?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            for (tag, idx) in [(b'e', 0_usize), (b't', 1), (b'r', 2), (b'k', 3)] {
                let value: String = row.get(idx)?;
                hash_field(&mut hasher, tag, &value);
            }
            let depth: u32 = row.get(4)?;
            hasher.update(&depth.to_le_bytes());
            let provenance: String = row.get(5)?;
            hash_field(&mut hasher, b'p', &provenance);
        }

        let state = self.graph_state()?;
        hasher.update(&[
            u8::from(state.to_validate),
            u8::from(state.to_normalize),
            u8::from(state.to_augment),
        ]);

        Ok(format!("blake3:{}", hasher.finalize().to_hex()))
    }

    /// # Errors
    ///
    /// Propagates SQLite read failures.
    pub fn count_nodes(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Applied schema version.
    ///
    /// # Errors
    ///
    /// Propagates SQLite read failures.
    pub fn schema_version(&self) -> Result<u32> {
        Ok(migrations::current_schema_version(&self.conn)?)
    }

    fn labels_of(&self, id: &str) -> rusqlite::Result<std::collections::BTreeSet<String>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT label FROM node_labels WHERE node_id = ?1 ORDER BY label")?;
        let labels = stmt
            .query_map([id], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<_>>()?;
        Ok(labels)
    }

    const fn note_write(&mut self) {
        self.pending_writes += 1;
    }
}

fn configure_connection(conn: &Connection, wal: bool) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    if wal {
        let _journal_mode: String =
            conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    }
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    Ok(())
}

fn hash_field(hasher: &mut blake3::Hasher, tag: u8, value: &str) {
    hasher.update(&[tag]);
    hasher.update(&u64::try_from(value.len()).unwrap_or(u64::MAX).to_le_bytes());
    hasher.update(value.as_bytes());
}

fn page_limit(limit: usize) -> i64 {
    i64::try_from(limit.max(1)).unwrap_or(i64::MAX)
}

fn edge_from_row(row: &Row<'_>) -> rusqlite::Result<(RowKey, Edge)> {
    let relation_type: String = row.get(4)?;
    let relation_type = relation_type
        .parse::<RelationType>()
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(err)))?;
    Ok((
        row.get(0)?,
        Edge {
            source: row.get(1)?,
            target: row.get(2)?,
            relation: row.get(3)?,
            relation_type,
            depth: row.get(5)?,
            provenance: row.get(6)?,
        },
    ))
}

fn next_cursor<T>(rows: &[(RowKey, T)], limit: usize) -> Option<RowKey> {
    if rows.len() < limit.max(1) {
        return None;
    }
    rows.last().map(|(key, _)| *key)
}

impl GraphStore for SqliteStore {
    fn node_page(&self, after: Option<RowKey>, limit: usize) -> Result<Page<Node>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT node_key, id FROM nodes WHERE node_key > ?1 ORDER BY node_key LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![after.unwrap_or(i64::MIN), page_limit(limit)], |row| {
                Ok((row.get::<_, RowKey>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let next = next_cursor(&rows, limit);
        let mut items = Vec::with_capacity(rows.len());
        for (_, id) in rows {
            let labels = self.labels_of(&id)?;
            items.push(Node { id, labels });
        }
        Ok(Page { items, next })
    }

    fn edge_page(
        &self,
        filter: &EdgeFilter,
        after: Option<RowKey>,
        limit: usize,
    ) -> Result<Page<Edge>> {
        let mut sql = String::from(
            "SELECT edge_key, source, target, relation, relation_type, depth, provenance
             FROM edges WHERE edge_key > ?",
        );
        let mut values = vec![Value::Integer(after.unwrap_or(i64::MIN))];
        if let Some(source) = &filter.source {
            sql.push_str(" AND source = ?");
            values.push(Value::Text(source.clone()));
        }
        if let Some(target) = &filter.target {
            sql.push_str(" AND target = ?");
            values.push(Value::Text(target.clone()));
        }
        if let Some(relation) = &filter.relation {
            sql.push_str(" AND relation = ?");
            values.push(Value::Text(relation.clone()));
        }
        if let Some(depth) = filter.depth {
            sql.push_str(" AND depth = ?");
            values.push(Value::Integer(i64::from(depth)));
        }
        sql.push_str(" ORDER BY edge_key LIMIT ?");
        values.push(Value::Integer(page_limit(limit)));

        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), edge_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let next = next_cursor(&rows, limit);
        Ok(Page {
            items: rows.into_iter().map(|(_, edge)| edge).collect(),
            next,
        })
    }

    fn edge_exists(&self, source: &str, target: &str, relation: &str) -> Result<bool> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT EXISTS(SELECT 1 FROM edges WHERE source = ?1 AND target = ?2 AND relation = ?3)",
        )?;
        Ok(stmt.query_row(params![source, target, relation], |row| row.get(0))?)
    }

    fn node(&self, id: &str) -> Result<Option<Node>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT id FROM nodes WHERE id = ?1")?;
        let Some(id) = stmt
            .query_row([id], |row| row.get::<_, String>(0))
            .optional()?
        else {
            return Ok(None);
        };
        let labels = self.labels_of(&id)?;
        Ok(Some(Node { id, labels }))
    }

    fn node_exists(&self, id: &str) -> Result<bool> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT EXISTS(SELECT 1 FROM nodes WHERE id = ?1)")?;
        Ok(stmt.query_row([id], |row| row.get(0))?)
    }

    fn insert_node(&mut self, node: &Node) -> Result<bool> {
        let inserted = {
            let mut stmt = self
                .conn
                .prepare_cached("INSERT OR IGNORE INTO nodes (id) VALUES (?1)")?;
            stmt.execute([&node.id])? == 1
        };
        let mut stmt = self
            .conn
            .prepare_cached("INSERT OR IGNORE INTO node_labels (node_id, label) VALUES (?1, ?2)")?;
        for label in &node.labels {
            stmt.execute(params![node.id, label])?;
        }
        drop(stmt);
        self.note_write();
        Ok(inserted)
    }

    fn insert_edge(&mut self, edge: &Edge) -> Result<bool> {
        let inserted = {
            let mut stmt = self.conn.prepare_cached(
                "INSERT OR IGNORE INTO edges
                    (source, target, relation, relation_type, depth, provenance)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            stmt.execute(params![
                edge.source,
                edge.target,
                edge.relation,
                edge.relation_type.as_str(),
                edge.depth,
                edge.provenance,
            ])? == 1
        };
        if inserted {
            self.note_write();
        }
        Ok(inserted)
    }

    fn replace_edge(&mut self, edge: &Edge) -> Result<bool> {
        let replaced = {
            let mut stmt = self.conn.prepare_cached(
                "UPDATE edges SET depth = ?4, provenance = ?5
                 WHERE source = ?1 AND target = ?2 AND relation = ?3",
            )?;
            stmt.execute(params![
                edge.source,
                edge.target,
                edge.relation,
                edge.depth,
                edge.provenance,
            ])? == 1
        };
        if replaced {
            self.note_write();
        }
        Ok(replaced)
    }

    fn delete_derived_edges(&mut self, relation: &str) -> Result<u64> {
        let deleted = self
            .conn
            .prepare_cached("DELETE FROM edges WHERE relation = ?1 AND depth > 1")?
            .execute([relation])?;
        if deleted > 0 {
            self.note_write();
        }
        Ok(u64::try_from(deleted).unwrap_or(u64::MAX))
    }

    fn flush(&mut self) -> Result<()> {
        trace!(writes = self.pending_writes, "batch boundary");
        self.pending_writes = 0;
        Ok(())
    }

    fn clear_cache(&mut self) -> Result<()> {
        self.conn.flush_prepared_statement_cache();
        self.conn.execute_batch("PRAGMA shrink_memory")?;
        Ok(())
    }

    fn count_edges(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM edges", [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    fn count_edges_by_relation(&self) -> Result<BTreeMap<String, u64>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT relation, COUNT(*) FROM edges GROUP BY relation")?;
        let counts = stmt
            .query_map([], |row| {
                let count: i64 = row.get(1)?;
                Ok((row.get::<_, String>(0)?, u64::try_from(count).unwrap_or(0)))
            })?
            .collect::<rusqlite::Result<_>>()?;
        Ok(counts)
    }

    fn begin_unit_of_work(&mut self) -> Result<()> {
        if self.in_unit_of_work {
            return Err(StoreError::UnitOfWork("a unit of work is already open").into());
        }
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        self.in_unit_of_work = true;
        self.pending_writes = 0;
        debug!("unit of work started");
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        if !self.in_unit_of_work {
            return Err(StoreError::UnitOfWork("commit without an open unit of work").into());
        }
        self.conn.execute_batch("COMMIT")?;
        self.in_unit_of_work = false;
        debug!("unit of work committed");
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if !self.in_unit_of_work {
            return Err(StoreError::UnitOfWork("rollback without an open unit of work").into());
        }
        self.in_unit_of_work = false;
        self.conn.execute_batch("ROLLBACK")?;
        debug!("unit of work rolled back");
        Ok(())
    }

    fn graph_state(&self) -> Result<GraphState> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT to_validate, to_normalize, to_augment FROM graph_state WHERE id = 1",
        )?;
        Ok(stmt.query_row([], |row| {
            Ok(GraphState {
                to_validate: row.get(0)?,
                to_normalize: row.get(1)?,
                to_augment: row.get(2)?,
            })
        })?)
    }

    fn set_graph_state(&mut self, state: GraphState) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(
            "UPDATE graph_state SET to_validate = ?1, to_normalize = ?2, to_augment = ?3
             WHERE id = 1",
        )?;
        stmt.execute(params![
            state.to_validate,
            state.to_normalize,
            state.to_augment
        ])?;
        Ok(())
    }
}
