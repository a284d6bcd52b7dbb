//! Graph store capability.
//!
//! The engine only talks to a [`GraphStore`]: keyset-paged reads, dedup
//! probes, write-through inserts and one unit of work per phase. Paging is
//! wrapped by [`NodeScroll`] and [`EdgeScroll`] so that a phase never holds
//! more than one page of rows.

pub mod migrations;
pub mod schema;
pub mod sqlite;

use std::collections::BTreeMap;

use crate::error::{EngineError, Result};
use crate::model::{Edge, Node};
use crate::state::GraphState;

pub use sqlite::SqliteStore;

/// Opaque, monotonically increasing row position used for keyset paging.
pub type RowKey = i64;

/// One page of rows plus the cursor for the following page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// `None` when this is the last page.
    pub next: Option<RowKey>,
}

impl<T> Page<T> {
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            items: Vec::new(),
            next: None,
        }
    }
}

/// Conjunctive filter over edge columns. An empty filter matches every edge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeFilter {
    pub source: Option<String>,
    pub target: Option<String>,
    pub relation: Option<String>,
    pub depth: Option<u32>,
}

impl EdgeFilter {
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_node(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    #[must_use]
    pub fn to_node(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    #[must_use]
    pub fn relation(mut self, relation: impl Into<String>) -> Self {
        self.relation = Some(relation.into());
        self
    }

    #[must_use]
    pub const fn depth(mut self, depth: u32) -> Self {
        self.depth = Some(depth);
        self
    }

    #[must_use]
    pub fn matches(&self, edge: &Edge) -> bool {
        self.source.as_deref().is_none_or(|s| s == edge.source)
            && self.target.as_deref().is_none_or(|t| t == edge.target)
            && self.relation.as_deref().is_none_or(|r| r == edge.relation)
            && self.depth.is_none_or(|d| d == edge.depth)
    }
}

/// Storage capability consumed by the engine phases.
///
/// Implementations must provide read-your-own-writes inside an open unit of
/// work: an edge inserted by a phase is visible to its later probes and
/// scans.
pub trait GraphStore {
    /// Nodes with a row position strictly after `after`, in row order.
    fn node_page(&self, after: Option<RowKey>, limit: usize) -> Result<Page<Node>>;

    /// Edges matching `filter` strictly after `after`, in row order.
    fn edge_page(
        &self,
        filter: &EdgeFilter,
        after: Option<RowKey>,
        limit: usize,
    ) -> Result<Page<Edge>>;

    /// True when an edge with this triple exists at any depth.
    fn edge_exists(&self, source: &str, target: &str, relation: &str) -> Result<bool>;

    /// The edge with this triple, at whatever depth it is stored.
    fn edge(&self, source: &str, target: &str, relation: &str) -> Result<Option<Edge>> {
        let filter = EdgeFilter::all()
            .from_node(source)
            .to_node(target)
            .relation(relation);
        Ok(self.edge_page(&filter, None, 1)?.items.into_iter().next())
    }

    fn node(&self, id: &str) -> Result<Option<Node>>;

    fn node_exists(&self, id: &str) -> Result<bool> {
        Ok(self.node(id)?.is_some())
    }

    /// Fetch a node that must exist.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] when the node is absent.
    fn require_node(&self, id: &str) -> Result<Node> {
        self.node(id)?
            .ok_or_else(|| EngineError::node_not_found(id))
    }

    /// Insert a node, merging labels into an existing one. Returns `true`
    /// when the node did not exist before.
    fn insert_node(&mut self, node: &Node) -> Result<bool>;

    /// Insert an edge. Returns `false` when the triple already exists.
    fn insert_edge(&mut self, edge: &Edge) -> Result<bool>;

    /// Overwrite the depth and provenance of the stored edge with this
    /// triple. Returns `false` when no such edge exists.
    fn replace_edge(&mut self, edge: &Edge) -> Result<bool>;

    /// Delete every edge of `relation` deeper than 1. Returns the number of
    /// edges removed.
    fn delete_derived_edges(&mut self, relation: &str) -> Result<u64>;

    /// Mark a batch boundary.
    fn flush(&mut self) -> Result<()>;

    /// Release cached statements and memory held between batches.
    fn clear_cache(&mut self) -> Result<()>;

    fn count_edges(&self) -> Result<u64>;

    fn count_edges_by_relation(&self) -> Result<BTreeMap<String, u64>>;

    fn begin_unit_of_work(&mut self) -> Result<()>;

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;

    fn graph_state(&self) -> Result<GraphState>;

    fn set_graph_state(&mut self, state: GraphState) -> Result<()>;
}

/// Run `work` inside one unit of work, committing on success and rolling
/// back on any error. The original error is returned even when the rollback
/// itself fails.
///
/// # Errors
///
/// Propagates the error from `work`, or from `begin`/`commit`.
pub fn in_unit_of_work<S, T, F>(store: &mut S, work: F) -> Result<T>
where
    S: GraphStore + ?Sized,
    F: FnOnce(&mut S) -> Result<T>,
{
    store.begin_unit_of_work()?;
    let outcome = work(store).and_then(|value| store.commit().map(|()| value));
    if let Err(err) = &outcome {
        tracing::warn!(error = %err, "rolling back unit of work");
        if let Err(rollback_err) = store.rollback() {
            tracing::error!(error = %rollback_err, "rollback failed");
        }
    }
    outcome
}

// ---------------------------------------------------------------------------
// Scrolling cursors
// ---------------------------------------------------------------------------

/// Lazy, restartable cursor over all nodes.
#[derive(Debug, Clone)]
pub struct NodeScroll {
    after: Option<RowKey>,
    page_size: usize,
    exhausted: bool,
}

impl NodeScroll {
    #[must_use]
    pub fn new(page_size: usize) -> Self {
        Self {
            after: None,
            page_size: page_size.max(1),
            exhausted: false,
        }
    }

    /// Next page of nodes, or `None` once the cursor is exhausted.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub fn next_batch<S: GraphStore + ?Sized>(&mut self, store: &S) -> Result<Option<Vec<Node>>> {
        if self.exhausted {
            return Ok(None);
        }
        let page = store.node_page(self.after, self.page_size)?;
        self.advance(page.next);
        Ok((!page.items.is_empty()).then_some(page.items))
    }

    fn advance(&mut self, next: Option<RowKey>) {
        match next {
            Some(key) => self.after = Some(key),
            None => self.exhausted = true,
        }
    }

    /// Rewind to the first page.
    pub const fn reset(&mut self) {
        self.after = None;
        self.exhausted = false;
    }
}

/// Lazy, restartable cursor over the edges matching a filter.
#[derive(Debug, Clone)]
pub struct EdgeScroll {
    filter: EdgeFilter,
    after: Option<RowKey>,
    page_size: usize,
    exhausted: bool,
}

impl EdgeScroll {
    #[must_use]
    pub fn new(filter: EdgeFilter, page_size: usize) -> Self {
        Self {
            filter,
            after: None,
            page_size: page_size.max(1),
            exhausted: false,
        }
    }

    /// Next page of edges, or `None` once the cursor is exhausted.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub fn next_batch<S: GraphStore + ?Sized>(&mut self, store: &S) -> Result<Option<Vec<Edge>>> {
        if self.exhausted {
            return Ok(None);
        }
        let page = store.edge_page(&self.filter, self.after, self.page_size)?;
        match page.next {
            Some(key) => self.after = Some(key),
            None => self.exhausted = true,
        }
        Ok((!page.items.is_empty()).then_some(page.items))
    }

    /// Rewind to the first page.
    pub const fn reset(&mut self) {
        self.after = None;
        self.exhausted = false;
    }
}

/// Collect every edge matching `filter`.
///
/// Only for bounded result sets (one node's edges, tests); phases scroll.
///
/// # Errors
///
/// Propagates store read failures.
pub fn collect_edges<S: GraphStore + ?Sized>(store: &S, filter: EdgeFilter) -> Result<Vec<Edge>> {
    let mut scroll = EdgeScroll::new(filter, 512);
    let mut edges = Vec::new();
    while let Some(batch) = scroll.next_batch(store)? {
        edges.extend(batch);
    }
    Ok(edges)
}
