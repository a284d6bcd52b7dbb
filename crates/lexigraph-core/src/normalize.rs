//! Normalization pass.
//!
//! One scroll over every node, materializing edges that are implied by the
//! ones already stored:
//!
//! - **domain promotion**: nodes that look like domains hang off the root
//!   domain through `super_domain`
//! - **inverse materialization**: every edge whose inverse relation is
//!   canonical gets that inverse
//! - **topic derivation**: `topic` implies `domain`, `is_topic_of` implies
//!   `domain_member`
//!
//! Membership checks use the node's own outgoing and incoming edges, loaded
//! once per node. Each edge is examined from its source node only.

use std::collections::HashSet;
use std::time::Instant;

use tracing::{debug, info, instrument};

use crate::config::AugmentConfig;
use crate::error::{EngineError, Result};
use crate::model::{DOMAIN_LABEL, Edge, EdgeKey, Node};
use crate::relation::{DOMAIN, DOMAIN_MEMBER, IS_TOPIC_OF, RelationRegistry, SUPER_DOMAIN, TOPIC};
use crate::state::Phase;
use crate::stats::InsertionStats;
use crate::store::{EdgeFilter, GraphStore, NodeScroll, collect_edges, in_unit_of_work};

/// Materializes inverse, domain and topic-derived edges.
#[derive(Debug, Clone, Copy)]
pub struct GraphNormalizer<'a> {
    registry: &'a RelationRegistry,
    config: &'a AugmentConfig,
}

/// A node's edges, updated with the node's own insertions.
struct Neighbourhood {
    outgoing: Vec<Edge>,
    keys: HashSet<EdgeKey>,
}

impl Neighbourhood {
    fn load<S: GraphStore + ?Sized>(store: &S, id: &str) -> Result<Self> {
        let outgoing = collect_edges(store, EdgeFilter::all().from_node(id))?;
        let incoming = collect_edges(store, EdgeFilter::all().to_node(id))?;
        let keys = outgoing.iter().chain(&incoming).map(Edge::key).collect();
        Ok(Self { outgoing, keys })
    }

    fn contains(&self, source: &str, target: &str, relation: &str) -> bool {
        self.keys
            .contains(&EdgeKey::new(source, target, relation))
    }

    fn has_incoming(&self, id: &str, relation: &str) -> bool {
        self.keys
            .iter()
            .any(|key| key.target == id && key.relation == relation)
    }

    fn has_outgoing(&self, relation: &str) -> bool {
        self.outgoing.iter().any(|edge| edge.relation == relation)
    }
}

/// Per-run bookkeeping.
struct Pass {
    stats: InsertionStats,
    root_ready: bool,
}

impl<'a> GraphNormalizer<'a> {
    #[must_use]
    pub const fn new(registry: &'a RelationRegistry, config: &'a AugmentConfig) -> Self {
        Self { registry, config }
    }

    /// Run the pass over the whole store.
    ///
    /// On success `to_normalize` is cleared in the same unit of work as the
    /// last insertion. On failure every insertion is rolled back and the
    /// flags are left as they were.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::PhaseOrder`] while `to_validate` is raised, and
    /// propagates store failures.
    #[instrument(skip_all, fields(batch_size = self.config.batch_size))]
    pub fn normalize<S: GraphStore + ?Sized>(&self, store: &mut S) -> Result<InsertionStats> {
        if store.graph_state()?.to_validate {
            return Err(EngineError::PhaseOrder {
                phase: Phase::Normalize,
                requires: Phase::Validate,
            });
        }

        let started = Instant::now();
        let mut pass = Pass {
            stats: InsertionStats::new(store.count_edges()?),
            root_ready: false,
        };

        in_unit_of_work(store, |store| {
            let mut scroll = NodeScroll::new(self.config.batch_size);
            let mut batch = 0_u64;
            while let Some(nodes) = scroll.next_batch(store)? {
                for node in &nodes {
                    self.normalize_node(store, node, &mut pass)?;
                }
                store.flush()?;
                store.clear_cache()?;
                batch += 1;
                debug!(
                    batch,
                    nodes = nodes.len(),
                    inserted = pass.stats.total_inserted(),
                    "normalized batch"
                );
            }
            let state = store.graph_state()?.cleared(Phase::Normalize);
            store.set_graph_state(state)
        })?;

        let mut stats = pass.stats;
        stats.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            inserted = stats.total_inserted(),
            edges_before = stats.edges_prior_to_run,
            elapsed_ms = stats.elapsed_ms,
            "normalization complete"
        );
        Ok(stats)
    }

    fn normalize_node<S: GraphStore + ?Sized>(
        &self,
        store: &mut S,
        node: &Node,
        pass: &mut Pass,
    ) -> Result<()> {
        let mut hood = Neighbourhood::load(store, &node.id)?;

        if self.looks_like_domain(node, &hood) {
            self.ensure_root(store, pass)?;
            self.insert_with_inverse(
                store,
                &mut hood,
                pass,
                &node.id,
                &self.config.root_domain,
                SUPER_DOMAIN,
            )?;
        }

        // Edges inserted from here on need no further processing at this node.
        let outgoing = std::mem::take(&mut hood.outgoing);
        for edge in &outgoing {
            self.materialize_inverse(store, &mut hood, pass, edge)?;
            let derived = match edge.relation.as_str() {
                TOPIC => Some(DOMAIN),
                IS_TOPIC_OF => Some(DOMAIN_MEMBER),
                _ => None,
            };
            if let Some(relation) = derived {
                self.insert_with_inverse(
                    store,
                    &mut hood,
                    pass,
                    &edge.source,
                    &edge.target,
                    relation,
                )?;
            }
        }
        Ok(())
    }

    fn looks_like_domain(&self, node: &Node, hood: &Neighbourhood) -> bool {
        node.id != self.config.root_domain
            && (node.has_label(DOMAIN_LABEL)
                || hood.has_incoming(&node.id, TOPIC)
                || hood.has_outgoing(IS_TOPIC_OF))
    }

    fn ensure_root<S: GraphStore + ?Sized>(&self, store: &mut S, pass: &mut Pass) -> Result<()> {
        if pass.root_ready {
            return Ok(());
        }
        let root = Node::new(self.config.root_domain.as_str()).with_label(DOMAIN_LABEL);
        if store.insert_node(&root)? {
            debug!(root = %root.id, "created root domain node");
        }
        pass.root_ready = true;
        Ok(())
    }

    fn materialize_inverse<S: GraphStore + ?Sized>(
        &self,
        store: &mut S,
        hood: &mut Neighbourhood,
        pass: &mut Pass,
        edge: &Edge,
    ) -> Result<()> {
        if edge.is_self_loop() || !self.registry.has_inverse(&edge.relation)? {
            return Ok(());
        }
        let inverse = self.registry.inverse_of(&edge.relation)?;
        if !inverse.canonical || hood.contains(&edge.target, &edge.source, &inverse.name) {
            return Ok(());
        }
        self.insert(store, hood, pass, &edge.target, &edge.source, &inverse.name)
    }

    /// Insert `(source, target, relation)` unless present, then its inverse
    /// when that inverse is canonical and absent.
    fn insert_with_inverse<S: GraphStore + ?Sized>(
        &self,
        store: &mut S,
        hood: &mut Neighbourhood,
        pass: &mut Pass,
        source: &str,
        target: &str,
        relation: &str,
    ) -> Result<()> {
        if !hood.contains(source, target, relation) {
            self.insert(store, hood, pass, source, target, relation)?;
        }
        if source == target {
            return Ok(());
        }
        if let Ok(inverse) = self.registry.inverse_of(relation)
            && inverse.canonical
            && !hood.contains(target, source, &inverse.name)
        {
            self.insert(store, hood, pass, target, source, &inverse.name)?;
        }
        Ok(())
    }

    fn insert<S: GraphStore + ?Sized>(
        &self,
        store: &mut S,
        hood: &mut Neighbourhood,
        pass: &mut Pass,
        source: &str,
        target: &str,
        relation: &str,
    ) -> Result<()> {
        let edge = Edge::derived(
            source,
            target,
            relation,
            self.registry.relation_type(relation)?,
            1,
            self.config.provenance.as_str(),
        );
        hood.keys.insert(edge.key());
        if store.insert_edge(&edge)? {
            pass.stats.record(&edge);
        }
        Ok(())
    }
}
