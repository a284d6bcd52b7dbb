//! Transitive closure of canonical transitive relations.
//!
//! Layered (seminaive) evaluation per relation `r`: the frontier is every
//! `r` edge at depth `d`, joined with the depth-1 `r` edges leaving its
//! target. Candidates that already exist at any depth, or that would close a
//! self-loop, are dropped; survivors are written at depth `d + 1` together
//! with their inverse. Evaluation stops at the first empty frontier.
//!
//! Inserted edges are never re-read within the same layer because the
//! frontier scan only selects depth `d`.

use std::collections::HashMap;
use std::time::Instant;

use tracing::{debug, info, instrument};

use crate::config::AugmentConfig;
use crate::error::{EngineError, Result};
use crate::model::Edge;
use crate::relation::{RelationRegistry, RelationType};
use crate::state::Phase;
use crate::stats::InsertionStats;
use crate::store::{EdgeFilter, EdgeScroll, GraphStore, in_unit_of_work};

/// Computes and stores the transitive closure.
#[derive(Debug, Clone, Copy)]
pub struct ClosureComputer<'a> {
    registry: &'a RelationRegistry,
    config: &'a AugmentConfig,
}

/// What is fixed while closing one relation.
struct RelationPlan<'r> {
    relation: &'r str,
    inverse: Option<&'r str>,
    relation_type: RelationType,
    /// Depth-1 successors by source node.
    base: HashMap<String, Vec<String>>,
}

impl<'a> ClosureComputer<'a> {
    #[must_use]
    pub const fn new(registry: &'a RelationRegistry, config: &'a AugmentConfig) -> Self {
        Self { registry, config }
    }

    /// Close every canonical transitive relation.
    ///
    /// On success `to_augment` is cleared in the same unit of work as the
    /// last insertion. On failure every insertion is rolled back and the
    /// flags are left as they were.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::PhaseOrder`] while `to_normalize` is raised,
    /// and propagates store failures.
    #[instrument(skip_all, fields(batch_size = self.config.batch_size))]
    pub fn compute_closure<S: GraphStore + ?Sized>(&self, store: &mut S) -> Result<InsertionStats> {
        if store.graph_state()?.to_normalize {
            return Err(EngineError::PhaseOrder {
                phase: Phase::Augment,
                requires: Phase::Normalize,
            });
        }

        let started = Instant::now();
        let mut stats = InsertionStats::new(store.count_edges()?);

        in_unit_of_work(store, |store| {
            for relation in self.registry.canonical_transitive_relations() {
                self.close_relation(store, relation, &mut stats)?;
            }
            let state = store.graph_state()?.cleared(Phase::Augment);
            store.set_graph_state(state)
        })?;

        stats.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            inserted = stats.total_inserted(),
            max_depth = stats.max_depth_reached,
            layers = stats.layers,
            elapsed_ms = stats.elapsed_ms,
            "closure complete"
        );
        Ok(stats)
    }

    fn plan<'r, S: GraphStore + ?Sized>(
        &'r self,
        store: &S,
        relation: &'r str,
    ) -> Result<RelationPlan<'r>> {
        let entry = self.registry.get(relation)?;
        let inverse = self
            .registry
            .inverse_of(relation)
            .ok()
            .map(|inverse| inverse.name.as_str());

        let mut base: HashMap<String, Vec<String>> = HashMap::new();
        let mut scroll = EdgeScroll::new(
            EdgeFilter::all().relation(relation).depth(1),
            self.config.batch_size,
        );
        while let Some(batch) = scroll.next_batch(store)? {
            for edge in batch {
                base.entry(edge.source).or_default().push(edge.target);
            }
        }

        Ok(RelationPlan {
            relation,
            inverse,
            relation_type: entry.relation_type,
            base,
        })
    }

    fn close_relation<S: GraphStore + ?Sized>(
        &self,
        store: &mut S,
        relation: &str,
        stats: &mut InsertionStats,
    ) -> Result<()> {
        let plan = self.plan(store, relation)?;
        if plan.base.is_empty() {
            return Ok(());
        }

        let mut depth = 1_u32;
        loop {
            let mut frontier = EdgeScroll::new(
                EdgeFilter::all().relation(relation).depth(depth),
                self.config.batch_size,
            );
            let mut frontier_size = 0_usize;
            let mut inserted = 0_u64;
            while let Some(batch) = frontier.next_batch(store)? {
                frontier_size += batch.len();
                for edge in &batch {
                    inserted += self.extend(store, &plan, edge, depth + 1, stats)?;
                }
                store.flush()?;
                store.clear_cache()?;
            }
            if frontier_size == 0 {
                break;
            }
            stats.layers += 1;
            debug!(relation, depth, frontier = frontier_size, inserted, "closure layer");
            depth += 1;
        }
        Ok(())
    }

    /// Join one frontier edge with the base successors of its target.
    fn extend<S: GraphStore + ?Sized>(
        &self,
        store: &mut S,
        plan: &RelationPlan<'_>,
        edge: &Edge,
        depth: u32,
        stats: &mut InsertionStats,
    ) -> Result<u64> {
        let Some(successors) = plan.base.get(&edge.target) else {
            return Ok(0);
        };
        let mut inserted = 0;
        for next in successors {
            if *next == edge.source || store.edge_exists(&edge.source, next, plan.relation)? {
                continue;
            }
            let derived = Edge::derived(
                edge.source.as_str(),
                next.as_str(),
                plan.relation,
                plan.relation_type,
                depth,
                self.config.provenance.as_str(),
            );
            if store.insert_edge(&derived)? {
                stats.record(&derived);
                inserted += 1;
            }

            if let Some(inverse) = plan.inverse
                && !store.edge_exists(next, &edge.source, inverse)?
            {
                let mirrored = Edge::derived(
                    next.as_str(),
                    edge.source.as_str(),
                    inverse,
                    plan.relation_type,
                    depth,
                    self.config.provenance.as_str(),
                );
                if store.insert_edge(&mirrored)? {
                    stats.record(&mirrored);
                    inserted += 1;
                }
            }
        }
        Ok(inserted)
    }
}
