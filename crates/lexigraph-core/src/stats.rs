//! Per-invocation insertion counters for the normalizer and closure phases.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::Edge;

/// What a single normalize or closure run inserted. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InsertionStats {
    /// Edge count in the store when the run started.
    pub edges_prior_to_run: u64,
    /// Largest depth inserted; 0 when nothing was inserted.
    pub max_depth_reached: u32,
    pub count_by_relation: BTreeMap<String, u64>,
    /// Closure layers evaluated (0 for the normalizer).
    pub layers: u32,
    pub elapsed_ms: u64,
}

impl InsertionStats {
    #[must_use]
    pub fn new(edges_prior_to_run: u64) -> Self {
        Self {
            edges_prior_to_run,
            ..Self::default()
        }
    }

    /// Account for one inserted edge.
    pub fn record(&mut self, edge: &Edge) {
        *self
            .count_by_relation
            .entry(edge.relation.clone())
            .or_default() += 1;
        self.max_depth_reached = self.max_depth_reached.max(edge.depth);
    }

    #[must_use]
    pub fn total_inserted(&self) -> u64 {
        self.count_by_relation.values().sum()
    }

    #[must_use]
    pub fn inserted(&self, relation: &str) -> u64 {
        self.count_by_relation.get(relation).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation::RelationType;

    #[test]
    fn record_tracks_counts_and_depth() {
        let mut stats = InsertionStats::new(7);
        assert_eq!(stats.total_inserted(), 0);
        assert_eq!(stats.max_depth_reached, 0);

        stats.record(&Edge::derived("a", "c", "hyponym", RelationType::Taxonomic, 2, "x"));
        stats.record(&Edge::derived("c", "a", "hypernym", RelationType::Taxonomic, 2, "x"));
        stats.record(&Edge::derived("a", "d", "hyponym", RelationType::Taxonomic, 3, "x"));

        assert_eq!(stats.edges_prior_to_run, 7);
        assert_eq!(stats.total_inserted(), 3);
        assert_eq!(stats.inserted("hyponym"), 2);
        assert_eq!(stats.inserted("mero_part"), 0);
        assert_eq!(stats.max_depth_reached, 3);
    }
}
