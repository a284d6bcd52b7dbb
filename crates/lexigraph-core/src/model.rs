//! Nodes and edges as the engine sees them.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::relation::RelationType;

/// Provenance stamped on edges the engine creates itself.
pub const ENGINE_PROVENANCE: &str = "lexigraph";

/// Semantic label marking a node as a topical domain.
pub const DOMAIN_LABEL: &str = "domain";

/// A synset. Only `id` and `labels` are visible to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(default)]
    pub labels: BTreeSet<String>,
}

impl Node {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            labels: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.insert(label.into());
        self
    }

    #[must_use]
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }
}

/// A directed, labeled relation edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub relation: String,
    pub relation_type: RelationType,
    /// Path length in canonical hops; 1 for asserted and normalized edges.
    pub depth: u32,
    pub provenance: String,
}

/// Identity of an edge: at most one edge exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey {
    pub source: String,
    pub target: String,
    pub relation: String,
}

impl EdgeKey {
    #[must_use]
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        relation: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            relation: relation.into(),
        }
    }
}

/// How an edge came to exist, recovered from its depth and provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeOrigin {
    /// Stated by an imported data set.
    Asserted,
    /// Materialized by the normalizer (inverse, domain or super-domain edge).
    Normalized,
    /// Produced by the closure computer.
    Derived { depth: u32 },
}

impl Edge {
    /// A depth-1 edge as stated by a data set.
    #[must_use]
    pub fn asserted(
        source: impl Into<String>,
        target: impl Into<String>,
        relation: impl Into<String>,
        relation_type: RelationType,
        provenance: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            relation: relation.into(),
            relation_type,
            depth: 1,
            provenance: provenance.into(),
        }
    }

    /// An edge created by the engine at the given depth.
    #[must_use]
    pub fn derived(
        source: impl Into<String>,
        target: impl Into<String>,
        relation: impl Into<String>,
        relation_type: RelationType,
        depth: u32,
        provenance: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            relation: relation.into(),
            relation_type,
            depth,
            provenance: provenance.into(),
        }
    }

    #[must_use]
    pub fn key(&self) -> EdgeKey {
        EdgeKey::new(&self.source, &self.target, &self.relation)
    }

    #[must_use]
    pub fn is_self_loop(&self) -> bool {
        self.source == self.target
    }

    /// Classify this edge given the provenance the engine stamps on its own
    /// edges.
    #[must_use]
    pub fn origin(&self, engine_provenance: &str) -> EdgeOrigin {
        if self.depth > 1 {
            EdgeOrigin::Derived { depth: self.depth }
        } else if self.provenance == engine_provenance {
            EdgeOrigin::Normalized
        } else {
            EdgeOrigin::Asserted
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_is_recovered_from_depth_and_provenance() {
        let asserted = Edge::asserted("ex_a", "ex_b", "hypernym", RelationType::Taxonomic, "ex");
        assert_eq!(asserted.origin(ENGINE_PROVENANCE), EdgeOrigin::Asserted);

        let normalized = Edge::derived(
            "ex_b",
            "ex_a",
            "hyponym",
            RelationType::Taxonomic,
            1,
            ENGINE_PROVENANCE,
        );
        assert_eq!(normalized.origin(ENGINE_PROVENANCE), EdgeOrigin::Normalized);

        let derived = Edge::derived(
            "ex_c",
            "ex_a",
            "hyponym",
            RelationType::Taxonomic,
            2,
            ENGINE_PROVENANCE,
        );
        assert_eq!(
            derived.origin(ENGINE_PROVENANCE),
            EdgeOrigin::Derived { depth: 2 }
        );
    }

    #[test]
    fn key_ignores_depth_and_provenance() {
        let a = Edge::asserted("ex_a", "ex_b", "hypernym", RelationType::Taxonomic, "ex");
        let b = Edge::derived(
            "ex_a",
            "ex_b",
            "hypernym",
            RelationType::Taxonomic,
            3,
            ENGINE_PROVENANCE,
        );
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn node_labels() {
        let node = Node::new("ex_physics").with_label(DOMAIN_LABEL);
        assert!(node.has_label(DOMAIN_LABEL));
        assert!(!Node::new("ex_dog").has_label(DOMAIN_LABEL));
    }
}
