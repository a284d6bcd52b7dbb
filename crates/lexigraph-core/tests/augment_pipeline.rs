//! End-to-end tests for import, normalize and augment against a real store.
//!
//! Covers the worked hypernym chain, idempotence of a full second run,
//! re-assertion of derived edges, mixed assertion directions, rollback after
//! an injected store failure, and rejection of self-loops.

use std::collections::BTreeMap;

use lexigraph_core::config::EngineConfig;
use lexigraph_core::error::{EngineError, StoreError};
use lexigraph_core::model::{Edge, EdgeOrigin, Node};
use lexigraph_core::pipeline::{ImportOutcome, Pipeline};
use lexigraph_core::relation::{HYPERNYM, HYPONYM, RelationRegistry};
use lexigraph_core::state::GraphState;
use lexigraph_core::store::{
    EdgeFilter, GraphStore, Page, RowKey, SqliteStore, collect_edges,
};
use lexigraph_core::validate::source::{Element, MemorySource, attrs, tags};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn lexicon() -> Element {
    Element::new(tags::LEXICON)
        .attr(attrs::ID, "ex_lex")
        .declare("ex", "https://example.org/ex")
}

fn synset(id: &str) -> Element {
    Element::new(tags::SYNSET).attr(attrs::ID, id)
}

fn relation(target: &str, rel_type: &str) -> Element {
    Element::new(tags::SYNSET_RELATION)
        .attr(attrs::TARGET, target)
        .attr(attrs::REL_TYPE, rel_type)
}

/// `ex_a hypernym ex_b hypernym ex_c`, then `ex_c hypernym ex_d` when
/// `long` is set.
fn chain(long: bool) -> MemorySource {
    let mut source = MemorySource::new("chain", Vec::new())
        .open(lexicon())
        .open(synset("ex_a"))
        .leaf(relation("ex_b", HYPERNYM))
        .close(tags::SYNSET)
        .open(synset("ex_b"))
        .leaf(relation("ex_c", HYPERNYM))
        .close(tags::SYNSET);
    if long {
        source = source
            .open(synset("ex_c"))
            .leaf(relation("ex_d", HYPERNYM))
            .close(tags::SYNSET)
            .leaf(synset("ex_d"));
    } else {
        source = source.leaf(synset("ex_c"));
    }
    source.close(tags::LEXICON)
}

fn edges_of(store: &SqliteStore) -> BTreeMap<(String, String, String), u32> {
    collect_edges(store, EdgeFilter::all())
        .expect("edges")
        .into_iter()
        .map(|edge| ((edge.source, edge.target, edge.relation), edge.depth))
        .collect()
}

fn key(source: &str, target: &str, relation: &str) -> (String, String, String) {
    (source.into(), target.into(), relation.into())
}

// ---------------------------------------------------------------------------
// Failure injection
// ---------------------------------------------------------------------------

/// Store that fails every edge insertion after `budget` have succeeded.
struct FailingStore {
    inner: SqliteStore,
    budget: usize,
}

impl FailingStore {
    fn new(inner: SqliteStore, budget: usize) -> Self {
        Self { inner, budget }
    }
}

impl GraphStore for FailingStore {
    fn node_page(&self, after: Option<RowKey>, limit: usize) -> lexigraph_core::Result<Page<Node>> {
        self.inner.node_page(after, limit)
    }

    fn edge_page(
        &self,
        filter: &EdgeFilter,
        after: Option<RowKey>,
        limit: usize,
    ) -> lexigraph_core::Result<Page<Edge>> {
        self.inner.edge_page(filter, after, limit)
    }

    fn edge_exists(&self, source: &str, target: &str, relation: &str) -> lexigraph_core::Result<bool> {
        self.inner.edge_exists(source, target, relation)
    }

    fn node(&self, id: &str) -> lexigraph_core::Result<Option<Node>> {
        self.inner.node(id)
    }

    fn insert_node(&mut self, node: &Node) -> lexigraph_core::Result<bool> {
        self.inner.insert_node(node)
    }

    fn insert_edge(&mut self, edge: &Edge) -> lexigraph_core::Result<bool> {
        if self.budget == 0 {
            return Err(StoreError::Backend("injected write failure".into()).into());
        }
        self.budget -= 1;
        self.inner.insert_edge(edge)
    }

    fn replace_edge(&mut self, edge: &Edge) -> lexigraph_core::Result<bool> {
        self.inner.replace_edge(edge)
    }

    fn delete_derived_edges(&mut self, relation: &str) -> lexigraph_core::Result<u64> {
        self.inner.delete_derived_edges(relation)
    }

    fn flush(&mut self) -> lexigraph_core::Result<()> {
        self.inner.flush()
    }

    fn clear_cache(&mut self) -> lexigraph_core::Result<()> {
        self.inner.clear_cache()
    }

    fn count_edges(&self) -> lexigraph_core::Result<u64> {
        self.inner.count_edges()
    }

    fn count_edges_by_relation(&self) -> lexigraph_core::Result<BTreeMap<String, u64>> {
        self.inner.count_edges_by_relation()
    }

    fn begin_unit_of_work(&mut self) -> lexigraph_core::Result<()> {
        self.inner.begin_unit_of_work()
    }

    fn commit(&mut self) -> lexigraph_core::Result<()> {
        self.inner.commit()
    }

    fn rollback(&mut self) -> lexigraph_core::Result<()> {
        self.inner.rollback()
    }

    fn graph_state(&self) -> lexigraph_core::Result<GraphState> {
        self.inner.graph_state()
    }

    fn set_graph_state(&mut self, state: GraphState) -> lexigraph_core::Result<()> {
        self.inner.set_graph_state(state)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn hypernym_chain_is_normalized_and_closed() {
    let mut store = SqliteStore::open_in_memory().expect("store");
    let config = EngineConfig::default();
    let registry = RelationRegistry::global();
    let mut pipeline = Pipeline::new(&mut store, registry, &config);

    let ImportOutcome::Merged(summary) = pipeline.import(&mut chain(false)).expect("import") else {
        panic!("chain should merge");
    };
    assert_eq!(summary.lexicon, "ex_lex");
    assert_eq!(summary.nodes_inserted, 3);
    assert_eq!(summary.edges_inserted, 2);

    let run = pipeline.run_pending().expect("run pending");
    let normalize = run.normalize.expect("normalize ran");
    let augment = run.augment.expect("augment ran");
    assert_eq!(normalize.inserted(HYPONYM), 2);
    assert_eq!(augment.inserted(HYPONYM), 1);
    assert_eq!(augment.inserted(HYPERNYM), 1);
    assert_eq!(augment.max_depth_reached, 2);
    assert_eq!(augment.edges_prior_to_run, 4);

    let edges = edges_of(&store);
    let expected: BTreeMap<_, _> = [
        (key("ex_a", "ex_b", HYPERNYM), 1),
        (key("ex_b", "ex_c", HYPERNYM), 1),
        (key("ex_b", "ex_a", HYPONYM), 1),
        (key("ex_c", "ex_b", HYPONYM), 1),
        (key("ex_c", "ex_a", HYPONYM), 2),
        (key("ex_a", "ex_c", HYPERNYM), 2),
    ]
    .into_iter()
    .collect();
    assert_eq!(edges, expected);
    assert_eq!(store.graph_state().expect("flags"), GraphState::default());
}

#[test]
fn edge_origins_are_distinguishable() {
    let mut store = SqliteStore::open_in_memory().expect("store");
    let config = EngineConfig::default();
    let mut pipeline = Pipeline::new(&mut store, RelationRegistry::global(), &config);
    pipeline.import(&mut chain(false)).expect("import");
    pipeline.run_pending().expect("run pending");

    let provenance = config.augment.provenance.as_str();
    let origin_of = |source: &str, target: &str, relation: &str| {
        collect_edges(
            &store,
            EdgeFilter::all()
                .from_node(source)
                .to_node(target)
                .relation(relation),
        )
        .expect("edges")
        .first()
        .map(|edge| edge.origin(provenance))
    };

    assert_eq!(origin_of("ex_a", "ex_b", HYPERNYM), Some(EdgeOrigin::Asserted));
    assert_eq!(origin_of("ex_b", "ex_a", HYPONYM), Some(EdgeOrigin::Normalized));
    assert_eq!(
        origin_of("ex_c", "ex_a", HYPONYM),
        Some(EdgeOrigin::Derived { depth: 2 })
    );
}

#[test]
fn full_rerun_after_reimport_changes_nothing() {
    let mut store = SqliteStore::open_in_memory().expect("store");
    let config = EngineConfig::default();
    let registry = RelationRegistry::global();

    {
        let mut pipeline = Pipeline::new(&mut store, registry, &config);
        pipeline.import(&mut chain(true)).expect("import");
        pipeline.run_pending().expect("run pending");
    }
    let fingerprint = store.fingerprint().expect("fingerprint");

    let mut pipeline = Pipeline::new(&mut store, registry, &config);
    let ImportOutcome::Merged(summary) = pipeline.import(&mut chain(true)).expect("reimport")
    else {
        panic!("reimport should merge");
    };
    assert_eq!(summary.nodes_inserted, 0);
    assert_eq!(summary.edges_inserted, 0);

    let run = pipeline.run_pending().expect("run pending");
    assert_eq!(run.normalize.expect("normalize ran").total_inserted(), 0);
    assert_eq!(run.augment.expect("augment ran").total_inserted(), 0);
    assert_eq!(store.fingerprint().expect("fingerprint"), fingerprint);
}

/// A second data set asserting `ex_a hypernym ex_c` directly.
fn shortcut() -> MemorySource {
    MemorySource::new("shortcut", Vec::new())
        .open(
            Element::new(tags::LEXICON)
                .attr(attrs::ID, "ex_more")
                .declare("ex", "https://example.org/ex"),
        )
        .open(synset("ex_a"))
        .leaf(relation("ex_c", HYPERNYM))
        .close(tags::SYNSET)
        .leaf(synset("ex_c"))
        .close(tags::LEXICON)
}

#[test]
fn asserting_a_derived_edge_makes_it_asserted_and_recomputes_depths() {
    let mut store = SqliteStore::open_in_memory().expect("store");
    let config = EngineConfig::default();
    let registry = RelationRegistry::global();
    {
        let mut pipeline = Pipeline::new(&mut store, registry, &config);
        pipeline.import(&mut chain(true)).expect("import");
        pipeline.run_pending().expect("run pending");
    }
    assert_eq!(edges_of(&store)[&key("ex_d", "ex_a", HYPONYM)], 3);

    let mut pipeline = Pipeline::new(&mut store, registry, &config);
    let ImportOutcome::Merged(summary) = pipeline.import(&mut shortcut()).expect("import") else {
        panic!("shortcut should merge");
    };
    assert_eq!(summary.edges_inserted, 0);
    assert_eq!(summary.edges_reasserted, 1);

    let run = pipeline.run_pending().expect("run pending");
    assert_eq!(run.normalize.expect("normalize ran").inserted(HYPONYM), 1);
    assert_eq!(run.augment.expect("augment ran").max_depth_reached, 2);

    let shortcut_edge = store
        .edge("ex_a", "ex_c", HYPERNYM)
        .expect("edge")
        .expect("present");
    assert_eq!(shortcut_edge.depth, 1);
    assert_eq!(shortcut_edge.provenance, "ex_more");
    assert_eq!(
        shortcut_edge.origin(&config.augment.provenance),
        EdgeOrigin::Asserted
    );

    let edges = edges_of(&store);
    assert_eq!(edges[&key("ex_c", "ex_a", HYPONYM)], 1);
    assert_eq!(edges[&key("ex_d", "ex_a", HYPONYM)], 2);
    assert_eq!(edges[&key("ex_a", "ex_d", HYPERNYM)], 2);
    assert_eq!(edges[&key("ex_d", "ex_b", HYPONYM)], 2);
    assert_eq!(edges.len(), 12);
}

#[test]
fn mixed_directions_close_over_the_canonical_chain() {
    let mut store = SqliteStore::open_in_memory().expect("store");
    let config = EngineConfig::default();
    let mut source = MemorySource::default()
        .open(lexicon())
        .open(synset("ex_a"))
        .leaf(relation("ex_b", HYPERNYM))
        .close(tags::SYNSET)
        .leaf(synset("ex_b"))
        .open(synset("ex_c"))
        .leaf(relation("ex_b", HYPONYM))
        .close(tags::SYNSET)
        .close(tags::LEXICON);

    let mut pipeline = Pipeline::new(&mut store, RelationRegistry::global(), &config);
    pipeline.import(&mut source).expect("import");
    pipeline.run_pending().expect("run pending");

    // ex_c hyponym ex_b hyponym ex_a; the hypernym edge mirrors that chain
    // even though no hypernym edge leaves ex_b.
    let expected: BTreeMap<_, _> = [
        (key("ex_a", "ex_b", HYPERNYM), 1),
        (key("ex_b", "ex_a", HYPONYM), 1),
        (key("ex_c", "ex_b", HYPONYM), 1),
        (key("ex_c", "ex_a", HYPONYM), 2),
        (key("ex_a", "ex_c", HYPERNYM), 2),
    ]
    .into_iter()
    .collect();
    assert_eq!(edges_of(&store), expected);
}

#[test]
fn failed_normalize_rolls_back_and_keeps_flag() {
    let mut store = SqliteStore::open_in_memory().expect("store");
    let config = EngineConfig::default();
    let registry = RelationRegistry::global();
    Pipeline::new(&mut store, registry, &config)
        .import(&mut chain(true))
        .expect("import");
    let before = store.fingerprint().expect("fingerprint");
    let flags = store.graph_state().expect("flags");
    assert!(flags.to_normalize);

    // Normalization adds three hyponym edges; fail on the second.
    let mut failing = FailingStore::new(store, 1);
    let err = Pipeline::new(&mut failing, registry, &config)
        .normalize()
        .expect_err("injected failure");
    assert!(matches!(err, EngineError::Store(StoreError::Backend(_))), "{err:?}");

    let store = failing.inner;
    assert_eq!(store.fingerprint().expect("fingerprint"), before);
    assert_eq!(store.graph_state().expect("flags"), flags);
    assert!(store.graph_state().expect("flags").to_normalize);
}

#[test]
fn failed_augment_rolls_back_and_keeps_flag() {
    let mut store = SqliteStore::open_in_memory().expect("store");
    let config = EngineConfig::default();
    let registry = RelationRegistry::global();
    {
        let mut pipeline = Pipeline::new(&mut store, registry, &config);
        pipeline.import(&mut chain(true)).expect("import");
        pipeline.normalize().expect("normalize");
    }
    let before = store.fingerprint().expect("fingerprint");
    let flags = store.graph_state().expect("flags");
    assert!(flags.to_augment);

    // The chain derives six edges; fail on the fourth.
    let mut failing = FailingStore::new(store, 3);
    let err = Pipeline::new(&mut failing, registry, &config)
        .augment()
        .expect_err("injected failure");
    assert!(matches!(err, EngineError::Store(StoreError::Backend(_))), "{err:?}");

    let store = failing.inner;
    assert_eq!(store.fingerprint().expect("fingerprint"), before);
    assert_eq!(store.graph_state().expect("flags"), flags);
}

#[test]
fn failed_merge_leaves_store_untouched() {
    let store = SqliteStore::open_in_memory().expect("store");
    let before = store.fingerprint().expect("fingerprint");
    let config = EngineConfig::default();

    let mut failing = FailingStore::new(store, 1);
    let err = Pipeline::new(&mut failing, RelationRegistry::global(), &config)
        .import(&mut chain(false))
        .expect_err("injected failure");
    assert_eq!(err.code(), lexigraph_core::ErrorCode::StoreFailure);

    let store = failing.inner;
    assert_eq!(store.fingerprint().expect("fingerprint"), before);
    assert_eq!(store.graph_state().expect("flags"), GraphState::default());
}

#[test]
fn self_loop_on_transitive_relation_is_an_invariant_violation() {
    let mut store = SqliteStore::open_in_memory().expect("store");
    let before = store.fingerprint().expect("fingerprint");
    let config = EngineConfig::default();
    let mut source = MemorySource::default()
        .open(lexicon())
        .open(synset("ex_a"))
        .leaf(relation("ex_a", HYPONYM))
        .close(tags::SYNSET)
        .close(tags::LEXICON);

    let err = Pipeline::new(&mut store, RelationRegistry::global(), &config)
        .import(&mut source)
        .expect_err("self-loop");
    assert!(matches!(err, EngineError::InvariantViolation(_)), "{err:?}");
    assert_eq!(store.fingerprint().expect("fingerprint"), before);
}

#[test]
fn self_loop_on_non_transitive_relation_is_allowed() {
    let mut store = SqliteStore::open_in_memory().expect("store");
    let config = EngineConfig::default();
    let mut source = MemorySource::default()
        .open(lexicon())
        .open(synset("ex_a"))
        .leaf(relation("ex_a", "similar"))
        .close(tags::SYNSET)
        .close(tags::LEXICON);

    let outcome = Pipeline::new(&mut store, RelationRegistry::global(), &config)
        .import(&mut source)
        .expect("import");
    assert!(matches!(outcome, ImportOutcome::Merged(_)));
    assert!(store.edge_exists("ex_a", "ex_a", "similar").expect("probe"));
}
