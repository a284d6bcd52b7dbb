//! Control flow from candidate data set to augmented graph.
//!
//! `import` validates and merges; `run_pending` then runs whichever of
//! normalize and augment the readiness flags say are owed.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::closure::ClosureComputer;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::model::{Edge, EdgeOrigin, Node};
use crate::normalize::GraphNormalizer;
use crate::relation::RelationRegistry;
use crate::state::{GraphState, Phase};
use crate::stats::InsertionStats;
use crate::store::{GraphStore, in_unit_of_work};
use crate::validate::report::{IssueCode, IssueSink, TracingSink};
use crate::validate::source::{ImportSource, ScanControl, ScanEvent, attrs, tags};
use crate::validate::{ValidationReport, Validator};

/// What a successful merge wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    /// Provenance stamped on the merged edges.
    pub lexicon: String,
    pub nodes_inserted: u64,
    pub edges_inserted: u64,
    /// Engine-created edges now asserted by the data set.
    pub edges_reasserted: u64,
    /// Relations whose target is neither in the document nor the store.
    pub skipped_references: u64,
    pub report: ValidationReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ImportOutcome {
    Merged(ImportSummary),
    /// Validation failed; the store is unchanged.
    Rejected(ValidationReport),
}

/// Phases run by [`Pipeline::run_pending`]; `None` when the phase owed no work.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PendingRun {
    pub normalize: Option<InsertionStats>,
    pub augment: Option<InsertionStats>,
}

/// Drives the engine phases against one store.
pub struct Pipeline<'a, S: GraphStore + ?Sized> {
    store: &'a mut S,
    registry: &'a RelationRegistry,
    config: &'a EngineConfig,
}

impl<'a, S: GraphStore + ?Sized> Pipeline<'a, S> {
    pub const fn new(
        store: &'a mut S,
        registry: &'a RelationRegistry,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    /// Read access to the underlying store.
    pub fn store(&self) -> &S {
        &*self.store
    }

    /// Validate without merging.
    ///
    /// # Errors
    ///
    /// See [`Validator::validate_with_sink`].
    pub fn validate(
        &self,
        source: &mut dyn ImportSource,
        sink: &mut dyn IssueSink,
    ) -> Result<ValidationReport> {
        Validator::new(self.registry, &self.config.validation).validate_with_sink(
            source,
            &*self.store,
            sink,
        )
    }

    /// Validate `source` and, when it passes, merge it into the store.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvariantViolation`] when the data set contains
    /// a self-loop on a transitive canonical relation, propagates fail-fast
    /// aborts, and propagates store failures (the merge is rolled back).
    pub fn import(&mut self, source: &mut dyn ImportSource) -> Result<ImportOutcome> {
        self.import_with_sink(source, &mut TracingSink)
    }

    /// [`Pipeline::import`] with a caller-provided issue sink.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::import`].
    #[instrument(skip_all, fields(source = source.name()))]
    pub fn import_with_sink(
        &mut self,
        source: &mut dyn ImportSource,
        sink: &mut dyn IssueSink,
    ) -> Result<ImportOutcome> {
        let report = self.validate(source, sink)?;

        if report.has_invariant_violation() {
            let detail = report
                .errors
                .first
                .iter()
                .find(|issue| issue.code == IssueCode::SelfLoop)
                .map_or_else(|| "self-loop".to_string(), ToString::to_string);
            return Err(EngineError::InvariantViolation(detail));
        }
        if !report.passed() {
            info!(errors = report.errors.count, "data set rejected");
            return Ok(ImportOutcome::Rejected(report));
        }

        let summary = in_unit_of_work(self.store, |store| {
            let summary = merge(
                store,
                self.registry,
                &self.config.augment.provenance,
                source,
                report,
            )?;
            store.set_graph_state(GraphState::merged())?;
            Ok(summary)
        })?;
        info!(
            lexicon = %summary.lexicon,
            nodes = summary.nodes_inserted,
            edges = summary.edges_inserted,
            reasserted = summary.edges_reasserted,
            skipped = summary.skipped_references,
            "data set merged"
        );
        Ok(ImportOutcome::Merged(summary))
    }

    /// # Errors
    ///
    /// See [`GraphNormalizer::normalize`].
    pub fn normalize(&mut self) -> Result<InsertionStats> {
        GraphNormalizer::new(self.registry, &self.config.augment).normalize(self.store)
    }

    /// # Errors
    ///
    /// See [`ClosureComputer::compute_closure`].
    pub fn augment(&mut self) -> Result<InsertionStats> {
        ClosureComputer::new(self.registry, &self.config.augment).compute_closure(self.store)
    }

    /// Run normalize and augment as the readiness flags require.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::PhaseOrder`] while `to_validate` is raised, and
    /// propagates phase failures.
    pub fn run_pending(&mut self) -> Result<PendingRun> {
        let state = self.store.graph_state()?;
        if state.to_validate {
            return Err(EngineError::PhaseOrder {
                phase: Phase::Normalize,
                requires: Phase::Validate,
            });
        }

        let mut run = PendingRun::default();
        if state.to_normalize {
            run.normalize = Some(self.normalize()?);
        }
        if self.store.graph_state()?.to_augment {
            run.augment = Some(self.augment()?);
        }
        Ok(run)
    }
}

/// Write the synsets of a validated data set and their relations.
///
/// Nodes are written in a first scan so that relations may point forward.
/// A relation the engine already created is rewritten as asserted. When that
/// edge came from the closure, the closure edges of its relation pair are
/// dropped so the next augment recomputes their depths.
fn merge<S: GraphStore + ?Sized>(
    store: &mut S,
    registry: &RelationRegistry,
    engine_provenance: &str,
    source: &mut dyn ImportSource,
    report: ValidationReport,
) -> Result<ImportSummary> {
    let mut lexicon: Option<String> = None;
    let mut nodes_inserted = 0;

    source.scan(&mut |event| {
        let ScanEvent::Start(element) = event else {
            return Ok(ScanControl::Continue);
        };
        if element.tag == tags::LEXICON && lexicon.is_none() {
            lexicon = element.id().map(str::to_string);
        }
        if element.tag == tags::SYNSET
            && let Some(id) = element.id()
        {
            let mut node = Node::new(id);
            if let Some(labels) = element.get(attrs::LABELS) {
                node.labels = labels.split_whitespace().map(str::to_string).collect();
            }
            if store.insert_node(&node)? {
                nodes_inserted += 1;
            }
        }
        Ok(ScanControl::Continue)
    })?;
    store.flush()?;

    let provenance = lexicon.unwrap_or_else(|| source.name().to_string());
    let mut synsets: Vec<Option<String>> = Vec::new();
    let mut edges_inserted = 0;
    let mut edges_reasserted = 0;
    let mut skipped_references = 0;
    let mut stale: BTreeSet<String> = BTreeSet::new();

    source.scan(&mut |event| {
        let element = match event {
            ScanEvent::Start(element) => element,
            ScanEvent::End { tag } => {
                if tag == tags::SYNSET {
                    synsets.pop();
                }
                return Ok(ScanControl::Continue);
            }
        };
        if element.tag == tags::SYNSET {
            synsets.push(element.id().map(str::to_string));
            return Ok(ScanControl::Continue);
        }
        if element.tag != tags::SYNSET_RELATION {
            return Ok(ScanControl::Continue);
        }
        let (Some(Some(from)), Some(target), Some(relation)) = (
            synsets.last(),
            element.get(attrs::TARGET),
            element.get(attrs::REL_TYPE),
        ) else {
            return Ok(ScanControl::Continue);
        };

        if !store.node_exists(target)? {
            warn!(from = %from, target, relation, "skipping relation to absent node");
            skipped_references += 1;
            return Ok(ScanControl::Continue);
        }
        let edge = Edge::asserted(
            from.as_str(),
            target,
            relation,
            registry.relation_type(relation)?,
            provenance.as_str(),
        );
        if store.insert_edge(&edge)? {
            edges_inserted += 1;
        } else if let Some(existing) = store.edge(from, target, relation)?
            && existing.origin(engine_provenance) != EdgeOrigin::Asserted
        {
            store.replace_edge(&edge)?;
            edges_reasserted += 1;
            if existing.depth > 1 {
                stale.insert(relation.to_string());
            }
        }
        Ok(ScanControl::Continue)
    })?;

    for relation in &stale {
        let mut pair = vec![relation.as_str()];
        if let Ok(inverse) = registry.inverse_of(relation)
            && inverse.name != *relation
        {
            pair.push(inverse.name.as_str());
        }
        for name in pair {
            let deleted = store.delete_derived_edges(name)?;
            debug!(relation = name, deleted, "dropped closure edges for recomputation");
        }
    }
    store.flush()?;

    Ok(ImportSummary {
        lexicon: provenance,
        nodes_inserted,
        edges_inserted,
        edges_reasserted,
        skipped_references,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use crate::validate::source::{Element, MemorySource};

    fn lexicon_with(relations: &[(&str, &str, &str)]) -> MemorySource {
        let mut source = MemorySource::new("test", Vec::new()).open(
            Element::new(tags::LEXICON)
                .attr(attrs::ID, "ex_lex")
                .declare("ex", "https://example.org/ex"),
        );
        let mut ids: Vec<&str> = relations.iter().flat_map(|(s, t, _)| [*s, *t]).collect();
        ids.sort_unstable();
        ids.dedup();
        for id in ids {
            source = source.open(Element::new(tags::SYNSET).attr(attrs::ID, id));
            for (_, target, rel) in relations.iter().filter(|(s, _, _)| *s == id) {
                source = source.leaf(
                    Element::new(tags::SYNSET_RELATION)
                        .attr(attrs::TARGET, *target)
                        .attr(attrs::REL_TYPE, *rel),
                );
            }
            source = source.close(tags::SYNSET);
        }
        source.close(tags::LEXICON)
    }

    #[test]
    fn import_merges_and_raises_flags() {
        let mut store = SqliteStore::open_in_memory().expect("store");
        let config = EngineConfig::default();
        let mut pipeline = Pipeline::new(&mut store, RelationRegistry::global(), &config);

        let mut source = lexicon_with(&[("ex_dog", "ex_animal", "hypernym")]);
        let ImportOutcome::Merged(summary) = pipeline.import(&mut source).expect("import") else {
            panic!("expected merge");
        };
        assert_eq!(summary.lexicon, "ex_lex");
        assert_eq!(summary.nodes_inserted, 2);
        assert_eq!(summary.edges_inserted, 1);
        assert_eq!(pipeline.store().graph_state().expect("flags"), GraphState::merged());

        let run = pipeline.run_pending().expect("run");
        assert_eq!(run.normalize.expect("normalized").total_inserted(), 1);
        assert!(run.augment.is_some());
        assert_eq!(pipeline.store().graph_state().expect("flags"), GraphState::default());

        let again = pipeline.run_pending().expect("nothing owed");
        assert_eq!(again, PendingRun::default());
    }

    #[test]
    fn labels_are_merged_onto_nodes() {
        let mut store = SqliteStore::open_in_memory().expect("store");
        let config = EngineConfig::default();
        let mut source = MemorySource::default()
            .open(
                Element::new(tags::LEXICON)
                    .attr(attrs::ID, "ex_lex")
                    .declare("ex", "https://example.org/ex"),
            )
            .leaf(
                Element::new(tags::SYNSET)
                    .attr(attrs::ID, "ex_physics")
                    .attr(attrs::LABELS, "domain  science"),
            )
            .close(tags::LEXICON);

        Pipeline::new(&mut store, RelationRegistry::global(), &config)
            .import(&mut source)
            .expect("import");
        let node = store.require_node("ex_physics").expect("node");
        assert!(node.has_label("domain"));
        assert!(node.has_label("science"));
    }

    #[test]
    fn rejected_import_leaves_store_untouched() {
        let mut store = SqliteStore::open_in_memory().expect("store");
        let before = store.fingerprint().expect("fingerprint");
        let config = EngineConfig::default();

        let mut source = lexicon_with(&[("ex_dog", "ex_animal", "frobnicates")]);
        let outcome = Pipeline::new(&mut store, RelationRegistry::global(), &config)
            .import(&mut source)
            .expect("import");
        assert!(matches!(outcome, ImportOutcome::Rejected(ref report) if !report.passed()));
        assert_eq!(before, store.fingerprint().expect("fingerprint"));
    }

    #[test]
    fn run_pending_refuses_unvalidated_store() {
        let mut store = SqliteStore::open_in_memory().expect("store");
        store
            .set_graph_state(GraphState {
                to_validate: true,
                to_normalize: true,
                to_augment: true,
            })
            .expect("flags");
        let config = EngineConfig::default();
        let err = Pipeline::new(&mut store, RelationRegistry::global(), &config)
            .run_pending()
            .expect_err("phase order");
        assert_eq!(err.code(), crate::ErrorCode::PhaseOutOfOrder);
    }
}
