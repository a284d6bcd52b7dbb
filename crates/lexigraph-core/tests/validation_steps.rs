//! Validation scenarios driven through the import pipeline.

use std::fmt::Write as _;

use lexigraph_core::config::{EngineConfig, ValidationConfig};
use lexigraph_core::error::EngineError;
use lexigraph_core::model::Node;
use lexigraph_core::pipeline::{ImportOutcome, Pipeline};
use lexigraph_core::relation::{HYPERNYM, HYPONYM, RelationRegistry};
use lexigraph_core::store::{GraphStore, SqliteStore};
use lexigraph_core::validate::report::{IssueCode, Severity, Step, ValidationIssue};
use lexigraph_core::validate::source::{Element, JsonLinesSource, MemorySource, attrs, tags};
use lexigraph_core::validate::Validator;

fn lexicon() -> Element {
    Element::new(tags::LEXICON)
        .attr(attrs::ID, "ex_lex")
        .declare("ex", "https://example.org/ex")
}

fn synset(id: &str) -> Element {
    Element::new(tags::SYNSET).attr(attrs::ID, id)
}

fn relation(target: &str) -> Element {
    Element::new(tags::SYNSET_RELATION)
        .attr(attrs::TARGET, target)
        .attr(attrs::REL_TYPE, HYPERNYM)
}

/// `ex_dog hypernym oewn_animal`, a reference into another lexicon.
fn cross_lexicon() -> MemorySource {
    MemorySource::default()
        .open(lexicon())
        .open(synset("ex_dog"))
        .leaf(relation("oewn_animal"))
        .close(tags::SYNSET)
        .close(tags::LEXICON)
}

fn with_validation(validation: ValidationConfig) -> EngineConfig {
    EngineConfig {
        validation,
        ..EngineConfig::default()
    }
}

fn import(
    store: &mut SqliteStore,
    config: &EngineConfig,
    source: &mut MemorySource,
) -> lexigraph_core::Result<ImportOutcome> {
    Pipeline::new(store, RelationRegistry::global(), config).import(source)
}

#[test]
fn invalid_prefix_rejects_without_touching_store() {
    let mut store = SqliteStore::open_in_memory().expect("store");
    let before = store.fingerprint().expect("fingerprint");
    let mut source = MemorySource::default()
        .open(lexicon().declare("2x", "https://example.org/2x"))
        .leaf(synset("ex_dog"))
        .close(tags::LEXICON);

    let outcome = import(&mut store, &EngineConfig::default(), &mut source).expect("import");
    let ImportOutcome::Rejected(report) = outcome else {
        panic!("invalid prefix should reject");
    };
    assert_eq!(report.step, Step::Structural);
    assert_eq!(report.errors.count_of(IssueCode::InvalidPrefix), 1);
    assert_eq!(store.fingerprint().expect("fingerprint"), before);
}

#[test]
fn reference_to_wrong_element_kind_is_missing_internal_id() {
    let mut source = MemorySource::default()
        .open(lexicon())
        .leaf(synset("ex_dog"))
        .leaf(
            Element::new(tags::SENSE)
                .attr(attrs::ID, "ex_dog_n_1")
                .attr(attrs::SYNSET, "ex_lex"),
        )
        .close(tags::LEXICON);

    let store = SqliteStore::open_in_memory().expect("store");
    let config = ValidationConfig::default();
    let report = Validator::new(RelationRegistry::global(), &config)
        .validate(&mut source, &store)
        .expect("validate");

    assert_eq!(report.step, Step::Internal);
    assert_eq!(report.errors.count_of(IssueCode::MissingInternalId), 1);
    let issue = &report.errors.first[0];
    assert_eq!(issue.subject, "ex_lex");
    assert!(issue.message.contains("<Lexicon>"), "{}", issue.message);
}

#[test]
fn missing_external_reference_warns_and_import_proceeds() {
    let mut store = SqliteStore::open_in_memory().expect("store");
    let outcome = import(&mut store, &EngineConfig::default(), &mut cross_lexicon())
        .expect("import");

    let ImportOutcome::Merged(summary) = outcome else {
        panic!("non-strict import should merge");
    };
    assert_eq!(summary.report.warnings.count_of(IssueCode::MissingExternalId), 1);
    assert_eq!(summary.nodes_inserted, 1);
    assert_eq!(summary.edges_inserted, 0);
    assert_eq!(summary.skipped_references, 1);
    assert!(store.node_exists("ex_dog").expect("probe"));
}

#[test]
fn missing_external_reference_blocks_strict_import() {
    let mut store = SqliteStore::open_in_memory().expect("store");
    let config = with_validation(ValidationConfig {
        strict: true,
        ..ValidationConfig::default()
    });

    let outcome = import(&mut store, &config, &mut cross_lexicon()).expect("import");
    let ImportOutcome::Rejected(report) = outcome else {
        panic!("strict import should reject");
    };
    assert_eq!(report.step, Step::External);
    assert_eq!(report.errors.count_of(IssueCode::MissingExternalId), 1);
    assert!(!store.node_exists("ex_dog").expect("probe"));
}

#[test]
fn external_reference_resolves_against_earlier_import() {
    let mut store = SqliteStore::open_in_memory().expect("store");
    store.insert_node(&Node::new("oewn_animal")).expect("node");
    let config = with_validation(ValidationConfig {
        strict: true,
        ..ValidationConfig::default()
    });

    let outcome = import(&mut store, &config, &mut cross_lexicon()).expect("import");
    let ImportOutcome::Merged(summary) = outcome else {
        panic!("resolvable reference should merge");
    };
    assert_eq!(summary.edges_inserted, 1);
    assert!(store.edge_exists("ex_dog", "oewn_animal", HYPERNYM).expect("probe"));
}

#[test]
fn foreign_sense_reference_is_not_checked_against_store() {
    let mut store = SqliteStore::open_in_memory().expect("store");
    store.insert_node(&Node::new("oewn_dog")).expect("node");
    let config = with_validation(ValidationConfig {
        strict: true,
        ..ValidationConfig::default()
    });
    let mut source = MemorySource::default()
        .open(lexicon())
        .leaf(synset("ex_dog"))
        .open(Element::new(tags::LEXICAL_ENTRY).attr(attrs::ID, "ex_dog_n"))
        .open(
            Element::new(tags::SENSE)
                .attr(attrs::ID, "ex_dog_n_01")
                .attr(attrs::SYNSET, "ex_dog"),
        )
        .leaf(
            Element::new(tags::SENSE_RELATION)
                .attr(attrs::TARGET, "oewn_dog-n-01")
                .attr(attrs::REL_TYPE, "similar"),
        )
        .close(tags::SENSE)
        .close(tags::LEXICAL_ENTRY)
        .close(tags::LEXICON);

    let outcome = import(&mut store, &config, &mut source).expect("import");
    let ImportOutcome::Merged(summary) = outcome else {
        panic!("foreign sense reference should not block a strict import");
    };
    assert!(summary.report.warnings.is_empty());
    assert_eq!(summary.skipped_references, 0);
}

fn self_loop_lexicon(lexicon: Element) -> MemorySource {
    MemorySource::default()
        .open(lexicon)
        .open(synset("ex_a"))
        .leaf(
            Element::new(tags::SYNSET_RELATION)
                .attr(attrs::TARGET, "ex_a")
                .attr(attrs::REL_TYPE, HYPONYM),
        )
        .close(tags::SYNSET)
        .close(tags::LEXICON)
}

#[test]
fn self_loop_beside_structural_errors_is_still_an_invariant_violation() {
    let mut store = SqliteStore::open_in_memory().expect("store");
    let before = store.fingerprint().expect("fingerprint");
    let mut source = self_loop_lexicon(lexicon().declare("2x", "https://example.org/2x"));

    let err = import(&mut store, &EngineConfig::default(), &mut source).expect_err("self-loop");
    assert!(matches!(err, EngineError::InvariantViolation(_)), "{err:?}");
    assert_eq!(store.fingerprint().expect("fingerprint"), before);
}

#[test]
fn fail_fast_on_self_loop_is_an_invariant_violation() {
    let store = SqliteStore::open_in_memory().expect("store");
    let config = ValidationConfig {
        log_limit: 0,
        fail_fast: true,
        ..ValidationConfig::default()
    };
    let err = Validator::new(RelationRegistry::global(), &config)
        .validate(&mut self_loop_lexicon(lexicon()), &store)
        .expect_err("fail fast");
    let EngineError::InvariantViolation(detail) = err else {
        panic!("expected an invariant violation, got {err:?}");
    };
    assert!(detail.contains("ex_a"), "{detail}");
}

fn broken_references(count: usize) -> MemorySource {
    let mut source = MemorySource::default().open(lexicon());
    for i in 0..count {
        source = source.leaf(
            Element::new(tags::SENSE)
                .attr(attrs::ID, format!("ex_sense_{i}"))
                .attr(attrs::SYNSET, "ex_nowhere"),
        );
    }
    source.close(tags::LEXICON)
}

#[test]
fn fail_fast_aborts_once_log_limit_is_spent() {
    let store = SqliteStore::open_in_memory().expect("store");
    let config = ValidationConfig {
        log_limit: 1,
        fail_fast: true,
        ..ValidationConfig::default()
    };
    let mut sink: Vec<ValidationIssue> = Vec::new();
    let err = Validator::new(RelationRegistry::global(), &config)
        .validate_with_sink(&mut broken_references(3), &store, &mut sink)
        .expect_err("fail fast");

    let EngineError::Validation(issue) = err else {
        panic!("expected a validation abort, got {err:?}");
    };
    assert_eq!(issue.code, IssueCode::MissingInternalId);
    assert_eq!(issue.severity, Severity::Error);
    assert_eq!(issue.subject, "ex_nowhere");
    assert_eq!(sink.len(), 1);
}

#[test]
fn fail_fast_without_log_limit_reports_everything() {
    let store = SqliteStore::open_in_memory().expect("store");
    let config = ValidationConfig {
        fail_fast: true,
        ..ValidationConfig::default()
    };
    let mut sink: Vec<ValidationIssue> = Vec::new();
    let report = Validator::new(RelationRegistry::global(), &config)
        .validate_with_sink(&mut broken_references(3), &store, &mut sink)
        .expect("validate");
    assert_eq!(report.errors.count, 3);
    assert_eq!(sink.len(), 3);
}

#[test]
fn zero_log_limit_silences_sink_but_counts_issues() {
    let store = SqliteStore::open_in_memory().expect("store");
    let config = ValidationConfig {
        log_limit: 0,
        ..ValidationConfig::default()
    };
    let mut sink: Vec<ValidationIssue> = Vec::new();
    let report = Validator::new(RelationRegistry::global(), &config)
        .validate_with_sink(&mut broken_references(4), &store, &mut sink)
        .expect("validate");
    assert!(sink.is_empty());
    assert_eq!(report.emitted, 0);
    assert_eq!(report.errors.count_of(IssueCode::MissingInternalId), 4);
}

#[test]
fn log_limit_below_minus_one_is_invalid_config() {
    let store = SqliteStore::open_in_memory().expect("store");
    let config = ValidationConfig {
        log_limit: -2,
        ..ValidationConfig::default()
    };
    let err = Validator::new(RelationRegistry::global(), &config)
        .validate(&mut broken_references(1), &store)
        .expect_err("invalid config");
    assert!(matches!(err, EngineError::InvalidConfig(_)));
}

#[test]
fn json_lines_file_imports_end_to_end() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ex.jsonl");

    let mut text = String::new();
    for event in [
        r#"{"event":"start","tag":"Lexicon","attributes":{"id":"ex_lex"},"namespaces":[{"prefix":"ex","uri":"https://example.org/ex"}]}"#,
        r#"{"event":"start","tag":"Synset","attributes":{"id":"ex_cat","labels":"feline pet"}}"#,
        r#"{"event":"start","tag":"SynsetRelation","attributes":{"target":"ex_mammal","relType":"hypernym"}}"#,
        r#"{"event":"end","tag":"SynsetRelation"}"#,
        r#"{"event":"end","tag":"Synset"}"#,
        r#"{"event":"start","tag":"Synset","attributes":{"id":"ex_mammal"}}"#,
        r#"{"event":"end","tag":"Synset"}"#,
        r#"{"event":"end","tag":"Lexicon"}"#,
    ] {
        writeln!(text, "{event}").expect("format");
    }
    std::fs::write(&path, text).expect("write");

    let mut store = SqliteStore::open_in_memory().expect("store");
    let config = EngineConfig::default();
    let mut pipeline = Pipeline::new(&mut store, RelationRegistry::global(), &config);
    let outcome = pipeline
        .import(&mut JsonLinesSource::new(&path))
        .expect("import");
    assert!(matches!(outcome, ImportOutcome::Merged(_)));
    pipeline.run_pending().expect("run pending");

    let cat = store.require_node("ex_cat").expect("cat");
    assert!(cat.has_label("feline") && cat.has_label("pet"));
    assert!(store.edge_exists("ex_mammal", "ex_cat", "hyponym").expect("probe"));
}

#[test]
fn truncated_json_lines_file_is_rejected_as_fatal() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ex.jsonl");
    std::fs::write(
        &path,
        "{\"event\":\"start\",\"tag\":\"Lexicon\",\"attributes\":{\"id\":\"ex_lex\"}}\n{\"event\":\"st",
    )
    .expect("write");

    let mut store = SqliteStore::open_in_memory().expect("store");
    let config = EngineConfig::default();
    let outcome = Pipeline::new(&mut store, RelationRegistry::global(), &config)
        .import(&mut JsonLinesSource::new(&path))
        .expect("import");
    let ImportOutcome::Rejected(report) = outcome else {
        panic!("truncated file should reject");
    };
    assert!(report.fatal.as_deref().is_some_and(|m| m.contains(":2:")));
}
