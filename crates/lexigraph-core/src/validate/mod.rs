//! Three-step validation of a candidate data set.
//!
//! 1. **Structural**: namespace declarations, lexicon prefix, id index and
//!    self-loops on transitive relations.
//! 2. **Internal**: references inside the document and relation names.
//! 3. **External**: synset references to other namespaces must name nodes
//!    already in the graph store. The store holds synsets only, so foreign
//!    sense references are not looked up.
//!
//! Each step is a full scan of the source. A step that records an error ends
//! the run; validation never mutates the store.

pub mod namespace;
pub mod report;
pub mod source;

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, instrument};

use crate::config::{LogLimit, ValidationConfig};
use crate::error::{EngineError, Result};
use crate::relation::RelationRegistry;
use crate::store::GraphStore;

use namespace::{is_valid_prefix, split_id};
use report::{IssueCode, IssueSink, Severity, Step, TracingSink, ValidationIssue};
use source::{Element, ImportSource, ScanControl, ScanEvent, attrs, tags};

pub use report::ValidationReport;

/// Reference attributes and the element kind they must resolve to.
const REFERENCE_RULES: &[(&str, &str, &str)] = &[
    (tags::SENSE, attrs::SYNSET, tags::SYNSET),
    (tags::SYNSET_RELATION, attrs::TARGET, tags::SYNSET),
    (tags::SENSE_RELATION, attrs::TARGET, tags::SENSE),
];

fn reference_of(element: &Element) -> Option<(&str, &'static str)> {
    REFERENCE_RULES
        .iter()
        .find(|(tag, _, _)| *tag == element.tag)
        .and_then(|(_, attr, expected)| element.get(attr).map(|value| (value, *expected)))
}

/// Validates candidate data sets against the taxonomy and the graph store.
#[derive(Debug, Clone, Copy)]
pub struct Validator<'a> {
    registry: &'a RelationRegistry,
    config: &'a ValidationConfig,
}

/// Facts collected by step 1 and consumed by later steps.
#[derive(Debug, Default)]
struct DocumentIndex {
    declared: HashMap<String, String>,
    own_prefixes: HashSet<String>,
    ids: HashMap<String, String>,
}

impl DocumentIndex {
    fn is_own(&self, prefix: &str) -> bool {
        self.own_prefixes.contains(prefix)
    }
}

/// Issue accounting shared by all steps of one run.
struct Run<'s> {
    limit: LogLimit,
    fail_fast: bool,
    step: Step,
    report: ValidationReport,
    sink: &'s mut dyn IssueSink,
}

impl Run<'_> {
    fn raise(
        &mut self,
        code: IssueCode,
        severity: Severity,
        element: &str,
        subject: &str,
        message: String,
    ) -> Result<()> {
        let issue = ValidationIssue {
            code,
            severity,
            step: self.step,
            element: element.to_string(),
            subject: subject.to_string(),
            message,
        };
        if self.limit.allows(self.report.emitted) {
            self.sink.emit(&issue);
            self.report.emitted += 1;
        } else if self.fail_fast && severity == Severity::Error {
            if issue.code == IssueCode::SelfLoop {
                return Err(EngineError::InvariantViolation(issue.to_string()));
            }
            return Err(EngineError::Validation(Box::new(issue)));
        }
        self.report.record(issue);
        Ok(())
    }

    fn error(&mut self, code: IssueCode, element: &str, subject: &str, message: String) -> Result<()> {
        self.raise(code, Severity::Error, element, subject, message)
    }
}

impl<'a> Validator<'a> {
    #[must_use]
    pub const fn new(registry: &'a RelationRegistry, config: &'a ValidationConfig) -> Self {
        Self { registry, config }
    }

    /// Validate `source`, logging issues through `tracing`.
    ///
    /// # Errors
    ///
    /// See [`Validator::validate_with_sink`].
    pub fn validate<S: GraphStore + ?Sized>(
        &self,
        source: &mut dyn ImportSource,
        store: &S,
    ) -> Result<ValidationReport> {
        self.validate_with_sink(source, store, &mut TracingSink)
    }

    /// Validate `source`, handing issues to `sink` as they are found.
    ///
    /// Unreadable or malformed input ends the run with `report.fatal` set.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] when fail-fast aborts the scan
    /// ([`EngineError::InvariantViolation`] when the trigger is a self-loop),
    /// [`EngineError::InvalidConfig`] for an out-of-range log limit, and
    /// propagates store read failures.
    #[instrument(skip_all, fields(source = source.name()))]
    pub fn validate_with_sink<S: GraphStore + ?Sized>(
        &self,
        source: &mut dyn ImportSource,
        store: &S,
        sink: &mut dyn IssueSink,
    ) -> Result<ValidationReport> {
        let mut run = Run {
            limit: self.config.limit()?,
            fail_fast: self.config.fail_fast,
            step: Step::Structural,
            report: ValidationReport::default(),
            sink,
        };

        let mut index = DocumentIndex::default();
        if !run_step(&mut run, source, |run, source| {
            structural(run, source, self.registry, &mut index)
        })? {
            return Ok(run.report);
        }

        run.step = Step::Internal;
        if !run_step(&mut run, source, |run, source| {
            self.internal(run, source, &index)
        })? {
            return Ok(run.report);
        }

        run.step = Step::External;
        run_step(&mut run, source, |run, source| {
            self.external(run, source, &index, store)
        })?;

        let report = run.report;
        info!(
            errors = report.errors.count,
            warnings = report.warnings.count,
            passed = report.passed(),
            "validation finished"
        );
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Step 2
    // -----------------------------------------------------------------------

    fn internal(
        &self,
        run: &mut Run<'_>,
        source: &mut dyn ImportSource,
        index: &DocumentIndex,
    ) -> Result<()> {
        source.scan(&mut |event| {
            let ScanEvent::Start(element) = event else {
                return Ok(ScanControl::Continue);
            };

            if let Some((reference, expected)) = reference_of(element) {
                self.check_reference(run, element, reference, expected, index)?;
            }
            if element.tag == tags::SYNSET_RELATION || element.tag == tags::SENSE_RELATION {
                self.check_relation(run, element)?;
            }
            Ok(ScanControl::Continue)
        })?;
        Ok(())
    }

    fn check_reference(
        &self,
        run: &mut Run<'_>,
        element: &Element,
        reference: &str,
        expected: &str,
        index: &DocumentIndex,
    ) -> Result<()> {
        match split_id(reference) {
            Some((prefix, _)) if !index.is_own(prefix) => {
                let known = index.declared.contains_key(prefix)
                    || self.config.known_prefixes.iter().any(|p| p == prefix);
                if !known {
                    run.error(
                        IssueCode::UndeclaredNamespace,
                        &element.tag,
                        reference,
                        format!("prefix `{prefix}` is neither declared nor well known"),
                    )?;
                }
            }
            _ => match index.ids.get(reference) {
                Some(tag) if tag == expected => {}
                Some(tag) => {
                    run.error(
                        IssueCode::MissingInternalId,
                        &element.tag,
                        reference,
                        format!("expected a <{expected}>, found a <{tag}>"),
                    )?;
                }
                None => {
                    run.error(
                        IssueCode::MissingInternalId,
                        &element.tag,
                        reference,
                        format!("no <{expected}> with this id in the document"),
                    )?;
                }
            },
        }
        Ok(())
    }

    fn check_relation(&self, run: &mut Run<'_>, element: &Element) -> Result<()> {
        let rel_type = element.get(attrs::REL_TYPE).unwrap_or_default();
        if self.registry.get(rel_type).is_err() {
            run.error(
                IssueCode::UnknownRelation,
                &element.tag,
                rel_type,
                "relation is not part of the taxonomy".to_string(),
            )?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Step 3
    // -----------------------------------------------------------------------

    fn external<S: GraphStore + ?Sized>(
        &self,
        run: &mut Run<'_>,
        source: &mut dyn ImportSource,
        index: &DocumentIndex,
        store: &S,
    ) -> Result<()> {
        let severity = if self.config.strict {
            Severity::Error
        } else {
            Severity::Warning
        };
        let mut present: HashMap<String, bool> = HashMap::new();

        source.scan(&mut |event| {
            let ScanEvent::Start(element) = event else {
                return Ok(ScanControl::Continue);
            };
            let Some((reference, expected)) = reference_of(element) else {
                return Ok(ScanControl::Continue);
            };
            let Some((prefix, _)) = split_id(reference) else {
                return Ok(ScanControl::Continue);
            };
            if index.is_own(prefix) {
                return Ok(ScanControl::Continue);
            }
            if expected != tags::SYNSET {
                debug!(reference, "foreign sense reference not checked");
                return Ok(ScanControl::Continue);
            }

            let exists = match present.get(reference) {
                Some(exists) => *exists,
                None => {
                    let exists = store.node_exists(reference)?;
                    present.insert(reference.to_string(), exists);
                    exists
                }
            };
            if !exists {
                run.raise(
                    IssueCode::MissingExternalId,
                    severity,
                    &element.tag,
                    reference,
                    "referenced node is not in the graph store".to_string(),
                )?;
            }
            Ok(ScanControl::Continue)
        })?;
        Ok(())
    }
}

/// Run one step. Returns `false` when the run must stop after it.
fn run_step(
    run: &mut Run<'_>,
    source: &mut dyn ImportSource,
    step: impl FnOnce(&mut Run<'_>, &mut dyn ImportSource) -> Result<()>,
) -> Result<bool> {
    run.report.step = run.step;
    debug!(step = run.step.number(), "validation step started");
    match step(run, source) {
        Ok(()) => {}
        Err(EngineError::FatalParse(message)) => {
            tracing::error!(step = run.step.number(), %message, "fatal parse error");
            run.report.fatal = Some(message);
            return Ok(false);
        }
        Err(err) => return Err(err),
    }
    Ok(run.report.errors.is_empty())
}

// ---------------------------------------------------------------------------
// Step 1
// ---------------------------------------------------------------------------

fn structural(
    run: &mut Run<'_>,
    source: &mut dyn ImportSource,
    registry: &RelationRegistry,
    index: &mut DocumentIndex,
) -> Result<()> {
    let mut open: Vec<String> = Vec::new();
    let mut lexicons: Vec<Option<String>> = Vec::new();
    let mut synsets: Vec<Option<String>> = Vec::new();

    source.scan(&mut |event| {
        match event {
            ScanEvent::Start(element) => {
                check_declarations(run, element, index)?;
                if element.tag == tags::LEXICON {
                    let prefix = check_lexicon(run, element, index)?;
                    lexicons.push(prefix);
                } else if let Some(id) = element.id() {
                    let enclosing = lexicons.last().cloned().flatten();
                    check_own_namespace(run, element, id, enclosing.as_deref())?;
                }
                if let Some(id) = element.id() {
                    if index.ids.contains_key(id) {
                        run.error(
                            IssueCode::DuplicateId,
                            &element.tag,
                            id,
                            "id is defined more than once".to_string(),
                        )?;
                    } else {
                        index.ids.insert(id.to_string(), element.tag.clone());
                    }
                }
                if element.tag == tags::SYNSET_RELATION {
                    let enclosing = synsets.last().and_then(Option::as_deref);
                    check_self_loop(run, registry, element, enclosing)?;
                } else if element.tag == tags::SYNSET {
                    synsets.push(element.id().map(str::to_string));
                }
                open.push(element.tag.clone());
            }
            ScanEvent::End { tag } => match open.pop() {
                Some(expected) if expected == *tag => {
                    if tag == tags::LEXICON {
                        lexicons.pop();
                    } else if tag == tags::SYNSET {
                        synsets.pop();
                    }
                }
                Some(expected) => {
                    return Err(EngineError::FatalParse(format!(
                        "element <{expected}> closed by </{tag}>"
                    )));
                }
                None => {
                    return Err(EngineError::FatalParse(format!(
                        "unexpected </{tag}> at top level"
                    )));
                }
            },
        }
        Ok(ScanControl::Continue)
    })?;

    if let Some(unclosed) = open.pop() {
        return Err(EngineError::FatalParse(format!(
            "element <{unclosed}> is never closed"
        )));
    }
    debug!(
        ids = index.ids.len(),
        prefixes = index.declared.len(),
        "document index built"
    );
    Ok(())
}

fn check_declarations(
    run: &mut Run<'_>,
    element: &Element,
    index: &mut DocumentIndex,
) -> Result<()> {
    for decl in &element.namespaces {
        if !is_valid_prefix(&decl.prefix) {
            run.error(
                IssueCode::InvalidPrefix,
                &element.tag,
                &decl.prefix,
                "prefix must match [A-Za-z][A-Za-z0-9.-]*".to_string(),
            )?;
        }
        match index.declared.get(&decl.prefix) {
            Some(uri) if *uri != decl.uri => {
                run.error(
                    IssueCode::NamespaceClash,
                    &element.tag,
                    &decl.prefix,
                    format!("prefix already bound to {uri}, redeclared as {}", decl.uri),
                )?;
            }
            Some(_) => {}
            None => {
                index
                    .declared
                    .insert(decl.prefix.clone(), decl.uri.clone());
            }
        }
    }
    Ok(())
}

/// Returns the lexicon's own prefix when it is usable.
fn check_lexicon(
    run: &mut Run<'_>,
    element: &Element,
    index: &mut DocumentIndex,
) -> Result<Option<String>> {
    let id = element.id().unwrap_or_default();
    match split_id(id) {
        Some((prefix, _)) if index.declared.contains_key(prefix) => {
            index.own_prefixes.insert(prefix.to_string());
            Ok(Some(prefix.to_string()))
        }
        Some((prefix, _)) => {
            run.error(
                IssueCode::InvalidRootNamespace,
                &element.tag,
                id,
                format!("lexicon prefix `{prefix}` is not declared"),
            )?;
            Ok(None)
        }
        None => {
            run.error(
                IssueCode::InvalidRootNamespace,
                &element.tag,
                id,
                "lexicon id must have the form <prefix>_<local>".to_string(),
            )?;
            Ok(None)
        }
    }
}

/// Transitive relations may not relate a synset to itself. Unknown relation
/// names are left to step 2.
fn check_self_loop(
    run: &mut Run<'_>,
    registry: &RelationRegistry,
    element: &Element,
    enclosing_synset: Option<&str>,
) -> Result<()> {
    let rel_type = element.get(attrs::REL_TYPE).unwrap_or_default();
    let target = element.get(attrs::TARGET);
    if target.is_some()
        && target == enclosing_synset
        && matches!(registry.forbids_self_loop(rel_type), Ok(true))
    {
        run.error(
            IssueCode::SelfLoop,
            &element.tag,
            target.unwrap_or_default(),
            format!("`{rel_type}` may not relate a synset to itself"),
        )?;
    }
    Ok(())
}

fn check_own_namespace(
    run: &mut Run<'_>,
    element: &Element,
    id: &str,
    lexicon_prefix: Option<&str>,
) -> Result<()> {
    let Some(own) = lexicon_prefix else {
        return Ok(());
    };
    match split_id(id) {
        Some((prefix, _)) if prefix == own => Ok(()),
        _ => run.error(
            IssueCode::NamespaceClash,
            &element.tag,
            id,
            format!("id is defined outside the lexicon namespace `{own}`"),
        ),
    }
}
