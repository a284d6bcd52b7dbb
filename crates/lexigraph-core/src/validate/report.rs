use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tracing::{error, warn};

/// Issues of each severity retained verbatim in a report.
pub const MAX_FIRST_ISSUES: usize = 10;

// ---------------------------------------------------------------------------
// Issue
// ---------------------------------------------------------------------------

/// Category of validation issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueCode {
    /// A declared prefix does not match the prefix grammar.
    InvalidPrefix,
    /// A reference uses a prefix that is neither declared nor well known.
    UndeclaredNamespace,
    /// An own-namespace reference names no element of the expected kind.
    MissingInternalId,
    /// A foreign reference names no node in the graph store.
    MissingExternalId,
    /// Conflicting redeclaration, or an id outside its lexicon's namespace.
    NamespaceClash,
    /// The lexicon id does not carry a declared prefix.
    InvalidRootNamespace,
    DuplicateId,
    UnknownRelation,
    /// Self-loop on a transitive canonical relation pair.
    SelfLoop,
}

impl IssueCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidPrefix => "invalid-prefix",
            Self::UndeclaredNamespace => "undeclared-namespace",
            Self::MissingInternalId => "missing-internal-id",
            Self::MissingExternalId => "missing-external-id",
            Self::NamespaceClash => "namespace-clash",
            Self::InvalidRootNamespace => "invalid-root-namespace",
            Self::DuplicateId => "duplicate-id",
            Self::UnknownRelation => "unknown-relation",
            Self::SelfLoop => "self-loop",
        }
    }
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// Validation step, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Structural = 1,
    Internal = 2,
    External = 3,
}

impl Step {
    #[must_use]
    pub const fn number(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Structural => "structural",
            Self::Internal => "internal",
            Self::External => "external",
        };
        write!(f, "{} ({name})", self.number())
    }
}

/// A single finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub code: IssueCode,
    pub severity: Severity,
    pub step: Step,
    /// Tag of the element the issue was found on.
    pub element: String,
    /// The offending id, reference or prefix.
    pub subject: String,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] step {} <{}> {}: {}",
            self.code,
            self.step.number(),
            self.element,
            self.subject,
            self.message
        )
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// First issues verbatim plus running counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IssueLog {
    pub first: Vec<ValidationIssue>,
    pub count: usize,
    pub by_code: BTreeMap<IssueCode, usize>,
}

impl IssueLog {
    pub fn record(&mut self, issue: ValidationIssue) {
        self.count += 1;
        *self.by_code.entry(issue.code).or_default() += 1;
        if self.first.len() < MAX_FIRST_ISSUES {
            self.first.push(issue);
        }
    }

    #[must_use]
    pub fn count_of(&self, code: IssueCode) -> usize {
        self.by_code.get(&code).copied().unwrap_or(0)
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Outcome of one validation run. Read-only once returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// Last step that ran.
    pub step: Step,
    pub errors: IssueLog,
    pub warnings: IssueLog,
    /// Terminal condition that stopped the scan, if any.
    pub fatal: Option<String>,
    /// Issues handed to the caller's sink (bounded by the log limit).
    pub emitted: usize,
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self {
            step: Step::Structural,
            errors: IssueLog::default(),
            warnings: IssueLog::default(),
            fatal: None,
            emitted: 0,
        }
    }
}

impl ValidationReport {
    /// True when the data set may be merged.
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.errors.is_empty() && self.fatal.is_none()
    }

    #[must_use]
    pub fn has_invariant_violation(&self) -> bool {
        self.errors.count_of(IssueCode::SelfLoop) > 0
    }

    pub(crate) fn record(&mut self, issue: ValidationIssue) {
        match issue.severity {
            Severity::Error => self.errors.record(issue),
            Severity::Warning => self.warnings.record(issue),
        }
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Receiver for issues as they are found.
pub trait IssueSink {
    fn emit(&mut self, issue: &ValidationIssue);
}

/// Logs every issue through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl IssueSink for TracingSink {
    fn emit(&mut self, issue: &ValidationIssue) {
        match issue.severity {
            Severity::Error => error!(code = %issue.code, step = issue.step.number(), "{issue}"),
            Severity::Warning => warn!(code = %issue.code, step = issue.step.number(), "{issue}"),
        }
    }
}

impl IssueSink for Vec<ValidationIssue> {
    fn emit(&mut self, issue: &ValidationIssue) {
        self.push(issue.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(code: IssueCode, severity: Severity) -> ValidationIssue {
        ValidationIssue {
            code,
            severity,
            step: Step::Internal,
            element: "SynsetRelation".into(),
            subject: "ex_cat".into(),
            message: "no such synset".into(),
        }
    }

    #[test]
    fn log_keeps_first_issues_and_counts_the_rest() {
        let mut log = IssueLog::default();
        for _ in 0..(MAX_FIRST_ISSUES + 5) {
            log.record(issue(IssueCode::MissingInternalId, Severity::Error));
        }
        assert_eq!(log.first.len(), MAX_FIRST_ISSUES);
        assert_eq!(log.count, MAX_FIRST_ISSUES + 5);
        assert_eq!(log.count_of(IssueCode::MissingInternalId), MAX_FIRST_ISSUES + 5);
        assert_eq!(log.count_of(IssueCode::SelfLoop), 0);
    }

    #[test]
    fn report_splits_by_severity() {
        let mut report = ValidationReport::default();
        assert!(report.passed());
        report.record(issue(IssueCode::MissingExternalId, Severity::Warning));
        assert!(report.passed());
        report.record(issue(IssueCode::SelfLoop, Severity::Error));
        assert!(!report.passed());
        assert!(report.has_invariant_violation());
        assert_eq!(report.warnings.count, 1);
    }

    #[test]
    fn issue_display_and_codes() {
        let text = issue(IssueCode::MissingInternalId, Severity::Error).to_string();
        assert_eq!(text, "[missing-internal-id] step 2 <SynsetRelation> ex_cat: no such synset");
        assert_eq!(
            serde_json::to_value(IssueCode::InvalidRootNamespace).expect("encode"),
            serde_json::json!("invalid-root-namespace")
        );
        assert_eq!(Step::External.to_string(), "3 (external)");
    }
}
