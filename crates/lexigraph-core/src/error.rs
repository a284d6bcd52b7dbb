//! Error taxonomy for the engine.
//!
//! Every failure the engine can surface maps to a stable [`ErrorCode`]
//! (`E####`) so tooling can branch on it without parsing messages.

use std::fmt;

use crate::state::Phase;
use crate::validate::report::ValidationIssue;

/// Machine-readable error codes for agent-friendly decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    InvalidConfig,
    RelationNotFound,
    NodeNotFound,
    PhaseOutOfOrder,
    InvariantViolation,
    ValidationFailed,
    FatalParse,
    StoreFailure,
    LockContention,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::InvalidConfig => "E1003",
            Self::RelationNotFound => "E2001",
            Self::NodeNotFound => "E2002",
            Self::PhaseOutOfOrder => "E2003",
            Self::InvariantViolation => "E2004",
            Self::ValidationFailed => "E3001",
            Self::FatalParse => "E3002",
            Self::StoreFailure => "E5001",
            Self::LockContention => "E5002",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Graph store not initialized",
            Self::ConfigParseError => "Config file parse error",
            Self::InvalidConfig => "Invalid engine configuration",
            Self::RelationNotFound => "Relation not found",
            Self::NodeNotFound => "Node not found",
            Self::PhaseOutOfOrder => "Phase invoked out of order",
            Self::InvariantViolation => "Graph invariant violated",
            Self::ValidationFailed => "Candidate data set failed validation",
            Self::FatalParse => "Input could not be scanned",
            Self::StoreFailure => "Graph store failure",
            Self::LockContention => "Lock contention",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and agents.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run `lexigraph init` to create the graph store."),
            Self::ConfigParseError => Some("Fix syntax in the lexigraph config.toml and retry."),
            Self::InvalidConfig => {
                Some("batch_size must be positive and log_limit must be -1 or greater.")
            }
            Self::RelationNotFound => {
                Some("Relation names come from the built-in taxonomy; check the spelling.")
            }
            Self::NodeNotFound => None,
            Self::PhaseOutOfOrder => {
                Some("Run phases in order: validate -> normalize -> augment (`lexigraph run`).")
            }
            Self::InvariantViolation => {
                Some("Remove the offending edge from the source data; it is never auto-repaired.")
            }
            Self::ValidationFailed => Some("Inspect the validation report and fix the data set."),
            Self::FatalParse => Some("Check that the input is well-formed before importing."),
            Self::StoreFailure => {
                Some("The phase was rolled back; check disk space and database permissions.")
            }
            Self::LockContention => {
                Some("Retry after the other `lexigraph` process releases its lock.")
            }
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// What kind of thing a failed lookup was looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
    Relation,
    Inverse,
    Node,
}

impl fmt::Display for LookupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Relation => "relation",
            Self::Inverse => "inverse of relation",
            Self::Node => "node",
        })
    }
}

/// Failures raised by a [`crate::store::GraphStore`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("store I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("unit of work: {0}")]
    UnitOfWork(&'static str),

    #[error("schema version {found} does not match expected version {expected}")]
    SchemaMismatch { found: u32, expected: u32 },

    #[error("graph store not initialized at {}", .0.display())]
    NotInitialized(std::path::PathBuf),

    #[error("store failure: {0}")]
    Backend(String),
}

/// Top-level engine error.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{kind} not found: {key}")]
    NotFound { kind: LookupKind, key: String },

    #[error("validation aborted: {0}")]
    Validation(Box<ValidationIssue>),

    #[error("fatal parse error: {0}")]
    FatalParse(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("{phase} cannot run while {} is still pending", .requires.flag_name())]
    PhaseOrder { phase: Phase, requires: Phase },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Store(StoreError::Sqlite(err))
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        Self::Store(StoreError::Io(err))
    }
}

impl EngineError {
    pub(crate) fn relation_not_found(name: &str) -> Self {
        Self::NotFound {
            kind: LookupKind::Relation,
            key: name.to_string(),
        }
    }

    pub(crate) fn node_not_found(id: &str) -> Self {
        Self::NotFound {
            kind: LookupKind::Node,
            key: id.to_string(),
        }
    }

    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound {
                kind: LookupKind::Node,
                ..
            } => ErrorCode::NodeNotFound,
            Self::NotFound { .. } => ErrorCode::RelationNotFound,
            Self::Validation(_) => ErrorCode::ValidationFailed,
            Self::FatalParse(_) => ErrorCode::FatalParse,
            Self::InvariantViolation(_) => ErrorCode::InvariantViolation,
            Self::PhaseOrder { .. } => ErrorCode::PhaseOutOfOrder,
            Self::InvalidConfig(_) => ErrorCode::InvalidConfig,
            Self::Store(StoreError::SchemaMismatch { .. } | StoreError::NotInitialized(_)) => {
                ErrorCode::NotInitialized
            }
            Self::Store(_) => ErrorCode::StoreFailure,
        }
    }

    /// Optional remediation hint for operators and agents.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

/// Result alias used throughout the engine.
pub type Result<T, E = EngineError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::{EngineError, ErrorCode, LookupKind, StoreError};
    use crate::state::Phase;
    use std::collections::HashSet;

    #[test]
    fn all_codes_are_unique() {
        let all = [
            ErrorCode::NotInitialized,
            ErrorCode::ConfigParseError,
            ErrorCode::InvalidConfig,
            ErrorCode::RelationNotFound,
            ErrorCode::NodeNotFound,
            ErrorCode::PhaseOutOfOrder,
            ErrorCode::InvariantViolation,
            ErrorCode::ValidationFailed,
            ErrorCode::FatalParse,
            ErrorCode::StoreFailure,
            ErrorCode::LockContention,
            ErrorCode::InternalUnexpected,
        ];

        let mut seen = HashSet::new();
        for code in all {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        let code = ErrorCode::PhaseOutOfOrder.code();
        assert_eq!(code.len(), 5);
        assert!(code.starts_with('E'));
        assert!(code.chars().skip(1).all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn engine_errors_map_to_codes() {
        let missing_node = EngineError::NotFound {
            kind: LookupKind::Node,
            key: "ex_dog".into(),
        };
        assert_eq!(missing_node.code(), ErrorCode::NodeNotFound);
        assert_eq!(
            EngineError::relation_not_found("frobnicates").code(),
            ErrorCode::RelationNotFound
        );
        assert_eq!(
            EngineError::from(StoreError::UnitOfWork("no unit of work open")).code(),
            ErrorCode::StoreFailure
        );
        assert_eq!(
            EngineError::from(StoreError::SchemaMismatch {
                found: 0,
                expected: 1
            })
            .code(),
            ErrorCode::NotInitialized
        );
    }

    #[test]
    fn phase_order_message_names_pending_flag() {
        let err = EngineError::PhaseOrder {
            phase: Phase::Augment,
            requires: Phase::Normalize,
        };
        assert_eq!(
            err.to_string(),
            "augment cannot run while to_normalize is still pending"
        );
    }
}
