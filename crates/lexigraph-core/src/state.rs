//! Readiness flags persisted alongside the graph.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the three engine phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Validate,
    Normalize,
    Augment,
}

impl Phase {
    /// Name of the readiness flag owned by this phase.
    #[must_use]
    pub const fn flag_name(self) -> &'static str {
        match self {
            Self::Validate => "to_validate",
            Self::Normalize => "to_normalize",
            Self::Augment => "to_augment",
        }
    }

    /// The phase whose flag must be clear before this one may run.
    #[must_use]
    pub const fn predecessor(self) -> Option<Self> {
        match self {
            Self::Validate => None,
            Self::Normalize => Some(Self::Validate),
            Self::Augment => Some(Self::Normalize),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validate => "validate",
            Self::Normalize => "normalize",
            Self::Augment => "augment",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which phases still owe work. A fresh store owes nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct GraphState {
    pub to_validate: bool,
    pub to_normalize: bool,
    pub to_augment: bool,
}

impl GraphState {
    /// State after the importer merged a validated data set.
    #[must_use]
    pub const fn merged() -> Self {
        Self {
            to_validate: false,
            to_normalize: true,
            to_augment: true,
        }
    }

    #[must_use]
    pub const fn is_raised(self, phase: Phase) -> bool {
        match phase {
            Phase::Validate => self.to_validate,
            Phase::Normalize => self.to_normalize,
            Phase::Augment => self.to_augment,
        }
    }

    /// Copy of this state with `phase`'s flag cleared.
    #[must_use]
    pub const fn cleared(mut self, phase: Phase) -> Self {
        match phase {
            Phase::Validate => self.to_validate = false,
            Phase::Normalize => self.to_normalize = false,
            Phase::Augment => self.to_augment = false,
        }
        self
    }

    /// Raised phases in execution order.
    #[must_use]
    pub fn pending_phases(self) -> Vec<Phase> {
        [Phase::Validate, Phase::Normalize, Phase::Augment]
            .into_iter()
            .filter(|phase| self.is_raised(*phase))
            .collect()
    }
}
