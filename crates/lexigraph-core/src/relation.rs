//! Relation taxonomy.
//!
//! The registry is an immutable table of relation names, their inverses and
//! classification flags. It is built once and passed around by reference.
//!
//! Every inverse pair has exactly one canonical member. Transitive closure
//! only ever runs over canonical relations; the non-canonical direction is
//! materialized alongside each derived edge.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, LookupKind, Result};

pub const HYPERNYM: &str = "hypernym";
pub const HYPONYM: &str = "hyponym";
pub const TOPIC: &str = "topic";
pub const IS_TOPIC_OF: &str = "is_topic_of";
pub const DOMAIN: &str = "domain";
pub const DOMAIN_MEMBER: &str = "domain_member";
pub const SUPER_DOMAIN: &str = "super_domain";
pub const SUB_DOMAIN: &str = "sub_domain";

/// Coarse classification of a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationType {
    Taxonomic,
    PartWhole,
    Association,
    Complementary,
    Label,
}

impl RelationType {
    /// Stable name used in storage and serialized output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Taxonomic => "taxonomic",
            Self::PartWhole => "partWhole",
            Self::Association => "association",
            Self::Complementary => "complementary",
            Self::Label => "label",
        }
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a relation type string is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown relation type: {0}")]
pub struct ParseRelationTypeError(pub String);

impl FromStr for RelationType {
    type Err = ParseRelationTypeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "taxonomic" => Ok(Self::Taxonomic),
            "partWhole" => Ok(Self::PartWhole),
            "association" => Ok(Self::Association),
            "complementary" => Ok(Self::Complementary),
            "label" => Ok(Self::Label),
            other => Err(ParseRelationTypeError(other.to_string())),
        }
    }
}

/// One entry of the taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationName {
    pub name: String,
    pub inverse: Option<String>,
    pub relation_type: RelationType,
    pub transitive: bool,
    pub part_of: bool,
    pub canonical: bool,
}

impl RelationName {
    /// True when the relation is its own inverse (antonym, similar, also).
    #[must_use]
    pub fn is_self_inverse(&self) -> bool {
        self.inverse.as_deref() == Some(self.name.as_str())
    }
}

/// Immutable relation table with O(1) lookups.
#[derive(Debug, Clone)]
pub struct RelationRegistry {
    entries: HashMap<String, RelationName>,
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

struct PairSpec {
    canonical: &'static str,
    inverse: Option<&'static str>,
    relation_type: RelationType,
    transitive: bool,
    part_of: bool,
}

const fn pair(
    canonical: &'static str,
    inverse: &'static str,
    relation_type: RelationType,
    transitive: bool,
    part_of: bool,
) -> PairSpec {
    PairSpec {
        canonical,
        inverse: Some(inverse),
        relation_type,
        transitive,
        part_of,
    }
}

const STANDARD_PAIRS: &[PairSpec] = &[
    pair(HYPONYM, HYPERNYM, RelationType::Taxonomic, true, false),
    pair(
        "instance_hyponym",
        "instance_hypernym",
        RelationType::Taxonomic,
        false,
        false,
    ),
    pair("mero_part", "holo_part", RelationType::PartWhole, true, true),
    pair("mero_member", "holo_member", RelationType::PartWhole, true, true),
    pair(
        "mero_substance",
        "holo_substance",
        RelationType::PartWhole,
        true,
        true,
    ),
    pair(SUB_DOMAIN, SUPER_DOMAIN, RelationType::Association, true, false),
    pair(DOMAIN_MEMBER, DOMAIN, RelationType::Association, false, false),
    pair(IS_TOPIC_OF, TOPIC, RelationType::Association, false, false),
    pair("is_region_of", "region", RelationType::Association, false, false),
    pair("is_entailed_by", "entails", RelationType::Association, true, false),
    pair("is_caused_by", "causes", RelationType::Association, true, false),
    pair("similar", "similar", RelationType::Association, false, false),
    pair("also", "also", RelationType::Association, false, false),
    pair("antonym", "antonym", RelationType::Complementary, false, false),
    pair(
        "is_exemplified_by",
        "exemplifies",
        RelationType::Label,
        false,
        false,
    ),
    PairSpec {
        canonical: "attribute",
        inverse: None,
        relation_type: RelationType::Label,
        transitive: false,
        part_of: false,
    },
    PairSpec {
        canonical: "pertainym",
        inverse: None,
        relation_type: RelationType::Label,
        transitive: false,
        part_of: false,
    },
];

impl RelationRegistry {
    /// The built-in lexical taxonomy.
    #[must_use]
    pub fn standard() -> Self {
        let mut entries = Vec::with_capacity(STANDARD_PAIRS.len() * 2);
        for spec in STANDARD_PAIRS {
            // Relations without an inverse never take part in a pair, so none
            // of them is canonical.
            entries.push(RelationName {
                name: spec.canonical.to_string(),
                inverse: spec.inverse.map(str::to_string),
                relation_type: spec.relation_type,
                transitive: spec.transitive,
                part_of: spec.part_of,
                canonical: spec.inverse.is_some(),
            });
            if let Some(inverse) = spec.inverse
                && inverse != spec.canonical
            {
                entries.push(RelationName {
                    name: inverse.to_string(),
                    inverse: Some(spec.canonical.to_string()),
                    relation_type: spec.relation_type,
                    transitive: spec.transitive,
                    part_of: spec.part_of,
                    canonical: false,
                });
            }
        }
        Self {
            entries: entries
                .into_iter()
                .map(|entry| (entry.name.clone(), entry))
                .collect(),
        }
    }

    /// Process-wide shared instance of [`RelationRegistry::standard`].
    pub fn global() -> &'static Self {
        static REGISTRY: OnceLock<RelationRegistry> = OnceLock::new();
        REGISTRY.get_or_init(Self::standard)
    }

    /// Build a registry from explicit entries, checking pair invariants.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] when a name is repeated, an
    /// inverse is missing or does not point back, both members of a pair are
    /// canonical (or neither is), or the two members disagree on their flags.
    pub fn from_entries(entries: impl IntoIterator<Item = RelationName>) -> Result<Self> {
        let mut map = HashMap::new();
        for entry in entries {
            let name = entry.name.clone();
            if map.insert(name.clone(), entry).is_some() {
                return Err(EngineError::InvalidConfig(format!(
                    "relation `{name}` is declared twice"
                )));
            }
        }

        for entry in map.values() {
            let Some(inverse_name) = entry.inverse.as_deref() else {
                continue;
            };
            let inverse = map.get(inverse_name).ok_or_else(|| {
                EngineError::InvalidConfig(format!(
                    "inverse `{inverse_name}` of `{}` is not declared",
                    entry.name
                ))
            })?;
            if inverse.inverse.as_deref() != Some(entry.name.as_str()) {
                return Err(EngineError::InvalidConfig(format!(
                    "inverse of `{inverse_name}` does not point back to `{}`",
                    entry.name
                )));
            }
            if inverse.relation_type != entry.relation_type
                || inverse.transitive != entry.transitive
                || inverse.part_of != entry.part_of
            {
                return Err(EngineError::InvalidConfig(format!(
                    "`{}` and `{inverse_name}` disagree on their classification",
                    entry.name
                )));
            }
            if entry.is_self_inverse() {
                if !entry.canonical {
                    return Err(EngineError::InvalidConfig(format!(
                        "self-inverse relation `{}` must be canonical",
                        entry.name
                    )));
                }
            } else if entry.canonical == inverse.canonical {
                return Err(EngineError::InvalidConfig(format!(
                    "exactly one of `{}` and `{inverse_name}` must be canonical",
                    entry.name
                )));
            }
        }

        Ok(Self { entries: map })
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    /// Look up a relation by name.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for unknown names.
    pub fn get(&self, name: &str) -> Result<&RelationName> {
        self.entries
            .get(name)
            .ok_or_else(|| EngineError::relation_not_found(name))
    }

    /// The inverse entry of `name`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] when `name` is unknown or has no
    /// inverse.
    pub fn inverse_of(&self, name: &str) -> Result<&RelationName> {
        let entry = self.get(name)?;
        entry
            .inverse
            .as_deref()
            .and_then(|inverse| self.entries.get(inverse))
            .ok_or_else(|| EngineError::NotFound {
                kind: LookupKind::Inverse,
                key: name.to_string(),
            })
    }

    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for unknown names.
    pub fn has_inverse(&self, name: &str) -> Result<bool> {
        Ok(self.get(name)?.inverse.is_some())
    }

    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for unknown names.
    pub fn is_canonical(&self, name: &str) -> Result<bool> {
        Ok(self.get(name)?.canonical)
    }

    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for unknown names.
    pub fn is_transitive(&self, name: &str) -> Result<bool> {
        Ok(self.get(name)?.transitive)
    }

    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for unknown names.
    pub fn is_part_of(&self, name: &str) -> Result<bool> {
        Ok(self.get(name)?.part_of)
    }

    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for unknown names.
    pub fn relation_type(&self, name: &str) -> Result<RelationType> {
        Ok(self.get(name)?.relation_type)
    }

    /// True when a self-loop on `name` violates the graph invariants.
    ///
    /// Both members of a transitive canonical pair are covered: a self-loop
    /// on the non-canonical side would be normalized into one on the
    /// canonical side.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for unknown names.
    pub fn forbids_self_loop(&self, name: &str) -> Result<bool> {
        let entry = self.get(name)?;
        if !entry.transitive {
            return Ok(false);
        }
        if entry.canonical {
            return Ok(true);
        }
        Ok(self.inverse_of(name).is_ok_and(|inverse| inverse.canonical))
    }

    /// Names of all relations that are both canonical and transitive.
    #[must_use]
    pub fn canonical_transitive_relations(&self) -> BTreeSet<&str> {
        self.entries
            .values()
            .filter(|entry| entry.canonical && entry.transitive)
            .map(|entry| entry.name.as_str())
            .collect()
    }

    /// All entries, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &RelationName> {
        self.entries.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
