//! Import sources: restartable scans over typed document events.
//!
//! A source yields a flat stream of [`ScanEvent`]s (element start with its
//! attributes and namespace declarations, element end). Every validation step
//! and the importer call [`ImportSource::scan`] again from the beginning.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Element names the engine interprets.
pub mod tags {
    pub const LEXICON: &str = "Lexicon";
    pub const LEXICAL_ENTRY: &str = "LexicalEntry";
    pub const SENSE: &str = "Sense";
    pub const SENSE_RELATION: &str = "SenseRelation";
    pub const SYNSET: &str = "Synset";
    pub const SYNSET_RELATION: &str = "SynsetRelation";
}

/// Attribute names the engine interprets.
pub mod attrs {
    pub const ID: &str = "id";
    pub const LABELS: &str = "labels";
    pub const REL_TYPE: &str = "relType";
    pub const SYNSET: &str = "synset";
    pub const TARGET: &str = "target";
}

/// `xmlns:<prefix>="<uri>"`-style declaration carried by an element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceDecl {
    pub prefix: String,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    pub tag: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub namespaces: Vec<NamespaceDecl>,
}

impl Element {
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: BTreeMap::new(),
            namespaces: Vec::new(),
        }
    }

    #[must_use]
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn declare(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.namespaces.push(NamespaceDecl {
            prefix: prefix.into(),
            uri: uri.into(),
        });
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.get(attrs::ID)
    }
}

/// One event of a document scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScanEvent {
    Start(Element),
    End { tag: String },
}

impl ScanEvent {
    #[must_use]
    pub fn end(tag: impl Into<String>) -> Self {
        Self::End { tag: tag.into() }
    }
}

/// Visitor verdict: keep scanning or stop early without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanControl {
    Continue,
    Stop,
}

/// Summary of one completed scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    pub events: u64,
    pub stopped: bool,
}

/// Visitor callback handed to [`ImportSource::scan`].
pub type Visitor<'v> = dyn FnMut(&ScanEvent) -> Result<ScanControl> + 'v;

/// A candidate data set that can be scanned any number of times.
pub trait ImportSource {
    /// Human-readable name used in logs.
    fn name(&self) -> &str;

    /// Feed every event to `visitor` in document order, from the start.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::FatalParse`] when the input cannot be read, and
    /// propagates any error returned by `visitor`.
    fn scan(&mut self, visitor: &mut Visitor<'_>) -> Result<ScanOutcome>;
}

// ---------------------------------------------------------------------------
// MemorySource
// ---------------------------------------------------------------------------

/// Events held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    name: String,
    events: Vec<ScanEvent>,
}

impl MemorySource {
    #[must_use]
    pub fn new(name: impl Into<String>, events: Vec<ScanEvent>) -> Self {
        Self {
            name: name.into(),
            events,
        }
    }

    /// Append an element start.
    #[must_use]
    pub fn open(mut self, element: Element) -> Self {
        self.events.push(ScanEvent::Start(element));
        self
    }

    /// Append an element end.
    #[must_use]
    pub fn close(mut self, tag: impl Into<String>) -> Self {
        self.events.push(ScanEvent::end(tag));
        self
    }

    /// Append a childless element.
    #[must_use]
    pub fn leaf(self, element: Element) -> Self {
        let tag = element.tag.clone();
        self.open(element).close(tag)
    }

    #[must_use]
    pub fn events(&self) -> &[ScanEvent] {
        &self.events
    }
}

impl ImportSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn scan(&mut self, visitor: &mut Visitor<'_>) -> Result<ScanOutcome> {
        let mut outcome = ScanOutcome::default();
        for event in &self.events {
            outcome.events += 1;
            if visitor(event)? == ScanControl::Stop {
                outcome.stopped = true;
                break;
            }
        }
        Ok(outcome)
    }
}

// ---------------------------------------------------------------------------
// JsonLinesSource
// ---------------------------------------------------------------------------

/// One JSON-encoded [`ScanEvent`] per line; blank lines are ignored.
#[derive(Debug, Clone)]
pub struct JsonLinesSource {
    path: PathBuf,
    name: String,
}

impl JsonLinesSource {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path.display().to_string();
        Self { path, name }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ImportSource for JsonLinesSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn scan(&mut self, visitor: &mut Visitor<'_>) -> Result<ScanOutcome> {
        let file = File::open(&self.path).map_err(|err| {
            EngineError::FatalParse(format!("cannot open {}: {err}", self.path.display()))
        })?;

        let mut outcome = ScanOutcome::default();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line_num = idx + 1;
            let line = line.map_err(|err| {
                EngineError::FatalParse(format!("{}:{line_num}: {err}", self.path.display()))
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let event: ScanEvent = serde_json::from_str(&line).map_err(|err| {
                EngineError::FatalParse(format!("{}:{line_num}: {err}", self.path.display()))
            })?;
            outcome.events += 1;
            if visitor(&event)? == ScanControl::Stop {
                outcome.stopped = true;
                break;
            }
        }
        Ok(outcome)
    }
}

/// Read the first `Lexicon` element and stop the scan there.
///
/// # Errors
///
/// Propagates scan failures.
pub fn peek_lexicon(source: &mut dyn ImportSource) -> Result<Option<Element>> {
    let mut found = None;
    source.scan(&mut |event| {
        if let ScanEvent::Start(element) = event
            && element.tag == tags::LEXICON
        {
            found = Some(element.clone());
            return Ok(ScanControl::Stop);
        }
        Ok(ScanControl::Continue)
    })?;
    Ok(found)
}
