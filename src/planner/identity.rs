//! Stable identifiers for sub-entities.
//!
//! Matching is positional: the element declared at index `i` inherits the id
//! previously held at index `i` unless that slot was flagged for a new id.

use uuid::Uuid;

/// Source of fresh identifiers.
pub trait IdGenerator {
    /// Returns a new, never-before-issued identifier.
    fn generate(&mut self) -> String;
}

/// Random UUID v4 identifiers.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidV4;

impl IdGenerator for UuidV4 {
    fn generate(&mut self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Deterministic identifiers (`<prefix>-1`, `<prefix>-2`, ...).
#[derive(Debug, Clone)]
pub struct SequentialIds {
    prefix: String,
    next: u64,
}

impl SequentialIds {
    /// Creates a generator issuing ids with the given prefix.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: 1,
        }
    }
}

impl IdGenerator for SequentialIds {
    fn generate(&mut self) -> String {
        let id = format!("{}-{}", self.prefix, self.next);
        self.next += 1;
        id
    }
}

/// Identifier previously held by a position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PriorId {
    /// The position held this id and it may be reused.
    Known(String),
    /// The position must receive a fresh id.
    Unknown,
}

impl PriorId {
    /// Returns the reusable id, if any. Empty ids are never reused.
    #[must_use]
    pub fn reusable(&self) -> Option<&str> {
        match self {
            Self::Known(id) if !id.is_empty() => Some(id),
            _ => None,
        }
    }
}

/// Pairs each declared value with an id.
///
/// For index `i`, reuses `prior[i]` when it is a known, non-empty id and
/// mints a fresh one otherwise. Declared values beyond the end of `prior`
/// always get fresh ids.
pub fn reconcile_identities<T: Clone>(
    declared: &[T],
    prior: &[PriorId],
    ids: &mut dyn IdGenerator,
) -> Vec<(String, T)> {
    declared
        .iter()
        .enumerate()
        .map(|(i, value)| {
            let id = prior
                .get(i)
                .and_then(PriorId::reusable)
                .map_or_else(|| ids.generate(), str::to_string);
            (id, value.clone())
        })
        .collect()
}
