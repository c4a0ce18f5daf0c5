//! Operation classification: what kind of mutation a fact represents.
//!
//! Classification is a seam: the gate only sees an [`OperationClassifier`], so
//! the default prefix heuristic can be replaced by a declarative registry
//! without touching gate logic.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The kind of knowledge-base mutation a fact requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    Add,
    Delete,
    Override,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "ADD",
            Self::Delete => "DELETE",
            Self::Override => "OVERRIDE",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decides the [`OperationKind`] of a parsed predicate.
pub trait OperationClassifier: Send + Sync {
    fn classify(&self, predicate: &str) -> OperationKind;
}

/// Classifies by predicate prefix: `Delete*` → Delete, `Override*` → Override.
#[derive(Debug, Clone)]
pub struct PrefixClassifier {
    pub delete_prefixes: Vec<String>,
    pub override_prefixes: Vec<String>,
}

impl Default for PrefixClassifier {
    fn default() -> Self {
        Self {
            delete_prefixes: vec!["Delete".into()],
            override_prefixes: vec!["Override".into()],
        }
    }
}

impl OperationClassifier for PrefixClassifier {
    fn classify(&self, predicate: &str) -> OperationKind {
        if self
            .delete_prefixes
            .iter()
            .any(|p| predicate.starts_with(p.as_str()))
        {
            OperationKind::Delete
        } else if self
            .override_prefixes
            .iter()
            .any(|p| predicate.starts_with(p.as_str()))
        {
            OperationKind::Override
        } else {
            OperationKind::Add
        }
    }
}

/// Exact predicate → kind registry with a fallback classifier.
pub struct PredicateRegistry {
    entries: HashMap<String, OperationKind>,
    fallback: Box<dyn OperationClassifier>,
}

impl PredicateRegistry {
    pub fn new(fallback: Box<dyn OperationClassifier>) -> Self {
        Self {
            entries: HashMap::new(),
            fallback,
        }
    }

    pub fn with(mut self, predicate: impl Into<String>, kind: OperationKind) -> Self {
        self.entries.insert(predicate.into(), kind);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl OperationClassifier for PredicateRegistry {
    fn classify(&self, predicate: &str) -> OperationKind {
        self.entries
            .get(predicate)
            .copied()
            .unwrap_or_else(|| self.fallback.classify(predicate))
    }
}

impl std::fmt::Debug for PredicateRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredicateRegistry")
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}
