//! Knowledge bases, the library that holds them, and per-run instances.
//!
//! A `KnowledgeBase` is immutable once built and shared behind `Arc`.
//! Rebuilding a (name, version) pair produces a fresh base that replaces the
//! old one in the library; instances created earlier keep the base they
//! were created from.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RuleError};
use crate::rules::Rule;


// ---------------------------------------------------------------------------
// KnowledgeBase
// ---------------------------------------------------------------------------

/// A named, versioned, ordered set of rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBase {
    pub name: String,
    pub version: String,
    rules: Vec<Rule>,
}

/// The identifying triple of a rule, as listed by `KnowledgeBase::entries`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuleEntry {
    pub name: String,
    pub description: String,
    pub salience: i64,
}

impl KnowledgeBase {
    pub fn new(name: &str, version: &str) -> Self {
        KnowledgeBase {
            name: name.to_string(),
            version: version.to_string(),
            rules: Vec::new(),
        }
    }

    /// Rules in declaration order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.name == name)
    }

    /// Declaration index of a rule.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.rules.iter().position(|r| r.name == name)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// (name, description, salience) for every rule, in declaration order.
    pub fn entries(&self) -> Vec<RuleEntry> {
        self.rules
            .iter()
            .map(|r| RuleEntry {
                name: r.name.clone(),
                description: r.description.clone(),
                salience: r.salience,
            })
            .collect()
    }

    /// Re-serialize every rule to DSL text.
    pub fn to_grl(&self) -> String {
        self.rules
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// A copy of this base with `rules` appended. The caller has already
    /// checked that no name collides.
    pub(crate) fn extended(&self, rules: Vec<Rule>) -> KnowledgeBase {
        let mut next = self.clone();
        next.rules.extend(rules);
        next
    }
}


// ---------------------------------------------------------------------------
// KnowledgeLibrary
// ---------------------------------------------------------------------------

/// Registry of knowledge bases keyed by (name, version).
///
/// There is no process-wide library; create one and pass it to the
/// `RuleBuilder` and to whoever creates instances.
#[derive(Debug, Default, Clone)]
pub struct KnowledgeLibrary {
    bases: BTreeMap<(String, String), Arc<KnowledgeBase>>,
}

impl KnowledgeLibrary {
    pub fn new() -> Self {
        KnowledgeLibrary {
            bases: BTreeMap::new(),
        }
    }

    pub fn get(&self, name: &str, version: &str) -> Option<Arc<KnowledgeBase>> {
        self.bases
            .get(&(name.to_string(), version.to_string()))
            .cloned()
    }

    /// Create a fresh instance (empty retraction set) over a stored base.
    pub fn new_instance(&self, name: &str, version: &str) -> Result<KnowledgeBaseInstance> {
        self.get(name, version)
            .map(KnowledgeBaseInstance::new)
            .ok_or_else(|| RuleError::KnowledgeBaseNotFound {
                name: name.to_string(),
                version: version.to_string(),
            })
    }

    /// All stored (name, version) pairs, sorted.
    pub fn bases(&self) -> Vec<(&str, &str)> {
        self.bases
            .keys()
            .map(|(n, v)| (n.as_str(), v.as_str()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.bases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }

    /// Store `base`, replacing any previous base with the same key.
    pub(crate) fn store(&mut self, base: KnowledgeBase) -> Arc<KnowledgeBase> {
        let key = (base.name.clone(), base.version.clone());
        let base = Arc::new(base);
        self.bases.insert(key, Arc::clone(&base));
        base
    }
}


// ---------------------------------------------------------------------------
// Retraction set + instance
// ---------------------------------------------------------------------------

/// Rules marked inactive for the rest of an instance's life, indexed by
/// declaration position.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RetractionSet {
    retracted: Vec<bool>,
}

impl RetractionSet {
    pub fn new(rule_count: usize) -> Self {
        RetractionSet {
            retracted: vec![false; rule_count],
        }
    }

    /// Mark a rule retracted. Returns `false` if it already was.
    pub fn retract(&mut self, index: usize) -> bool {
        match self.retracted.get_mut(index) {
            Some(flag) if !*flag => {
                *flag = true;
                true
            }
            _ => false,
        }
    }

    pub fn is_retracted(&self, index: usize) -> bool {
        self.retracted.get(index).copied().unwrap_or(false)
    }

    pub fn count(&self) -> usize {
        self.retracted.iter().filter(|r| **r).count()
    }

    pub fn clear(&mut self) {
        self.retracted.iter_mut().for_each(|r| *r = false);
    }
}

/// A per-run activation view over a shared knowledge base.
#[derive(Debug, Clone)]
pub struct KnowledgeBaseInstance {
    base: Arc<KnowledgeBase>,
    retractions: RetractionSet,
}

impl KnowledgeBaseInstance {
    pub fn new(base: Arc<KnowledgeBase>) -> Self {
        let retractions = RetractionSet::new(base.len());
        KnowledgeBaseInstance { base, retractions }
    }

    pub fn base(&self) -> &Arc<KnowledgeBase> {
        &self.base
    }

    pub fn retractions(&self) -> &RetractionSet {
        &self.retractions
    }

    pub(crate) fn retractions_mut(&mut self) -> &mut RetractionSet {
        &mut self.retractions
    }

    pub fn is_retracted(&self, rule_name: &str) -> bool {
        self.base
            .index_of(rule_name)
            .map_or(false, |i| self.retractions.is_retracted(i))
    }

    /// Names of retracted rules in declaration order.
    pub fn retracted_names(&self) -> Vec<&str> {
        self.base
            .rules()
            .iter()
            .enumerate()
            .filter(|(i, _)| self.retractions.is_retracted(*i))
            .map(|(_, r)| r.name.as_str())
            .collect()
    }

    /// Reactivate every rule.
    pub fn reset(&mut self) {
        self.retractions.clear();
    }
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
