//! Fact context: the named facts a single execution session works on.
//!
//! The context borrows each fact mutably for its own lifetime; callers own
//! the facts and get them back when the context is dropped.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use crate::error::{FactError, Result, RuleError};
use crate::fact::Fact;

/// Mapping from symbolic names to live facts.
#[derive(Default)]
pub struct DataContext<'a> {
    facts: HashMap<String, &'a mut dyn Fact>,
}

impl<'a> DataContext<'a> {
    /// Create an empty context.
    pub fn new() -> Self {
        DataContext {
            facts: HashMap::new(),
        }
    }

    /// Bind `fact` under `name`. Fails if the name is already bound.
    pub fn add(&mut self, name: &str, fact: &'a mut dyn Fact) -> Result<()> {
        if self.facts.contains_key(name) {
            return Err(RuleError::DuplicateName {
                name: name.to_string(),
            });
        }
        self.facts.insert(name.to_string(), fact);
        Ok(())
    }

    /// Unbind a fact, handing the borrow back.
    pub fn remove(&mut self, name: &str) -> Option<&'a mut dyn Fact> {
        self.facts.remove(name)
    }

    pub fn fact(&self, name: &str) -> Option<&dyn Fact> {
        self.facts.get(name).map(|f| &**f)
    }

    pub fn fact_mut(&mut self, name: &str) -> Option<&mut dyn Fact> {
        match self.facts.get_mut(name) {
            Some(f) => Some(&mut **f),
            None => None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.facts.contains_key(name)
    }

    /// Bound names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.facts.keys().map(|s| s.as_str()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    // -------------------------------------------------------------------
    // Resolution used by the evaluator
    // -------------------------------------------------------------------

    /// Read `fact.field`.
    pub fn get_field(&self, fact: &str, field: &str) -> Result<Value> {
        let f = self.resolve(fact)?;
        f.get_field(field)
            .ok_or_else(|| RuleError::UnresolvedReference(format!("{}.{}", fact, field)))
    }

    /// Write `fact.field`. Fact-level faults come back unconverted so the
    /// engine can attribute them to the firing rule.
    pub fn set_field(
        &mut self,
        fact: &str,
        field: &str,
        value: Value,
    ) -> Result<std::result::Result<(), FactError>> {
        let f = self.resolve_mut(fact)?;
        Ok(f.set_field(field, value))
    }

    /// Invoke `fact.method(args)`.
    pub fn invoke(
        &mut self,
        fact: &str,
        method: &str,
        args: &[Value],
    ) -> Result<std::result::Result<Value, FactError>> {
        let f = self.resolve_mut(fact)?;
        Ok(f.invoke(method, args))
    }

    fn resolve(&self, name: &str) -> Result<&dyn Fact> {
        self.fact(name)
            .ok_or_else(|| RuleError::UnresolvedReference(format!("unknown fact '{}'", name)))
    }

    fn resolve_mut(&mut self, name: &str) -> Result<&mut dyn Fact> {
        self.fact_mut(name)
            .ok_or_else(|| RuleError::UnresolvedReference(format!("unknown fact '{}'", name)))
    }
}

impl fmt::Debug for DataContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataContext")
            .field("facts", &self.names())
            .finish()
    }
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
