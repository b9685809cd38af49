//! Rule builder: parses DSL text and files the rules into a knowledge
//! library under (name, version).

use std::collections::HashSet;

use tracing::{debug, info};

use crate::error::{ParseError, Result};
use crate::knowledge::{KnowledgeBase, KnowledgeLibrary};
use crate::resource::{Resource, TextResource};
use crate::rules::{parse_rules, Rule};

pub struct RuleBuilder<'l> {
    library: &'l mut KnowledgeLibrary,
}

impl<'l> RuleBuilder<'l> {
    pub fn new(library: &'l mut KnowledgeLibrary) -> Self {
        RuleBuilder { library }
    }

    /// Parse `source` and append its rules to the base `(kb_name, kb_version)`,
    /// creating the base if needed. Returns the number of rules added.
    ///
    /// All-or-nothing: on error the library is not touched.
    pub fn build_from_source(
        &mut self,
        kb_name: &str,
        kb_version: &str,
        source: &str,
    ) -> Result<usize> {
        let rules = parse_rules(source)?;
        self.add_rules(kb_name, kb_version, source, rules)
    }

    /// Like `build_from_source`, reading the text from a resource.
    pub fn build_from_resource(
        &mut self,
        kb_name: &str,
        kb_version: &str,
        resource: &mut dyn Resource,
    ) -> Result<usize> {
        let source = resource.load()?;
        debug!(origin = %resource.origin(), bytes = source.len(), "loaded rule resource");
        self.build_from_source(kb_name, kb_version, &source)
    }

    /// Build from in-memory text; shorthand for a `TextResource`.
    pub fn build_from_text(
        &mut self,
        kb_name: &str,
        kb_version: &str,
        text: impl Into<String>,
    ) -> Result<usize> {
        self.build_from_resource(kb_name, kb_version, &mut TextResource::new(text))
    }

    fn add_rules(
        &mut self,
        kb_name: &str,
        kb_version: &str,
        source: &str,
        rules: Vec<Rule>,
    ) -> Result<usize> {
        let current = self
            .library
            .get(kb_name, kb_version)
            .unwrap_or_else(|| KnowledgeBase::new(kb_name, kb_version).into());

        let existing: HashSet<&str> = current.rules().iter().map(|r| r.name.as_str()).collect();
        if let Some(dup) = rules.iter().find(|r| existing.contains(r.name.as_str())) {
            let (line, column) = locate(source, &dup.source);
            return Err(ParseError::new(
                line,
                column,
                format!(
                    "duplicate rule name '{}' in knowledge base '{}' version '{}'",
                    dup.name, kb_name, kb_version
                ),
            )
            .into());
        }

        let added = rules.len();
        let next = current.extended(rules);
        let total = next.len();
        self.library.store(next);
        info!(kb = kb_name, version = kb_version, added, total, "rules built");
        Ok(added)
    }
}

/// 1-based position of `needle`'s first occurrence in `haystack`.
fn locate(haystack: &str, needle: &str) -> (usize, usize) {
    let offset = match haystack.find(needle) {
        Some(o) if !needle.is_empty() => o,
        _ => return (1, 1),
    };
    let before = &haystack[..offset];
    let line = before.matches('\n').count() + 1;
    let column = before
        .rsplit('\n')
        .next()
        .map_or(0, |l| l.chars().count())
        + 1;
    (line, column)
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
