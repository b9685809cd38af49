//! Salience-ordered forward-chaining rule engine.
//!
//! Rules are written in a small DSL, parsed by the `RuleBuilder` into a
//! `KnowledgeBase` held by a `KnowledgeLibrary`, and run by the `Engine`
//! against named facts registered in a `DataContext`.
//!
//! ```ignore
//! let mut library = KnowledgeLibrary::new();
//! RuleBuilder::new(&mut library).build_from_text("Shop", "1.0.0", rules)?;
//! let mut instance = library.new_instance("Shop", "1.0.0")?;
//!
//! let mut ctx = DataContext::new();
//! ctx.add("User", &mut user)?;
//! Engine::new().execute(&mut ctx, &mut instance)?;
//! ```

pub mod builder;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod fact;
pub mod knowledge;
pub mod resource;
pub mod rules;
pub mod value;

pub use builder::RuleBuilder;
pub use config::{CycleLimitPolicy, EngineConfig};
pub use context::DataContext;
pub use engine::{Engine, ExecutionReport};
pub use error::{ExecutionError, FactError, ParseError, Result, RuleError};
pub use fact::Fact;
pub use knowledge::{KnowledgeBase, KnowledgeBaseInstance, KnowledgeLibrary, RetractionSet, RuleEntry};
pub use resource::{DirectoryBundle, FileResource, ReaderResource, Resource, TextResource};
pub use rules::{parse_expression, parse_rules, Rule};
