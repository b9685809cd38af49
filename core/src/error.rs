// ---------------------------------------------------------------------------
// Parse errors
// ---------------------------------------------------------------------------

/// A syntax or build-time error in rule source text.
///
/// `line` and `column` are 1-based and point at the offending token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("parse error at line {line}, col {column}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(line: usize, column: usize, message: impl Into<String>) -> Self {
        ParseError {
            line,
            column,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Execution errors
// ---------------------------------------------------------------------------

/// Faults raised while the engine is running a knowledge base.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecutionError {
    #[error("cycle limit of {limit} exceeded (last fired rule: '{last_rule}')")]
    CycleLimit { limit: u64, last_rule: String },

    #[error("rule '{rule}': {message}")]
    Action { rule: String, message: String },

    #[error("rule '{rule}' retracts unknown rule '{target}'")]
    UnknownRule { rule: String, target: String },
}

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Rule name collisions are reported as `Parse` errors with a position.
    #[error("duplicate fact name '{name}'")]
    DuplicateName { name: String },

    #[error("unresolved reference: {0}")]
    UnresolvedReference(String),

    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("knowledge base '{name}' version '{version}' not found")]
    KnowledgeBaseNotFound { name: String, version: String },

    #[error("cannot load resource {origin}: {source}")]
    Resource {
        origin: String,
        #[source]
        source: std::io::Error,
    },

    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T, E = RuleError> = std::result::Result<T, E>;

// ---------------------------------------------------------------------------
// Fact errors
// ---------------------------------------------------------------------------

/// Error returned by `Fact` implementations.
///
/// The `Unknown*` variants become `RuleError::UnresolvedReference`; anything
/// else is reported as an action fault of the rule that triggered it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FactError {
    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("unknown method '{0}'")]
    UnknownMethod(String),

    #[error("method '{method}' expects {expected} argument(s), got {got}")]
    Arity {
        method: String,
        expected: usize,
        got: usize,
    },

    #[error("field '{field}' cannot hold {found}")]
    TypeMismatch { field: String, found: String },

    #[error("{0}")]
    Failed(String),
}

impl FactError {
    pub fn is_unresolved(&self) -> bool {
        matches!(self, FactError::UnknownField(_) | FactError::UnknownMethod(_))
    }
}
