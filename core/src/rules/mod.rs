//! Rule DSL: tokenizer, parser and the rule model it produces.

pub mod ast;
pub mod lexer;
pub mod parser;

pub use ast::{AssignOp, BinaryOp, Builtin, Expr, Rule, Statement, UnaryOp};
pub use parser::{parse_expression, parse_rules};
