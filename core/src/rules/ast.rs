//! Rule model: the parsed form of a rule block.
//!
//! A rule is a boolean `when` expression plus an ordered list of `then`
//! statements. Every node prints back to rule DSL text via `Display`, so a
//! parsed rule can be re-serialized and parsed again.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;


// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
        }
    }

    /// Binding strength; higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Eq | BinaryOp::NotEq => 3,
            BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => 4,
            BinaryOp::Add | BinaryOp::Sub => 5,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    /// `!`
    Not,
    /// `-`
    Neg,
}

const UNARY_PRECEDENCE: u8 = 7;

/// Functions the engine provides without a fact receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Builtin {
    /// `Len(x)`: length of a string or array.
    Len,
    /// `IsZero(x)`: whether `x` is its type's zero value.
    IsZero,
}

impl Builtin {
    pub fn lookup(name: &str) -> Option<Builtin> {
        match name {
            "Len" => Some(Builtin::Len),
            "IsZero" => Some(Builtin::IsZero),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Len => "Len",
            Builtin::IsZero => "IsZero",
        }
    }

    pub fn arity(self) -> usize {
        1
    }
}


// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Value),
    /// `Fact.Field`
    Field { fact: String, field: String },
    /// `Fact.Method(args...)`
    MethodCall {
        fact: String,
        method: String,
        args: Vec<Expr>,
    },
    /// `Builtin(args...)`
    Builtin { func: Builtin, args: Vec<Expr> },
    Unary { op: UnaryOp, expr: Box<Expr> },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Binary { op, .. } => op.precedence(),
            Expr::Unary { .. } => UNARY_PRECEDENCE,
            _ => u8::MAX,
        }
    }

    fn fmt_with(&self, f: &mut fmt::Formatter<'_>, min_prec: u8) -> fmt::Result {
        let parens = self.precedence() < min_prec;
        if parens {
            write!(f, "(")?;
        }
        match self {
            Expr::Literal(v) => write_literal(f, v)?,
            Expr::Field { fact, field } => write!(f, "{}.{}", fact, field)?,
            Expr::MethodCall { fact, method, args } => {
                write!(f, "{}.{}(", fact, method)?;
                write_args(f, args)?;
                write!(f, ")")?;
            }
            Expr::Builtin { func, args } => {
                write!(f, "{}(", func.name())?;
                write_args(f, args)?;
                write!(f, ")")?;
            }
            Expr::Unary { op, expr } => {
                let sym = match op {
                    UnaryOp::Not => "!",
                    UnaryOp::Neg => "-",
                };
                write!(f, "{}", sym)?;
                expr.fmt_with(f, UNARY_PRECEDENCE)?;
            }
            Expr::Binary { op, lhs, rhs } => {
                // Left-associative: the right operand needs parens at equal precedence.
                lhs.fmt_with(f, op.precedence())?;
                write!(f, " {} ", op.symbol())?;
                rhs.fmt_with(f, op.precedence() + 1)?;
            }
        }
        if parens {
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_with(f, 0)
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[Expr]) -> fmt::Result {
    for (i, a) in args.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", a)?;
    }
    Ok(())
}

fn write_literal(f: &mut fmt::Formatter<'_>, v: &Value) -> fmt::Result {
    match v {
        Value::Null => write!(f, "nil"),
        Value::String(s) => write!(f, "{}", quote(s)),
        other => write!(f, "{}", other),
    }
}

/// Quote a string using the DSL's escape rules.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}


// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignOp {
    /// `=`
    Set,
    /// `+=`
    Add,
    /// `-=`
    Sub,
    /// `*=`
    Mul,
    /// `/=`
    Div,
}

impl AssignOp {
    pub fn symbol(self) -> &'static str {
        match self {
            AssignOp::Set => "=",
            AssignOp::Add => "+=",
            AssignOp::Sub => "-=",
            AssignOp::Mul => "*=",
            AssignOp::Div => "/=",
        }
    }
}

/// One action in a rule's `then` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    Assign {
        fact: String,
        field: String,
        op: AssignOp,
        value: Expr,
    },
    /// A method or builtin call evaluated for its side effects.
    Call(Expr),
    /// `Retract("RuleName")`
    Retract(String),
    /// `Complete()`: stop the execution after this rule's actions.
    Complete,
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Assign {
                fact,
                field,
                op,
                value,
            } => write!(f, "{}.{} {} {};", fact, field, op.symbol(), value),
            Statement::Call(expr) => write!(f, "{};", expr),
            Statement::Retract(name) => write!(f, "Retract({});", quote(name)),
            Statement::Complete => write!(f, "Complete();"),
        }
    }
}


// ---------------------------------------------------------------------------
// Rule
// ---------------------------------------------------------------------------

/// A parsed rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    pub description: String,
    pub salience: i64,
    pub when: Expr,
    pub then: Vec<Statement>,
    /// The rule's text exactly as it appeared in the source.
    #[serde(default)]
    pub source: String,
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "rule {} {} salience {} {{",
            self.name,
            quote(&self.description),
            self.salience
        )?;
        writeln!(f, "    when")?;
        writeln!(f, "        {}", self.when)?;
        writeln!(f, "    then")?;
        for stmt in &self.then {
            writeln!(f, "        {}", stmt)?;
        }
        write!(f, "}}")
    }
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
