//! Execution engine.
//!
//! Each cycle evaluates the condition of every rule that is not retracted in
//! the instance, picks the true rule with the highest salience (ties go to
//! the rule declared first), and runs its statements. Cycles repeat until no
//! condition holds, a rule calls `Complete()`, or the cycle guard trips.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{CycleLimitPolicy, EngineConfig};
use crate::context::DataContext;
use crate::error::{ExecutionError, FactError, Result, RuleError};
use crate::knowledge::{KnowledgeBase, KnowledgeBaseInstance};
use crate::rules::{AssignOp, BinaryOp, Builtin, Expr, Rule, Statement, UnaryOp};
use crate::value;


// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Outcome of one `execute` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Number of cycles that fired a rule.
    pub cycles: u64,
    /// Names of fired rules, in firing order.
    pub fired: Vec<String>,
    /// A rule called `Complete()`.
    pub completed: bool,
    /// The cycle guard tripped under `CycleLimitPolicy::Warn`.
    pub limit_reached: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Engine {
    config: EngineConfig,
}

/// What running a rule's statements asks the cycle loop to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Complete,
}


// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

impl Engine {
    pub fn new() -> Self {
        Engine::default()
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Engine { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run `instance` against the facts in `ctx` until fixpoint.
    ///
    /// Retractions recorded here stay in the instance for later calls.
    pub fn execute(
        &self,
        ctx: &mut DataContext<'_>,
        instance: &mut KnowledgeBaseInstance,
    ) -> Result<ExecutionReport> {
        let base = Arc::clone(instance.base());
        let mut report = ExecutionReport::default();

        while let Some(index) = select(&base, ctx, instance)? {
            let rule = &base.rules()[index];

            if report.cycles >= self.config.max_cycles {
                match self.config.cycle_limit {
                    CycleLimitPolicy::Fail => {
                        return Err(ExecutionError::CycleLimit {
                            limit: self.config.max_cycles,
                            last_rule: rule.name.clone(),
                        }
                        .into())
                    }
                    CycleLimitPolicy::Warn => {
                        warn!(
                            kb = %base.name,
                            limit = self.config.max_cycles,
                            rule = %rule.name,
                            "cycle limit reached, stopping execution"
                        );
                        report.limit_reached = true;
                        break;
                    }
                }
            }

            report.cycles += 1;
            debug!(cycle = report.cycles, rule = %rule.name, salience = rule.salience, "firing rule");
            report.fired.push(rule.name.clone());

            if run_actions(rule, &base, ctx, instance)? == Flow::Complete {
                report.completed = true;
                break;
            }
        }

        info!(
            kb = %base.name,
            version = %base.version,
            cycles = report.cycles,
            completed = report.completed,
            "execution finished"
        );
        Ok(report)
    }

    /// Rules whose condition currently holds, highest salience first
    /// (declaration order among equals). Evaluates conditions only; no
    /// action runs.
    pub fn matching_rules<'k>(
        &self,
        ctx: &mut DataContext<'_>,
        instance: &'k KnowledgeBaseInstance,
    ) -> Result<Vec<&'k Rule>> {
        let base = instance.base();
        let mut matched = Vec::new();
        for (index, rule) in base.rules().iter().enumerate() {
            if instance.retractions().is_retracted(index) {
                continue;
            }
            if condition_holds(rule, ctx)? {
                matched.push(rule);
            }
        }
        // Stable sort keeps declaration order among equal saliences.
        matched.sort_by(|a, b| b.salience.cmp(&a.salience));
        Ok(matched)
    }
}


// ---------------------------------------------------------------------------
// Conflict resolution
// ---------------------------------------------------------------------------

/// Index of the rule to fire this cycle, if any.
fn select(
    base: &KnowledgeBase,
    ctx: &mut DataContext<'_>,
    instance: &KnowledgeBaseInstance,
) -> Result<Option<usize>> {
    let mut best: Option<(usize, i64)> = None;
    for (index, rule) in base.rules().iter().enumerate() {
        if instance.retractions().is_retracted(index) {
            continue;
        }
        if !condition_holds(rule, ctx)? {
            continue;
        }
        match best {
            Some((_, salience)) if salience >= rule.salience => {}
            _ => best = Some((index, rule.salience)),
        }
    }
    Ok(best.map(|(index, _)| index))
}

fn condition_holds(rule: &Rule, ctx: &mut DataContext<'_>) -> Result<bool> {
    match eval(&rule.when, ctx, &rule.name)? {
        Value::Bool(b) => Ok(b),
        other => Err(action_error(
            &rule.name,
            format!("condition evaluated to {}, not bool", value::type_name(&other)),
        )),
    }
}


// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

fn run_actions(
    rule: &Rule,
    base: &KnowledgeBase,
    ctx: &mut DataContext<'_>,
    instance: &mut KnowledgeBaseInstance,
) -> Result<Flow> {
    let mut flow = Flow::Continue;
    for stmt in &rule.then {
        match stmt {
            Statement::Assign {
                fact,
                field,
                op,
                value: expr,
            } => {
                let rhs = eval(expr, ctx, &rule.name)?;
                let new_value = match op {
                    AssignOp::Set => rhs,
                    compound => {
                        let current = ctx.get_field(fact, field)?;
                        let combined = match compound {
                            AssignOp::Add => value::add(&current, &rhs),
                            AssignOp::Sub => value::sub(&current, &rhs),
                            AssignOp::Mul => value::mul(&current, &rhs),
                            AssignOp::Div => value::div(&current, &rhs),
                            AssignOp::Set => Ok(rhs),
                        };
                        combined.map_err(|m| action_error(&rule.name, m))?
                    }
                };
                ctx.set_field(fact, field, new_value)?
                    .map_err(|e| fact_fault(&rule.name, fact, field, e))?;
            }
            Statement::Call(expr) => {
                eval(expr, ctx, &rule.name)?;
            }
            Statement::Retract(target) => {
                let index = base.index_of(target).ok_or_else(|| ExecutionError::UnknownRule {
                    rule: rule.name.clone(),
                    target: target.clone(),
                })?;
                if instance.retractions_mut().retract(index) {
                    debug!(rule = %rule.name, retracted = %target, "rule retracted");
                }
            }
            Statement::Complete => flow = Flow::Complete,
        }
    }
    Ok(flow)
}


// ---------------------------------------------------------------------------
// Expression evaluation
// ---------------------------------------------------------------------------

fn eval(expr: &Expr, ctx: &mut DataContext<'_>, rule: &str) -> Result<Value> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Field { fact, field } => ctx.get_field(fact, field),
        Expr::MethodCall { fact, method, args } => {
            let args = eval_args(args, ctx, rule)?;
            ctx.invoke(fact, method, &args)?
                .map_err(|e| fact_fault(rule, fact, method, e))
        }
        Expr::Builtin { func, args } => {
            let args = eval_args(args, ctx, rule)?;
            let arg = args.first().unwrap_or(&Value::Null);
            match func {
                Builtin::Len => value::len(arg).map_err(|m| action_error(rule, m)),
                Builtin::IsZero => Ok(Value::Bool(value::is_zero(arg))),
            }
        }
        Expr::Unary { op, expr } => {
            let v = eval(expr, ctx, rule)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!expect_bool(&v, "!", rule)?)),
                UnaryOp::Neg => value::negate(&v).map_err(|m| action_error(rule, m)),
            }
        }
        Expr::Binary { op, lhs, rhs } => eval_binary(*op, lhs, rhs, ctx, rule),
    }
}

fn eval_args(args: &[Expr], ctx: &mut DataContext<'_>, rule: &str) -> Result<Vec<Value>> {
    args.iter().map(|a| eval(a, ctx, rule)).collect()
}

fn eval_binary(
    op: BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
    ctx: &mut DataContext<'_>,
    rule: &str,
) -> Result<Value> {
    let l = eval(lhs, ctx, rule)?;
    let apply: fn(&Value, &Value) -> std::result::Result<Value, String> = match op {
        BinaryOp::And | BinaryOp::Or => return eval_logical(op, &l, rhs, ctx, rule),
        BinaryOp::Eq => |a, b| Ok(Value::Bool(value::equals(a, b))),
        BinaryOp::NotEq => |a, b| Ok(Value::Bool(!value::equals(a, b))),
        BinaryOp::Lt => |a, b| ordered(a, b, BinaryOp::Lt, Ordering::is_lt),
        BinaryOp::LtEq => |a, b| ordered(a, b, BinaryOp::LtEq, Ordering::is_le),
        BinaryOp::Gt => |a, b| ordered(a, b, BinaryOp::Gt, Ordering::is_gt),
        BinaryOp::GtEq => |a, b| ordered(a, b, BinaryOp::GtEq, Ordering::is_ge),
        BinaryOp::Add => value::add,
        BinaryOp::Sub => value::sub,
        BinaryOp::Mul => value::mul,
        BinaryOp::Div => value::div,
        BinaryOp::Rem => value::rem,
    };
    let r = eval(rhs, ctx, rule)?;
    apply(&l, &r).map_err(|m| action_error(rule, m))
}

/// `&&` and `||`. The right side is not evaluated once the left side
/// decides the result.
fn eval_logical(
    op: BinaryOp,
    l: &Value,
    rhs: &Expr,
    ctx: &mut DataContext<'_>,
    rule: &str,
) -> Result<Value> {
    let l = expect_bool(l, op.symbol(), rule)?;
    if l == (op == BinaryOp::Or) {
        return Ok(Value::Bool(l));
    }
    let r = expect_bool(&eval(rhs, ctx, rule)?, op.symbol(), rule)?;
    Ok(Value::Bool(r))
}

fn ordered(
    a: &Value,
    b: &Value,
    op: BinaryOp,
    test: fn(Ordering) -> bool,
) -> std::result::Result<Value, String> {
    value::compare(a, b).map(|ord| Value::Bool(test(ord))).ok_or_else(|| {
        format!(
            "cannot compare {} with {} using '{}'",
            value::type_name(a),
            value::type_name(b),
            op.symbol()
        )
    })
}

fn expect_bool(v: &Value, op: &str, rule: &str) -> Result<bool> {
    v.as_bool().ok_or_else(|| {
        action_error(
            rule,
            format!("operator '{}' needs bool, got {}", op, value::type_name(v)),
        )
    })
}


// ---------------------------------------------------------------------------
// Error helpers
// ---------------------------------------------------------------------------

fn action_error(rule: &str, message: impl Into<String>) -> RuleError {
    ExecutionError::Action {
        rule: rule.to_string(),
        message: message.into(),
    }
    .into()
}

fn fact_fault(rule: &str, fact: &str, member: &str, err: FactError) -> RuleError {
    if err.is_unresolved() {
        RuleError::UnresolvedReference(format!("{}.{}: {}", fact, member, err))
    } else {
        action_error(rule, format!("{}.{}: {}", fact, member, err))
    }
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::RuleBuilder;
    use crate::fact::{expect_args, Fact};
    use crate::knowledge::KnowledgeLibrary;
    use serde_json::{json, Map};

    fn instance(src: &str) -> KnowledgeBaseInstance {
        let mut lib = KnowledgeLibrary::new();
        RuleBuilder::new(&mut lib)
            .build_from_source("Test", "0.1.0", src)
            .unwrap();
        lib.new_instance("Test", "0.1.0").unwrap()
    }

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    /// Counts how often `Bump` is invoked.
    struct Counter {
        hits: i64,
    }

    impl Fact for Counter {
        fn get_field(&self, name: &str) -> Option<Value> {
            match name {
                "Hits" => Some(json!(self.hits)),
                _ => None,
            }
        }

        fn set_field(&mut self, name: &str, value: Value) -> std::result::Result<(), FactError> {
            match name {
                "Hits" => {
                    self.hits = crate::fact::int_field(name, value)?;
                    Ok(())
                }
                _ => Err(FactError::UnknownField(name.into())),
            }
        }

        fn invoke(&mut self, name: &str, args: &[Value]) -> std::result::Result<Value, FactError> {
            match name {
                "Bump" => {
                    expect_args(name, args, 0)?;
                    self.hits += 1;
                    Ok(Value::Null)
                }
                "Fail" => Err(FactError::Failed("refused".into())),
                _ => Err(FactError::UnknownMethod(name.into())),
            }
        }
    }

    // --- salience ---

    #[test]
    fn higher_salience_fires_first() {
        let mut inst = instance(
            r#"
            rule Low "" salience 5 { when T.Log == "" then T.Log = T.Log + "low"; Retract("Low"); }
            rule High "" salience 10 { when true then T.Log = T.Log + "high"; Retract("High"); }
            "#,
        );
        let mut t = obj(json!({"Log": ""}));
        let mut ctx = DataContext::new();
        ctx.add("T", &mut t).unwrap();
        let report = Engine::new().execute(&mut ctx, &mut inst).unwrap();
        assert_eq!(report.fired, vec!["High"]);
        drop(ctx);
        // High ran first, so Low's condition was already false.
        assert_eq!(t["Log"], json!("high"));
    }

    #[test]
    fn equal_salience_uses_declaration_order() {
        let mut inst = instance(
            r#"
            rule First { when true then T.Seq = T.Seq + "1"; Retract("First"); }
            rule Second { when true then T.Seq = T.Seq + "2"; Retract("Second"); }
            "#,
        );
        let mut t = obj(json!({"Seq": ""}));
        let mut ctx = DataContext::new();
        ctx.add("T", &mut t).unwrap();
        Engine::new().execute(&mut ctx, &mut inst).unwrap();
        drop(ctx);
        assert_eq!(t["Seq"], json!("12"));
    }

    // --- retraction ---

    #[test]
    fn retracted_rule_never_fires_again() {
        let mut inst = instance(
            r#"rule Once { when C.Hits >= 0 then C.Bump(); Retract("Once"); }"#,
        );
        let mut c = Counter { hits: 0 };
        {
            let mut ctx = DataContext::new();
            ctx.add("C", &mut c).unwrap();
            let engine = Engine::new();
            engine.execute(&mut ctx, &mut inst).unwrap();
            let second = engine.execute(&mut ctx, &mut inst).unwrap();
            assert_eq!(second.cycles, 0);
        }
        assert_eq!(c.hits, 1);
        assert!(inst.is_retracted("Once"));
    }

    #[test]
    fn retracting_unknown_rule_fails() {
        let mut inst = instance(r#"rule R { when true then Retract("Ghost"); }"#);
        let mut ctx = DataContext::new();
        let err = Engine::new().execute(&mut ctx, &mut inst).unwrap_err();
        assert!(matches!(
            err,
            RuleError::Execution(ExecutionError::UnknownRule { .. })
        ));
    }

    // --- fixpoint / cycle guard ---

    #[test]
    fn runs_until_no_rule_holds() {
        let mut inst = instance(r#"rule Count { when C.Hits < 5 then C.Hits += 1; }"#);
        let mut c = Counter { hits: 0 };
        let report = {
            let mut ctx = DataContext::new();
            ctx.add("C", &mut c).unwrap();
            Engine::new().execute(&mut ctx, &mut inst).unwrap()
        };
        assert_eq!(c.hits, 5);
        assert_eq!(report.cycles, 5);
    }

    #[test]
    fn self_triggering_rule_hits_cycle_limit() {
        let mut inst = instance(r#"rule Loop { when true then C.Bump(); }"#);
        let mut c = Counter { hits: 0 };
        let engine = Engine::with_config(EngineConfig {
            max_cycles: 10,
            cycle_limit: CycleLimitPolicy::Fail,
        });
        let err = {
            let mut ctx = DataContext::new();
            ctx.add("C", &mut c).unwrap();
            engine.execute(&mut ctx, &mut inst).unwrap_err()
        };
        match err {
            RuleError::Execution(ExecutionError::CycleLimit { limit, last_rule }) => {
                assert_eq!(limit, 10);
                assert_eq!(last_rule, "Loop");
            }
            other => panic!("expected cycle limit, got {:?}", other),
        }
        assert_eq!(c.hits, 10);
    }

    #[test]
    fn warn_policy_stops_without_error() {
        let mut inst = instance(r#"rule Loop { when true then C.Bump(); }"#);
        let mut c = Counter { hits: 0 };
        let engine = Engine::with_config(EngineConfig {
            max_cycles: 3,
            cycle_limit: CycleLimitPolicy::Warn,
        });
        let mut ctx = DataContext::new();
        ctx.add("C", &mut c).unwrap();
        let report = engine.execute(&mut ctx, &mut inst).unwrap();
        assert!(report.limit_reached);
        assert_eq!(report.cycles, 3);
    }

    #[test]
    fn complete_stops_execution() {
        let mut inst = instance(
            r#"
            rule Stop salience 10 { when true then C.Bump(); Complete(); }
            rule Never { when true then C.Hits = 100; }
            "#,
        );
        let mut c = Counter { hits: 0 };
        let report = {
            let mut ctx = DataContext::new();
            ctx.add("C", &mut c).unwrap();
            Engine::new().execute(&mut ctx, &mut inst).unwrap()
        };
        assert!(report.completed);
        assert_eq!(report.fired, vec!["Stop"]);
        assert_eq!(c.hits, 1);
    }

    // --- errors ---

    #[test]
    fn unknown_fact_in_condition_is_unresolved() {
        let mut inst = instance(r#"rule R { when Missing.X == 1 then Complete(); }"#);
        let mut ctx = DataContext::new();
        let err = Engine::new().execute(&mut ctx, &mut inst).unwrap_err();
        assert!(matches!(err, RuleError::UnresolvedReference(_)));
    }

    #[test]
    fn unknown_method_is_unresolved() {
        let mut inst = instance(r#"rule R { when true then C.Explode(); Complete(); }"#);
        let mut c = Counter { hits: 0 };
        let mut ctx = DataContext::new();
        ctx.add("C", &mut c).unwrap();
        let err = Engine::new().execute(&mut ctx, &mut inst).unwrap_err();
        assert!(matches!(err, RuleError::UnresolvedReference(m) if m.contains("C.Explode")));
    }

    #[test]
    fn method_fault_is_wrapped_as_execution_error() {
        let mut inst = instance(r#"rule R { when true then C.Fail(); Complete(); }"#);
        let mut c = Counter { hits: 0 };
        let mut ctx = DataContext::new();
        ctx.add("C", &mut c).unwrap();
        let err = Engine::new().execute(&mut ctx, &mut inst).unwrap_err();
        match err {
            RuleError::Execution(ExecutionError::Action { rule, message }) => {
                assert_eq!(rule, "R");
                assert!(message.contains("refused"));
            }
            other => panic!("expected action fault, got {:?}", other),
        }
    }

    #[test]
    fn non_bool_condition_is_an_error() {
        let mut inst = instance(r#"rule R { when 1 + 1 then Complete(); }"#);
        let mut ctx = DataContext::new();
        assert!(Engine::new().execute(&mut ctx, &mut inst).is_err());
    }

    #[test]
    fn type_mismatch_on_assignment() {
        let mut inst = instance(r#"rule R { when true then C.Hits = "many"; Complete(); }"#);
        let mut c = Counter { hits: 0 };
        let mut ctx = DataContext::new();
        ctx.add("C", &mut c).unwrap();
        let err = Engine::new().execute(&mut ctx, &mut inst).unwrap_err();
        assert!(matches!(err, RuleError::Execution(ExecutionError::Action { .. })));
    }

    // --- evaluation ---

    #[test]
    fn and_short_circuits_before_unknown_fields() {
        let mut inst = instance(
            r#"rule R { when T.Ready && T.Missing == 1 then Complete(); }"#,
        );
        let mut t = obj(json!({"Ready": false}));
        let mut ctx = DataContext::new();
        ctx.add("T", &mut t).unwrap();
        let report = Engine::new().execute(&mut ctx, &mut inst).unwrap();
        assert_eq!(report.cycles, 0);
    }

    #[test]
    fn or_short_circuits_and_operands_must_be_bool() {
        let mut inst = instance(r#"rule R { when T.Ready || T.Missing == 1 then Complete(); }"#);
        let mut t = obj(json!({"Ready": true}));
        let mut ctx = DataContext::new();
        ctx.add("T", &mut t).unwrap();
        assert!(Engine::new().execute(&mut ctx, &mut inst).unwrap().completed);

        let mut inst = instance(r#"rule R { when 1 && true then Complete(); }"#);
        let err = Engine::new().execute(&mut ctx, &mut inst).unwrap_err();
        assert!(matches!(err, RuleError::Execution(ExecutionError::Action { .. })));
    }

    #[test]
    fn comparisons_across_numeric_types() {
        let mut inst = instance(
            r#"rule R { when T.I < 2.5 && T.F >= 2 && T.S > "a" && T.I == T.F then Complete(); }"#,
        );
        let mut t = obj(json!({"I": 2, "F": 2.0, "S": "b"}));
        let mut ctx = DataContext::new();
        ctx.add("T", &mut t).unwrap();
        assert!(Engine::new().execute(&mut ctx, &mut inst).unwrap().completed);
    }

    #[test]
    fn builtins_and_arithmetic() {
        let mut inst = instance(
            r##"rule R {
                when Len(T.Name) == 5 && !IsZero(T.Score) && T.Score % 2 == 1
                then T.Double = T.Score * 2.0; T.Label = T.Name + "#" + T.Score; Complete();
            }"##,
        );
        let mut t = obj(json!({"Name": "Alice", "Score": 7}));
        {
            let mut ctx = DataContext::new();
            ctx.add("T", &mut t).unwrap();
            Engine::new().execute(&mut ctx, &mut inst).unwrap();
        }
        assert_eq!(t["Double"], json!(14.0));
        assert_eq!(t["Label"], json!("Alice#7"));
    }

    #[test]
    fn matching_rules_are_sorted_and_side_effect_free() {
        let inst = instance(
            r#"
            rule A salience 1 { when T.N > 0 then T.N = 0; }
            rule B salience 3 { when T.N > 0 then T.N = 0; }
            rule C salience 2 { when T.N < 0 then T.N = 0; }
            "#,
        );
        let mut t = obj(json!({"N": 4}));
        let mut ctx = DataContext::new();
        ctx.add("T", &mut t).unwrap();
        let names: Vec<String> = Engine::new()
            .matching_rules(&mut ctx, &inst)
            .unwrap()
            .into_iter()
            .map(|r| r.name.clone())
            .collect();
        assert_eq!(names, vec!["B", "A"]);
        assert_eq!(ctx.get_field("T", "N").unwrap(), json!(4));
    }
}
