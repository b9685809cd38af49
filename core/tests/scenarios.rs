//! End-to-end scenarios over the public API: build, instantiate, execute.

use std::sync::Arc;

use salience_core::fact::{expect_args, float_field, int_field, string_field};
use salience_core::{
    DataContext, DirectoryBundle, Engine, ExecutionError, Fact, FactError, FileResource,
    KnowledgeBaseInstance, KnowledgeLibrary, RuleBuilder, RuleError,
};
use serde_json::{json, Map, Value};


// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

const TUTORIAL: &str = r#"
rule CheckValuesForHello "Check the default values for hello" salience 10 {
    when
        MF.IntAttribute == 123 && MF.StringAttribute == "Some string value"
    then
        MF.WhatToSay = MF.GetWhatToSay("Hello Grule");
        Retract("CheckValuesForHello");
}

rule CheckValuesForBye "Check the default values for bye" salience 10 {
    when
        MF.FloatAttribute == 20.11 && MF.StringAttribute == "Some string value"
    then
        MF.WhatToSay = MF.GetWhatToSay("Bye Grule");
        Retract("CheckValuesForBye");
}
"#;

const DISCOUNT: &str = include_str!("../../demos/discount.grl");

#[derive(Debug)]
struct MyFact {
    int_attribute: i64,
    float_attribute: f64,
    string_attribute: String,
    boolean_attribute: bool,
    what_to_say: String,
    say_calls: usize,
}

impl MyFact {
    fn tutorial() -> Self {
        MyFact {
            int_attribute: 123,
            float_attribute: 1.234,
            string_attribute: "Some string value".into(),
            boolean_attribute: true,
            what_to_say: "Hello World".into(),
            say_calls: 0,
        }
    }
}

impl Fact for MyFact {
    fn get_field(&self, name: &str) -> Option<Value> {
        Some(match name {
            "IntAttribute" => json!(self.int_attribute),
            "FloatAttribute" => json!(self.float_attribute),
            "StringAttribute" => json!(self.string_attribute),
            "BooleanAttribute" => json!(self.boolean_attribute),
            "WhatToSay" => json!(self.what_to_say),
            _ => return None,
        })
    }

    fn set_field(&mut self, name: &str, value: Value) -> Result<(), FactError> {
        match name {
            "IntAttribute" => self.int_attribute = int_field(name, value)?,
            "FloatAttribute" => self.float_attribute = float_field(name, value)?,
            "StringAttribute" => self.string_attribute = string_field(name, value)?,
            "WhatToSay" => self.what_to_say = string_field(name, value)?,
            _ => return Err(FactError::UnknownField(name.into())),
        }
        Ok(())
    }

    fn invoke(&mut self, name: &str, args: &[Value]) -> Result<Value, FactError> {
        match name {
            "GetWhatToSay" => {
                expect_args(name, args, 1)?;
                let sentence = args[0]
                    .as_str()
                    .ok_or_else(|| FactError::Failed("sentence must be a string".into()))?;
                self.say_calls += 1;
                Ok(json!(format!("Let say \"{}\"", sentence)))
            }
            _ => Err(FactError::UnknownMethod(name.into())),
        }
    }
}

fn library_with(name: &str, version: &str, src: &str) -> KnowledgeLibrary {
    let mut lib = KnowledgeLibrary::new();
    RuleBuilder::new(&mut lib)
        .build_from_source(name, version, src)
        .unwrap();
    lib
}

fn user(gender: &str, membership: &str) -> Map<String, Value> {
    json!({
        "Name": "Test",
        "Gender": gender,
        "Membership": membership,
        "Discount": ""
    })
    .as_object()
    .cloned()
    .unwrap()
}


// ---------------------------------------------------------------------------
// Tutorial scenario
// ---------------------------------------------------------------------------

#[test]
fn tutorial_hello_then_bye() {
    let lib = library_with("TutorialRules", "0.0.1", TUTORIAL);
    let mut instance = lib.new_instance("TutorialRules", "0.0.1").unwrap();
    let engine = Engine::new();
    let mut mf = MyFact::tutorial();

    {
        let mut ctx = DataContext::new();
        ctx.add("MF", &mut mf).unwrap();

        let first = engine.execute(&mut ctx, &mut instance).unwrap();
        assert_eq!(first.fired, vec!["CheckValuesForHello"]);
        assert_eq!(
            ctx.get_field("MF", "WhatToSay").unwrap(),
            json!("Let say \"Hello Grule\"")
        );

        // Hello is retracted in this instance, so nothing changes.
        let second = engine.execute(&mut ctx, &mut instance).unwrap();
        assert_eq!(second.cycles, 0);

        ctx.set_field("MF", "FloatAttribute", json!(20.11))
            .unwrap()
            .unwrap();
        let third = engine.execute(&mut ctx, &mut instance).unwrap();
        assert_eq!(third.fired, vec!["CheckValuesForBye"]);
    }

    assert_eq!(mf.what_to_say, "Let say \"Bye Grule\"");
    assert_eq!(mf.say_calls, 2);
    assert_eq!(
        instance.retracted_names(),
        vec!["CheckValuesForHello", "CheckValuesForBye"]
    );
}

#[test]
fn fresh_instance_fires_again() {
    let lib = library_with("TutorialRules", "0.0.1", TUTORIAL);
    let engine = Engine::new();
    let mut mf = MyFact::tutorial();
    let mut ctx = DataContext::new();
    ctx.add("MF", &mut mf).unwrap();

    for _ in 0..2 {
        let mut instance = lib.new_instance("TutorialRules", "0.0.1").unwrap();
        let report = engine.execute(&mut ctx, &mut instance).unwrap();
        assert_eq!(report.fired, vec!["CheckValuesForHello"]);
    }
}

#[test]
fn reset_reactivates_retracted_rules() {
    let lib = library_with("TutorialRules", "0.0.1", TUTORIAL);
    let mut instance = lib.new_instance("TutorialRules", "0.0.1").unwrap();
    let engine = Engine::new();
    let mut mf = MyFact::tutorial();
    let mut ctx = DataContext::new();
    ctx.add("MF", &mut mf).unwrap();

    engine.execute(&mut ctx, &mut instance).unwrap();
    instance.reset();
    let again = engine.execute(&mut ctx, &mut instance).unwrap();
    assert_eq!(again.cycles, 1);
}

#[test]
fn entries_survive_a_text_round_trip() {
    let lib = library_with("TutorialRules", "0.0.1", TUTORIAL);
    let kb = lib.get("TutorialRules", "0.0.1").unwrap();
    let rebuilt = library_with("Copy", "1", &kb.to_grl());
    assert_eq!(rebuilt.get("Copy", "1").unwrap().entries(), kb.entries());
}


// ---------------------------------------------------------------------------
// Discount rules
// ---------------------------------------------------------------------------

#[test]
fn discount_rules_pick_one_discount() {
    let lib = library_with("Calculate Discount", "0.0.2", DISCOUNT);
    let engine = Engine::new();

    let cases = [
        ("WOMAN", "BRONZE", "20%"),
        ("MAN", "GOLD", "15%"),
        ("MAN", "SILVER", "10%"),
        ("MAN", "BRONZE", "5%"),
        ("MAN", "NONE", ""),
    ];
    for (gender, membership, expected) in cases {
        let mut u = user(gender, membership);
        let mut instance = lib.new_instance("Calculate Discount", "0.0.2").unwrap();
        {
            let mut ctx = DataContext::new();
            ctx.add("User", &mut u).unwrap();
            engine.execute(&mut ctx, &mut instance).unwrap();
        }
        assert_eq!(u["Discount"], json!(expected), "{} {}", gender, membership);
    }
}

#[test]
fn execution_is_deterministic() {
    let lib = library_with("Calculate Discount", "0.0.2", DISCOUNT);
    let engine = Engine::new();
    let run = || {
        let mut u = user("WOMAN", "GOLD");
        let mut instance = lib.new_instance("Calculate Discount", "0.0.2").unwrap();
        let report = {
            let mut ctx = DataContext::new();
            ctx.add("User", &mut u).unwrap();
            engine.execute(&mut ctx, &mut instance).unwrap()
        };
        (u, report)
    };
    assert_eq!(run(), run());
}

#[test]
fn instances_run_concurrently_over_a_shared_base() {
    let lib = library_with("Calculate Discount", "0.0.2", DISCOUNT);
    let base = lib.get("Calculate Discount", "0.0.2").unwrap();
    let engine = Engine::new();

    let discounts: Vec<Value> = std::thread::scope(|s| {
        let handles: Vec<_> = ["GOLD", "SILVER", "BRONZE"]
            .into_iter()
            .map(|membership| {
                let base = Arc::clone(&base);
                let engine = &engine;
                s.spawn(move || {
                    let mut u = user("MAN", membership);
                    let mut instance = KnowledgeBaseInstance::new(base);
                    {
                        let mut ctx = DataContext::new();
                        ctx.add("User", &mut u).unwrap();
                        engine.execute(&mut ctx, &mut instance).unwrap();
                    }
                    u["Discount"].clone()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(discounts, vec![json!("15%"), json!("10%"), json!("5%")]);
}


// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[test]
fn duplicate_fact_name_is_rejected() {
    let mut a = user("MAN", "GOLD");
    let mut b = user("WOMAN", "GOLD");
    let mut ctx = DataContext::new();
    ctx.add("User", &mut a).unwrap();
    assert!(matches!(
        ctx.add("User", &mut b),
        Err(RuleError::DuplicateName { .. })
    ));
}

#[test]
fn missing_fact_surfaces_at_execution() {
    let lib = library_with("TutorialRules", "0.0.1", TUTORIAL);
    let mut instance = lib.new_instance("TutorialRules", "0.0.1").unwrap();
    let mut ctx = DataContext::new();
    let err = Engine::new().execute(&mut ctx, &mut instance).unwrap_err();
    assert!(matches!(err, RuleError::UnresolvedReference(_)));
}

#[test]
fn runaway_rule_trips_the_cycle_guard() {
    let lib = library_with(
        "Loop",
        "1",
        r#"rule Grow "never settles" { when C.N >= 0 then C.N += 1; }"#,
    );
    let mut instance = lib.new_instance("Loop", "1").unwrap();
    let mut c = json!({"N": 0}).as_object().cloned().unwrap();
    let mut ctx = DataContext::new();
    ctx.add("C", &mut c).unwrap();
    let err = Engine::new().execute(&mut ctx, &mut instance).unwrap_err();
    assert!(matches!(
        err,
        RuleError::Execution(ExecutionError::CycleLimit { limit: 5000, .. })
    ));
    assert_eq!(ctx.get_field("C", "N").unwrap(), json!(5000));
}

#[test]
fn missing_base_is_reported() {
    let lib = KnowledgeLibrary::new();
    assert!(matches!(
        lib.new_instance("TutorialRules", "0.0.1"),
        Err(RuleError::KnowledgeBaseNotFound { .. })
    ));
}


// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

#[test]
fn directory_bundle_builds_every_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("tutorial.grl"), TUTORIAL).unwrap();
    std::fs::create_dir(dir.path().join("shop")).unwrap();
    std::fs::write(dir.path().join("shop").join("discount.grl"), DISCOUNT).unwrap();

    let mut lib = KnowledgeLibrary::new();
    let mut builder = RuleBuilder::new(&mut lib);
    let mut total = 0;
    for mut res in DirectoryBundle::new(dir.path()).load().unwrap() {
        total += builder.build_from_resource("All", "1", &mut res).unwrap();
    }
    assert_eq!(total, 6);
    assert_eq!(lib.get("All", "1").unwrap().len(), 6);
}

#[test]
fn file_resource_appends_to_existing_base() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("extra.grl");
    std::fs::write(
        &path,
        r#"rule Extra "added later" salience 1 { when false then Complete(); }"#,
    )
    .unwrap();

    let mut lib = library_with("TutorialRules", "0.0.1", TUTORIAL);
    RuleBuilder::new(&mut lib)
        .build_from_resource("TutorialRules", "0.0.1", &mut FileResource::new(&path))
        .unwrap();
    let kb = lib.get("TutorialRules", "0.0.1").unwrap();
    assert_eq!(kb.len(), 3);
    assert_eq!(kb.index_of("Extra"), Some(2));
}
