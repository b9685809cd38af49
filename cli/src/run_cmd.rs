//! `salience run`: build rules, execute once, print the facts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use salience_core::{DataContext, DirectoryBundle, Engine, EngineConfig, KnowledgeLibrary, RuleBuilder};
use serde_json::{Map, Value};

use crate::build_file;

pub struct RunArgs {
    pub rules: Vec<PathBuf>,
    pub dirs: Vec<PathBuf>,
    pub facts: PathBuf,
    pub kb: String,
    pub kb_version: String,
    pub config: Option<PathBuf>,
}

pub fn run(args: RunArgs) -> Result<()> {
    if args.rules.is_empty() && args.dirs.is_empty() {
        bail!("nothing to run: pass --rules or --dir");
    }

    let config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("failed to load config '{}'", path.display()))?,
        None => EngineConfig::default(),
    };

    let mut library = KnowledgeLibrary::new();
    let mut builder = RuleBuilder::new(&mut library);
    for path in &args.rules {
        build_file(&mut builder, &args.kb, &args.kb_version, path)?;
    }
    for dir in &args.dirs {
        let files = DirectoryBundle::new(dir)
            .load()
            .with_context(|| format!("failed to scan '{}'", dir.display()))?;
        tracing::debug!(dir = %dir.display(), files = files.len(), "scanned rule directory");
        for file in files {
            build_file(&mut builder, &args.kb, &args.kb_version, file.path())?;
        }
    }

    let mut facts = load_facts(&args.facts)?;
    let mut instance = library.new_instance(&args.kb, &args.kb_version)?;
    let engine = Engine::with_config(config);

    let report = {
        let mut ctx = DataContext::new();
        for (name, fact) in facts.iter_mut() {
            ctx.add(name, fact)?;
        }
        engine.execute(&mut ctx, &mut instance)?
    };
    tracing::info!(
        cycles = report.cycles,
        fired = ?report.fired,
        limit_reached = report.limit_reached,
        "run complete"
    );

    println!("{}", serde_json::to_string_pretty(&facts)?);
    Ok(())
}

/// Facts file: a JSON object whose values are the fact objects.
fn load_facts(path: &Path) -> Result<BTreeMap<String, Map<String, Value>>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read facts file '{}'", path.display()))?;
    serde_json::from_str(&content).with_context(|| {
        format!(
            "'{}' must be a JSON object of fact name to fact object",
            path.display()
        )
    })
}
