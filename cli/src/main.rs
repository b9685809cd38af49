//! salience CLI: build rule files, run them against JSON facts.
//!
//! # Usage
//!
//! ```text
//! salience check rules/discount.grl
//! salience run --rules rules/discount.grl --facts users.json
//! salience run --dir rules/ --facts users.json --config engine.yaml
//! salience fmt rules/discount.grl
//! ```

mod run_cmd;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use salience_core::{FileResource, KnowledgeBase, KnowledgeLibrary, RuleBuilder};
use tracing_subscriber::EnvFilter;


#[derive(Parser)]
#[command(name = "salience", about = "Salience-ordered rule engine")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse rule files and list their rules
    Check {
        /// Rule files (.grl)
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Print the rule list as JSON
        #[arg(long)]
        json: bool,
    },
    /// Build rules and execute them once against JSON facts
    Run {
        /// Rule files (.grl), may be repeated
        #[arg(short, long = "rules")]
        rules: Vec<PathBuf>,
        /// Directories scanned recursively for .grl files
        #[arg(long)]
        dir: Vec<PathBuf>,
        /// JSON object mapping fact names to fact objects
        #[arg(short, long)]
        facts: PathBuf,
        /// Knowledge base name
        #[arg(long, default_value = "Main")]
        kb: String,
        /// Knowledge base version
        #[arg(long = "version", default_value = "0.0.1")]
        kb_version: String,
        /// Engine config (YAML, or JSON by extension)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the normalised DSL text of a rule file
    Fmt {
        /// Rule file (.grl)
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "salience=debug,salience_core=debug"
    } else {
        "salience=info,salience_core=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Check { files, json } => check(&files, json),
        Commands::Run {
            rules,
            dir,
            facts,
            kb,
            kb_version,
            config,
        } => run_cmd::run(run_cmd::RunArgs {
            rules,
            dirs: dir,
            facts,
            kb,
            kb_version,
            config,
        }),
        Commands::Fmt { file } => {
            let base = build_files(&[file], "fmt", "0")?;
            println!("{}", base.to_grl());
            Ok(())
        }
    }
}

fn check(files: &[PathBuf], json: bool) -> Result<()> {
    let base = build_files(files, "check", "0")?;
    let entries = base.entries();
    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    println!("{} rule(s)", entries.len());
    for e in &entries {
        println!("  {:<32} salience {:>5}  {}", e.name, e.salience, e.description);
    }
    Ok(())
}

/// Build `files` into a throwaway library and return the resulting base.
fn build_files(files: &[PathBuf], kb: &str, version: &str) -> Result<KnowledgeBase> {
    let mut library = KnowledgeLibrary::new();
    let mut builder = RuleBuilder::new(&mut library);
    for path in files {
        build_file(&mut builder, kb, version, path)?;
    }
    let base = library
        .get(kb, version)
        .with_context(|| format!("no rules were built into '{}'", kb))?;
    Ok(base.as_ref().clone())
}

pub(crate) fn build_file(
    builder: &mut RuleBuilder<'_>,
    kb: &str,
    version: &str,
    path: &Path,
) -> Result<usize> {
    builder
        .build_from_resource(kb, version, &mut FileResource::new(path))
        .with_context(|| format!("failed to build rules from '{}'", path.display()))
}
