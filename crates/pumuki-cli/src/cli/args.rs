use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use pumuki_core::{Platform, Stage};

#[derive(Parser)]
#[command(
    name = "pumuki",
    version,
    about = "Compile coding guidelines into a deterministic skills lock and gate commits, pushes and CI on it"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,

    /// Repository root
    #[arg(long, global = true, default_value = ".", env = "PUMUKI_REPO")]
    pub repo: PathBuf,

    /// Leave the built-in guideline bundles out of the effective lock
    #[arg(long, global = true)]
    pub no_core: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Skills lock management and stage evaluation
    Skills(SkillsArgs),
    Version,
}

#[derive(Parser, Debug)]
pub struct SkillsArgs {
    #[command(subcommand)]
    pub cmd: SkillsSub,
}

#[derive(Subcommand, Debug)]
pub enum SkillsSub {
    /// Compile skills.sources.json into skills.lock.json
    Compile(CompileArgs),
    /// Report whether skills.lock.json matches its sources
    Check(CheckArgs),
    /// Import guideline documents as custom rules
    Import(ImportArgs),
    /// Print the rule set active at a stage
    Rules(RulesArgs),
    /// Evaluate a fact context at a stage and decide the gate
    Evaluate(EvaluateArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Args, Debug)]
pub struct CompileArgs {
    /// Manifest path relative to the repository root
    #[arg(long, default_value = pumuki_core::config::SOURCES_MANIFEST_FILE)]
    pub manifest: String,

    /// Lock output path relative to the repository root
    #[arg(long, default_value = pumuki_core::config::LOCK_FILE)]
    pub output: String,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    #[arg(long, default_value = pumuki_core::config::SOURCES_MANIFEST_FILE)]
    pub manifest: String,

    #[arg(long, default_value = pumuki_core::config::LOCK_FILE)]
    pub lock: String,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Guideline documents; when omitted, SKILL.md references in AGENTS.md/SKILLS.md are used
    pub paths: Vec<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct StageArgs {
    /// PRE_COMMIT, PRE_PUSH or CI
    #[arg(long)]
    pub stage: Stage,

    /// Detected platforms; when omitted every platform is assumed present
    #[arg(long = "platform", value_delimiter = ',')]
    pub platforms: Vec<Platform>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Args, Debug)]
pub struct RulesArgs {
    #[command(flatten)]
    pub stage: StageArgs,
}

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    #[command(flatten)]
    pub stage: StageArgs,

    /// JSON fact context: `{"facts": [...]}` or a bare array
    #[arg(long)]
    pub facts: PathBuf,
}
