use std::path::PathBuf;

use anyhow::Context;
use serde::Serialize;
use tracing::{info, warn};

use pumuki_core::config::LayerOptions;
use pumuki_core::lock::{
    check_lock_status, compile_lock, import_custom_rules, load_effective_lock, write_lock,
    CompileOptions, CoreLockCache, Lock, LockStatus,
};
use pumuki_core::{
    build_rule_set, evaluate_rules, gate_decision, load_facts, load_policy, DetectedPlatforms,
    Finding, GateDecision, GateOutcome, Policy, ResolvedRuleSet, RuleSetRequest, Stage,
};

use super::super::args::{
    CheckArgs, CompileArgs, EvaluateArgs, ImportArgs, OutputFormat, RulesArgs, StageArgs,
};
use crate::exit_codes::{GATE_FAILED, SUCCESS};

/// Global options shared by every skills command.
pub struct RepoContext {
    pub repo: PathBuf,
    pub no_core: bool,
}

impl RepoContext {
    fn layers(&self) -> LayerOptions {
        if self.no_core {
            LayerOptions::without_core()
        } else {
            LayerOptions::from_env()
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn cmd_compile(ctx: &RepoContext, args: CompileArgs) -> anyhow::Result<i32> {
    let options = CompileOptions {
        manifest_file: args.manifest,
        lock_file: args.output,
        generated_at: None,
    };
    let lock = compile_lock(&ctx.repo, &options)?;
    let path = write_lock(&lock, &ctx.repo.join(&options.lock_file))?;
    info!(
        bundles = lock.bundles.len(),
        rules = lock.rule_count(),
        path = %path.display(),
        "wrote skills lock"
    );
    println!(
        "Compiled {} bundle(s), {} rule(s) -> {}",
        lock.bundles.len(),
        lock.rule_count(),
        path.display()
    );
    Ok(SUCCESS)
}

pub fn cmd_check(ctx: &RepoContext, args: CheckArgs) -> anyhow::Result<i32> {
    let options = CompileOptions {
        manifest_file: args.manifest,
        lock_file: args.lock,
        generated_at: None,
    };
    let check = check_lock_status(&ctx.repo, &options);
    match args.format {
        OutputFormat::Json => print_json(&check)?,
        OutputFormat::Text => println!("skills lock {}: {}", check.status, check.details),
    }
    if check.status == LockStatus::Fresh {
        Ok(SUCCESS)
    } else {
        warn!(status = %check.status, "skills lock is not fresh; run `pumuki skills compile`");
        Ok(GATE_FAILED)
    }
}

pub fn cmd_import(ctx: &RepoContext, args: ImportArgs) -> anyhow::Result<i32> {
    let imported = import_custom_rules(&ctx.repo, &args.paths)?;
    println!(
        "Imported {} rule(s) from {} file(s) -> {}",
        imported.rules.len(),
        imported.source_files.len(),
        imported.output_path.display()
    );
    for rule in &imported.rules {
        println!("  {} [{}] {}", rule.id, rule.severity, rule.description);
    }
    Ok(SUCCESS)
}

fn resolve_rule_set(ctx: &RepoContext, args: &StageArgs) -> anyhow::Result<(ResolvedRuleSet, Option<Policy>)> {
    let cache = CoreLockCache::new();
    let lock = load_effective_lock(&ctx.repo, &cache, ctx.layers())
        .with_context(|| format!("failed to load skills lock for {}", ctx.repo.display()))?
        .unwrap_or_else(|| Lock::new(Default::default(), Vec::new()));
    let policy = load_policy(&ctx.repo);
    let platforms = (!args.platforms.is_empty()).then(|| DetectedPlatforms::detected(&args.platforms));

    let mut request = RuleSetRequest::new(args.stage).with_repo_root(&ctx.repo);
    if let Some(policy) = &policy {
        request = request.with_policy(policy);
    }
    if let Some(platforms) = &platforms {
        request = request.with_platforms(platforms);
    }
    let rule_set = build_rule_set(&lock, &request);
    Ok((rule_set, policy))
}

pub fn cmd_rules(ctx: &RepoContext, args: RulesArgs) -> anyhow::Result<i32> {
    let (rule_set, _) = resolve_rule_set(ctx, &args.stage)?;
    match args.stage.format {
        OutputFormat::Json => print_json(&rule_set)?,
        OutputFormat::Text => {
            println!(
                "{}: {} rule(s) from {} bundle(s)",
                rule_set.stage,
                rule_set.rules.len(),
                rule_set.active_bundles.len()
            );
            for rule in &rule_set.rules {
                let mode = if rule.is_declarative() { "declarative" } else { "auto" };
                println!("  {:<8} {} ({})", rule.severity, rule.id, mode);
            }
            if !rule_set.required_detectors.is_empty() {
                let detectors: Vec<&str> =
                    rule_set.required_detectors.iter().map(String::as_str).collect();
                println!("detectors: {}", detectors.join(", "));
            }
        }
    }
    Ok(SUCCESS)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EvaluationReport<'a> {
    stage: Stage,
    outcome: GateOutcome,
    findings: &'a [Finding],
    decision: &'a GateDecision,
}

pub fn cmd_evaluate(ctx: &RepoContext, args: EvaluateArgs) -> anyhow::Result<i32> {
    let facts = load_facts(&args.facts)
        .with_context(|| format!("failed to read facts from {}", args.facts.display()))?;
    let (rule_set, policy) = resolve_rule_set(ctx, &args.stage)?;
    let policy = policy.unwrap_or_default();

    let findings = evaluate_rules(&rule_set.rules, &facts);
    let decision = gate_decision(&findings, policy.stage(rule_set.stage));

    match args.stage.format {
        OutputFormat::Json => print_json(&EvaluationReport {
            stage: rule_set.stage,
            outcome: decision.outcome,
            findings: &findings,
            decision: &decision,
        })?,
        OutputFormat::Text => {
            for finding in &findings {
                println!(
                    "{:<8} {} {}{}",
                    finding.severity,
                    finding.code,
                    finding.message,
                    finding
                        .file_path
                        .as_deref()
                        .map(|p| format!(" ({})", p))
                        .unwrap_or_default()
                );
            }
            println!("{}: {}", rule_set.stage, decision.outcome);
        }
    }

    Ok(if decision.outcome == GateOutcome::Block {
        GATE_FAILED
    } else {
        SUCCESS
    })
}
