/// Command-line front end.
///
///   combat-ledger-analyzer analyze report.json WoWCombatLog.txt Logs/
///   combat-ledger-analyzer modules
///   combat-ledger-analyzer specs
///
/// `analyze` accepts JSON reports (`{ "context": ..., "events": [...] }`),
/// raw combat log text files, or a WoW Logs directory (the newest
/// `WoWCombatLog*.txt` holding an encounter is read). Every input is an independent run;
/// results are printed as one JSON array in input order.
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use combat_ledger_analyzer::{
    batch::{analyze_batch, AnalysisJob, RunLimits},
    config::{self, AnalysisConfig},
    context::RunContext,
    event::{ActorId, EventStream, RawRecord},
    logging,
    modules,
    parser::{self, CombatLogReader},
    specs, AnalysisResult, CatalogFormatter,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "combat-ledger-analyzer")]
#[command(about = "Analyze combat logs with pluggable analysis modules")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml (defaults to the user config directory)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the analysis over one or more inputs
    Analyze {
        /// JSON reports, combat log text files, or WoW Logs directories
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Player to analyze in combat log text (name, or Name-Realm)
        #[arg(long)]
        actor: Option<String>,
        /// Comma-separated module ids; overrides config and spec profile
        #[arg(long, value_delimiter = ',')]
        modules: Vec<String>,
    },
    /// List the built-in analysis modules
    Modules,
    /// List the embedded spec profiles
    Specs,
}

// ---------------------------------------------------------------------------
// Input and output shapes
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ReportInput {
    context: RunContext,
    events:  Vec<RawRecord>,
}

#[derive(Serialize)]
struct RunReport {
    input:  String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<AnalysisResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error:  Option<String>,
}

#[derive(Serialize)]
struct ModuleListing {
    id:           &'static str,
    dependencies: Vec<&'static str>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_dir = cli.config_dir.clone().unwrap_or_else(config::default_config_dir);
    let config = config::load_or_default(&config_dir)?;
    let _guard = logging::init(&config.log)?;
    tracing::debug!("Config loaded from {}", config_dir.display());

    let output = match cli.command {
        Commands::Analyze { inputs, actor, modules } => {
            let reports = analyze(&config, &inputs, actor.as_deref(), modules).await?;
            to_json(&reports, cli.pretty)?
        }
        Commands::Modules => {
            let catalog = modules::builtin()?;
            let listing: Vec<ModuleListing> = catalog
                .descriptors()
                .iter()
                .map(|d| ModuleListing {
                    id:           d.id.as_str(),
                    dependencies: d.dependencies.iter().map(|dep| dep.module.as_str()).collect(),
                })
                .collect();
            to_json(&listing, cli.pretty)?
        }
        Commands::Specs => to_json(&specs::list_all(), cli.pretty)?,
    };
    println!("{}", output);
    Ok(())
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String> {
    let json = if pretty { serde_json::to_string_pretty(value)? } else { serde_json::to_string(value)? };
    Ok(json)
}

async fn analyze(
    config: &AnalysisConfig,
    inputs: &[PathBuf],
    actor: Option<&str>,
    modules: Vec<String>,
) -> Result<Vec<RunReport>> {
    let catalog = Arc::new(modules::builtin()?);
    let limits = RunLimits::from_config(config);

    let mut jobs = Vec::with_capacity(inputs.len());
    let mut reports: Vec<Option<RunReport>> = Vec::with_capacity(inputs.len());
    for path in inputs {
        let label = path.display().to_string();
        match load_input(path, actor) {
            Ok((context, stream)) => {
                let requested = if modules.is_empty() { config.requested_modules(&context) } else { modules.clone() };
                jobs.push(AnalysisJob { label, context, stream, modules: requested });
                reports.push(None);
            }
            Err(e) => {
                tracing::warn!("Skipping {}: {:#}", label, e);
                reports.push(Some(RunReport { input: label, result: None, error: Some(format!("{:#}", e)) }));
            }
        }
    }

    let mut outcomes = analyze_batch(jobs, catalog, Arc::new(CatalogFormatter::english()), limits)
        .await
        .into_iter();

    // failed loads keep their slot; runs fill the rest in order
    let mut merged = Vec::with_capacity(reports.len());
    for slot in reports {
        match slot {
            Some(report) => merged.push(report),
            None => {
                let Some(outcome) = outcomes.next() else { break };
                let (result, error) = match outcome.result {
                    Ok(r) => (Some(r), None),
                    Err(e) => (None, Some(e.to_string())),
                };
                merged.push(RunReport { input: outcome.label, result, error });
            }
        }
    }
    Ok(merged)
}

fn load_input(path: &Path, actor: Option<&str>) -> Result<(RunContext, EventStream)> {
    let path = if path.is_dir() {
        parser::find_encounter_log(path)?
    } else {
        path.to_path_buf()
    };

    let text = std::fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    if text.trim_start().starts_with('{') {
        let report: ReportInput = serde_json::from_str(&text)
            .with_context(|| format!("Invalid JSON report {}", path.display()))?;
        let stream = EventStream::normalize(&report.events, report.context.fight.start_ms, report.context.selected);
        return Ok((report.context, stream));
    }

    let log = CombatLogReader::read_str(&text);
    let selected: ActorId = match actor {
        Some(name) => match log.player_named(name) {
            Some(id) => id,
            None => bail!("No player named '{}' in {}", name, path.display()),
        },
        None => match log.roster.combatants.first() {
            Some(c) => {
                tracing::info!("No --actor given; analyzing {}", c.name);
                c.id
            }
            None => bail!("No players found in {}", path.display()),
        },
    };
    Ok((log.context(selected), log.stream(selected)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_json_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        std::fs::write(
            &path,
            r#"{ "context": { "selected": 1, "fight": { "id": 1, "start_ms": 1000, "end_ms": 2000 } },
                 "events": [ { "timestamp": 1500, "type": "heal", "sourceID": 1, "targetID": 1, "amount": 10 } ] }"#,
        )
        .unwrap();
        let (ctx, stream) = load_input(&path, None).unwrap();
        assert_eq!(ctx.selected, ActorId(1));
        assert_eq!(stream.events()[0].timestamp, 500);
    }

    #[test]
    fn loads_newest_log_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("WoWCombatLog.txt"),
            "5/21 20:14:34.500  SPELL_HEAL,0,Player-1-A,\"Brewster-Realm\",0x511,0x0,Player-1-A,\"Brewster-Realm\",0x511,0x0,191840,\"Essence Font\",0x8,900,0,0,nil\n",
        )
        .unwrap();
        let (ctx, stream) = load_input(dir.path(), Some("Brewster")).unwrap();
        assert_eq!(ctx.selected_combatant().unwrap().name, "Brewster-Realm");
        assert_eq!(stream.len(), 1);
        assert!(load_input(dir.path(), Some("Nobody")).is_err());
    }
}
