mod fixture;
mod prompt;

use anyhow::{Result, bail};
use axnav_engine::config::{ConfigLoader, EngineConfig};
use axnav_engine::formatter::{format_clarification, format_plan, format_results};
use axnav_engine::matcher::MatchHints;
use axnav_engine::protocol::{self, ActionKind, ContextId, Intent};
use axnav_engine::resolution::{MultiStepResolver, Resolution};
use axnav_engine::session::SessionStatus;
use axnav_engine::{Engine, SessionReport};
use clap::{Parser, Subcommand};
use fixture::{FixturePage, Scenario};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "axnav",
    version,
    about = "Resolve intents against accessibility trees and supervise their execution"
)]
struct Args {
    #[command(subcommand)]
    mode: Mode,

    /// Engine configuration (defaults to ./axnav.yaml, then ~/.axnav/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print JSON payloads instead of text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Mode {
    /// Resolve an intent against a snapshot file without executing it
    Resolve {
        /// Snapshot file (axtree_v1)
        snapshot: PathBuf,
        /// Intent file (intent_v1); takes precedence over --action/--target
        #[arg(long)]
        intent: Option<PathBuf>,
        #[arg(long, default_value = "click")]
        action: String,
        #[arg(long)]
        target: Option<String>,
        #[arg(long)]
        value: Option<String>,
    },
    /// Run a scripted scenario end to end
    Run {
        /// Scenario file: intent, pages and step effects
        scenario: PathBuf,
        /// Never prompt; cancel once the scripted answers run out
        #[arg(long)]
        batch: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries plans and reports.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => ConfigLoader::load_from(path).await?,
        None => ConfigLoader::load_default().await?,
    };

    match args.mode {
        Mode::Resolve {
            snapshot,
            intent,
            action,
            target,
            value,
        } => {
            let intent = match (intent, target) {
                (Some(path), _) => fixture::load_intent(&path).await?,
                (None, Some(target)) => {
                    let intent = Intent::new(ActionKind::from_verb(&action), &target);
                    match value {
                        Some(value) => intent.with_value(&value),
                        None => intent,
                    }
                }
                (None, None) => bail!("either --intent or --target is required"),
            };
            resolve(config, &snapshot, &intent, args.json).await
        }
        Mode::Run { scenario, batch } => {
            let scenario = Scenario::load(&scenario).await?;
            run(config, scenario, batch, args.json).await
        }
    }
}

async fn resolve(
    config: EngineConfig,
    snapshot: &std::path::Path,
    intent: &Intent,
    json: bool,
) -> Result<()> {
    let context = ContextId::new("fixture");
    let snapshot = fixture::load_snapshot(snapshot, &context).await?;
    let resolver = MultiStepResolver::new(
        config.matcher,
        config.resolver,
        Arc::new(FixturePage::single(snapshot)),
    );

    match resolver.resolve(&context, intent, &MatchHints::default()).await {
        Resolution::Plan(resolved) => {
            if json {
                println!("{}", protocol::encode(&resolved.plan)?);
            } else {
                print!("{}", format_plan(&resolved.plan, Some(&resolved.snapshot)));
            }
            Ok(())
        }
        Resolution::Clarify(clarification) => {
            if json {
                println!("{}", protocol::encode(&clarification.request)?);
            } else {
                print!("{}", format_clarification(&clarification.request));
            }
            Ok(())
        }
        Resolution::NoMatch(report) => bail!("no match for {:?}: {}", intent.target, report),
    }
}

async fn run(config: EngineConfig, scenario: Scenario, batch: bool, json: bool) -> Result<()> {
    let page = Arc::new(FixturePage::new(scenario.pages, scenario.steps));
    let engine = Engine::from_config(config, page.clone(), page.clone(), page).await?;
    let context = scenario.context;
    let mut answers = scenario.answers.into_iter();

    let mut report = engine
        .submit(&context, scenario.intent, engine.default_policy())
        .await?;

    while report.status == SessionStatus::AwaitingClarification {
        if let Some(request) = &report.clarification {
            print!("{}", format_clarification(request));
        }

        let answer = match answers.next() {
            Some(scripted) => {
                println!("> {}", scripted);
                Some(scripted)
            }
            None if batch => None,
            None => prompt::read_answer()?,
        };
        let Some(answer) = answer else {
            report = engine.cancel(&context).await?;
            break;
        };

        match engine.answer(&context, prompt::parse_answer(&answer)).await {
            Ok(next) => report = next,
            Err(e) if batch => {
                eprintln!("{}", e);
                report = engine.cancel(&context).await?;
                break;
            }
            Err(e) => eprintln!("{}", e),
        }
    }

    print_report(&report, json)?;
    if report.status == SessionStatus::Failed {
        bail!("session {} failed", report.session_id);
    }
    Ok(())
}

fn print_report(report: &SessionReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    if let Some(plan) = &report.plan {
        print!("{}", format_plan(plan, None));
    }
    print!("{}", format_results(&report.results));
    match &report.failure {
        Some(failure) => println!("{} ({}): {}", report.status, failure.code, failure.detail),
        None => println!("{}", report.status),
    }
    Ok(())
}
