#![forbid(unsafe_code)]

//! **hive-cli** — command-line harness over the HiveForge orchestration
//! core.
//!
//! Stands in for the out-of-scope HTTP/MCP facade (spec §1/§7): every
//! subcommand is a thin wrapper around a handler function the core
//! already exposes, rendering results as JSON rather than going through
//! a REST or MCP transport.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hive_auth::{KeyValidator, StaticKeyValidator};
use hive_llm::{LlmGateway, StubProvider};
use hive_ra::{RaCollaborators, RaPipeline, UserFeedbackDecision};
use hive_record::{ChainFault, Event, EventLog, JsonlEventLog};
use hive_types::{Episode, HiveConfig};
use hive_worker::{ReActConfig, ToolRegistry};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod executor;

#[derive(Parser)]
#[command(name = "hive")]
#[command(about = "HiveForge orchestration core — command-line harness")]
#[command(version)]
struct Cli {
    /// Root directory the event log's streams are written under.
    #[arg(long, default_value = "./vault")]
    vault: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Boundary key to present, checked against `HiveConfig.api_key` when
    /// one is configured. No effect if no key is configured.
    #[arg(long)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs a goal through the planner/guard/approval/orchestrator pipeline.
    Run {
        /// Stream id this run's events are appended to.
        #[arg(long)]
        run_id: String,
        /// Natural-language goal to execute.
        #[arg(long)]
        goal: String,
        /// Skip the approval gate by pre-supplying acceptance.
        #[arg(long)]
        auto_approve: bool,
    },
    /// Replays a run's event stream and verifies its hash chain.
    Verify {
        #[arg(long)]
        run_id: String,
    },
    /// Dumps a run's event stream as JSON lines.
    Replay {
        #[arg(long)]
        run_id: String,
    },
    /// Drives a goal through the Requirement Analysis pipeline to completion.
    Ra {
        #[arg(long)]
        run_id: String,
        #[arg(long)]
        goal: String,
    },
    /// Records an Episode for a finished run and appends it to an episode file.
    RecordEpisode {
        #[arg(long)]
        run_id: String,
        #[arg(long)]
        colony_id: Option<String>,
        #[arg(long, default_value = "")]
        goal: String,
        /// JSON file of episodes (a JSON array), created if missing.
        #[arg(long, default_value = "episodes.json")]
        episodes_path: PathBuf,
    },
    /// Recommends a Colony template given task features and episode history.
    Scout {
        #[arg(long, default_value = "episodes.json")]
        episodes_path: PathBuf,
        #[arg(long, default_value_t = 3.0)]
        complexity: f64,
        #[arg(long, default_value_t = 3.0)]
        risk: f64,
        #[arg(long, default_value_t = 3.0)]
        urgency: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let mut config = HiveConfig::load(None).context("loading config")?;
    config.vault_path = cli.vault.clone();
    check_boundary_key(&config, cli.api_key.as_deref()).await?;
    let log = JsonlEventLog::new(&config.vault_path).context("opening vault")?;

    match cli.command {
        Commands::Run { run_id, goal, auto_approve } => run_goal(&log, &config, &run_id, &goal, auto_approve).await,
        Commands::Verify { run_id } => verify(&log, &run_id).await,
        Commands::Replay { run_id } => replay(&log, &run_id).await,
        Commands::Ra { run_id, goal } => ra_intake(&log, &run_id, &goal).await,
        Commands::RecordEpisode { run_id, colony_id, goal, episodes_path } => {
            record_episode(&log, &run_id, colony_id, goal, &episodes_path).await
        }
        Commands::Scout { episodes_path, complexity, risk, urgency } => {
            scout(&episodes_path, complexity, risk, urgency)
        }
    }
}

fn init_tracing(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer()).init();
}

/// Enforces the boundary header-key check (spec §1 Non-goals: "... beyond
/// a header-key check at the boundary") before any subcommand runs. A
/// deployment that configures no `api_key` leaves the boundary open, the
/// same way an unconfigured `StaticKeyValidator` rejects everything only
/// once a key *is* expected.
async fn check_boundary_key(config: &HiveConfig, presented: Option<&str>) -> Result<()> {
    let Some(expected) = config.api_key.clone() else {
        return Ok(());
    };
    let validator = StaticKeyValidator::new(Some(expected));
    let presented = presented.unwrap_or("");
    validator.validate(presented).await.context("boundary key check failed")
}

async fn run_goal(log: &dyn EventLog, config: &HiveConfig, run_id: &str, goal: &str, auto_approve: bool) -> Result<()> {
    let pipeline = hive_pipeline::Pipeline::new(log);
    let planner = executor::SingleTaskPlanner;
    let classifier = hive_pipeline::AlwaysIrreversible;

    let gateway = Arc::new(LlmGateway::new(Arc::new(StubProvider::echo()), 60));
    let tools = Arc::new(ToolRegistry::new());
    let worker_executor = executor::WorkerExecutor {
        log,
        run_id: run_id.to_string(),
        gateway,
        tools,
        config: ReActConfig::default(),
    };

    let pre_supplied_approval = if auto_approve { Some(true) } else { None };
    let outcome = pipeline
        .run(
            run_id,
            goal,
            serde_json::json!({}),
            &planner,
            &classifier,
            config.trust_level,
            pre_supplied_approval,
            &worker_executor,
        )
        .await
        .context("pipeline run failed")?;

    println!("{}", serde_json::to_string_pretty(&describe_outcome(&outcome))?);
    Ok(())
}

fn describe_outcome(outcome: &hive_pipeline::PipelineOutcome) -> serde_json::Value {
    match outcome {
        hive_pipeline::PipelineOutcome::Completed(result) => serde_json::json!({
            "status": "completed",
            "run_id": result.run_id,
            "all_completed": result.all_completed(),
            "tasks": result.task_contexts.iter().map(|(id, ctx)| {
                serde_json::json!({"task_id": id, "status": format!("{:?}", ctx.status), "result": ctx.result, "error": ctx.error})
            }).collect::<Vec<_>>(),
        }),
        hive_pipeline::PipelineOutcome::ApprovalRequired { request_id } => {
            serde_json::json!({"status": "approval_required", "request_id": request_id})
        }
        hive_pipeline::PipelineOutcome::Rejected { reason } => {
            serde_json::json!({"status": "rejected", "reason": reason})
        }
    }
}

async fn verify(log: &dyn EventLog, run_id: &str) -> Result<()> {
    let (ok, fault): (bool, Option<ChainFault>) = log.verify_chain(run_id).await.context("verifying chain")?;
    let fault = fault.map(|f| serde_json::json!({ "index": f.index, "reason": f.reason }));
    println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "ok": ok, "fault": fault }))?);
    Ok(())
}

async fn replay(log: &dyn EventLog, run_id: &str) -> Result<()> {
    let events: Vec<Event> = log.replay(run_id, None).await.context("replaying stream")?;
    for event in events {
        println!("{}", serde_json::to_string(&event)?);
    }
    Ok(())
}

async fn ra_intake(log: &dyn EventLog, run_id: &str, goal: &str) -> Result<()> {
    let pipeline = RaPipeline::new(log, run_id, RaCollaborators::default());
    let (session, path) = pipeline.intake(goal).await.context("ra intake failed")?;

    // No human present in a CLI invocation: proceed past any clarification
    // round rather than block on stdin.
    let always_proceed = |_session: &hive_ra::RaSession, _round: &hive_ra::ClarificationRound| UserFeedbackDecision::Proceed;
    let session = pipeline.run_to_completion(session, &always_proceed).await.context("ra pipeline failed")?;

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "analysis_path": path,
            "final_state": session.state,
            "draft": session.current_draft(),
            "hypotheses": session.hypotheses,
        }))?
    );
    Ok(())
}

async fn record_episode(
    log: &dyn EventLog,
    run_id: &str,
    colony_id: Option<String>,
    goal: String,
    episodes_path: &PathBuf,
) -> Result<()> {
    let episode = hive_honeycomb::record_run_episode(log, run_id, colony_id, goal, None, Default::default(), vec![])
        .await
        .context("recording episode")?;

    let mut episodes = load_episodes(episodes_path)?;
    episodes.push(episode.clone());
    save_episodes(episodes_path, &episodes)?;

    println!("{}", serde_json::to_string_pretty(&episode)?);
    Ok(())
}

fn scout(episodes_path: &PathBuf, complexity: f64, risk: f64, urgency: f64) -> Result<()> {
    let episodes = load_episodes(episodes_path)?;
    let target = std::collections::BTreeMap::from([
        ("complexity".to_string(), complexity),
        ("risk".to_string(), risk),
        ("urgency".to_string(), urgency),
    ]);

    let report = hive_scout::recommend(&target, &episodes, &hive_scout::ScoutConfig::default());
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn load_episodes(path: &PathBuf) -> Result<Vec<Episode>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let data = std::fs::read_to_string(path).context("reading episode file")?;
    serde_json::from_str(&data).context("parsing episode file")
}

fn save_episodes(path: &PathBuf, episodes: &[Episode]) -> Result<()> {
    let data = serde_json::to_string_pretty(episodes)?;
    std::fs::write(path, data).context("writing episode file")
}
