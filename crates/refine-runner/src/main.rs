use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use refinement::OperatingMode;
use refine_runner::{LoopReport, RefinementLoop, RunnerConfig, Scenario};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Scenario file (JSON) with sections, initial content, judge and patch scripts
    #[arg(long)]
    scenario: PathBuf,

    /// Runner config (TOML); REFINE_* environment variables override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Operating mode: full-auto or semi-auto
    #[arg(long)]
    mode: Option<OperatingMode>,

    /// Maximum refinement iterations
    #[arg(long)]
    max_iterations: Option<u32>,

    /// Print the full report as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => RunnerConfig::load(path)?,
        None => RunnerConfig::from_env(),
    };
    if let Some(mode) = args.mode {
        config.refinement.operation_mode = mode;
    }
    if let Some(max_iterations) = args.max_iterations {
        config.refinement.max_iterations = max_iterations;
    }
    config.validate()?;

    let scenario = Scenario::load(&args.scenario)?;
    info!(
        scenario = %args.scenario.display(),
        sections = scenario.sections.len(),
        judges = scenario.judges.len(),
        mode = %config.refinement.operation_mode,
        "Refinement run starting"
    );

    let driver = RefinementLoop::new(
        config,
        scenario.sections.clone(),
        scenario.judges(),
        Arc::new(scenario.patcher()),
    )
    .with_context(scenario.context.clone());

    let report = driver
        .run(&scenario.initial_content)
        .await
        .context("Refinement run aborted")?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize report")?
        );
    } else {
        print_summary(&report);
    }
    Ok(())
}

fn print_summary(report: &LoopReport) {
    let outcome = &report.final_outcome;
    println!("Status:     {}", outcome.status);
    println!("Stopped:    {}", outcome.reason);
    println!("Score:      {:.1}%", outcome.score * 100.0);
    println!("Iterations: {}", report.session.iterations);
    println!("Tokens:     {}", report.session.tokens_used);
    println!("Cost:       ${:.4}", report.session.total_cost);
    if outcome.escalate {
        println!("Escalated for human review");
    }
    if let Some(best) = &outcome.best_effort {
        println!("{}", best.selection_reason);
    }
    if !outcome.improvement_hints.is_empty() {
        println!("Improvement hints:");
        for hint in &outcome.improvement_hints {
            println!("  - {}", hint);
        }
    }
}
