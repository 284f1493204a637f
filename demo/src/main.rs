//! TEMPER Reference Runtime, demo CLI
//!
//! Runs one or all of the reference scenarios. Each scenario wires the real
//! TEMPER components (quality gate, router, dispatcher, debug loop,
//! retriever, audit log) to scripted agents.
//!
//! Usage:
//!   cargo run -p demo -- run-all
//!   cargo run -p demo -- spec-refinement
//!   cargo run -p demo -- feature-routing
//!   cargo run -p demo -- debug-repair
//!   cargo run -p demo -- context-lookup
//!   cargo run -p demo -- approval

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use temper_contracts::error::TemperResult;
use temper_ref::scenarios::{approval, context_lookup, debug_repair, feature_routing, spec_refinement};

// ── CLI definition ────────────────────────────────────────────────────────────

/// TEMPER, quality-gated multi-agent refinement demo.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "TEMPER reference runtime demo",
    long_about = "Runs TEMPER demo scenarios showing quality-gated refinement,\n\
                  dependency-aware routing, automatic repair, context retrieval\n\
                  and approval-gated finalization."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run all five scenarios in sequence.
    RunAll,
    /// Scenario 1: an incomplete spec is refined from gate feedback.
    SpecRefinement,
    /// Scenario 2: a backend/frontend feature runs as dependency waves.
    FeatureRouting,
    /// Scenario 3: a syntax error is repaired by the auto-debug loop.
    DebugRepair,
    /// Scenario 4: semantic context lookup and keyword fallback.
    ContextLookup,
    /// Scenario 5: an irreversible write waits for approval.
    Approval,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Set RUST_LOG=debug for step-by-step output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    print_banner();

    let result = match cli.command {
        Command::RunAll => run_all(),
        Command::SpecRefinement => spec_refinement::run_scenario(),
        Command::FeatureRouting => feature_routing::run_scenario(),
        Command::DebugRepair => debug_repair::run_scenario(),
        Command::ContextLookup => context_lookup::run_scenario(),
        Command::Approval => approval::run_scenario(),
    };

    match result {
        Ok(()) => {
            println!("All selected scenarios completed successfully.");
        }
        Err(e) => {
            eprintln!("Demo error: {e}");
            std::process::exit(1);
        }
    }
}

fn run_all() -> TemperResult<()> {
    spec_refinement::run_scenario()?;
    feature_routing::run_scenario()?;
    debug_repair::run_scenario()?;
    context_lookup::run_scenario()?;
    approval::run_scenario()?;
    info!("all scenarios finished");
    Ok(())
}

// ── Banner ────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("TEMPER, Quality-gated Multi-agent Refinement");
    println!("Reference Demo");
    println!("============================================");
    println!();
    println!("Per refinement round:");
    println!("  [1] Router decomposes the task and picks agents, waves or a DAG");
    println!("  [2] Agents produce an artifact; execution failures go to auto-debug");
    println!("  [3] Quality gate scores completeness, compliance, coverage, alignment");
    println!("  [4] Below threshold: a strategy is chosen and feedback fed back");
    println!("  [5] Every decision is appended to a SHA-256 hash-chained audit trail");
    println!("  [6] Irreversible actions wait for explicit approval");
    println!();
}
