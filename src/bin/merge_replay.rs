//! Merge Replay Binary
//!
//! Feeds a recorded sequence of view process events through a merging
//! listener and prints every call that reaches the consumer, one JSON object
//! per line.
//!
//! Usage:
//!   merge_replay --scenario events.json [--config merge_config.toml] [--stats]
//!
//! Scenario format:
//!   {"steps": [{"op": "set_pass_through", "enable": false},
//!              {"op": "cycle_completed", "delta": {...}},
//!              {"op": "drain"}]}
//!
//! Environment:
//!   MERGE_SCENARIO - Scenario file ("-" reads stdin)
//!   MERGE_CONFIG_PATH - Config file (default: merge_config.toml)
//!   MERGE_* - Config overrides, see `MergeConfig::apply_env_overrides`

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Deserialize;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use result_merge::listener::{CallRecorder, MergingViewProcessListener, ViewResultListener};
use result_merge::model::{
    CompiledViewDefinition, CycleExecutionOptions, CycleMetadata, DeltaResult, FullResult,
    SharedError,
};
use result_merge::retention::InMemoryCycleManager;
use result_merge::MergeConfig;

#[derive(Parser, Debug)]
#[command(name = "merge_replay")]
#[command(about = "Replay view process events through a merging listener")]
struct Args {
    /// Scenario file ("-" for stdin)
    #[arg(long, env = "MERGE_SCENARIO")]
    scenario: String,

    /// Config file (falls back to MERGE_CONFIG_PATH / defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print listener statistics after the last step
    #[arg(long)]
    stats: bool,
}

#[derive(Debug, Deserialize)]
struct Scenario {
    steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Step {
    ViewDefinitionCompiled {
        compiled: CompiledViewDefinition,
        #[serde(default)]
        has_market_data_permissions: bool,
    },
    ViewDefinitionCompilationFailed {
        valuation_time: DateTime<Utc>,
        message: String,
    },
    CycleStarted {
        metadata: CycleMetadata,
    },
    CycleCompleted {
        #[serde(default)]
        full: Option<FullResult>,
        #[serde(default)]
        delta: Option<DeltaResult>,
    },
    CycleFragmentCompleted {
        #[serde(default)]
        full: Option<FullResult>,
        #[serde(default)]
        delta: Option<DeltaResult>,
    },
    CycleExecutionFailed {
        options: CycleExecutionOptions,
        message: String,
    },
    ProcessCompleted,
    ProcessTerminated {
        #[serde(default)]
        execution_interrupted: bool,
    },
    Error {
        message: String,
    },
    ClientShutdown {
        #[serde(default)]
        message: Option<String>,
    },
    SetPassThrough {
        enable: bool,
    },
    SetRetained {
        retain: bool,
    },
    Drain,
    Reset,
}

fn shared_error(message: &str) -> SharedError {
    Arc::new(anyhow::anyhow!("{}", message))
}

fn load_scenario(source: &str) -> Result<Scenario> {
    let contents = if source == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(source).with_context(|| format!("reading scenario {}", source))?
    };
    serde_json::from_str(&contents).context("parsing scenario")
}

fn apply(
    step: Step,
    listener: &MergingViewProcessListener,
    cycles: &InMemoryCycleManager,
) {
    match step {
        Step::ViewDefinitionCompiled {
            compiled,
            has_market_data_permissions,
        } => listener.view_definition_compiled(&compiled, has_market_data_permissions),
        Step::ViewDefinitionCompilationFailed {
            valuation_time,
            message,
        } => listener.view_definition_compilation_failed(valuation_time, &shared_error(&message)),
        Step::CycleStarted { metadata } => {
            cycles.register(metadata.cycle_id);
            listener.cycle_started(&metadata)
        }
        Step::CycleCompleted { full, delta } => {
            if let Some(full) = &full {
                cycles.register(full.cycle_id);
            }
            listener.cycle_completed(full.as_ref(), delta.as_ref())
        }
        Step::CycleFragmentCompleted { full, delta } => {
            listener.cycle_fragment_completed(full.as_ref(), delta.as_ref())
        }
        Step::CycleExecutionFailed { options, message } => {
            listener.cycle_execution_failed(&options, &shared_error(&message))
        }
        Step::ProcessCompleted => listener.process_completed(),
        Step::ProcessTerminated {
            execution_interrupted,
        } => listener.process_terminated(execution_interrupted),
        Step::Error { message } => listener.error(&shared_error(&message)),
        Step::ClientShutdown { message } => {
            let error = message.as_deref().map(shared_error);
            listener.client_shutdown(error.as_ref())
        }
        Step::SetPassThrough { enable } => listener.set_pass_through(enable),
        Step::SetRetained { retain } => listener.set_latest_result_cycle_retained(retain),
        Step::Drain => {
            listener.drain();
        }
        Step::Reset => listener.reset(),
    }
}

fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the delivered calls
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(Level::INFO.into())
                .add_directive("merge_replay=debug".parse()?),
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => {
            let mut cfg = MergeConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?;
            cfg.apply_env_overrides();
            cfg
        }
        None => MergeConfig::from_env(),
    };
    let scenario = load_scenario(&args.scenario)?;

    info!("Starting merge replay");
    info!("  Scenario: {} ({} steps)", args.scenario, scenario.steps.len());
    info!("  Pass-through: {}", config.listener.start_in_pass_through);
    info!("  Retain latest cycle: {}", config.listener.retain_latest_cycle);

    let recorder = Arc::new(CallRecorder::new());
    let cycles = Arc::new(InMemoryCycleManager::new());
    let listener =
        MergingViewProcessListener::with_config(recorder.clone(), cycles.clone(), &config.listener);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for step in scenario.steps {
        apply(step, &listener, &cycles);
        for call in recorder.take() {
            writeln!(out, "{}", serde_json::to_string(&call)?)?;
        }
    }

    if args.stats {
        writeln!(out, "{}", serde_json::to_string(&listener.stats())?)?;
    }

    info!(
        queued = listener.queued_call_count(),
        pinned = cycles.pinned_cycles().len(),
        "Merge replay finished"
    );
    Ok(())
}
