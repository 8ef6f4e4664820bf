//! Operations and demo CLI for the Echelon dispatch engine.
//!
//! Wires a manager over simulated tier backends so the engine can be
//! exercised and observed without real execution infrastructure.

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use echelon_core::{EchelonError, EchelonResult, OrchestratorConfig, TierLevel};
use echelon_orchestrator::{
    InvocationRequest, OrchestrationManager, Tier, TierHandle, TierRegistry, TierResponse,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "echelon", about = "Echelon — hierarchical task dispatch engine")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "echelon.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a demo workload against simulated tiers and print the status
    /// snapshot
    Demo {
        /// Number of tasks to submit (overrides config)
        #[arg(short, long)]
        tasks: Option<usize>,
    },
    /// Parse and validate the config file
    Validate,
}

#[derive(Deserialize, Default)]
struct EchelonConfig {
    #[serde(default)]
    orchestrator: OrchestratorConfig,
    #[serde(default)]
    demo: DemoConfig,
}

#[derive(Deserialize)]
struct DemoConfig {
    #[serde(default = "default_demo_tasks")]
    tasks: usize,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            tasks: default_demo_tasks(),
        }
    }
}

fn default_demo_tasks() -> usize {
    12
}

fn load_config(path: &PathBuf) -> EchelonResult<EchelonConfig> {
    if !path.exists() {
        warn!(path = %path.display(), "config file not found, using defaults");
        return Ok(EchelonConfig::default());
    }
    let raw = std::fs::read_to_string(path)?;
    toml::from_str(&raw).map_err(|e| EchelonError::Config(format!("{}: {e}", path.display())))
}

/// Simulated backend: deterministic latency and confidence derived from the
/// invocation counter, so demo runs are reproducible.
struct SimulatedTier {
    latency: Duration,
    base_confidence: f64,
    calls: AtomicUsize,
}

impl SimulatedTier {
    fn new(latency_ms: u64, base_confidence: f64) -> Arc<Self> {
        Arc::new(Self {
            latency: Duration::from_millis(latency_ms),
            base_confidence,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl TierHandle for SimulatedTier {
    async fn invoke(&self, request: InvocationRequest) -> EchelonResult<TierResponse> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;
        // Wobble confidence a little around the base so metrics move.
        let confidence = (self.base_confidence + (call % 5) as f64 * 0.01).min(1.0);
        Ok(TierResponse::ok(
            json!({
                "task_type": request.task.task_type,
                "sequence": call,
            }),
            confidence,
        ))
    }
}

fn demo_registry() -> EchelonResult<TierRegistry> {
    let mut registry = TierRegistry::new();
    let tiers = [
        ("ops-fleet", TierLevel::Operations, 20, 0.82),
        ("qa-review", TierLevel::Quality, 60, 0.91),
        ("exec-pool", TierLevel::Execution, 80, 0.88),
        ("tactical-router", TierLevel::Tactical, 40, 0.86),
        ("strategic-core", TierLevel::Strategic, 120, 0.94),
        ("voice-lab", TierLevel::Specialized, 90, 0.89),
    ];
    for (name, level, latency_ms, confidence) in tiers {
        registry.register(
            Tier::new(name, level, SimulatedTier::new(latency_ms, confidence))
                .with_capability(level.to_string())
                .with_max_concurrent(8),
        )?;
    }
    Ok(registry)
}

async fn run_demo(config: EchelonConfig, task_count: usize) -> EchelonResult<()> {
    let manager = OrchestrationManager::new(demo_registry()?, config.orchestrator)?;

    // A mix that exercises every strategy path.
    let shapes: [(&str, &str, Value); 4] = [
        ("classification", "simple", Value::Null),
        ("analysis", "moderate", Value::Null),
        ("refactor", "complex", Value::Null),
        ("audit", "critical", json!({"requires_consensus": true})),
    ];

    let mut ids = Vec::with_capacity(task_count);
    for i in 0..task_count {
        let (task_type, complexity, requirements) = &shapes[i % shapes.len()];
        let id = manager
            .submit_task(
                task_type,
                requirements.clone(),
                complexity,
                ((i % 10) + 1) as i64,
                Some("demo"),
            )
            .await?;
        ids.push(id);
    }
    info!(submitted = ids.len(), "demo workload submitted");

    for id in &ids {
        loop {
            if let Some(report) = manager.get_task_result(*id) {
                info!(
                    task_id = %id,
                    strategy = %report.strategy,
                    success = report.success,
                    confidence = report.confidence,
                    "task finished"
                );
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    manager.shutdown().await;
    let status = manager.get_orchestrator_status();
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

#[tokio::main]
async fn main() -> EchelonResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    config.orchestrator.validate()?;

    match cli.command {
        Commands::Demo { tasks } => {
            let count = tasks.unwrap_or(config.demo.tasks);
            run_demo(config, count).await
        }
        Commands::Validate => {
            println!("config ok: {}", cli.config.display());
            Ok(())
        }
    }
}
