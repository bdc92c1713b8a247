use std::fmt;
use std::path::{Path, PathBuf};

use chacha_core::automl::{AutomlSnapshot, CollectingMetricsSink, RoundReport, SlotReport};
use chacha_core::namespace::exclusions_to_string;
use chacha_core::{load_chacha_config, AutoMl, AutomlConfig, ChachaConfig, ConfigManager};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde::Serialize;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod demo;

use demo::LinearDemoLearner;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] chacha_core::ConfigError),
    #[error("automl error: {0}")]
    Automl(#[from] chacha_core::AutomlError),
    #[error("snapshot error: {0}")]
    Persist(#[from] chacha_core::PersistError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "ChaCha online AutoML control interface", long_about = None)]
pub struct Cli {
    /// Path to chacha.toml
    #[arg(long, default_value = "configs/chacha.toml")]
    pub config: PathBuf,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Loads and validates the config, printing the resolved settings
    Validate,
    /// Runs a synthetic bandit stream through the scheduler
    Simulate(SimulateArgs),
    /// Loads a snapshot with full validation and summarizes it
    Inspect(InspectArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    /// Number of decisions to stream
    #[arg(long, default_value_t = 1000)]
    pub rounds: u64,
    /// Seed of the synthetic stream (the scheduler uses `automl.seed`)
    #[arg(long, default_value_t = 1)]
    pub seed: u64,
    /// Arms offered on every decision
    #[arg(long, default_value_t = 4)]
    pub actions: u32,
    /// Writes a snapshot of the final scheduler state here
    #[arg(long)]
    pub snapshot: Option<PathBuf>,
    /// Keeps only the champion's weights in the snapshot
    #[arg(long, requires = "snapshot")]
    pub predict_only: bool,
}

#[derive(Args, Debug, Clone)]
pub struct InspectArgs {
    #[arg(long)]
    pub snapshot: PathBuf,
}

pub fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Commands::Validate => {
            let config = load_chacha_config(&cli.config)?;
            init_tracing(&config.logging.filter);
            render(&ValidateReport::new(&cli.config, &config), cli.format)?;
        }
        Commands::Simulate(args) => {
            let config = load_chacha_config(&cli.config)?;
            init_tracing(&config.logging.filter);
            let summary = simulate(&config.automl, args)?;
            render(&summary, cli.format)?;
        }
        Commands::Inspect(args) => {
            init_tracing("info");
            render(&inspect(&args.snapshot)?, cli.format)?;
        }
    }
    Ok(())
}

/// Installs a stderr subscriber. `RUST_LOG` takes precedence over the
/// configured filter; a second call is a no-op.
pub fn init_tracing(default_filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

#[derive(Debug, Serialize)]
pub struct ValidateReport {
    pub config_path: PathBuf,
    pub resolved_priority_challengers: usize,
    pub automl: AutomlConfig,
    pub logging_filter: String,
}

impl ValidateReport {
    fn new(path: &Path, config: &ChachaConfig) -> Self {
        Self {
            config_path: path.to_path_buf(),
            resolved_priority_challengers: config.automl.resolved_priority_challengers(),
            automl: config.automl.clone(),
            logging_filter: config.logging.filter.clone(),
        }
    }
}

impl DisplayFallback for ValidateReport {
    fn display(&self) -> String {
        let automl = &self.automl;
        let mut lines = vec![format!("config {} is valid", self.config_path.display())];
        lines.push(format!(
            "  live slots: {} ({} priority challengers)",
            automl.max_live_configs, self.resolved_priority_challengers
        ));
        lines.push(format!(
            "  lease: {}  oracle: {}  priority: {}  interactions: {}",
            automl.global_lease, automl.oracle, automl.priority, automl.interactions
        ));
        lines.push(format!(
            "  significance: {}  decay: {}  lb_trick: {}",
            automl.significance_level, automl.estimator_decay, automl.lb_trick
        ));
        lines.push(format!(
            "  catalog cap: {}  weights/slot: {}  seed: {}",
            automl
                .catalog_cap
                .map(|cap| cap.to_string())
                .unwrap_or_else(|| "none".to_string()),
            automl.weights_per_slot,
            automl.seed
        ));
        lines.push(format!("  log filter: {}", self.logging_filter));
        lines.join("\n")
    }
}

/// One live slot in command output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotSummary {
    #[serde(flatten)]
    pub report: SlotReport,
    pub exclusions: String,
}

impl fmt::Display for SlotSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = &self.report;
        write!(
            f,
            "  [{}] config {} {} lease={} updates={} bounds=[{:.4}, {:.4}] vs champion=[{:.4}, {:.4}] excl={}",
            report.slot,
            report.config_id,
            report.state,
            report.lease,
            report.update_count,
            report.lower_bound,
            report.upper_bound,
            report.champion_lower_bound,
            report.champion_upper_bound,
            self.exclusions
        )
    }
}

fn slot_summaries(manager: &ConfigManager, report: &RoundReport) -> Vec<SlotSummary> {
    report
        .slots
        .iter()
        .map(|slot| SlotSummary {
            report: slot.clone(),
            exclusions: exclusions_to_string(
                &manager.catalog().get(slot.config_index).exclusions,
            ),
        })
        .collect()
}

#[derive(Debug, Serialize)]
pub struct SimulationSummary {
    pub rounds: u64,
    pub stream_seed: u64,
    pub actions: u32,
    pub state: String,
    pub champion_config_id: u64,
    pub champion_exclusions: String,
    pub total_champ_switches: u64,
    pub valid_configs: usize,
    pub queued: usize,
    /// Share of decisions where the champion, queried before learning,
    /// picked the rewarded arm.
    pub champion_accuracy: f64,
    pub switch_rounds: Vec<u64>,
    pub slots: Vec<SlotSummary>,
    pub snapshot: Option<PathBuf>,
}

impl DisplayFallback for SimulationSummary {
    fn display(&self) -> String {
        let mut lines = vec![format!(
            "simulated {} rounds (seed {}, {} actions), state {}",
            self.rounds, self.stream_seed, self.actions, self.state
        )];
        lines.push(format!(
            "champion: config {} excl={} accuracy={:.3}",
            self.champion_config_id, self.champion_exclusions, self.champion_accuracy
        ));
        lines.push(format!(
            "switches: {} {:?}  valid configs: {}  queued: {}",
            self.total_champ_switches, self.switch_rounds, self.valid_configs, self.queued
        ));
        lines.extend(self.slots.iter().map(ToString::to_string));
        if let Some(path) = &self.snapshot {
            lines.push(format!("snapshot written to {}", path.display()));
        }
        lines.join("\n")
    }
}

pub fn simulate(config: &AutomlConfig, args: &SimulateArgs) -> Result<SimulationSummary> {
    let sink = CollectingMetricsSink::new();
    let mut automl = AutoMl::new(config, LinearDemoLearner::new(args.actions))?
        .with_metrics_sink(Box::new(sink.clone()));
    let mut rng = ChaCha20Rng::seed_from_u64(args.seed);
    let mut hits = 0u64;

    for _ in 0..args.rounds {
        let mut decision = demo::next_decision(&mut rng, args.actions);
        if automl.predict(&mut decision.group)? == decision.best_action {
            hits += 1;
        }
        automl.step(&mut decision.group, &decision.outcome)?;
    }

    if let Some(path) = &args.snapshot {
        let snapshot = if args.predict_only {
            AutomlSnapshot::capture_predict_only(&automl)?
        } else {
            AutomlSnapshot::capture(&automl)?
        };
        snapshot.save(path)?;
    }

    let manager = automl.manager();
    let report = manager.report();
    let champion = manager.catalog().get(manager.slots()[0].config_index);
    let log = sink.snapshot();
    tracing::debug!(
        target: "chachactl.simulate",
        rounds = args.rounds,
        recorded_rounds = log.rounds.len(),
        switches = log.switches.len(),
        "simulation finished"
    );
    Ok(SimulationSummary {
        rounds: args.rounds,
        stream_seed: args.seed,
        actions: args.actions,
        state: automl.state().to_string(),
        champion_config_id: report.champion_config_id,
        champion_exclusions: exclusions_to_string(&champion.exclusions),
        total_champ_switches: report.total_champ_switches,
        valid_configs: report.valid_configs,
        queued: report.queued,
        champion_accuracy: if args.rounds == 0 {
            0.0
        } else {
            hits as f64 / args.rounds as f64
        },
        switch_rounds: log.switches.iter().map(|switch| switch.round).collect(),
        slots: slot_summaries(manager, &report),
        snapshot: args.snapshot.clone(),
    })
}

#[derive(Debug, Serialize)]
pub struct SnapshotSummary {
    pub path: PathBuf,
    pub version: u32,
    pub saved_at: String,
    pub checksum: String,
    pub state: String,
    pub rounds: u64,
    pub champion_config_id: u64,
    pub total_champ_switches: u64,
    pub valid_configs: usize,
    pub catalog_len: usize,
    pub queued: usize,
    pub namespaces_seen: usize,
    pub slots: Vec<SlotSummary>,
}

impl DisplayFallback for SnapshotSummary {
    fn display(&self) -> String {
        let mut lines = vec![format!(
            "snapshot {} (v{}, saved {})",
            self.path.display(),
            self.version,
            self.saved_at
        )];
        lines.push(format!("checksum: {}", self.checksum));
        lines.push(format!(
            "state {} after {} rounds, champion config {}, {} switches",
            self.state, self.rounds, self.champion_config_id, self.total_champ_switches
        ));
        lines.push(format!(
            "catalog: {} valid / {} stored, {} queued, {} namespaces seen",
            self.valid_configs, self.catalog_len, self.queued, self.namespaces_seen
        ));
        lines.extend(self.slots.iter().map(ToString::to_string));
        lines.join("\n")
    }
}

pub fn inspect(path: &Path) -> Result<SnapshotSummary> {
    let snapshot = AutomlSnapshot::load(path)?;
    let version = snapshot.version;
    let saved_at = snapshot.saved_at.to_rfc3339();
    let checksum = snapshot.checksum.clone();
    let (state, manager) = snapshot.into_manager()?;
    let report = manager.report();
    Ok(SnapshotSummary {
        path: path.to_path_buf(),
        version,
        saved_at,
        checksum,
        state: state.to_string(),
        rounds: manager.total_learn_count(),
        champion_config_id: report.champion_config_id,
        total_champ_switches: report.total_champ_switches,
        valid_configs: report.valid_configs,
        catalog_len: manager.catalog().len(),
        queued: report.queued,
        namespaces_seen: manager.namespace_counter().len(),
        slots: slot_summaries(&manager, &report),
    })
}
