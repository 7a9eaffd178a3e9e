//! CLI Entry Point for iv-daq
//!
//! Provides command-line interface for:
//! - Full runs: operator swap, repeated sweeps and aggregation per component
//! - Single standalone sweeps (`collect`)
//! - Re-aggregating repeat files already on disk (`analyze`)
//!
//! # Usage
//!
//! ```bash
//! iv-daq run --component red_LED --component green_LED --repeats 5
//! iv-daq collect --component red_LED --mock
//! iv-daq analyze --component red_LED
//! ```

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use iv_daq::component::ComponentUnderTest;
use iv_daq::config::AppConfig;
use iv_daq::data::{AggregationEngine, DataLayout};
use iv_daq::experiment::{
    collect_single, AutoConfirm, Orchestrator, RunPlan, RunReport, StdinConfirmation,
    SwapConfirmation,
};
use iv_daq::instrument::{transport, ChannelSettings, InstrumentChannel};
use iv_daq::tracing_setup;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "iv-daq")]
#[command(about = "I-V characterisation bench: sweep, record and average", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true, default_value = iv_daq::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the configured log level
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct InstrumentArgs {
    /// Use the simulated instrument instead of the serial port
    #[arg(long)]
    mock: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Measure every component: swap, sweep N times, aggregate
    Run {
        /// Component to measure (repeatable, replaces the configured list)
        #[arg(long = "component")]
        components: Vec<String>,

        /// Sweeps per component
        #[arg(long)]
        repeats: Option<usize>,

        /// Do not wait for the operator between components
        #[arg(long)]
        yes: bool,

        #[command(flatten)]
        instrument: InstrumentArgs,
    },

    /// Single sweep of one component into <output>/<component>/<component>.txt
    Collect {
        /// Component to measure
        #[arg(long)]
        component: String,

        /// Output directory (defaults to the configured one)
        #[arg(long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        instrument: InstrumentArgs,
    },

    /// Recompute profiles from the repeat files already on disk
    Analyze {
        /// Component to aggregate (repeatable, defaults to the configured list)
        #[arg(long = "component")]
        components: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(level) = cli.log_level {
        config.application.log_level = level;
    }
    config.validate()?;

    tracing_setup::init_from_config(&config).map_err(anyhow::Error::msg)?;
    info!(config = %cli.config.display(), "Configuration loaded");

    match cli.command {
        Commands::Run {
            components,
            repeats,
            yes,
            instrument,
        } => run(&config, components, repeats, yes, instrument.mock).await,
        Commands::Collect {
            component,
            output,
            instrument,
        } => collect(&config, component, output, instrument.mock).await,
        Commands::Analyze { components } => analyze(&config, components),
    }
}

async fn connect(config: &AppConfig, mock: bool) -> Result<InstrumentChannel> {
    let stream = transport::open(&config.instrument, mock).await?;
    let channel = InstrumentChannel::connect(stream, ChannelSettings::from(&config.instrument))
        .await
        .context("instrument handshake failed")?;
    Ok(channel)
}

async fn run(
    config: &AppConfig,
    components: Vec<String>,
    repeats: Option<usize>,
    yes: bool,
    mock: bool,
) -> Result<()> {
    let mut plan = RunPlan::from_config(config)?;
    if !components.is_empty() {
        plan = plan.with_components(components)?;
    }
    if let Some(repeats) = repeats {
        plan = plan.with_repeats(repeats)?;
    }

    let mut channel = connect(config, mock).await?;
    let layout = DataLayout::new(&config.run.output_dir);

    let report = if yes {
        execute(Orchestrator::new(plan, layout, AutoConfirm), &mut channel).await?
    } else {
        execute(
            Orchestrator::new(plan, layout, StdinConfirmation::new()),
            &mut channel,
        )
        .await?
    };

    print_report(&report);
    if !report.all_succeeded() {
        bail!("{} component(s) failed", report.failures().count());
    }
    Ok(())
}

async fn execute<C: SwapConfirmation>(
    mut orchestrator: Orchestrator<C>,
    channel: &mut InstrumentChannel,
) -> Result<RunReport> {
    Ok(orchestrator.run(channel).await?)
}

fn print_report(report: &RunReport) {
    println!();
    for outcome in &report.outcomes {
        match (&outcome.profile, &outcome.failure) {
            (Some(profile), None) => println!(
                "{}: {} repeats, profile {}",
                outcome.component,
                outcome.completed_repeats,
                profile.display()
            ),
            (_, Some(reason)) => println!(
                "{}: FAILED after {} repeats: {}",
                outcome.component, outcome.completed_repeats, reason
            ),
            (None, None) => println!("{}: no profile", outcome.component),
        }
    }
}

async fn collect(
    config: &AppConfig,
    component: String,
    output: Option<PathBuf>,
    mock: bool,
) -> Result<()> {
    let component = ComponentUnderTest::new(component)?;
    let layout = DataLayout::new(output.unwrap_or_else(|| config.run.output_dir.clone()));

    let mut channel = connect(config, mock).await?;
    let summary = collect_single(&mut channel, &layout, config.sweep.clone(), &component).await?;
    println!("{}: {} samples in {}", component, summary.rows, summary.path.display());
    Ok(())
}

fn analyze(config: &AppConfig, components: Vec<String>) -> Result<()> {
    let names = if components.is_empty() {
        config.run.components.clone()
    } else {
        components
    };

    let engine = AggregationEngine::new(
        DataLayout::new(&config.run.output_dir),
        config.sweep.clone(),
    );

    let mut failed = 0usize;
    for name in names {
        let component = ComponentUnderTest::new(name)?;
        match engine.aggregate(&component) {
            Ok(profile) => println!(
                "{}: {} files averaged into {}",
                component,
                profile.sources.len(),
                profile.path.display()
            ),
            Err(e) => {
                eprintln!("{}: {}", component, e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{} component(s) could not be aggregated", failed);
    }
    Ok(())
}
