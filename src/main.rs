//! netpulse Binary Entry Point
//!
//! Samples network speed and usage on a fixed cadence until the configured
//! duration elapses or a signal arrives, then renders a report.
//! Core functionality is provided by the `netpulse` library crate.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use netpulse::{
    config::{AppConfig, ConfigError, DEFAULT_CONFIG_PATH},
    lifecycle::{LifecycleController, RunPlan, spawn_signal_listener},
    logging,
    probe::{HttpSpeedProbe, SystemUsageProbe},
    report::{ReportRenderer, SvgReportRenderer},
    scheduler::{RunClock, Scheduler},
    storage::{RunLayout, SampleKind},
};

/// Exit status for configuration errors.
const EXIT_CONFIG: u8 = 2;

/// netpulse - Network Speed & Usage Sampler
#[derive(Parser, Debug)]
#[command(name = "netpulse", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, env = "NETPULSE_CONFIG")]
    config: PathBuf,

    /// Results directory (overrides config file)
    #[arg(long, global = true, env = "NETPULSE_RESULTS_DIR")]
    results_dir: Option<PathBuf>,

    /// Logs directory (overrides config file)
    #[arg(long, global = true, env = "NETPULSE_LOGS_DIR")]
    logs_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the analysis (default)
    Run(RunArgs),
    /// Print the effective settings
    Settings(RunArgs),
    /// Re-render the report of an earlier run
    Render {
        /// Run stamp, e.g. 2024-05-17_09-30-00
        stamp: String,

        /// Samples between x-axis labels (overrides config file)
        #[arg(long)]
        xtick_interval: Option<usize>,
    },
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Analysis duration in minutes (overrides config file)
    #[arg(short, long, env = "NETPULSE_DURATION")]
    duration: Option<u64>,

    /// Run until interrupted
    #[arg(long)]
    infinite: bool,

    /// Minutes between measurements (overrides config file)
    #[arg(short, long, env = "NETPULSE_FREQUENCY")]
    frequency: Option<u64>,

    /// Skip the speed measurement
    #[arg(long)]
    no_speed: bool,

    /// Skip the data usage measurement
    #[arg(long)]
    no_usage: bool,

    /// Samples between x-axis labels in the report (overrides config file)
    #[arg(long, env = "NETPULSE_XTICK_INTERVAL")]
    xtick_interval: Option<usize>,
}

impl RunArgs {
    /// Apply CLI/env overrides (CLI > ENV > config file).
    fn apply(&self, config: &mut AppConfig) {
        let analysis = &mut config.analysis;
        if let Some(duration) = self.duration {
            analysis.analysis_duration = duration;
        }
        if self.infinite {
            analysis.infinite_analysis = true;
        }
        if let Some(frequency) = self.frequency {
            analysis.frequency = frequency;
        }
        if self.no_speed {
            analysis.analyze_speed = false;
        }
        if self.no_usage {
            analysis.analyze_usage = false;
        }
        if let Some(interval) = self.xtick_interval {
            analysis.xtick_interval = interval;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match load_config(&cli) {
        Ok(config) => match cli.command.unwrap_or(Command::Run(RunArgs::default())) {
            Command::Run(args) => run(config, &args).await,
            Command::Settings(args) => settings(config, &args),
            Command::Render {
                stamp,
                xtick_interval,
            } => render(config, &stamp, xtick_interval),
        },
        Err(e) => Err(e.into()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.downcast_ref::<ConfigError>().is_some() => {
            eprintln!("Configuration error: {e}");
            ExitCode::from(EXIT_CONFIG)
        }
        Err(e) => {
            tracing::error!("{e}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<AppConfig, ConfigError> {
    let mut config = AppConfig::load(&cli.config)?;
    if let Some(dir) = &cli.results_dir {
        config.paths.results_dir = dir.clone();
    }
    if let Some(dir) = &cli.logs_dir {
        config.paths.logs_dir = dir.clone();
    }
    Ok(config)
}

async fn run(mut config: AppConfig, args: &RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    args.apply(&mut config);
    config.validate()?;

    let clock = RunClock::start(chrono::Local::now().naive_local());
    let layout = RunLayout::new(
        &config.paths.results_dir,
        &config.paths.logs_dir,
        clock.started_at(),
    );
    let plan = RunPlan::new(&config.analysis, layout)?;

    // Initialize tracing
    logging::init(&config.logging, Some((plan.layout(), &plan.kinds())))?;
    tracing::info!("netpulse - Network Speed & Usage Sampler");
    tracing::info!(
        "Run {}: {:?}, every {} min, results in {}",
        plan.layout().stamp(),
        plan.policy(),
        config.analysis.frequency,
        plan.layout().results_dir().display()
    );

    let mut scheduler = Scheduler::new(clock);
    if plan.is_enabled(SampleKind::Speed)
        && let Some(job) = plan.bind(HttpSpeedProbe::new(config.speed_probe.clone())?)
    {
        scheduler.register(job)?;
    }
    if plan.is_enabled(SampleKind::Usage)
        && let Some(job) = plan.bind(SystemUsageProbe::new())
    {
        scheduler.register(job)?;
    }

    let mut controller = LifecycleController::new(scheduler, plan.policy(), plan.tables())
        .with_renderer(plan.renderer());
    let listener = spawn_signal_listener(controller.stop_handle());

    let summary = controller.run().await?;
    listener.abort();

    println!("{summary}");
    Ok(())
}

fn settings(mut config: AppConfig, args: &RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    args.apply(&mut config);
    config.validate()?;
    print!("{}", serde_yaml::to_string(&config)?);
    Ok(())
}

fn render(
    config: AppConfig,
    stamp: &str,
    xtick_interval: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    logging::init(&config.logging, None)?;

    let layout = RunLayout::from_stamp(&config.paths.results_dir, &config.paths.logs_dir, stamp)?;
    let tables = layout.tables([SampleKind::Speed, SampleKind::Usage]);
    let interval = xtick_interval.unwrap_or(config.analysis.xtick_interval);

    let report = SvgReportRenderer::new(layout, interval).render(&tables)?;
    println!("{}", report.chart.display());
    println!("{}", report.summary.display());
    Ok(())
}
