//! Gridiron Edge command line.
//!
//! Every subcommand is a stage of the weekly pipeline; `run` chains them.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{error, info};

use gridiron_edge::config::{self, PipelineConfig};
use gridiron_edge::scenario::{FULL_RUN, Scenario, Step};
use gridiron_edge::synthetic::{self, SynthConfig};

#[derive(Parser)]
#[command(name = "gridiron_edge")]
#[command(about = "Weekly football stats, trends and margin predictions", long_about = None)]
struct Cli {
    /// Data root (overrides OUTPUT_DIR)
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Current season (overrides CURRENT_SEASON)
    #[arg(long, global = true)]
    season: Option<u32>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play-by-play to per-team derived stats
    Derive {
        /// Also process the historical seasons
        #[arg(long)]
        all: bool,
    },
    /// Point-in-time season and last-5 trends
    Trends {
        /// Also process the historical seasons
        #[arg(long)]
        all: bool,
    },
    /// Matchup rows for the historical range and the current season
    Collate,
    /// Fit the margin model on the historical matchups
    Train,
    /// Predict margins for collated current-season weeks
    Predict {
        /// Only this week
        #[arg(long)]
        week: Option<u32>,
    },
    /// Score the latest predictions against final results
    Evaluate,
    /// Fetch, derive, trends, collate, train, predict and evaluate in order
    Run {
        /// Predict only this week
        #[arg(long)]
        week: Option<u32>,
    },
    /// Write a deterministic synthetic season into the data root
    Synth {
        #[arg(long, default_value = "6")]
        weeks: u32,
        #[arg(long, default_value = "7")]
        seed: u64,
    },
}

fn resolve_config(cli: &Cli) -> PipelineConfig {
    let mut config = PipelineConfig::from_env();
    if let Some(dir) = &cli.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(season) = cli.season {
        config.current_season = season;
    }
    config
}

fn seasons_for(scenario: &Scenario, all: bool) -> Vec<u32> {
    if all {
        scenario.seasons()
    } else {
        vec![scenario.config.current_season]
    }
}

fn execute(cli: Cli) -> Result<()> {
    let config = resolve_config(&cli);
    info!(
        "data root {}, current season {}, history {}-{}",
        config.output_dir.display(),
        config.current_season,
        config.historical_start,
        config.historical_end
    );
    let layout = config.layout();

    match cli.command {
        Commands::Derive { all } => {
            let scenario = Scenario::new(config, None)?;
            for season in seasons_for(&scenario, all) {
                gridiron_edge::pipeline::derive_season(&layout, &scenario.schema, season)?;
            }
        }
        Commands::Trends { all } => {
            let scenario = Scenario::new(config, None)?;
            for season in seasons_for(&scenario, all) {
                gridiron_edge::pipeline::build_season_trends(&layout, season)?;
            }
        }
        Commands::Collate => Scenario::new(config, None)?.run(&[Step::Collate])?,
        Commands::Train => Scenario::new(config, None)?.run(&[Step::Train])?,
        Commands::Predict { week } => Scenario::new(config, week)?.run(&[Step::Predict])?,
        Commands::Evaluate => Scenario::new(config, None)?.run(&[Step::Evaluate])?,
        Commands::Run { week } => Scenario::new(config, week)?.run(&FULL_RUN)?,
        Commands::Synth { weeks, seed } => {
            synthetic::write_season(
                &layout,
                SynthConfig {
                    season: config.current_season,
                    weeks,
                    seed,
                },
            )?;
        }
    }
    Ok(())
}

fn main() {
    config::load_dotenv();
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    if let Err(err) = execute(cli) {
        error!("{err:#}");
        std::process::exit(1);
    }
}
