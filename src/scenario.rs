use std::process::Command;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use log::info;

use crate::config::PipelineConfig;
use crate::pipeline;
use crate::schema::StatSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Fetch,
    Derive,
    Trends,
    Collate,
    Train,
    Predict,
    Evaluate,
}

pub const FULL_RUN: [Step; 7] = [
    Step::Fetch,
    Step::Derive,
    Step::Trends,
    Step::Collate,
    Step::Train,
    Step::Predict,
    Step::Evaluate,
];

impl Step {
    pub fn name(self) -> &'static str {
        match self {
            Step::Fetch => "fetch",
            Step::Derive => "derive",
            Step::Trends => "trends",
            Step::Collate => "collate",
            Step::Train => "train",
            Step::Predict => "predict",
            Step::Evaluate => "evaluate",
        }
    }
}

pub struct Scenario {
    pub config: PipelineConfig,
    pub schema: StatSchema,
    pub week: Option<u32>,
}

impl Scenario {
    pub fn new(config: PipelineConfig, week: Option<u32>) -> Result<Self> {
        let schema = StatSchema::resolve(config.stat_schema_path.as_deref())?;
        Ok(Self {
            config,
            schema,
            week,
        })
    }

    /// Historical seasons followed by the current one, without repeats.
    pub fn seasons(&self) -> Vec<u32> {
        let mut seasons: Vec<u32> = self
            .config
            .historical_seasons()
            .filter(|s| *s != self.config.current_season)
            .collect();
        seasons.push(self.config.current_season);
        seasons
    }

    fn historical_seasons(&self) -> Vec<u32> {
        self.config
            .historical_seasons()
            .filter(|s| *s != self.config.current_season)
            .collect()
    }

    pub fn run_step(&self, step: Step) -> Result<()> {
        let layout = self.config.layout();
        match step {
            Step::Fetch => match self.config.fetch_cmd.as_deref() {
                Some(cmd) => run_external(cmd, &self.config)?,
                None => info!("FETCH_CMD not set; using data already under {}", layout.root().display()),
            },
            Step::Derive => {
                for season in self.seasons() {
                    pipeline::derive_season(&layout, &self.schema, season)?;
                }
            }
            Step::Trends => {
                for season in self.seasons() {
                    pipeline::build_season_trends(&layout, season)?;
                }
            }
            Step::Collate => {
                pipeline::collate_historical(&layout, self.historical_seasons())?;
                pipeline::collate_current(&layout, self.config.current_season)?;
            }
            Step::Train => {
                pipeline::train_model(&layout, &self.config)?;
            }
            Step::Predict => {
                pipeline::predict(&layout, self.week)?;
            }
            Step::Evaluate => {
                pipeline::evaluate_predictions(&layout, &self.config)?;
            }
        }
        Ok(())
    }

    /// Runs `steps` in order and stops at the first failure.
    pub fn run(&self, steps: &[Step]) -> Result<()> {
        for step in steps {
            let started = Instant::now();
            info!("step {} started", step.name());
            self.run_step(*step)
                .with_context(|| format!("step {} failed", step.name()))?;
            info!("step {} finished in {:.1?}", step.name(), started.elapsed());
        }
        Ok(())
    }
}

/// Blocking shell command with the data root exported as OUTPUT_DIR.
pub fn run_external(cmd: &str, config: &PipelineConfig) -> Result<()> {
    info!("running `{cmd}`");
    let status = Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .env("OUTPUT_DIR", &config.output_dir)
        .env("CURRENT_SEASON", config.current_season.to_string())
        .status()
        .with_context(|| format!("spawn `{cmd}`"))?;
    if !status.success() {
        bail!("`{cmd}` exited with {status}");
    }
    Ok(())
}
