//! Cube and rank stages wired to a source, sinks and a renderer
//!
//! The cube stage is all-or-nothing. The rank stage runs every policy
//! independently: one policy failing never stops the others, and a chart
//! failing never undoes the table written before it.

use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;

use crate::config::PipelineConfig;
use crate::data::{self, Cube, DataError, DataFrame, RankPolicy};
use crate::error::{PipelineError, PipelineResult};
use crate::render::{self, ChartRenderer, PngRenderer, HEATMAP_CHART};
use crate::sink::{self, ArtifactSink, FileSink};
use crate::source::{self, FactSource};

/// Outcome of one ranking policy
#[derive(Debug)]
pub struct PolicyOutcome {
    pub policy: String,
    /// Where the ranked table was written
    pub artifact: PipelineResult<PathBuf>,
    /// `None` when charts are off or the policy has no default chart
    pub chart: Option<PipelineResult<PathBuf>>,
}

impl PolicyOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.artifact.is_ok()
    }
}

/// Per-policy outcomes in policy-table order
#[derive(Debug, Default)]
pub struct RankReport {
    pub outcomes: Vec<PolicyOutcome>,
    /// Heatmap of the whole cube, when charts are on
    pub heatmap: Option<PipelineResult<PathBuf>>,
}

impl RankReport {
    /// Policies whose table could not be produced
    pub fn failures(&self) -> impl Iterator<Item = (&str, &PipelineError)> {
        self.outcomes.iter().filter_map(|o| match &o.artifact {
            Ok(_) => None,
            Err(e) => Some((o.policy.as_str(), e)),
        })
    }

    /// Every policy wrote its table; chart failures do not count
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(PolicyOutcome::is_success)
    }

    #[must_use]
    pub fn artifacts(&self) -> Vec<&Path> {
        self.outcomes
            .iter()
            .filter_map(|o| o.artifact.as_ref().ok().map(PathBuf::as_path))
            .collect()
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub cube_path: PathBuf,
    pub cube_rows: usize,
    pub rank: RankReport,
}

impl RunReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.rank.is_success()
    }
}

/// The configured batch
pub struct Pipeline {
    config: PipelineConfig,
    renderer: Box<dyn ChartRenderer>,
}

impl Pipeline {
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            renderer: Box::new(PngRenderer::default()),
        }
    }

    #[must_use]
    pub fn with_renderer(mut self, renderer: impl ChartRenderer + 'static) -> Self {
        self.renderer = Box::new(renderer);
        self
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn cube_sink(&self) -> FileSink {
        FileSink::new(&self.config.paths.olap_output, self.config.output.format)
    }

    fn results_sink(&self) -> FileSink {
        FileSink::new(&self.config.paths.results, self.config.output.format)
    }

    /// Artifact name of the cube: the configured file name without extension
    fn cube_name(&self) -> String {
        Path::new(&self.config.cube.file)
            .file_stem()
            .map_or_else(|| self.config.cube.file.clone(), |s| s.to_string_lossy().into_owned())
    }

    /// Where the cube stage writes, and the rank stage reads by default
    #[must_use]
    pub fn cube_path(&self) -> PathBuf {
        self.cube_sink().path_for(&self.cube_name())
    }

    /// Load facts, derive the calendar and aggregate, without writing
    ///
    /// # Errors
    /// `Source` if the facts cannot be loaded, `Configuration` for a missing
    /// dimension or metric column, `Aggregation` for a numeric metric over
    /// non-numeric data
    pub fn build_cube(&self, facts: &dyn FactSource) -> PipelineResult<Cube> {
        let columns = &self.config.source;
        let facts = source::load_checked(facts, &columns.required_columns())?;

        let facts = data::derive_calendar(&facts, &columns.timestamp_column).map_err(|e| match e {
            DataError::Timestamp { .. } => PipelineError::load_failed("calendar", e),
            other => PipelineError::from_data("calendar", other),
        })?;
        tracing::debug!(columns = ?facts.columns(), "calendar dimensions derived");

        let cube = self
            .config
            .cube_builder()
            .build(&facts)
            .map_err(|e| PipelineError::from_data("cube", e))?;
        tracing::info!(
            rows = cube.row_count(),
            dimensions = ?cube.dimensions(),
            "OLAP cube created"
        );
        Ok(cube)
    }

    /// Build the cube from the configured source and write it
    ///
    /// # Errors
    /// Any `build_cube` error, or `Sink` if the cube cannot be written
    pub fn cube_stage(&self) -> PipelineResult<(Cube, PathBuf)> {
        let started = Instant::now();
        let facts = source::from_config(&self.config)?;
        let cube = self.build_cube(facts.as_ref())?;
        let path = self.cube_sink().write(&self.cube_name(), cube.frame())?;
        tracing::info!(elapsed_ms = started.elapsed().as_millis(), "cube stage done");
        Ok((cube, path))
    }

    /// Read a cube artifact back for ranking
    ///
    /// # Errors
    /// Returns `Source` if the file is missing or unreadable
    pub fn load_cube(&self, path: Option<&Path>) -> PipelineResult<DataFrame> {
        let path = path.map_or_else(|| self.cube_path(), Path::to_path_buf);
        let origin = || path.display().to_string();
        if !path.is_file() {
            return Err(PipelineError::load_failed(origin(), "cube artifact does not exist"));
        }
        let cube = sink::read_artifact(&path).map_err(|e| PipelineError::load_failed(origin(), e))?;
        tracing::info!(rows = cube.num_rows(), path = %path.display(), "cube loaded");
        Ok(cube)
    }

    /// Run `policies` over `cube` in parallel
    ///
    /// Tables are written as each policy finishes; outcomes are reported in
    /// the order of `policies`.
    pub fn rank_stage(&self, cube: &DataFrame, policies: &[RankPolicy]) -> RankReport {
        let results = self.results_sink();
        let outcomes: Vec<PolicyOutcome> = policies
            .par_iter()
            .map(|policy| self.run_policy(cube, policy, &results))
            .collect();

        for outcome in &outcomes {
            match &outcome.artifact {
                Ok(path) => {
                    tracing::info!(policy = %outcome.policy, path = %path.display(), "ranking saved");
                }
                Err(e) => tracing::error!(policy = %outcome.policy, error = %e, "ranking failed"),
            }
        }

        let heatmap = self.config.output.charts.then(|| {
            let path = results.dir().join(format!("{HEATMAP_CHART}.png"));
            self.draw(cube, &render::heatmap_chart(), path)
        });

        RankReport { outcomes, heatmap }
    }

    fn run_policy(&self, cube: &DataFrame, policy: &RankPolicy, sink: &FileSink) -> PolicyOutcome {
        let stage = format!("rank:{}", policy.name());
        let (table, artifact) = match data::extract(cube, policy) {
            Ok(table) => {
                tracing::debug!(policy = policy.name(), rows = table.num_rows(), "policy ranked");
                let artifact = sink.write(policy.name(), &table);
                (Some(table), artifact)
            }
            Err(e) => (None, Err(PipelineError::from_data(stage, e))),
        };

        let chart = match (&table, &artifact) {
            (Some(table), Ok(_)) if self.config.output.charts => {
                render::policy_chart(policy.name()).map(|spec| {
                    let path = sink.dir().join(format!("{}.png", policy.name()));
                    self.draw(table, &spec, path)
                })
            }
            _ => None,
        };

        PolicyOutcome {
            policy: policy.name().to_string(),
            artifact,
            chart,
        }
    }

    fn draw(&self, table: &DataFrame, spec: &render::ChartSpec, path: PathBuf) -> PipelineResult<PathBuf> {
        match self.renderer.render(table, spec, &path) {
            Ok(()) => Ok(path),
            Err(e) => {
                tracing::warn!(chart = %spec.title, error = %e, "chart skipped");
                Err(e)
            }
        }
    }

    /// Cube stage, then every configured policy over the fresh cube
    ///
    /// # Errors
    /// Returns the cube stage error; rank failures are in the report
    pub fn run(&self) -> PipelineResult<RunReport> {
        let policies = self.config.policies()?;
        let (cube, cube_path) = self.cube_stage()?;
        let rank = self.rank_stage(cube.frame(), &policies);
        Ok(RunReport {
            cube_path,
            cube_rows: cube.row_count(),
            rank,
        })
    }
}
