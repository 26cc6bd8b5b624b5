//! Turning configuration into the jobs of one run.

use crate::config::{AnalysisConfig, ConfigError, JobConfig};
use crate::lifecycle::DurationPolicy;
use crate::logging::job_span;
use crate::probe::SampleSource;
use crate::report::SvgReportRenderer;
use crate::scheduler::SamplingJob;
use crate::storage::{RecordTable, RunLayout, RunTables, Sample, SampleKind};

/// Validated description of a run: which jobs, where they write, how long.
///
/// Building a plan touches no files, so a configuration error leaves no
/// trace on disk.
#[derive(Debug, Clone)]
pub struct RunPlan {
    layout: RunLayout,
    policy: DurationPolicy,
    jobs: Vec<JobConfig>,
    xtick_interval: usize,
}

impl RunPlan {
    /// Validate `analysis` and plan a run laid out as `layout`.
    ///
    /// # Errors
    /// Returns `ConfigError::NoAnalysisSelected` when no kind is enabled, or
    /// any other validation error of the analysis settings.
    pub fn new(analysis: &AnalysisConfig, layout: RunLayout) -> Result<Self, ConfigError> {
        analysis.validate()?;

        let jobs = analysis
            .job_configs()
            .into_iter()
            .filter(|j| j.enabled)
            .collect();

        Ok(Self {
            layout,
            policy: analysis.duration_policy(),
            jobs,
            xtick_interval: analysis.xtick_interval,
        })
    }

    pub fn layout(&self) -> &RunLayout {
        &self.layout
    }

    pub fn policy(&self) -> DurationPolicy {
        self.policy
    }

    /// Enabled kinds, in registration order.
    pub fn kinds(&self) -> Vec<SampleKind> {
        self.jobs.iter().map(|j| j.kind).collect()
    }

    pub fn is_enabled(&self, kind: SampleKind) -> bool {
        self.jobs.iter().any(|j| j.kind == kind)
    }

    /// Record tables of the enabled kinds.
    pub fn tables(&self) -> RunTables {
        self.layout.tables(self.kinds())
    }

    /// Bind `source` to its record table, cadence and log span.
    ///
    /// Returns `None` if the source's kind is not part of this run.
    pub fn bind<S: SampleSource>(&self, source: S) -> Option<SamplingJob<S>> {
        let kind = S::Sample::KIND;
        let job = self.jobs.iter().find(|j| j.kind == kind)?;
        let table = RecordTable::new(self.layout.table_path(kind));

        Some(SamplingJob::new(source, table, job.cadence()).with_span(job_span(kind)))
    }

    /// Report renderer writing next to the record tables.
    pub fn renderer(&self) -> SvgReportRenderer {
        SvgReportRenderer::new(self.layout.clone(), self.xtick_interval)
    }
}
