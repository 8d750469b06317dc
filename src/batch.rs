/// Batch runner: many independent runs in parallel under one tokio runtime.
///
/// Each job gets its own `AnalysisRun` on a blocking thread (module state is
/// single-threaded and never crosses threads). The wall-clock budget is
/// enforced here, outside the run: a job that overruns it is reported as
/// `Timeout` and its eventual result is discarded. Other jobs are unaffected.
use crate::{
    config::AnalysisConfig,
    context::RunContext,
    error::AnalysisError,
    event::EventStream,
    format::Formatter,
    report::AnalysisResult,
    resolver::ModuleCatalog,
    run::AnalysisRun,
    threshold::ThresholdOverrides,
};
use std::sync::Arc;
use std::time::Duration;

pub struct AnalysisJob {
    /// Shown in logs and copied to the outcome (usually the input path).
    pub label:   String,
    pub context: RunContext,
    pub stream:  EventStream,
    pub modules: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RunLimits {
    pub max_events: usize,
    pub timeout:    Duration,
    pub thresholds: ThresholdOverrides,
}

impl RunLimits {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            max_events: config.max_events,
            timeout:    Duration::from_secs(config.run_timeout_secs),
            thresholds: config.thresholds.clone(),
        }
    }
}

#[derive(Debug)]
pub struct JobOutcome {
    pub label:  String,
    pub result: Result<AnalysisResult, AnalysisError>,
}

/// Run every job; outcomes come back in job order.
pub async fn analyze_batch(
    jobs: Vec<AnalysisJob>,
    catalog: Arc<ModuleCatalog>,
    formatter: Arc<dyn Formatter + Send + Sync>,
    limits: RunLimits,
) -> Vec<JobOutcome> {
    tracing::info!("Starting batch of {} run(s)", jobs.len());

    let mut handles = Vec::with_capacity(jobs.len());
    for job in jobs {
        let label = job.label.clone();
        let handle = tokio::spawn(run_job(job, Arc::clone(&catalog), Arc::clone(&formatter), limits.clone()));
        handles.push((label, handle));
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for (label, handle) in handles {
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => Err(AnalysisError::Aborted(format!("run task failed: {}", e))),
        };
        match &result {
            Ok(r) => tracing::info!("{}: {} statistic(s), {} suggestion(s)", label, r.statistics.len(), r.suggestions.len()),
            Err(e) => tracing::warn!("{}: {}", label, e),
        }
        outcomes.push(JobOutcome { label, result });
    }
    outcomes
}

async fn run_job(
    job: AnalysisJob,
    catalog: Arc<ModuleCatalog>,
    formatter: Arc<dyn Formatter + Send + Sync>,
    limits: RunLimits,
) -> Result<AnalysisResult, AnalysisError> {
    let timeout = limits.timeout;

    let task = tokio::task::spawn_blocking(move || {
        AnalysisRun::new(job.context)
            .with_event_budget(limits.max_events)
            .with_threshold_overrides(limits.thresholds)
            .execute(&catalog, job.modules.as_slice(), &job.stream, formatter.as_ref())
    });

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join)) => Err(AnalysisError::Aborted(format!("run panicked: {}", join))),
        Err(_) => Err(AnalysisError::Timeout { budget_ms: timeout.as_millis() as u64 }),
    }
}
