/// Error taxonomy for analysis runs.
///
/// Fatal configuration errors abort a run and surface as `AnalysisError`.
/// Failures inside a single module (a handler that errors or panics, a
/// statistic that cannot be computed) are recovered where they happen and
/// reported as `Diagnostic`s next to the normal result.
use crate::{
    event::{Event, EventKind},
    filter::FilterError,
    module::ModuleId,
    run::RunState,
};
use serde::Serialize;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

// ---------------------------------------------------------------------------
// Fatal errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("cyclic module dependency: {}", render_cycle(.cycle))]
    CyclicDependency { cycle: Vec<ModuleId> },

    #[error("module '{module}' registered an unfilterable handler ({filter}): {reason}")]
    UnfilterableRegistration {
        module: ModuleId,
        filter: String,
        #[source]
        reason: FilterError,
    },

    #[error("unknown module '{id}'{}", .required_by.map(|m| format!(" (required by '{}')", m)).unwrap_or_default())]
    UnknownModule { id: String, required_by: Option<ModuleId> },

    #[error("module '{0}' is already registered in the catalog")]
    DuplicateModule(ModuleId),

    #[error("module '{module}' failed to construct: {source:#}")]
    ModuleConstruction {
        module: ModuleId,
        #[source]
        source: anyhow::Error,
    },

    #[error("run is {actual:?}, expected {expected:?}")]
    InvalidState { expected: RunState, actual: RunState },

    #[error("event stream has {actual} events, budget is {limit}")]
    EventBudgetExceeded { limit: usize, actual: usize },

    #[error("run exceeded its wall-clock budget of {budget_ms}ms")]
    Timeout { budget_ms: u64 },

    #[error("run aborted: {0}")]
    Aborted(String),
}

fn render_cycle(cycle: &[ModuleId]) -> String {
    cycle.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(" -> ")
}

// ---------------------------------------------------------------------------
// Recovered failures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    HandlerFailure,
    AggregationFailure,
}

/// Where in the module's lifecycle the failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Handler,
    Finish,
    Statistic,
    Suggestions,
    Views,
}

impl Stage {
    pub fn failure_kind(self) -> FailureKind {
        match self {
            Stage::Handler | Stage::Finish => FailureKind::HandlerFailure,
            Stage::Statistic | Stage::Suggestions | Stage::Views => FailureKind::AggregationFailure,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EventRef {
    pub index:     u32,
    pub timestamp: u64,
    pub kind:      EventKind,
}

impl From<&Event> for EventRef {
    fn from(e: &Event) -> Self {
        Self { index: e.index, timestamp: e.timestamp, kind: e.kind }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind:   FailureKind,
    pub stage:  Stage,
    pub module: ModuleId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event:  Option<EventRef>,
    pub cause:  String,
}

impl Diagnostic {
    pub fn new(stage: Stage, module: ModuleId, event: Option<&Event>, cause: String) -> Self {
        Self {
            kind: stage.failure_kind(),
            stage,
            module,
            event: event.map(EventRef::from),
            cause,
        }
    }
}

// ---------------------------------------------------------------------------
// Isolation
// ---------------------------------------------------------------------------

/// Run module code, turning both returned errors and panics into a cause
/// string. Module state touched before the failure stays as it was left.
pub(crate) fn isolate<T>(f: impl FnOnce() -> anyhow::Result<T>) -> Result<T, String> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(format!("{:#}", e)),
        Err(payload) => Err(format!("panic: {}", panic_message(payload.as_ref()))),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isolate_passes_values_through() {
        assert_eq!(isolate(|| Ok(3)), Ok(3));
    }

    #[test]
    fn isolate_reports_errors_with_context() {
        let r: Result<(), String> = isolate(|| {
            Err(anyhow::anyhow!("inner")).map_err(|e| e.context("outer"))
        });
        assert_eq!(r, Err("outer: inner".to_owned()));
    }

    #[test]
    fn isolate_catches_panics() {
        let r: Result<(), String> = isolate(|| panic!("boom {}", 7));
        assert_eq!(r, Err("panic: boom 7".to_owned()));
    }

    #[test]
    fn cycle_error_names_members() {
        let e = AnalysisError::CyclicDependency {
            cycle: vec![ModuleId::new("a"), ModuleId::new("b"), ModuleId::new("a")],
        };
        assert_eq!(e.to_string(), "cyclic module dependency: a -> b -> a");
    }

    #[test]
    fn stage_maps_to_taxonomy() {
        assert_eq!(Stage::Finish.failure_kind(), FailureKind::HandlerFailure);
        assert_eq!(Stage::Views.failure_kind(), FailureKind::AggregationFailure);
    }
}
