/// One analysis run: a single forward pass over one fight for one actor.
///
///   Initializing --initialize--> Dispatching --dispatch--> Aggregating
///       --aggregate--> Complete
///
/// Any fatal error moves the run to `Failed`. Driving a run from the wrong
/// state returns `InvalidState`; a completed run only hands out its result.
use crate::{
    context::RunContext,
    dispatcher::Dispatcher,
    error::{isolate, AnalysisError, Diagnostic, Stage},
    event::EventStream,
    format::Formatter,
    module::{Instance, Module},
    report::{AnalysisResult, InactiveModule, StatisticEntry, SuggestionEntry, ViewEntry},
    resolver::{ActiveModule, DependencyResolver, ModuleCatalog},
    threshold::{SuggestionCollector, ThresholdOverrides},
};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Initializing,
    Dispatching,
    Aggregating,
    Complete,
    Failed,
}

pub struct AnalysisRun {
    context:      RunContext,
    state:        RunState,
    dispatcher:   Dispatcher,
    modules:      Vec<ActiveModule>,
    inactive:     Vec<InactiveModule>,
    diagnostics:  Vec<Diagnostic>,
    event_budget: Option<usize>,
    overrides:    ThresholdOverrides,
    result:       Option<AnalysisResult>,
}

impl AnalysisRun {
    pub fn new(context: RunContext) -> Self {
        Self {
            context,
            state: RunState::Initializing,
            dispatcher: Dispatcher::new(),
            modules: Vec::new(),
            inactive: Vec::new(),
            diagnostics: Vec::new(),
            event_budget: None,
            overrides: ThresholdOverrides::new(),
            result: None,
        }
    }

    /// Refuse to dispatch streams longer than `limit` events.
    pub fn with_event_budget(mut self, limit: usize) -> Self {
        self.event_budget = Some(limit);
        self
    }

    pub fn with_threshold_overrides(mut self, overrides: ThresholdOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    /// Available once the run is `Complete`.
    pub fn result(&self) -> Option<&AnalysisResult> {
        self.result.as_ref()
    }

    /// Typed read access to an active module's state.
    pub fn module<T: Module>(&self, id: &str) -> Option<Instance<T>> {
        self.modules
            .iter()
            .find(|m| m.id.as_str() == id)
            .and_then(|m| m.handle.downcast::<T>())
    }

    pub fn registrations(&self) -> usize {
        self.dispatcher.len()
    }

    fn expect(&self, expected: RunState) -> Result<(), AnalysisError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(AnalysisError::InvalidState { expected, actual: self.state })
        }
    }

    fn fail(&mut self, err: AnalysisError) -> AnalysisError {
        tracing::warn!("Run for {} failed in {:?}: {}", self.context.selected, self.state, err);
        self.state = RunState::Failed;
        err
    }

    // -----------------------------------------------------------------------
    // Initializing
    // -----------------------------------------------------------------------

    /// Resolve and build the requested modules, then register their filters.
    pub fn initialize<S: AsRef<str>>(&mut self, catalog: &ModuleCatalog, requested: &[S]) -> Result<(), AnalysisError> {
        self.expect(RunState::Initializing)?;

        let resolved = match DependencyResolver::new(catalog).resolve(requested, &self.context) {
            Ok(r) => r,
            Err(e) => return Err(self.fail(e)),
        };

        for (module, pending) in resolved.registrations {
            if let Err(e) = self.dispatcher.register(module, &pending.filter, pending.priority, pending.handler, &self.context) {
                return Err(self.fail(e));
            }
        }

        self.modules = resolved.active;
        self.inactive = resolved.inactive;
        self.state = RunState::Dispatching;

        tracing::info!(
            "Run for {} on fight {}: {} active module(s), {} inactive, {} registration(s)",
            self.context.selected,
            self.context.fight.id,
            self.modules.len(),
            self.inactive.len(),
            self.dispatcher.len()
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Dispatching
    // -----------------------------------------------------------------------

    /// Deliver every event exactly once, in stream order, then let each
    /// module close its open accumulations.
    pub fn dispatch(&mut self, stream: &EventStream) -> Result<(), AnalysisError> {
        self.expect(RunState::Dispatching)?;

        if let Some(limit) = self.event_budget {
            if stream.len() > limit {
                let err = AnalysisError::EventBudgetExceeded { limit, actual: stream.len() };
                return Err(self.fail(err));
            }
        }

        for event in stream {
            self.dispatcher.dispatch(event);
        }
        self.diagnostics.extend(self.dispatcher.take_failures());

        for active in &self.modules {
            let ctx = &self.context;
            let outcome = match active.handle.module().try_borrow_mut() {
                Ok(mut module) => isolate(|| module.finish(ctx)),
                Err(_) => Err("module state is still borrowed".to_owned()),
            };
            if let Err(cause) = outcome {
                tracing::warn!("Module '{}' failed to finish: {}", active.id, cause);
                self.diagnostics.push(Diagnostic::new(Stage::Finish, active.id, None, cause));
            }
        }

        tracing::info!(
            "Dispatched {} event(s) ({} skipped at normalization), {} handler failure(s)",
            stream.len(),
            stream.skipped(),
            self.diagnostics.len()
        );
        self.state = RunState::Aggregating;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Aggregating
    // -----------------------------------------------------------------------

    /// Pull statistics, suggestions and views from every active module and
    /// assemble the result.
    pub fn aggregate(&mut self, formatter: &dyn Formatter) -> Result<&AnalysisResult, AnalysisError> {
        self.expect(RunState::Aggregating)?;

        let ctx = &self.context;
        let mut result = AnalysisResult {
            active_modules: self.modules.iter().map(|m| m.id).collect(),
            inactive_modules: self.inactive.clone(),
            events_dispatched: self.dispatcher.dispatched(),
            ..AnalysisResult::default()
        };
        let mut failures = Vec::new();

        for active in &self.modules {
            let id = active.id;
            let Ok(module) = active.handle.module().try_borrow() else {
                failures.push(Diagnostic::new(Stage::Statistic, id, None, "module state is still borrowed".to_owned()));
                continue;
            };

            match isolate(|| module.statistic(ctx)) {
                Ok(Some(stat)) => result.statistics.push(StatisticEntry::render(id, &stat, formatter)),
                Ok(None) => {}
                Err(cause) => failures.push(Diagnostic::new(Stage::Statistic, id, None, cause)),
            }

            let mut collector = SuggestionCollector::new(id, ctx, formatter, self.overrides.get(id.as_str()));
            match isolate(|| module.suggestions(&mut collector)) {
                Ok(()) => result.suggestions.extend(
                    collector
                        .into_suggestions()
                        .into_iter()
                        .map(|suggestion| SuggestionEntry { module: id, suggestion }),
                ),
                Err(cause) => failures.push(Diagnostic::new(Stage::Suggestions, id, None, cause)),
            }

            match isolate(|| module.views(ctx)) {
                Ok(views) => result.views.extend(views.iter().map(|v| ViewEntry::render(id, v, formatter))),
                Err(cause) => failures.push(Diagnostic::new(Stage::Views, id, None, cause)),
            }
        }

        for failure in &failures {
            tracing::warn!("Module '{}' failed in {:?}: {}", failure.module, failure.stage, failure.cause);
        }

        result.diagnostics = std::mem::take(&mut self.diagnostics);
        result.diagnostics.extend(failures);
        result.sort();

        tracing::info!(
            "Run complete: {} statistic(s), {} suggestion(s), {} view(s), {} diagnostic(s)",
            result.statistics.len(),
            result.suggestions.len(),
            result.views.len(),
            result.diagnostics.len()
        );

        self.state = RunState::Complete;
        Ok(self.result.insert(result))
    }

    /// Drive a fresh run through every state and hand back its result.
    pub fn execute<S: AsRef<str>>(
        mut self,
        catalog: &ModuleCatalog,
        requested: &[S],
        stream: &EventStream,
        formatter: &dyn Formatter,
    ) -> Result<AnalysisResult, AnalysisError> {
        self.initialize(catalog, requested)?;
        self.dispatch(stream)?;
        self.aggregate(formatter)?;
        self.result
            .take()
            .ok_or(AnalysisError::InvalidState { expected: RunState::Complete, actual: self.state })
    }
}
