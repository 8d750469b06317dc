/// Combat log analysis engine.
///
/// One run feeds a fight's normalized events through a set of pluggable
/// analysis modules and collects their statistics, suggestions and views:
///
///   RawRecord[] / combat log text
///        │  EventStream::normalize / CombatLogReader
///        ▼
///   EventStream ──▶ Dispatcher ──▶ module handlers (by kind, filter, priority)
///                                      │
///   DependencyResolver ── builds ──────┘
///        ▲
///   ModuleCatalog (modules::builtin)
///
/// After the last event each module is asked for its statistic, suggestions
/// and views, which are rendered through a `Formatter` into an
/// `AnalysisResult`.
pub mod abilities;
pub mod batch;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod filter;
pub mod format;
pub mod logging;
pub mod module;
pub mod modules;
pub mod parser;
pub mod report;
pub mod resolver;
pub mod run;
pub mod specs;
pub mod threshold;

pub use context::RunContext;
pub use error::{AnalysisError, Diagnostic};
pub use event::{Event, EventKind, EventStream, RawRecord};
pub use format::{CatalogFormatter, Formatter};
pub use module::{Module, ModuleDescriptor, ModuleId};
pub use report::AnalysisResult;
pub use resolver::ModuleCatalog;
pub use run::{AnalysisRun, RunState};
