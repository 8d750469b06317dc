/// Event dispatcher: the compiled filter → handler index.
///
/// Registrations are bucketed by event kind at registration time. Each
/// bucket stays sorted by (priority, registration sequence), so dispatching
/// an event only walks the handlers for its own kind and evaluates their
/// residual checks.
///
/// Handlers are isolated: an error or panic is recorded as a `Diagnostic`
/// and delivery continues with the next handler.
use crate::{
    context::RunContext,
    error::{isolate, AnalysisError, Diagnostic, Stage},
    event::{Event, EventKind},
    filter::{CompiledFilter, Filter},
    module::{Handler, ModuleId},
};
use std::collections::HashMap;

struct Registration {
    module:   ModuleId,
    priority: i32,
    sequence: u64,
    matcher:  CompiledFilter,
    handler:  Handler,
}

#[derive(Default)]
pub struct Dispatcher {
    index:      HashMap<EventKind, Vec<Registration>>,
    next_seq:   u64,
    failures:   Vec<Diagnostic>,
    dispatched: usize,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile `filter` against the run and add it to its kind's bucket.
    /// A filter that does not pin exactly one kind is rejected.
    pub fn register(
        &mut self,
        module: ModuleId,
        filter: &Filter,
        priority: i32,
        handler: Handler,
        ctx: &RunContext,
    ) -> Result<(), AnalysisError> {
        let matcher = filter.compile(ctx).map_err(|reason| AnalysisError::UnfilterableRegistration {
            module,
            filter: filter.to_string(),
            reason,
        })?;

        let sequence = self.next_seq;
        self.next_seq += 1;

        tracing::debug!("Registered {} for '{}' (priority {})", filter, module, priority);

        let bucket = self.index.entry(matcher.kind()).or_default();
        // Insert after every entry with priority <= ours: keeps the bucket
        // sorted without re-sorting, and later sequence numbers land last.
        let at = bucket.partition_point(|r| r.priority <= priority);
        bucket.insert(at, Registration { module, priority, sequence, matcher, handler });
        Ok(())
    }

    /// Deliver one event to every matching handler in order. Returns how
    /// many handlers were invoked (including ones that failed).
    pub fn dispatch(&mut self, event: &Event) -> usize {
        self.dispatched += 1;
        let Some(bucket) = self.index.get_mut(&event.kind) else {
            return 0;
        };

        let mut invoked = 0;
        for reg in bucket.iter_mut() {
            if !reg.matcher.matches(event) {
                continue;
            }
            invoked += 1;
            if let Err(cause) = isolate(|| (reg.handler)(event)) {
                tracing::warn!(
                    "Handler of '{}' failed on {} #{} at {}ms: {}",
                    reg.module, event.kind, event.index, event.timestamp, cause
                );
                self.failures.push(Diagnostic::new(Stage::Handler, reg.module, Some(event), cause));
            }
        }
        invoked
    }

    pub fn take_failures(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.failures)
    }

    /// Total registrations across all kinds.
    pub fn len(&self) -> usize {
        self.index.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Events passed to `dispatch` so far.
    pub fn dispatched(&self) -> usize {
        self.dispatched
    }

    /// (module, priority, sequence) of the registrations for `kind`, in
    /// dispatch order.
    pub fn registrations_for(&self, kind: EventKind) -> Vec<(ModuleId, i32, u64)> {
        self.index
            .get(&kind)
            .map(|bucket| bucket.iter().map(|r| (r.module, r.priority, r.sequence)).collect())
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Fight;
    use crate::event::{AbilityId, ActorId};
    use crate::filter::{FilterError, Role};
    use crate::module::HandlerResult;
    use std::cell::RefCell;
    use std::rc::Rc;

    const ME: ActorId = ActorId(1);

    fn ctx() -> RunContext {
        RunContext::new(ME, Fight { id: 1, name: String::new(), start_ms: 0, end_ms: 1_000, boss: None })
    }

    fn recorder(log: &Rc<RefCell<Vec<&'static str>>>, name: &'static str) -> Handler {
        let log = Rc::clone(log);
        Box::new(move |_: &Event| -> HandlerResult {
            log.borrow_mut().push(name);
            Ok(())
        })
    }

    #[test]
    fn rejects_unpinned_filter() {
        let mut d = Dispatcher::new();
        let err = d
            .register(ModuleId::new("m"), &Filter::by_source(Role::Selected), 0, Box::new(|_: &Event| -> HandlerResult { Ok(()) }), &ctx())
            .unwrap_err();
        match err {
            AnalysisError::UnfilterableRegistration { module, reason, .. } => {
                assert_eq!(module.as_str(), "m");
                assert_eq!(reason, FilterError::Unpinned);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(d.is_empty());
    }

    #[test]
    fn only_same_kind_handlers_run() {
        let ctx = ctx();
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut d = Dispatcher::new();
        d.register(ModuleId::new("heal"), &Filter::heal(), 0, recorder(&log, "heal"), &ctx).unwrap();
        d.register(ModuleId::new("cast"), &Filter::cast(), 0, recorder(&log, "cast"), &ctx).unwrap();

        assert_eq!(d.dispatch(&Event::new(EventKind::Heal, 0)), 1);
        assert_eq!(d.dispatch(&Event::new(EventKind::Damage, 1)), 0);
        assert_eq!(*log.borrow(), vec!["heal"]);
        assert_eq!(d.dispatched(), 2);
    }

    #[test]
    fn residual_checks_filter_within_kind() {
        let ctx = ctx();
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut d = Dispatcher::new();
        let f = Filter::heal().by(Role::Selected).ability(AbilityId(5));
        d.register(ModuleId::new("m"), &f, 0, recorder(&log, "m"), &ctx).unwrap();

        d.dispatch(&Event::new(EventKind::Heal, 0).by(ME).ability(AbilityId(5)));
        d.dispatch(&Event::new(EventKind::Heal, 0).by(ActorId(2)).ability(AbilityId(5)));
        d.dispatch(&Event::new(EventKind::Heal, 0).by(ME).ability(AbilityId(6)));
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn priority_then_registration_order() {
        let ctx = ctx();
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut d = Dispatcher::new();
        d.register(ModuleId::new("a"), &Filter::heal(), 0, recorder(&log, "a"), &ctx).unwrap();
        d.register(ModuleId::new("b"), &Filter::heal(), -5, recorder(&log, "b"), &ctx).unwrap();
        d.register(ModuleId::new("c"), &Filter::heal(), 0, recorder(&log, "c"), &ctx).unwrap();
        d.register(ModuleId::new("d"), &Filter::heal(), 10, recorder(&log, "d"), &ctx).unwrap();

        d.dispatch(&Event::new(EventKind::Heal, 0));
        assert_eq!(*log.borrow(), vec!["b", "a", "c", "d"]);

        let seqs: Vec<u64> = d.registrations_for(EventKind::Heal).iter().map(|r| r.2).collect();
        assert_eq!(seqs, vec![1, 0, 2, 3]);
    }

    #[test]
    fn failing_handlers_are_isolated() {
        let ctx = ctx();
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut d = Dispatcher::new();
        d.register(ModuleId::new("errs"), &Filter::heal(), 0, Box::new(|_: &Event| -> HandlerResult { anyhow::bail!("bad data") }), &ctx)
            .unwrap();
        d.register(ModuleId::new("panics"), &Filter::heal(), 0, Box::new(|_: &Event| -> HandlerResult { panic!("oops") }), &ctx)
            .unwrap();
        d.register(ModuleId::new("ok"), &Filter::heal(), 0, recorder(&log, "ok"), &ctx).unwrap();

        assert_eq!(d.dispatch(&Event::new(EventKind::Heal, 7)), 3);
        assert_eq!(d.dispatch(&Event::new(EventKind::Heal, 8)), 3);
        assert_eq!(*log.borrow(), vec!["ok", "ok"]);

        let failures = d.take_failures();
        assert_eq!(failures.len(), 4);
        assert_eq!(failures[0].module.as_str(), "errs");
        assert_eq!(failures[0].cause, "bad data");
        assert_eq!(failures[1].cause, "panic: oops");
        assert_eq!(failures[0].event.map(|e| e.timestamp), Some(7));
        assert!(d.take_failures().is_empty());
    }
}
