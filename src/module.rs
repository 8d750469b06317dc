/// The module contract.
///
/// A module is any `Module` value plus a `ModuleDescriptor` naming its
/// dependencies and a factory. The factory gets a `Setup`: it reads the run
/// context, picks up its dependencies (the single shared instance of each),
/// installs its own state and registers (filter, handler) pairs against it.
/// It finally returns `Built::Active` or `Built::Inactive`; registrations of
/// an inactive module never reach the dispatcher.
///
/// State lives behind `Rc<RefCell<_>>`. Handlers get `&mut` access to their
/// own module only; other modules see a dependency through `Instance::borrow`.
use crate::{
    context::RunContext,
    event::Event,
    filter::Filter,
    report::{Statistic, View},
    threshold::SuggestionCollector,
};
use anyhow::anyhow;
use serde::Serialize;
use std::any::Any;
use std::cell::{Ref, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

pub type HandlerResult = anyhow::Result<()>;

pub(crate) type Handler = Box<dyn FnMut(&Event) -> HandlerResult>;

// ---------------------------------------------------------------------------
// Identity & descriptors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ModuleId(&'static str);

impl ModuleId {
    pub const fn new(id: &'static str) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// A named slot filled with another module's instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dependency {
    pub slot:   &'static str,
    pub module: ModuleId,
}

impl Dependency {
    pub const fn new(slot: &'static str, module: ModuleId) -> Self {
        Self { slot, module }
    }
}

pub type Factory = fn(&mut Setup<'_>) -> anyhow::Result<Built>;

#[derive(Clone, Copy)]
pub struct ModuleDescriptor {
    pub id:           ModuleId,
    /// Declaration order matters: it breaks ties in construction order.
    pub dependencies: &'static [Dependency],
    pub factory:      Factory,
}

impl ModuleDescriptor {
    pub const fn new(id: ModuleId, dependencies: &'static [Dependency], factory: Factory) -> Self {
        Self { id, dependencies, factory }
    }
}

impl fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("id", &self.id)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Module trait
// ---------------------------------------------------------------------------

/// Pull-phase accessors. Every method has a no-op default, so a module only
/// implements what it produces.
pub trait Module: 'static {
    /// Called once after the last event, before any accessor.
    fn finish(&mut self, _ctx: &RunContext) -> HandlerResult {
        Ok(())
    }

    fn statistic(&self, _ctx: &RunContext) -> anyhow::Result<Option<Statistic>> {
        Ok(None)
    }

    fn suggestions(&self, _when: &mut SuggestionCollector<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn views(&self, _ctx: &RunContext) -> anyhow::Result<Vec<View>> {
        Ok(Vec::new())
    }
}

/// Shared, read-only view of a module's state.
pub struct Instance<T>(Rc<RefCell<T>>);

impl<T> Clone for Instance<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T: Module> Instance<T> {
    /// Panics only if called from inside this module's own handler, which
    /// already holds the mutable borrow.
    pub fn borrow(&self) -> Ref<'_, T> {
        self.0.borrow()
    }
}

/// Type-erased handle to one constructed module.
#[derive(Clone)]
pub struct ModuleHandle {
    module: Rc<RefCell<dyn Module>>,
    any:    Rc<dyn Any>,
}

impl ModuleHandle {
    pub(crate) fn module(&self) -> &Rc<RefCell<dyn Module>> {
        &self.module
    }

    pub(crate) fn erased(&self) -> Rc<dyn Any> {
        Rc::clone(&self.any)
    }

    pub fn downcast<T: Module>(&self) -> Option<Instance<T>> {
        Rc::clone(&self.any).downcast::<RefCell<T>>().ok().map(Instance)
    }
}

impl fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ModuleHandle")
    }
}

#[derive(Debug)]
pub enum Built {
    Active(ModuleHandle),
    Inactive(String),
}

impl Built {
    pub fn inactive(reason: impl Into<String>) -> Self {
        Self::Inactive(reason.into())
    }
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

pub(crate) struct PendingRegistration {
    pub filter:   Filter,
    pub priority: i32,
    pub handler:  Handler,
}

pub struct Setup<'a> {
    module:       ModuleId,
    context:      &'a RunContext,
    dependencies: HashMap<&'static str, Rc<dyn Any>>,
    pending:      Vec<PendingRegistration>,
}

impl<'a> Setup<'a> {
    pub(crate) fn new(
        module: ModuleId,
        context: &'a RunContext,
        dependencies: HashMap<&'static str, Rc<dyn Any>>,
    ) -> Self {
        Self { module, context, dependencies, pending: Vec::new() }
    }

    pub fn context(&self) -> &'a RunContext {
        self.context
    }

    pub fn module_id(&self) -> ModuleId {
        self.module
    }

    /// The instance filling `slot`. Every dependent of the same module gets
    /// the same instance.
    pub fn dependency<T: Module>(&self, slot: &str) -> anyhow::Result<Instance<T>> {
        let any = self
            .dependencies
            .get(slot)
            .cloned()
            .ok_or_else(|| anyhow!("module '{}' has no dependency slot '{}'", self.module, slot))?;
        any.downcast::<RefCell<T>>().map(Instance).map_err(|_| {
            anyhow!(
                "dependency slot '{}' of '{}' does not hold a {}",
                slot,
                self.module,
                std::any::type_name::<T>()
            )
        })
    }

    pub fn install<T: Module>(&mut self, module: T) -> Instance<T> {
        Instance(Rc::new(RefCell::new(module)))
    }

    /// Register `handler` for events matching `filter`, at default priority.
    pub fn on<T, F>(&mut self, instance: &Instance<T>, filter: Filter, handler: F)
    where
        T: Module,
        F: FnMut(&mut T, &Event) -> HandlerResult + 'static,
    {
        self.on_with_priority(instance, filter, 0, handler);
    }

    /// Lower priority runs first; equal priorities run in registration order.
    pub fn on_with_priority<T, F>(&mut self, instance: &Instance<T>, filter: Filter, priority: i32, mut handler: F)
    where
        T: Module,
        F: FnMut(&mut T, &Event) -> HandlerResult + 'static,
    {
        let cell = Rc::clone(&instance.0);
        let module = self.module;
        self.pending.push(PendingRegistration {
            filter,
            priority,
            handler: Box::new(move |event| {
                let mut state = cell
                    .try_borrow_mut()
                    .map_err(|_| anyhow!("state of '{}' is already borrowed", module))?;
                handler(&mut state, event)
            }),
        });
    }

    pub fn activate<T: Module>(&self, instance: Instance<T>) -> Built {
        let module: Rc<RefCell<dyn Module>> = instance.0.clone();
        let any: Rc<dyn Any> = instance.0;
        Built::Active(ModuleHandle { module, any })
    }

    pub(crate) fn into_pending(self) -> Vec<PendingRegistration> {
        self.pending
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Fight;
    use crate::event::{ActorId, EventKind};

    #[derive(Default)]
    struct Counter {
        seen: usize,
    }

    impl Module for Counter {}

    struct Other;
    impl Module for Other {}

    fn ctx() -> RunContext {
        RunContext::new(ActorId(1), Fight { id: 1, name: String::new(), start_ms: 0, end_ms: 1, boss: None })
    }

    #[test]
    fn handlers_mutate_installed_state() {
        let ctx = ctx();
        let mut setup = Setup::new(ModuleId::new("counter"), &ctx, HashMap::new());
        let inst = setup.install(Counter::default());
        setup.on(&inst, Filter::heal(), |c: &mut Counter, _| {
            c.seen += 1;
            Ok(())
        });
        let mut pending = setup.into_pending();
        assert_eq!(pending.len(), 1);
        (pending[0].handler)(&Event::new(EventKind::Heal, 0)).unwrap();
        (pending[0].handler)(&Event::new(EventKind::Heal, 1)).unwrap();
        assert_eq!(inst.borrow().seen, 2);
    }

    #[test]
    fn dependency_is_typed_and_shared() {
        let ctx = ctx();
        let shared = Rc::new(RefCell::new(Counter { seen: 5 }));
        let any: Rc<dyn Any> = shared.clone();
        let setup = Setup::new(ModuleId::new("dependent"), &ctx, HashMap::from([("counter", any)]));

        let dep = setup.dependency::<Counter>("counter").unwrap();
        shared.borrow_mut().seen = 6;
        assert_eq!(dep.borrow().seen, 6);

        assert!(setup.dependency::<Other>("counter").is_err());
        assert!(setup.dependency::<Counter>("missing").is_err());
    }

    #[test]
    fn activated_handle_downcasts_to_its_type() {
        let ctx = ctx();
        let mut setup = Setup::new(ModuleId::new("counter"), &ctx, HashMap::new());
        let inst = setup.install(Counter { seen: 3 });
        let Built::Active(handle) = setup.activate(inst) else {
            panic!("expected an active module");
        };
        assert_eq!(handle.downcast::<Counter>().unwrap().borrow().seen, 3);
        assert!(handle.downcast::<Other>().is_none());
    }
}
