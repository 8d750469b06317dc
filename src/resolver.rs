/// Module catalog and dependency resolution.
///
/// `DependencyResolver::order` follows dependencies transitively from the
/// requested ids and emits a depth-first post-order: every module after all
/// of its dependencies. Independent modules keep the order they were
/// requested in (then dependency declaration order), so the same request
/// always yields the same order. A cycle fails the whole resolution.
///
/// `resolve` then builds each module exactly once, in that order, handing
/// every dependent the same instance.
use crate::{
    context::RunContext,
    error::{isolate, AnalysisError},
    module::{Built, ModuleDescriptor, ModuleHandle, ModuleId, PendingRegistration, Setup},
    report::InactiveModule,
};
use std::any::Any;
use std::collections::HashMap;
use std::rc::Rc;

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ModuleCatalog {
    descriptors: Vec<ModuleDescriptor>,
}

impl ModuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: ModuleDescriptor) -> Result<(), AnalysisError> {
        if self.get(descriptor.id.as_str()).is_some() {
            return Err(AnalysisError::DuplicateModule(descriptor.id));
        }
        self.descriptors.push(descriptor);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&ModuleDescriptor> {
        self.descriptors.iter().find(|d| d.id.as_str() == id)
    }

    pub fn descriptors(&self) -> &[ModuleDescriptor] {
        &self.descriptors
    }

    pub fn ids(&self) -> Vec<ModuleId> {
        self.descriptors.iter().map(|d| d.id).collect()
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ActiveModule {
    pub id:     ModuleId,
    pub handle: ModuleHandle,
}

pub struct ResolvedModules {
    /// Constructed modules, in construction order.
    pub active:   Vec<ActiveModule>,
    pub inactive: Vec<InactiveModule>,
    pub(crate) registrations: Vec<(ModuleId, PendingRegistration)>,
}

impl ResolvedModules {
    pub fn registration_count(&self) -> usize {
        self.registrations.len()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

pub struct DependencyResolver<'c> {
    catalog: &'c ModuleCatalog,
}

impl<'c> DependencyResolver<'c> {
    pub fn new(catalog: &'c ModuleCatalog) -> Self {
        Self { catalog }
    }

    /// Construction order for `requested` and everything it depends on.
    pub fn order<S: AsRef<str>>(&self, requested: &[S]) -> Result<Vec<&'c ModuleDescriptor>, AnalysisError> {
        let mut marks = HashMap::new();
        let mut path = Vec::new();
        let mut out = Vec::new();
        for id in requested {
            self.visit(id.as_ref(), None, &mut marks, &mut path, &mut out)?;
        }
        Ok(out)
    }

    fn visit(
        &self,
        id: &str,
        required_by: Option<ModuleId>,
        marks: &mut HashMap<ModuleId, Mark>,
        path: &mut Vec<ModuleId>,
        out: &mut Vec<&'c ModuleDescriptor>,
    ) -> Result<(), AnalysisError> {
        let desc = self
            .catalog
            .get(id)
            .ok_or_else(|| AnalysisError::UnknownModule { id: id.to_owned(), required_by })?;

        match marks.get(&desc.id) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = path.iter().position(|m| *m == desc.id).unwrap_or(0);
                let mut cycle = path[start..].to_vec();
                cycle.push(desc.id);
                return Err(AnalysisError::CyclicDependency { cycle });
            }
            None => {}
        }

        marks.insert(desc.id, Mark::Visiting);
        path.push(desc.id);
        for dep in desc.dependencies {
            self.visit(dep.module.as_str(), Some(desc.id), marks, path, out)?;
        }
        path.pop();
        marks.insert(desc.id, Mark::Done);
        out.push(desc);
        Ok(())
    }

    /// Build every module in construction order. Registrations of inactive
    /// modules are dropped here; a module depending on an inactive module is
    /// inactive itself.
    pub fn resolve<S: AsRef<str>>(&self, requested: &[S], ctx: &RunContext) -> Result<ResolvedModules, AnalysisError> {
        let order = self.order(requested)?;

        let mut handles: HashMap<ModuleId, ModuleHandle> = HashMap::new();
        let mut resolved = ResolvedModules { active: Vec::new(), inactive: Vec::new(), registrations: Vec::new() };

        for desc in order {
            let mut deps: HashMap<&'static str, Rc<dyn Any>> = HashMap::new();
            let mut missing = None;
            for dep in desc.dependencies {
                match handles.get(&dep.module) {
                    Some(handle) => {
                        deps.insert(dep.slot, handle.erased());
                    }
                    None => {
                        missing = Some(*dep);
                        break;
                    }
                }
            }
            if let Some(dep) = missing {
                let reason = format!("dependency '{}' ({}) is inactive", dep.slot, dep.module);
                tracing::debug!("Module '{}' inactive: {}", desc.id, reason);
                resolved.inactive.push(InactiveModule { id: desc.id, reason });
                continue;
            }

            let mut setup = Setup::new(desc.id, ctx, deps);
            let built = isolate(|| (desc.factory)(&mut setup)).map_err(|cause| {
                AnalysisError::ModuleConstruction { module: desc.id, source: anyhow::anyhow!(cause) }
            })?;

            match built {
                Built::Active(handle) => {
                    let pending = setup.into_pending();
                    tracing::debug!("Module '{}' active with {} registration(s)", desc.id, pending.len());
                    resolved.registrations.extend(pending.into_iter().map(|p| (desc.id, p)));
                    handles.insert(desc.id, handle.clone());
                    resolved.active.push(ActiveModule { id: desc.id, handle });
                }
                Built::Inactive(reason) => {
                    tracing::debug!("Module '{}' inactive: {}", desc.id, reason);
                    resolved.inactive.push(InactiveModule { id: desc.id, reason });
                }
            }
        }

        Ok(resolved)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Fight;
    use crate::event::ActorId;
    use crate::filter::Filter;
    use crate::module::{Dependency, Module};

    struct Leaf {
        reads: usize,
    }
    impl Module for Leaf {}

    struct Reader {
        leaf: crate::module::Instance<Leaf>,
    }
    impl Module for Reader {}

    fn leaf(s: &mut Setup<'_>) -> anyhow::Result<Built> {
        let inst = s.install(Leaf { reads: 0 });
        s.on(&inst, Filter::heal(), |l: &mut Leaf, _| {
            l.reads += 1;
            Ok(())
        });
        Ok(s.activate(inst))
    }

    fn reader(s: &mut Setup<'_>) -> anyhow::Result<Built> {
        let leaf = s.dependency::<Leaf>("leaf")?;
        let inst = s.install(Reader { leaf });
        Ok(s.activate(inst))
    }

    fn sleeper(s: &mut Setup<'_>) -> anyhow::Result<Built> {
        let inst = s.install(Leaf { reads: 0 });
        s.on(&inst, Filter::cast(), |_: &mut Leaf, _| Ok(()));
        Ok(Built::inactive("not relevant for this fight"))
    }

    fn broken(_: &mut Setup<'_>) -> anyhow::Result<Built> {
        anyhow::bail!("missing talent data")
    }

    fn explodes(_: &mut Setup<'_>) -> anyhow::Result<Built> {
        panic!("factory blew up")
    }

    const LEAF: ModuleId = ModuleId::new("leaf");
    const READER_A: ModuleId = ModuleId::new("reader_a");
    const READER_B: ModuleId = ModuleId::new("reader_b");
    const SLEEPER: ModuleId = ModuleId::new("sleeper");
    const NEEDS_SLEEPER: ModuleId = ModuleId::new("needs_sleeper");
    const NEEDS_NEEDS_SLEEPER: ModuleId = ModuleId::new("needs_needs_sleeper");

    static ON_LEAF: [Dependency; 1] = [Dependency::new("leaf", LEAF)];
    static ON_SLEEPER: [Dependency; 1] = [Dependency::new("leaf", SLEEPER)];
    static ON_NEEDS_SLEEPER: [Dependency; 1] = [Dependency::new("leaf", NEEDS_SLEEPER)];

    fn catalog() -> ModuleCatalog {
        let mut c = ModuleCatalog::new();
        c.register(ModuleDescriptor::new(READER_A, &ON_LEAF, reader)).unwrap();
        c.register(ModuleDescriptor::new(LEAF, &[], leaf)).unwrap();
        c.register(ModuleDescriptor::new(READER_B, &ON_LEAF, reader)).unwrap();
        c.register(ModuleDescriptor::new(SLEEPER, &[], sleeper)).unwrap();
        c.register(ModuleDescriptor::new(NEEDS_SLEEPER, &ON_SLEEPER, reader)).unwrap();
        c.register(ModuleDescriptor::new(NEEDS_NEEDS_SLEEPER, &ON_NEEDS_SLEEPER, reader)).unwrap();
        c
    }

    fn ctx() -> RunContext {
        RunContext::new(ActorId(1), Fight { id: 1, name: String::new(), start_ms: 0, end_ms: 1, boss: None })
    }

    fn ids(order: &[&ModuleDescriptor]) -> Vec<&'static str> {
        order.iter().map(|d| d.id.as_str()).collect()
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut c = catalog();
        assert!(matches!(
            c.register(ModuleDescriptor::new(LEAF, &[], leaf)),
            Err(AnalysisError::DuplicateModule(id)) if id == LEAF
        ));
    }

    #[test]
    fn dependencies_come_first() {
        let c = catalog();
        let order = DependencyResolver::new(&c).order(&["reader_a", "reader_b"]).unwrap();
        assert_eq!(ids(&order), vec!["leaf", "reader_a", "reader_b"]);
    }

    #[test]
    fn ties_follow_request_order() {
        let c = catalog();
        let r = DependencyResolver::new(&c);
        assert_eq!(ids(&r.order(&["sleeper", "leaf"]).unwrap()), vec!["sleeper", "leaf"]);
        assert_eq!(ids(&r.order(&["leaf", "sleeper"]).unwrap()), vec!["leaf", "sleeper"]);
    }

    #[test]
    fn unknown_dependency_names_requirer() {
        static ON_GHOST: [Dependency; 1] = [Dependency::new("ghost", ModuleId::new("ghost"))];
        let mut c = ModuleCatalog::new();
        c.register(ModuleDescriptor::new(READER_A, &ON_GHOST, reader)).unwrap();
        let err = DependencyResolver::new(&c).order(&["reader_a"]).err().unwrap();
        assert_eq!(err.to_string(), "unknown module 'ghost' (required by 'reader_a')");
    }

    #[test]
    fn cycle_is_reported_with_members() {
        const A: ModuleId = ModuleId::new("a");
        const B: ModuleId = ModuleId::new("b");
        const C: ModuleId = ModuleId::new("c");
        static A_DEPS: [Dependency; 1] = [Dependency::new("b", B)];
        static B_DEPS: [Dependency; 1] = [Dependency::new("c", C)];
        static C_DEPS: [Dependency; 1] = [Dependency::new("a", A)];
        let mut c = ModuleCatalog::new();
        c.register(ModuleDescriptor::new(A, &A_DEPS, leaf)).unwrap();
        c.register(ModuleDescriptor::new(B, &B_DEPS, leaf)).unwrap();
        c.register(ModuleDescriptor::new(C, &C_DEPS, leaf)).unwrap();

        match DependencyResolver::new(&c).resolve(&["a"], &ctx()) {
            Err(AnalysisError::CyclicDependency { cycle }) => assert_eq!(cycle, vec![A, B, C, A]),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("cycle must not resolve"),
        }
    }

    #[test]
    fn dependents_share_one_instance() {
        let c = catalog();
        let resolved = DependencyResolver::new(&c).resolve(&["reader_a", "reader_b"], &ctx()).unwrap();
        assert_eq!(resolved.active.len(), 3);

        let leaf = resolved.active[0].handle.downcast::<Leaf>().unwrap();
        let a = resolved.active[1].handle.downcast::<Reader>().unwrap();
        let b = resolved.active[2].handle.downcast::<Reader>().unwrap();

        let mut regs = resolved.registrations;
        assert_eq!(regs.len(), 1);
        (regs[0].1.handler)(&crate::event::Event::new(crate::event::EventKind::Heal, 0)).unwrap();

        assert_eq!(leaf.borrow().reads, 1);
        assert_eq!(a.borrow().leaf.borrow().reads, 1);
        assert_eq!(b.borrow().leaf.borrow().reads, 1);
    }

    #[test]
    fn inactive_modules_register_nothing_and_cascade() {
        let c = catalog();
        let resolved = DependencyResolver::new(&c).resolve(&["needs_needs_sleeper", "leaf"], &ctx()).unwrap();

        let inactive: Vec<&str> = resolved.inactive.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(inactive, vec!["sleeper", "needs_sleeper", "needs_needs_sleeper"]);
        assert!(resolved.inactive[1].reason.contains("sleeper"));

        let active: Vec<&str> = resolved.active.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(active, vec!["leaf"]);
        // only the leaf's heal handler survives; the sleeper's cast handler is gone
        assert_eq!(resolved.registration_count(), 1);
    }

    #[test]
    fn construction_errors_and_panics_are_fatal() {
        let mut c = ModuleCatalog::new();
        c.register(ModuleDescriptor::new(ModuleId::new("broken"), &[], broken)).unwrap();
        c.register(ModuleDescriptor::new(ModuleId::new("explodes"), &[], explodes)).unwrap();
        let r = DependencyResolver::new(&c);

        let err = r.resolve(&["broken"], &ctx()).err().unwrap();
        assert_eq!(err.to_string(), "module 'broken' failed to construct: missing talent data");

        let err = r.resolve(&["explodes"], &ctx()).err().unwrap();
        assert!(err.to_string().contains("panic: factory blew up"));
    }
}
