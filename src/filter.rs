/// Event filters: immutable predicate trees pinned to an event kind.
///
/// A `Filter` is plain data (Clone + Eq + Hash) so the same expression can be
/// shared across modules and compiled repeatedly. Builders consume and
/// return a new value; `and` intersects two expressions without touching
/// either.
///
///   Filter::heal().by(Role::Selected).ability(ESSENCE_FONT_BUFF).tick(true)
///
/// Roles such as "the observed actor" only mean something inside a run, so
/// matching happens on a `CompiledFilter` produced against a `RunContext`.
/// The compiled form drops the kind (the dispatcher already buckets by kind)
/// and keeps only the remaining checks.
use crate::{
    context::RunContext,
    event::{AbilityId, ActorId, Event, EventKind},
};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::fmt;

// ---------------------------------------------------------------------------
// Building blocks
// ---------------------------------------------------------------------------

/// Who an event's source (or target) must be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Role {
    /// The observed actor of the run.
    Selected,
    /// Any combatant on the roster.
    AnyPlayer,
    Actor(ActorId),
}

/// Set-based ability membership, the only "or" the domain needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AbilitySet(pub BTreeSet<AbilityId>);

impl From<AbilityId> for AbilitySet {
    fn from(id: AbilityId) -> Self {
        Self(BTreeSet::from([id]))
    }
}

impl<const N: usize> From<[AbilityId; N]> for AbilitySet {
    fn from(ids: [AbilityId; N]) -> Self {
        Self(ids.into_iter().collect())
    }
}

impl From<&[AbilityId]> for AbilitySet {
    fn from(ids: &[AbilityId]) -> Self {
        Self(ids.iter().copied().collect())
    }
}

impl From<Vec<AbilityId>> for AbilitySet {
    fn from(ids: Vec<AbilityId>) -> Self {
        Self(ids.into_iter().collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Attribute {
    Amount,
    Overheal,
    Absorbed,
    /// 1 for periodic ticks, 0 otherwise.
    Tick,
}

impl Attribute {
    fn read(self, event: &Event) -> u64 {
        match self {
            Self::Amount   => event.amount,
            Self::Overheal => event.overheal,
            Self::Absorbed => event.absorbed,
            Self::Tick     => u64::from(event.tick),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Op {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AttributePredicate {
    pub field: Attribute,
    pub op:    Op,
    pub value: u64,
}

impl AttributePredicate {
    pub fn holds(&self, event: &Event) -> bool {
        let v = self.field.read(event);
        match self.op {
            Op::Eq => v == self.value,
            Op::Ne => v != self.value,
            Op::Lt => v < self.value,
            Op::Le => v <= self.value,
            Op::Gt => v > self.value,
            Op::Ge => v >= self.value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Clause {
    Source(Role),
    Target(Role),
    Ability(AbilitySet),
    Attribute(AttributePredicate),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
enum KindConstraint {
    #[default]
    Unpinned,
    Pinned(EventKind),
    /// Intersection of two different kinds; can never match.
    Conflicting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    #[error("filter does not pin an event kind")]
    Unpinned,
    #[error("filter requires two different event kinds")]
    ConflictingKinds,
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Filter {
    kind:    KindConstraint,
    clauses: Vec<Clause>,
}

impl Filter {
    pub fn of_kind(kind: EventKind) -> Self {
        Self { kind: KindConstraint::Pinned(kind), clauses: Vec::new() }
    }

    pub fn cast() -> Self { Self::of_kind(EventKind::Cast) }
    pub fn begin_cast() -> Self { Self::of_kind(EventKind::BeginCast) }
    pub fn heal() -> Self { Self::of_kind(EventKind::Heal) }
    pub fn absorbed() -> Self { Self::of_kind(EventKind::Absorb) }
    pub fn damage() -> Self { Self::of_kind(EventKind::Damage) }
    pub fn apply_buff() -> Self { Self::of_kind(EventKind::ApplyBuff) }
    pub fn refresh_buff() -> Self { Self::of_kind(EventKind::RefreshBuff) }
    pub fn remove_buff() -> Self { Self::of_kind(EventKind::RemoveBuff) }
    pub fn death() -> Self { Self::of_kind(EventKind::Death) }

    /// Kind-less source constraint; must be intersected with a kind before
    /// it can be registered.
    pub fn by_source(role: Role) -> Self {
        Self::default().by(role)
    }

    /// Kind-less ability constraint; see `by_source`.
    pub fn with_ability(ids: impl Into<AbilitySet>) -> Self {
        Self::default().ability(ids)
    }

    pub fn by(self, role: Role) -> Self {
        self.push(Clause::Source(role))
    }

    pub fn to(self, role: Role) -> Self {
        self.push(Clause::Target(role))
    }

    pub fn ability(self, ids: impl Into<AbilitySet>) -> Self {
        self.push(Clause::Ability(ids.into()))
    }

    pub fn attribute(self, field: Attribute, op: Op, value: u64) -> Self {
        self.push(Clause::Attribute(AttributePredicate { field, op, value }))
    }

    pub fn tick(self, tick: bool) -> Self {
        self.attribute(Attribute::Tick, Op::Eq, u64::from(tick))
    }

    /// Clauses are kept sorted and deduplicated: a filter's identity does
    /// not depend on the order it was built in.
    fn push(mut self, clause: Clause) -> Self {
        if let Err(at) = self.clauses.binary_search(&clause) {
            self.clauses.insert(at, clause);
        }
        self
    }

    /// Intersection: the result matches only events both inputs match.
    pub fn and(&self, other: &Filter) -> Filter {
        use KindConstraint::*;
        let kind = match (self.kind, other.kind) {
            (Conflicting, _) | (_, Conflicting) => Conflicting,
            (Unpinned, k) | (k, Unpinned) => k,
            (Pinned(a), Pinned(b)) if a == b => Pinned(a),
            (Pinned(_), Pinned(_)) => Conflicting,
        };
        other
            .clauses
            .iter()
            .cloned()
            .fold(Filter { kind, clauses: self.clauses.clone() }, Filter::push)
    }

    pub fn kind(&self) -> Option<EventKind> {
        match self.kind {
            KindConstraint::Pinned(k) => Some(k),
            _ => None,
        }
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Resolve roles against the run and keep only the non-kind checks.
    pub fn compile(&self, ctx: &RunContext) -> Result<CompiledFilter, FilterError> {
        let kind = match self.kind {
            KindConstraint::Pinned(k) => k,
            KindConstraint::Unpinned => return Err(FilterError::Unpinned),
            KindConstraint::Conflicting => return Err(FilterError::ConflictingKinds),
        };
        let checks = self
            .clauses
            .iter()
            .map(|clause| match clause {
                Clause::Source(role) => Check::Source(ActorMatch::resolve(*role, ctx)),
                Clause::Target(role) => Check::Target(ActorMatch::resolve(*role, ctx)),
                Clause::Ability(set) => Check::Ability(set.0.iter().copied().collect()),
                Clause::Attribute(p) => Check::Attribute(*p),
            })
            .collect();
        Ok(CompiledFilter { kind, checks })
    }

    /// One-off match. Hot paths go through `compile` once and reuse the result.
    pub fn matches(&self, event: &Event, ctx: &RunContext) -> bool {
        self.compile(ctx)
            .map(|c| c.kind == event.kind && c.matches(event))
            .unwrap_or(false)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Selected  => f.write_str("selected"),
            Role::AnyPlayer => f.write_str("any-player"),
            Role::Actor(id) => write!(f, "{}", id),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            KindConstraint::Pinned(k)   => write!(f, "{}", k)?,
            KindConstraint::Unpinned    => f.write_str("<any kind>")?,
            KindConstraint::Conflicting => f.write_str("<conflicting kinds>")?,
        }
        for clause in &self.clauses {
            match clause {
                Clause::Source(role) => write!(f, " by {}", role)?,
                Clause::Target(role) => write!(f, " to {}", role)?,
                Clause::Ability(set) => {
                    let ids: Vec<String> = set.0.iter().map(|a| a.to_string()).collect();
                    write!(f, " ability {{{}}}", ids.join(","))?
                }
                Clause::Attribute(p) => write!(f, " {:?} {:?} {}", p.field, p.op, p.value)?,
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Compiled form
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum ActorMatch {
    Exactly(ActorId),
    AnyOf(HashSet<ActorId>),
}

impl ActorMatch {
    fn resolve(role: Role, ctx: &RunContext) -> Self {
        match role {
            Role::Selected  => Self::Exactly(ctx.selected),
            Role::Actor(id) => Self::Exactly(id),
            Role::AnyPlayer => Self::AnyOf(ctx.roster.player_ids()),
        }
    }

    fn accepts(&self, actor: Option<ActorId>) -> bool {
        match (self, actor) {
            (_, None) => false,
            (Self::Exactly(want), Some(id)) => *want == id,
            (Self::AnyOf(set), Some(id)) => set.contains(&id),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Check {
    Source(ActorMatch),
    Target(ActorMatch),
    Ability(HashSet<AbilityId>),
    Attribute(AttributePredicate),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFilter {
    kind:   EventKind,
    checks: Vec<Check>,
}

impl CompiledFilter {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Evaluate the remaining checks. The caller is responsible for having
    /// routed only events of `self.kind()` here.
    pub fn matches(&self, event: &Event) -> bool {
        self.checks.iter().all(|check| match check {
            Check::Source(m)    => m.accepts(event.source),
            Check::Target(m)    => m.accepts(event.target),
            Check::Ability(set) => event.ability.is_some_and(|a| set.contains(&a)),
            Check::Attribute(p) => p.holds(event),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Combatant, Fight};
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    const ME: ActorId = ActorId(1);
    const ALLY: ActorId = ActorId(2);
    const BOSS: ActorId = ActorId(99);
    const FONT: AbilityId = AbilityId(191837);
    const FONT_HOT: AbilityId = AbilityId(191840);

    fn ctx() -> RunContext {
        let fight = Fight { id: 1, name: String::new(), start_ms: 0, end_ms: 10_000, boss: None };
        RunContext::new(ME, fight)
            .with_combatant(Combatant { id: ME, name: "Me".into(), class: String::new(), spec: String::new(), auras: vec![] })
            .with_combatant(Combatant { id: ALLY, name: "Ally".into(), class: String::new(), spec: String::new(), auras: vec![] })
    }

    fn hash_of(f: &Filter) -> u64 {
        let mut h = DefaultHasher::new();
        f.hash(&mut h);
        h.finish()
    }

    #[test]
    fn matches_kind_source_and_ability() {
        let f = Filter::cast().by(Role::Selected).ability(FONT);
        let ctx = ctx();
        assert!(f.matches(&Event::new(EventKind::Cast, 0).by(ME).ability(FONT), &ctx));
        assert!(!f.matches(&Event::new(EventKind::Cast, 0).by(ALLY).ability(FONT), &ctx));
        assert!(!f.matches(&Event::new(EventKind::Heal, 0).by(ME).ability(FONT), &ctx));
        assert!(!f.matches(&Event::new(EventKind::Cast, 0).by(ME), &ctx));
    }

    #[test]
    fn ability_set_is_membership() {
        let f = Filter::heal().ability([FONT, FONT_HOT]);
        let ctx = ctx();
        assert!(f.matches(&Event::new(EventKind::Heal, 0).ability(FONT_HOT), &ctx));
        assert!(!f.matches(&Event::new(EventKind::Heal, 0).ability(AbilityId(1)), &ctx));
    }

    #[test]
    fn any_player_uses_roster() {
        let f = Filter::damage().to(Role::AnyPlayer);
        let ctx = ctx();
        assert!(f.matches(&Event::new(EventKind::Damage, 0).by(BOSS).on(ALLY), &ctx));
        assert!(!f.matches(&Event::new(EventKind::Damage, 0).by(ME).on(BOSS), &ctx));
    }

    #[test]
    fn attribute_predicates() {
        let f = Filter::heal().tick(true).attribute(Attribute::Amount, Op::Gt, 50);
        let ctx = ctx();
        assert!(f.matches(&Event::new(EventKind::Heal, 0).tick(true).amount(51), &ctx));
        assert!(!f.matches(&Event::new(EventKind::Heal, 0).tick(true).amount(50), &ctx));
        assert!(!f.matches(&Event::new(EventKind::Heal, 0).tick(false).amount(500), &ctx));
    }

    #[test]
    fn and_pins_kind_from_either_side() {
        let f = Filter::by_source(Role::Selected).and(&Filter::heal());
        assert_eq!(f.kind(), Some(EventKind::Heal));
        assert_eq!(f.clauses().len(), 1);
        assert!(f.compile(&ctx()).is_ok());
    }

    #[test]
    fn and_leaves_inputs_untouched() {
        let a = Filter::heal();
        let b = Filter::with_ability(FONT);
        let _ = a.and(&b);
        assert!(a.clauses().is_empty());
        assert_eq!(b.kind(), None);
    }

    #[test]
    fn unpinned_filter_does_not_compile() {
        let f = Filter::by_source(Role::Selected).and(&Filter::with_ability(FONT));
        assert_eq!(f.compile(&ctx()), Err(FilterError::Unpinned));
    }

    #[test]
    fn conflicting_kinds_do_not_compile() {
        let f = Filter::heal().and(&Filter::cast());
        assert_eq!(f.kind(), None);
        assert_eq!(f.compile(&ctx()), Err(FilterError::ConflictingKinds));
    }

    #[test]
    fn equal_expressions_hash_equal() {
        let a = Filter::heal().by(Role::Selected).ability([FONT_HOT, FONT]);
        let b = Filter::heal().by(Role::Selected).ability([FONT, FONT_HOT]);
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn and_is_order_independent() {
        let by_me = Filter::heal().by(Role::Selected);
        let font = Filter::with_ability(FONT).attribute(Attribute::Amount, Op::Gt, 0);
        let ab = by_me.and(&font);
        let ba = font.and(&by_me);
        assert_eq!(ab, ba);
        assert_eq!(hash_of(&ab), hash_of(&ba));
        assert_eq!(ab.and(&by_me).clauses().len(), 3);

        let built = Filter::heal().to(Role::AnyPlayer).by(Role::Selected);
        assert_eq!(built, Filter::heal().by(Role::Selected).to(Role::AnyPlayer));
    }

    #[test]
    fn display_is_readable() {
        let f = Filter::heal().by(Role::Selected).ability(FONT_HOT);
        assert_eq!(f.to_string(), "heal by selected ability {191840}");
    }
}
