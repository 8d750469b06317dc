//! Fixtures shared by the built-in module tests.
use crate::{
    context::{Boss, Combatant, Fight, RunContext},
    event::{ActorId, Event, EventStream},
    format::CatalogFormatter,
    report::AnalysisResult,
    run::AnalysisRun,
};

pub const ME: ActorId = ActorId(1);
pub const ALLY: ActorId = ActorId(2);
pub const ENEMY: ActorId = ActorId(100);

/// Ten-second fight with the observed actor and one ally on the roster.
pub fn ctx() -> RunContext {
    let fight = Fight { id: 7, name: "Taloc".into(), start_ms: 0, end_ms: 10_000, boss: None };
    RunContext::new(ME, fight)
        .with_combatant(combatant(ME, "Me", vec![]))
        .with_combatant(combatant(ALLY, "Ally", vec![]))
}

pub fn combatant(id: ActorId, name: &str, auras: Vec<crate::event::AbilityId>) -> Combatant {
    Combatant { id, name: name.into(), class: String::new(), spec: String::new(), auras }
}

pub fn with_boss(mut ctx: RunContext, boss: Boss) -> RunContext {
    ctx.fight.boss = Some(boss);
    ctx
}

pub fn run(ctx: RunContext, modules: &[&str], events: Vec<Event>) -> AnalysisResult {
    let catalog = super::builtin().unwrap();
    let stream = EventStream::from_events(events, ctx.selected);
    AnalysisRun::new(ctx)
        .execute(&catalog, modules, &stream, &CatalogFormatter::english())
        .unwrap()
}
