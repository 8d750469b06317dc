/// Damage taken by the observed actor, whoever caused it.
use super::{per_second, Breakdown, Total};
use crate::{
    context::RunContext,
    event::Event,
    filter::{Filter, Role},
    format::{Template, ValueStyle},
    module::{Built, HandlerResult, Module, ModuleDescriptor, ModuleId, Setup},
    report::{Statistic, StatisticOrder, View},
};

pub const ID: ModuleId = ModuleId::new("damage_taken");
pub const DESCRIPTOR: ModuleDescriptor = ModuleDescriptor::new(ID, &[], build);

#[derive(Debug, Default)]
pub struct DamageTaken {
    breakdown: Breakdown,
}

impl DamageTaken {
    pub fn total(&self) -> Total {
        self.breakdown.total
    }

    fn on_damage(&mut self, event: &Event) -> HandlerResult {
        self.breakdown.record(event, event.amount, event.absorbed, 0);
        Ok(())
    }
}

fn build(setup: &mut Setup<'_>) -> anyhow::Result<Built> {
    let inst = setup.install(DamageTaken::default());
    setup.on(&inst, Filter::damage().to(Role::Selected), DamageTaken::on_damage);
    Ok(setup.activate(inst))
}

impl Module for DamageTaken {
    fn statistic(&self, ctx: &RunContext) -> anyhow::Result<Option<Statistic>> {
        let total = self.total().effective();
        let dtps = per_second(total, ctx.fight_duration_ms());
        Ok(Some(
            Statistic::new(
                Template::new("damage_taken.statistic.label"),
                Template::new("damage_taken.statistic.value").number("dtps", dtps, ValueStyle::Number),
                dtps,
            )
            .order(StatisticOrder::Core(3)),
        ))
    }

    fn views(&self, _ctx: &RunContext) -> anyhow::Result<Vec<View>> {
        Ok(vec![self.breakdown.view("damage-taken", "damage_taken.view.title", 30)])
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{ctx, run, ALLY, ENEMY, ME};
    use super::*;
    use crate::abilities::MELEE;
    use crate::event::{AbilityId, EventKind};

    #[test]
    fn breaks_damage_taken_down_by_ability() {
        let result = run(
            ctx(),
            &["damage_taken"],
            vec![
                Event::new(EventKind::Damage, 0).by(ENEMY).on(ME).ability(MELEE).amount(2_000).absorbed(500),
                Event::new(EventKind::Damage, 1).by(ENEMY).on(ME).ability(AbilityId(300)).amount(7_500),
                Event::new(EventKind::Damage, 2).by(ENEMY).on(ALLY).ability(AbilityId(300)).amount(99_000),
            ],
        );
        assert_eq!(result.statistic(ID).unwrap().raw, 1_000.0);
        let view = result.view("damage-taken").unwrap();
        assert_eq!(view.rows[0].value, 7_500.0);
        assert_eq!(view.rows[1].label, "Melee");
        assert_eq!(view.rows[1].display, "2,500");
    }
}
