/// Damage done by the observed actor.
use super::{per_second, Breakdown, Total};
use crate::{
    context::RunContext,
    event::Event,
    filter::{Filter, Role},
    format::{Template, ValueStyle},
    module::{Built, HandlerResult, Module, ModuleDescriptor, ModuleId, Setup},
    report::{Statistic, StatisticOrder, View},
};

pub const ID: ModuleId = ModuleId::new("damage_done");
pub const DESCRIPTOR: ModuleDescriptor = ModuleDescriptor::new(ID, &[], build);

#[derive(Debug, Default)]
pub struct DamageDone {
    breakdown: Breakdown,
}

impl DamageDone {
    pub fn total(&self) -> Total {
        self.breakdown.total
    }

    fn on_damage(&mut self, event: &Event) -> HandlerResult {
        self.breakdown.record(event, event.amount, event.absorbed, 0);
        Ok(())
    }
}

fn build(setup: &mut Setup<'_>) -> anyhow::Result<Built> {
    let inst = setup.install(DamageDone::default());
    setup.on(&inst, Filter::damage().by(Role::Selected), DamageDone::on_damage);
    Ok(setup.activate(inst))
}

impl Module for DamageDone {
    fn statistic(&self, ctx: &RunContext) -> anyhow::Result<Option<Statistic>> {
        let total = self.total().effective();
        let dps = per_second(total, ctx.fight_duration_ms());
        Ok(Some(
            Statistic::new(
                Template::new("damage_done.statistic.label"),
                Template::new("damage_done.statistic.value").number("dps", dps, ValueStyle::Number),
                dps,
            )
            .order(StatisticOrder::Core(2))
            .tooltip(Template::new("damage_done.statistic.tooltip").number("total", total as f64, ValueStyle::Number)),
        ))
    }

    fn views(&self, _ctx: &RunContext) -> anyhow::Result<Vec<View>> {
        Ok(vec![self.breakdown.view("damage-done", "damage_done.view.title", 20)])
    }
}
