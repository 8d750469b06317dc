/// Healing done by the observed actor: direct and periodic heals plus the
/// damage its shields absorbed.
use super::{per_second, Breakdown, Total};
use crate::{
    context::RunContext,
    event::Event,
    filter::{Filter, Role},
    format::{Template, ValueStyle},
    module::{Built, HandlerResult, Module, ModuleDescriptor, ModuleId, Setup},
    report::{Statistic, StatisticOrder, View},
    threshold::ratio,
};

pub const ID: ModuleId = ModuleId::new("healing_done");
pub const DESCRIPTOR: ModuleDescriptor = ModuleDescriptor::new(ID, &[], build);

#[derive(Debug, Default)]
pub struct HealingDone {
    breakdown: Breakdown,
}

impl HealingDone {
    pub fn total(&self) -> Total {
        self.breakdown.total
    }

    fn on_heal(&mut self, event: &Event) -> HandlerResult {
        self.breakdown.record(event, event.amount, event.absorbed, event.overheal);
        Ok(())
    }

    /// `absorbed` events carry the absorbed amount in `amount`.
    fn on_absorbed(&mut self, event: &Event) -> HandlerResult {
        self.breakdown.record(event, 0, event.amount, 0);
        Ok(())
    }
}

fn build(setup: &mut Setup<'_>) -> anyhow::Result<Built> {
    let inst = setup.install(HealingDone::default());
    setup.on(&inst, Filter::heal().by(Role::Selected), HealingDone::on_heal);
    setup.on(&inst, Filter::absorbed().by(Role::Selected), HealingDone::on_absorbed);
    Ok(setup.activate(inst))
}

impl Module for HealingDone {
    fn statistic(&self, ctx: &RunContext) -> anyhow::Result<Option<Statistic>> {
        let total = self.total();
        let hps = per_second(total.effective(), ctx.fight_duration_ms());
        Ok(Some(
            Statistic::new(
                Template::new("healing_done.statistic.label"),
                Template::new("healing_done.statistic.value").number("hps", hps, ValueStyle::Number),
                hps,
            )
            .order(StatisticOrder::Core(1))
            .tooltip(
                Template::new("healing_done.statistic.tooltip")
                    .number("total", total.effective() as f64, ValueStyle::Number)
                    .number("overheal", ratio(total.overheal as f64, total.raw() as f64), ValueStyle::Percentage),
            ),
        ))
    }

    fn views(&self, _ctx: &RunContext) -> anyhow::Result<Vec<View>> {
        Ok(vec![self.breakdown.view("healing-done", "healing_done.view.title", 10)])
    }
}
