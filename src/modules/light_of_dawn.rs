/// Light of Dawn (Holy Paladin): how many players each cast reached.
use crate::{
    abilities::{LIGHT_OF_DAWN_CAST, LIGHT_OF_DAWN_HEAL},
    context::RunContext,
    event::Event,
    filter::{Filter, Role},
    format::{Template, ValueStyle},
    module::{Built, HandlerResult, Module, ModuleDescriptor, ModuleId, Setup},
    report::{Statistic, StatisticOrder},
    threshold::ratio,
};

pub const ID: ModuleId = ModuleId::new("light_of_dawn");
pub const DESCRIPTOR: ModuleDescriptor = ModuleDescriptor::new(ID, &[], build);

#[derive(Debug, Default)]
pub struct LightOfDawn {
    casts: u64,
    heals: u64,
}

impl LightOfDawn {
    pub fn average_hits(&self) -> f64 {
        ratio(self.heals as f64, self.casts as f64)
    }
}

fn build(setup: &mut Setup<'_>) -> anyhow::Result<Built> {
    let inst = setup.install(LightOfDawn::default());
    setup.on(
        &inst,
        Filter::cast().by(Role::Selected).ability(LIGHT_OF_DAWN_CAST),
        |lod: &mut LightOfDawn, _: &Event| -> HandlerResult {
            lod.casts += 1;
            Ok(())
        },
    );
    setup.on(
        &inst,
        Filter::heal().by(Role::Selected).ability(LIGHT_OF_DAWN_HEAL),
        |lod: &mut LightOfDawn, _: &Event| -> HandlerResult {
            lod.heals += 1;
            Ok(())
        },
    );
    Ok(setup.activate(inst))
}

impl Module for LightOfDawn {
    fn statistic(&self, _ctx: &RunContext) -> anyhow::Result<Option<Statistic>> {
        let average = self.average_hits();
        Ok(Some(
            Statistic::new(
                Template::new("light_of_dawn.statistic.label"),
                Template::new("light_of_dawn.statistic.value").number("average", average, ValueStyle::Decimal(2)),
                average,
            )
            .order(StatisticOrder::Core(60))
            .icon(LIGHT_OF_DAWN_CAST),
        ))
    }
}
