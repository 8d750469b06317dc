/// Vantus Rune: throughput gained from the boss-specific versatility rune.
///
/// Only active when the encounter has a rune and the observed actor entered
/// the fight with its buff. Reads the totals of the three throughput modules
/// and backs the rune's share out of them.
use super::{damage_done::DamageDone, damage_taken::DamageTaken, healing_done::HealingDone, per_second};
use crate::{
    context::RunContext,
    event::AbilityId,
    format::{Template, ValueStyle},
    module::{Built, Dependency, Instance, Module, ModuleDescriptor, ModuleId, Setup},
    report::{Statistic, StatisticOrder},
};

pub const ID: ModuleId = ModuleId::new("vantus_rune");
pub const DESCRIPTOR: ModuleDescriptor = ModuleDescriptor::new(ID, &DEPENDENCIES, build);

const DEPENDENCIES: [Dependency; 3] = [
    Dependency::new("healing_done", super::healing_done::ID),
    Dependency::new("damage_done", super::damage_done::ID),
    Dependency::new("damage_taken", super::damage_taken::ID),
];

const RUNE_VERSATILITY: f64 = 68.0;
const VERSATILITY_PER_PERCENT_THROUGHPUT: f64 = 2080.0;
const VERSATILITY_PER_PERCENT_DAMAGE_REDUCTION: f64 = VERSATILITY_PER_PERCENT_THROUGHPUT * 2.0;
const THROUGHPUT_GAIN: f64 = RUNE_VERSATILITY / VERSATILITY_PER_PERCENT_THROUGHPUT;
const DAMAGE_REDUCTION: f64 = RUNE_VERSATILITY / VERSATILITY_PER_PERCENT_DAMAGE_REDUCTION;

pub struct VantusRune {
    rune:         AbilityId,
    healing_done: Instance<HealingDone>,
    damage_done:  Instance<DamageDone>,
    damage_taken: Instance<DamageTaken>,
}

/// Per-second gains attributable to the rune.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuneGain {
    pub dps:  f64,
    pub hps:  f64,
    pub drps: f64,
}

impl VantusRune {
    pub fn rune(&self) -> AbilityId {
        self.rune
    }

    pub fn gain(&self, ctx: &RunContext) -> RuneGain {
        let damage = self.damage_done.borrow().total().effective() as f64;
        let healing = self.healing_done.borrow().total().effective() as f64;
        let taken = self.damage_taken.borrow().total().effective() as f64;

        let damage_gained = damage - damage / (1.0 + THROUGHPUT_GAIN);
        let healing_gained = healing - healing / (1.0 + THROUGHPUT_GAIN);
        let damage_reduced = taken / (1.0 - DAMAGE_REDUCTION) - taken;

        let duration = ctx.fight_duration_ms();
        RuneGain {
            dps:  per_second(damage_gained.round() as u64, duration),
            hps:  per_second(healing_gained.round() as u64, duration),
            drps: per_second(damage_reduced.round() as u64, duration),
        }
    }
}

fn build(setup: &mut Setup<'_>) -> anyhow::Result<Built> {
    let ctx = setup.context();
    let Some(rune) = ctx.boss().and_then(|b| b.vantus_rune_buff_id) else {
        return Ok(Built::inactive("encounter has no Vantus Rune"));
    };
    if !ctx.selected_combatant().is_some_and(|c| c.has_aura(rune)) {
        return Ok(Built::inactive("Vantus Rune not active for the selected combatant"));
    }

    let module = VantusRune {
        rune,
        healing_done: setup.dependency("healing_done")?,
        damage_done: setup.dependency("damage_done")?,
        damage_taken: setup.dependency("damage_taken")?,
    };
    let inst = setup.install(module);
    Ok(setup.activate(inst))
}

impl Module for VantusRune {
    fn statistic(&self, ctx: &RunContext) -> anyhow::Result<Option<Statistic>> {
        let gain = self.gain(ctx);
        let value = if gain.dps > gain.hps {
            Template::new("vantus_rune.statistic.dps").number("dps", gain.dps, ValueStyle::Number)
        } else {
            Template::new("vantus_rune.statistic.hps").number("hps", gain.hps, ValueStyle::Number)
        };
        Ok(Some(
            Statistic::new(Template::new("vantus_rune.statistic.label"), value, gain.dps.max(gain.hps))
                .order(StatisticOrder::Unimportant(0))
                .icon(self.rune)
                .tooltip(
                    Template::new("vantus_rune.statistic.tooltip")
                        .number("dps", gain.dps, ValueStyle::Number)
                        .number("hps", gain.hps, ValueStyle::Number)
                        .number("drps", gain.drps, ValueStyle::Number),
                ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{combatant, ctx, run, with_boss, ENEMY, ME};
    use super::*;
    use crate::context::Boss;
    use crate::event::{Event, EventKind};

    const RUNE: AbilityId = AbilityId(269276);

    fn boss(rune: Option<AbilityId>) -> Boss {
        Boss { id: 2144, name: "Taloc".into(), vantus_rune_buff_id: rune }
    }

    fn rune_ctx() -> RunContext {
        let mut ctx = with_boss(ctx(), boss(Some(RUNE)));
        ctx.roster.combatants[0] = combatant(ME, "Me", vec![RUNE]);
        ctx
    }

    fn events() -> Vec<Event> {
        vec![
            Event::new(EventKind::Damage, 0).by(ME).on(ENEMY).amount(2_148_000),
            Event::new(EventKind::Heal, 1).by(ME).on(ME).amount(52_000),
            Event::new(EventKind::Damage, 2).by(ENEMY).on(ME).amount(204_000),
        ]
    }

    #[test]
    fn inactive_without_a_rune_on_the_encounter() {
        let result = run(with_boss(ctx(), boss(None)), &["vantus_rune"], events());
        assert_eq!(result.inactive_modules[0].id, ID);
        // the throughput modules it pulled in still run
        assert_eq!(result.active_modules.len(), 3);
        assert!(result.statistic(ID).is_none());
    }

    #[test]
    fn inactive_when_the_actor_lacks_the_buff() {
        let result = run(with_boss(ctx(), boss(Some(RUNE))), &["vantus_rune"], events());
        assert!(result.inactive_modules[0].reason.contains("selected combatant"));
    }

    #[test]
    fn reports_the_larger_throughput_gain() {
        let result = run(rune_ctx(), &["vantus_rune"], events());
        let stat = result.statistic(ID).unwrap();
        // 2_148_000 - 2_148_000 / (1 + 68/2080) = 68_000 over 10s
        assert_eq!(stat.raw, 6_800.0);
        assert_eq!(stat.value, "6,800 DPS");
        assert_eq!(stat.icon, Some(RUNE));
        assert!(stat.tooltip.as_deref().unwrap().contains("DRPS"));
    }

    #[test]
    fn zero_length_fight_gains_nothing() {
        let mut ctx = rune_ctx();
        ctx.fight.end_ms = ctx.fight.start_ms;
        let result = run(ctx, &["vantus_rune"], events());
        assert_eq!(result.statistic(ID).unwrap().raw, 0.0);
    }
}
