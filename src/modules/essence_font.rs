/// Essence Font (Mistweaver Monk).
///
/// Each cast opens a window that collects the distinct targets its HoT
/// heals; the window closes on the next cast or at the end of the fight.
/// Buff applications and refreshes are counted separately: they drive the
/// targets-hit suggestion, the unique-target windows drive the statistic.
use crate::{
    abilities::{ESSENCE_FONT, ESSENCE_FONT_BUFF},
    context::RunContext,
    event::{ActorId, Event},
    filter::{Filter, Role},
    format::{Template, ValueStyle},
    module::{Built, HandlerResult, Module, ModuleDescriptor, ModuleId, Setup},
    report::{Statistic, StatisticOrder},
    threshold::{ratio, Bands, SuggestionBuilder, SuggestionCollector, SuggestionThreshold},
};
use std::collections::HashSet;

pub const ID: ModuleId = ModuleId::new("essence_font");
pub const DESCRIPTOR: ModuleDescriptor = ModuleDescriptor::new(ID, &[], build);

#[derive(Debug, Default)]
pub struct EssenceFont {
    casts:          u64,
    /// Buff applications plus refreshes.
    targets_hit:    u64,
    refreshes:      u64,

    total_healing:     u64,
    total_overhealing: u64,
    total_absorbs:     u64,
    hot_healing:       u64,
    hot_overhealing:   u64,

    window:         Option<HashSet<ActorId>>,
    unique_targets: u64,
}

impl EssenceFont {
    pub fn casts(&self) -> u64 {
        self.casts
    }

    /// Average distinct targets healed per cast.
    pub fn average_unique_targets(&self) -> f64 {
        ratio(self.unique_targets as f64, self.casts as f64)
    }

    /// Average buff applications (including refreshes) per cast.
    pub fn average_targets_hit(&self) -> f64 {
        ratio(self.targets_hit as f64, self.casts as f64)
    }

    /// Share of HoT healing that was overhealing.
    pub fn hot_overhealing(&self) -> f64 {
        ratio(self.hot_overhealing as f64, (self.hot_healing + self.hot_overhealing) as f64)
    }

    /// Share of buff hits that refreshed a HoT already on the target.
    pub fn hot_overlap(&self) -> f64 {
        ratio(self.refreshes as f64, self.targets_hit as f64)
    }

    pub fn hot_healing(&self) -> u64 {
        self.hot_healing
    }

    pub fn total_healing(&self) -> u64 {
        self.total_healing + self.total_absorbs
    }

    pub fn total_overhealing(&self) -> u64 {
        self.total_overhealing
    }

    fn close_window(&mut self) {
        if let Some(targets) = self.window.take() {
            self.unique_targets += targets.len() as u64;
        }
    }

    fn on_cast(&mut self, _: &Event) -> HandlerResult {
        self.close_window();
        self.window = Some(HashSet::new());
        self.casts += 1;
        Ok(())
    }

    fn add_healing(&mut self, event: &Event) {
        self.total_healing += event.amount;
        self.total_overhealing += event.overheal;
        self.total_absorbs += event.absorbed;
    }

    fn on_bolt_heal(&mut self, event: &Event) -> HandlerResult {
        self.add_healing(event);
        Ok(())
    }

    fn on_hot_heal(&mut self, event: &Event) -> HandlerResult {
        if event.tick {
            self.hot_healing += event.amount + event.absorbed;
            self.hot_overhealing += event.overheal;
        }
        self.add_healing(event);
        // heals from a cast before the log started belong to no window
        if let (Some(window), Some(target)) = (self.window.as_mut(), event.target) {
            window.insert(target);
        }
        Ok(())
    }

    fn on_apply(&mut self, _: &Event) -> HandlerResult {
        self.targets_hit += 1;
        Ok(())
    }

    fn on_refresh(&mut self, _: &Event) -> HandlerResult {
        self.targets_hit += 1;
        self.refreshes += 1;
        Ok(())
    }

    fn threshold(&self) -> SuggestionThreshold {
        SuggestionThreshold::is_less_than(self.average_targets_hit(), Bands::new(17.0, 14.0, 12.0))
    }
}

fn build(setup: &mut Setup<'_>) -> anyhow::Result<Built> {
    let inst = setup.install(EssenceFont::default());
    setup.on(&inst, Filter::cast().by(Role::Selected).ability(ESSENCE_FONT), EssenceFont::on_cast);
    setup.on(&inst, Filter::heal().by(Role::Selected).ability(ESSENCE_FONT), EssenceFont::on_bolt_heal);
    setup.on(&inst, Filter::heal().by(Role::Selected).ability(ESSENCE_FONT_BUFF), EssenceFont::on_hot_heal);
    setup.on(&inst, Filter::apply_buff().by(Role::Selected).ability(ESSENCE_FONT_BUFF), EssenceFont::on_apply);
    setup.on(&inst, Filter::refresh_buff().by(Role::Selected).ability(ESSENCE_FONT_BUFF), EssenceFont::on_refresh);
    Ok(setup.activate(inst))
}

impl Module for EssenceFont {
    fn finish(&mut self, _ctx: &RunContext) -> HandlerResult {
        self.close_window();
        Ok(())
    }

    fn statistic(&self, _ctx: &RunContext) -> anyhow::Result<Option<Statistic>> {
        let average = self.average_unique_targets();
        Ok(Some(
            Statistic::new(
                Template::new("essence_font.statistic.label"),
                Template::new("essence_font.statistic.value").number("average", average, ValueStyle::Number),
                average,
            )
            .order(StatisticOrder::Optional(50))
            .icon(ESSENCE_FONT)
            .tooltip(Template::new("essence_font.statistic.tooltip").ability("ability", ESSENCE_FONT)),
        ))
    }

    fn suggestions(&self, when: &mut SuggestionCollector<'_>) -> anyhow::Result<()> {
        when.when(self.threshold()).add_suggestion(|actual, recommended| {
            SuggestionBuilder::new(Template::new("essence_font.suggestion").ability("ability", ESSENCE_FONT))
                .icon(ESSENCE_FONT)
                .actual(Template::new("essence_font.suggestion.actual").number("average", actual, ValueStyle::Decimal(2)))
                .recommended(
                    Template::new("essence_font.suggestion.recommended")
                        .number("recommended", recommended, ValueStyle::Number),
                )
        });
        Ok(())
    }
}
