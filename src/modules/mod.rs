pub mod damage_done;
pub mod damage_taken;
pub mod essence_font;
pub mod healing_done;
pub mod light_of_dawn;
pub mod vantus_rune;

use crate::{
    error::AnalysisError,
    event::{AbilityId, Event},
    format::{Template, ValueStyle},
    report::View,
    resolver::ModuleCatalog,
    threshold::ratio,
};
use serde::Serialize;
use std::collections::BTreeMap;

#[cfg(test)]
pub(crate) mod testing;

/// Every built-in module, in declaration order.
pub fn builtin() -> Result<ModuleCatalog, AnalysisError> {
    let mut catalog = ModuleCatalog::new();
    for descriptor in [
        healing_done::DESCRIPTOR,
        damage_done::DESCRIPTOR,
        damage_taken::DESCRIPTOR,
        essence_font::DESCRIPTOR,
        light_of_dawn::DESCRIPTOR,
        vantus_rune::DESCRIPTOR,
    ] {
        catalog.register(descriptor)?;
    }
    Ok(catalog)
}

// ---------------------------------------------------------------------------
// Shared accumulators
// ---------------------------------------------------------------------------

/// Running amount split the way the log reports it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Total {
    pub regular:  u64,
    pub absorbed: u64,
    pub overheal: u64,
}

impl Total {
    pub fn add(&mut self, regular: u64, absorbed: u64, overheal: u64) {
        self.regular += regular;
        self.absorbed += absorbed;
        self.overheal += overheal;
    }

    /// Amount that actually landed: regular plus absorbed.
    pub fn effective(&self) -> u64 {
        self.regular + self.absorbed
    }

    /// Effective plus overheal.
    pub fn raw(&self) -> u64 {
        self.effective() + self.overheal
    }
}

/// Total plus a per-ability split of it.
#[derive(Debug, Clone, Default)]
pub struct Breakdown {
    pub total:      Total,
    pub by_ability: BTreeMap<AbilityId, Total>,
}

impl Breakdown {
    pub fn record(&mut self, event: &Event, regular: u64, absorbed: u64, overheal: u64) {
        self.total.add(regular, absorbed, overheal);
        if let Some(ability) = event.ability {
            self.by_ability.entry(ability).or_default().add(regular, absorbed, overheal);
        }
    }

    /// One row per ability, largest effective amount first.
    pub fn view(&self, key: &str, title: &'static str, order: u32) -> View {
        let mut rows: Vec<(&AbilityId, &Total)> = self.by_ability.iter().collect();
        rows.sort_by(|a, b| b.1.effective().cmp(&a.1.effective()).then(a.0.cmp(b.0)));
        rows.into_iter().fold(View::new(key, Template::new(title), order), |view, (ability, total)| {
            view.row(
                Template::new("view.ability_row").ability("ability", *ability),
                total.effective() as f64,
                ValueStyle::Number,
            )
        })
    }
}

/// Amount per second of fight; 0 for a zero-length fight.
pub fn per_second(amount: u64, duration_ms: u64) -> f64 {
    ratio(amount as f64 * 1000.0, duration_ms as f64)
}
