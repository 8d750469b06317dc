/// Read-only facts shared by every module for one run.
///
/// Built once before the run starts and never mutated afterwards. Modules
/// receive `&RunContext` at construction and again in the pull phase.
use crate::event::{AbilityId, ActorId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Boss {
    pub id:   u32,
    pub name: String,
    /// Buff granted by this encounter's Vantus Rune, if the encounter has one.
    #[serde(default)]
    pub vantus_rune_buff_id: Option<AbilityId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fight {
    pub id:       u32,
    #[serde(default)]
    pub name:     String,
    pub start_ms: u64,
    pub end_ms:   u64,
    #[serde(default)]
    pub boss:     Option<Boss>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Combatant {
    pub id:    ActorId,
    pub name:  String,
    #[serde(default)]
    pub class: String,
    #[serde(default)]
    pub spec:  String,
    /// Auras active when the fight started (flasks, runes, ...).
    #[serde(default)]
    pub auras: Vec<AbilityId>,
}

impl Combatant {
    pub fn has_aura(&self, aura: AbilityId) -> bool {
        self.auras.contains(&aura)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Roster {
    pub combatants: Vec<Combatant>,
}

impl Roster {
    pub fn get(&self, id: ActorId) -> Option<&Combatant> {
        self.combatants.iter().find(|c| c.id == id)
    }

    pub fn player_ids(&self) -> HashSet<ActorId> {
        self.combatants.iter().map(|c| c.id).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    /// The observed actor whose performance is analysed.
    pub selected: ActorId,
    pub fight:    Fight,
    #[serde(default)]
    pub roster:   Roster,
}

impl RunContext {
    pub fn new(selected: ActorId, fight: Fight) -> Self {
        Self { selected, fight, roster: Roster::default() }
    }

    pub fn with_combatant(mut self, combatant: Combatant) -> Self {
        self.roster.combatants.push(combatant);
        self
    }

    /// Fight length in milliseconds. Never negative.
    pub fn fight_duration_ms(&self) -> u64 {
        self.fight.end_ms.saturating_sub(self.fight.start_ms)
    }

    pub fn boss(&self) -> Option<&Boss> {
        self.fight.boss.as_ref()
    }

    pub fn selected_combatant(&self) -> Option<&Combatant> {
        self.roster.get(self.selected)
    }

    pub fn is_player(&self, id: ActorId) -> bool {
        self.roster.get(id).is_some()
    }
}
