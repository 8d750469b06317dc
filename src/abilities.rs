/// Ability ids the built-in modules listen for.
use crate::event::AbilityId;

pub const MELEE: AbilityId = AbilityId(1);

// Mistweaver Monk
pub const ESSENCE_FONT: AbilityId = AbilityId(191837);
/// The HoT Essence Font leaves on every target it hits.
pub const ESSENCE_FONT_BUFF: AbilityId = AbilityId(191840);

// Holy Paladin
pub const LIGHT_OF_DAWN_CAST: AbilityId = AbilityId(85222);
pub const LIGHT_OF_DAWN_HEAL: AbilityId = AbilityId(225311);
