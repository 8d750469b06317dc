/// Normalized encounter events: the single ordered sequence every module sees.
///
/// Raw records from the log source (JSON reports or parsed combat-log text)
/// are turned into immutable `Event`s exactly once. Dispatch order is:
///   1. timestamp (ms relative to fight start)
///   2. relation to the observed actor: events it caused, then events it
///      received, then everything else
///   3. declaration order in the raw log
///
/// The key is total, so two normalizations of the same records always yield
/// the same sequence.
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub u64);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AbilityId(pub u32);

impl fmt::Display for AbilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Event kinds
// ---------------------------------------------------------------------------

/// Wire names are the lowercase event type strings of the log source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Cast,
    BeginCast,
    Heal,
    #[serde(rename = "absorbed")]
    Absorb,
    Damage,
    ApplyBuff,
    ApplyBuffStack,
    RefreshBuff,
    RemoveBuff,
    ApplyDebuff,
    RefreshDebuff,
    RemoveDebuff,
    Interrupt,
    Death,
}

impl EventKind {
    pub const ALL: [EventKind; 14] = [
        EventKind::Cast,
        EventKind::BeginCast,
        EventKind::Heal,
        EventKind::Absorb,
        EventKind::Damage,
        EventKind::ApplyBuff,
        EventKind::ApplyBuffStack,
        EventKind::RefreshBuff,
        EventKind::RemoveBuff,
        EventKind::ApplyDebuff,
        EventKind::RefreshDebuff,
        EventKind::RemoveDebuff,
        EventKind::Interrupt,
        EventKind::Death,
    ];

    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Cast           => "cast",
            Self::BeginCast      => "begincast",
            Self::Heal           => "heal",
            Self::Absorb         => "absorbed",
            Self::Damage         => "damage",
            Self::ApplyBuff      => "applybuff",
            Self::ApplyBuffStack => "applybuffstack",
            Self::RefreshBuff    => "refreshbuff",
            Self::RemoveBuff     => "removebuff",
            Self::ApplyDebuff    => "applydebuff",
            Self::RefreshDebuff  => "refreshdebuff",
            Self::RemoveDebuff   => "removedebuff",
            Self::Interrupt      => "interrupt",
            Self::Death          => "death",
        }
    }

    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.wire_name() == name)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    /// Position of the originating record in the raw log.
    pub index:     u32,
    /// Milliseconds since fight start.
    pub timestamp: u64,
    pub kind:      EventKind,
    pub source:    Option<ActorId>,
    pub target:    Option<ActorId>,
    pub ability:   Option<AbilityId>,
    pub amount:    u64,
    pub overheal:  u64,
    pub absorbed:  u64,
    /// Periodic (HoT/DoT) instance rather than a direct hit.
    pub tick:      bool,
}

impl Event {
    /// A bare event of `kind` at `timestamp`; the remaining fields default.
    pub fn new(kind: EventKind, timestamp: u64) -> Self {
        Self {
            index: 0,
            timestamp,
            kind,
            source: None,
            target: None,
            ability: None,
            amount: 0,
            overheal: 0,
            absorbed: 0,
            tick: false,
        }
    }

    pub fn by(mut self, source: ActorId) -> Self {
        self.source = Some(source);
        self
    }

    pub fn on(mut self, target: ActorId) -> Self {
        self.target = Some(target);
        self
    }

    pub fn ability(mut self, ability: AbilityId) -> Self {
        self.ability = Some(ability);
        self
    }

    pub fn amount(mut self, amount: u64) -> Self {
        self.amount = amount;
        self
    }

    pub fn overheal(mut self, overheal: u64) -> Self {
        self.overheal = overheal;
        self
    }

    pub fn absorbed(mut self, absorbed: u64) -> Self {
        self.absorbed = absorbed;
        self
    }

    pub fn tick(mut self, tick: bool) -> Self {
        self.tick = tick;
        self
    }

    fn relation_rank(&self, observed: ActorId) -> u8 {
        if self.source == Some(observed) {
            0
        } else if self.target == Some(observed) {
            1
        } else {
            2
        }
    }
}

// ---------------------------------------------------------------------------
// Raw records (log-source shape)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAbility {
    pub guid: u32,
    #[serde(default)]
    pub name: String,
}

/// One record as supplied by the log source. `kind` stays a string so an
/// unknown event type is skipped during normalization instead of failing
/// the whole deserialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    pub timestamp: u64,
    #[serde(rename = "type")]
    pub kind:      String,
    #[serde(rename = "sourceID", default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<u64>,
    #[serde(rename = "targetID", default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ability:   Option<RawAbility>,
    #[serde(default)]
    pub amount:    u64,
    #[serde(default)]
    pub overheal:  u64,
    #[serde(default)]
    pub absorbed:  u64,
    #[serde(default)]
    pub tick:      bool,
}

// ---------------------------------------------------------------------------
// EventStream
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct EventStream {
    events:  Vec<Event>,
    skipped: usize,
}

impl EventStream {
    /// Normalize raw records for one fight. Records are ordered on their raw
    /// timestamps and only then rebased onto `fight_start_ms`, so pre-pull
    /// records clamp to 0 without losing their relative order. Records of
    /// unknown type are dropped and counted.
    pub fn normalize(records: &[RawRecord], fight_start_ms: u64, observed: ActorId) -> Self {
        if records.windows(2).any(|w| w[1].timestamp < w[0].timestamp) {
            tracing::debug!("Raw log is not in timestamp order, stable-sorting {} records", records.len());
        }

        let mut skipped = 0;
        let mut events = Vec::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            let Some(kind) = EventKind::from_wire(&record.kind) else {
                skipped += 1;
                continue;
            };
            events.push(Event {
                index:     index as u32,
                timestamp: record.timestamp,
                kind,
                source:    record.source_id.map(ActorId),
                target:    record.target_id.map(ActorId),
                ability:   record.ability.as_ref().map(|a| AbilityId(a.guid)),
                amount:    record.amount,
                overheal:  record.overheal,
                absorbed:  record.absorbed,
                tick:      record.tick,
            });
        }

        if skipped > 0 {
            tracing::debug!("Skipped {} raw records of unknown type", skipped);
        }

        let mut stream = Self { events, skipped };
        stream.order(observed);
        for event in &mut stream.events {
            event.timestamp = event.timestamp.saturating_sub(fight_start_ms);
        }
        stream
    }

    /// Build a stream from already-typed events. Each event's `index` is
    /// reassigned from its position in `events`.
    pub fn from_events(events: Vec<Event>, observed: ActorId) -> Self {
        let mut stream = Self {
            events: events
                .into_iter()
                .enumerate()
                .map(|(i, e)| Event { index: i as u32, ..e })
                .collect(),
            skipped: 0,
        };
        stream.order(observed);
        stream
    }

    fn order(&mut self, observed: ActorId) {
        self.events
            .sort_by_key(|e| (e.timestamp, e.relation_rank(observed), e.index));
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Event> {
        self.events.iter()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Raw records dropped because their type is not modelled.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl<'a> IntoIterator for &'a EventStream {
    type Item = &'a Event;
    type IntoIter = std::slice::Iter<'a, Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}
