/// Reads WoW combat log text into `RawRecord`s for one encounter.
///
/// Line format:
///
///   TIMESTAMP  SUBEVENT,HIDECASTER,SOURCEGUID,SOURCENAME,SOURCEFLAGS,SOURCERAIDFLAGS,
///              DESTGUID,DESTNAME,DESTFLAGS,DESTRAIDFLAGS,[subevent-specific fields...]
///
/// Field indices (0-based after splitting on comma):
///   [0]  subevent name (e.g. "SPELL_DAMAGE")
///   [2]  source GUID          [3]  source name (quoted)
///   [6]  dest GUID            [7]  dest name (quoted)
///   [10] spell ID             [11] spell name (quoted)     [12] spell school
///   [13+] subevent-specific
///
/// SWING_* events have no spell prefix; their suffix starts at [10].
///
/// With advanced logging on (announced by the `COMBAT_LOG_VERSION` header),
/// damage, heal and cast-success lines carry a block of unit fields between
/// the prefix and the suffix, which shifts the suffix by `ADVANCED_FIELDS`.
///
/// GUID strings are interned into `ActorId`s in order of first appearance.
/// `Player-*` GUIDs make up the roster. `ENCOUNTER_START`/`ENCOUNTER_END`
/// bound the fight and lines after `ENCOUNTER_END` are ignored; without
/// encounter lines the first and last line do.
use crate::{
    abilities::MELEE,
    context::{Boss, Combatant, Fight, Roster, RunContext},
    event::{ActorId, EventStream, RawAbility, RawRecord},
};
use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

const ADVANCED_FIELDS: usize = 17;
const NIL_GUID: &str = "0000000000000000";
const DAY_MS: u64 = 86_400_000;

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

/// Parse the timestamp prefix "M/D HH:MM:SS.mmm" into milliseconds since
/// midnight. The date is ignored; midnight rollover is handled by the reader.
fn parse_timestamp(date_time: &str) -> Option<u64> {
    let mut parts = date_time.splitn(2, ' ');
    let _date = parts.next()?;
    let time  = parts.next()?;

    let mut time_parts = time.splitn(3, ':');
    let h:  u64 = time_parts.next()?.parse().ok()?;
    let m:  u64 = time_parts.next()?.parse().ok()?;
    let sm: &str = time_parts.next()?;

    let (s_str, ms_str) = sm.split_once('.').unwrap_or((sm, "0"));
    let s:  u64 = s_str.parse().ok()?;
    let ms: u64 = ms_str.parse().ok()?;

    Some((h * 3_600 + m * 60 + s) * 1_000 + ms)
}

#[inline]
fn unquote(s: &str) -> &str {
    s.trim_matches('"')
}

/// Split a raw line into (timestamp_ms, fields[]). Timestamp and payload are
/// separated by two spaces.
fn split_line(raw: &str) -> Option<(u64, Vec<&str>)> {
    let sep = raw.find("  ")?;
    let ts_ms = parse_timestamp(&raw[..sep])?;
    let fields: Vec<&str> = raw[sep + 2..].trim_end().split(',').collect();
    Some((ts_ms, fields))
}

fn num<T: std::str::FromStr>(fields: &[&str], at: usize) -> Option<T> {
    fields.get(at)?.trim().parse().ok()
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CombatLog {
    pub fight:   Fight,
    pub roster:  Roster,
    pub records: Vec<RawRecord>,
    /// Lines that were not understood or not modelled.
    pub skipped: usize,
    actors:      HashMap<String, ActorId>,
}

impl CombatLog {
    pub fn actor(&self, guid: &str) -> Option<ActorId> {
        self.actors.get(guid).copied()
    }

    /// Roster lookup by name; a bare character name also matches "Name-Realm".
    pub fn player_named(&self, name: &str) -> Option<ActorId> {
        self.roster
            .combatants
            .iter()
            .find(|c| c.name == name || c.name.split('-').next() == Some(name))
            .map(|c| c.id)
    }

    pub fn context(&self, selected: ActorId) -> RunContext {
        RunContext { selected, fight: self.fight.clone(), roster: self.roster.clone() }
    }

    pub fn stream(&self, selected: ActorId) -> EventStream {
        EventStream::normalize(&self.records, self.fight.start_ms, selected)
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct CombatLogReader {
    advanced:  bool,
    actors:    HashMap<String, ActorId>,
    roster:    Vec<Combatant>,
    records:   Vec<RawRecord>,
    skipped:   usize,
    day_offset: u64,
    last_ts:   Option<u64>,
    first_ts:  Option<u64>,
    start:     Option<u64>,
    end:       Option<u64>,
    boss:      Option<Boss>,
}

impl CombatLogReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force advanced-logging field layout (normally read from the header).
    pub fn advanced(mut self, advanced: bool) -> Self {
        self.advanced = advanced;
        self
    }

    pub fn read_str(text: &str) -> CombatLog {
        let mut reader = Self::new();
        for line in text.lines() {
            reader.push_line(line);
        }
        reader.finish()
    }

    pub fn read_file(path: &Path) -> Result<CombatLog> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read combat log {}", path.display()))?;
        let log = Self::read_str(&text);
        tracing::info!(
            "Read {} record(s), {} combatant(s) from {} ({} line(s) skipped)",
            log.records.len(),
            log.roster.combatants.len(),
            path.display(),
            log.skipped
        );
        Ok(log)
    }

    pub fn push_line(&mut self, raw: &str) {
        if raw.trim().is_empty() {
            return;
        }
        let Some((ts, fields)) = split_line(raw) else {
            self.skipped += 1;
            return;
        };
        let ts = self.monotonic(ts);
        self.first_ts.get_or_insert(ts);

        match fields.first().copied() {
            Some("COMBAT_LOG_VERSION") => {
                // COMBAT_LOG_VERSION,4,ADVANCED_LOG_ENABLED,1,...
                if let Some(pos) = fields.iter().position(|f| *f == "ADVANCED_LOG_ENABLED") {
                    self.advanced = fields.get(pos + 1) == Some(&"1");
                }
            }
            Some("ENCOUNTER_START") => {
                self.start = Some(ts);
                self.end = None;
                self.records.clear();
                if let (Some(id), Some(name)) = (num::<u32>(&fields, 1), fields.get(2)) {
                    self.boss = Some(Boss { id, name: unquote(name).to_owned(), vantus_rune_buff_id: None });
                }
            }
            Some("ENCOUNTER_END") => self.end = Some(ts),
            // between encounters: nothing counts until the next ENCOUNTER_START
            _ if self.end.is_some() => {}
            _ => match self.parse_record(ts, &fields) {
                Some(record) => self.records.push(record),
                None => self.skipped += 1,
            },
        }
    }

    /// Timestamps carry no date; a large backwards jump means midnight passed.
    fn monotonic(&mut self, ts: u64) -> u64 {
        let mut ts = ts + self.day_offset;
        if let Some(last) = self.last_ts {
            if ts + DAY_MS / 2 < last {
                self.day_offset += DAY_MS;
                ts += DAY_MS;
            }
        }
        self.last_ts = Some(ts);
        ts
    }

    fn intern(&mut self, guid: &str, name: &str) -> Option<ActorId> {
        if guid.is_empty() || guid == NIL_GUID {
            return None;
        }
        if let Some(id) = self.actors.get(guid) {
            return Some(*id);
        }
        let id = ActorId(self.actors.len() as u64 + 1);
        self.actors.insert(guid.to_owned(), id);
        if guid.starts_with("Player-") {
            self.roster.push(Combatant {
                id,
                name:  name.to_owned(),
                class: String::new(),
                spec:  String::new(),
                auras: Vec::new(),
            });
        }
        Some(id)
    }

    fn parse_record(&mut self, ts: u64, f: &[&str]) -> Option<RawRecord> {
        let subevent = *f.first()?;
        let source = self.intern(unquote(f.get(2)?), unquote(f.get(3)?));
        let target = self.intern(unquote(f.get(6)?), unquote(f.get(7)?));

        let spell = || -> Option<RawAbility> {
            Some(RawAbility { guid: num(f, 10)?, name: unquote(f.get(11)?).to_owned() })
        };
        let adv = if self.advanced { ADVANCED_FIELDS } else { 0 };

        let mut record = RawRecord {
            timestamp: ts,
            source_id: source.map(|a| a.0),
            target_id: target.map(|a| a.0),
            ..RawRecord::default()
        };

        match subevent {
            "SPELL_CAST_START" => {
                record.kind = "begincast".into();
                record.ability = Some(spell()?);
            }
            "SPELL_CAST_SUCCESS" => {
                record.kind = "cast".into();
                record.ability = Some(spell()?);
            }
            "SPELL_HEAL" | "SPELL_PERIODIC_HEAL" => {
                // suffix: amount, overhealing, absorbed, critical
                let at = 13 + adv;
                record.kind = "heal".into();
                record.ability = Some(spell()?);
                record.amount = num(f, at)?;
                record.overheal = num(f, at + 1).unwrap_or(0);
                record.absorbed = num(f, at + 2).unwrap_or(0);
                record.tick = subevent == "SPELL_PERIODIC_HEAL";
            }
            "SPELL_DAMAGE" | "SPELL_PERIODIC_DAMAGE" | "RANGE_DAMAGE" => {
                // suffix: amount, overkill, school, resisted, blocked, absorbed, ...
                let at = 13 + adv;
                record.kind = "damage".into();
                record.ability = Some(spell()?);
                record.amount = num(f, at)?;
                record.absorbed = num(f, at + 5).unwrap_or(0);
                record.tick = subevent == "SPELL_PERIODIC_DAMAGE";
            }
            "SWING_DAMAGE" => {
                let at = 10 + adv;
                record.kind = "damage".into();
                record.ability = Some(RawAbility { guid: MELEE.0, name: "Melee".into() });
                record.amount = num(f, at)?;
                record.absorbed = num(f, at + 5).unwrap_or(0);
            }
            "SPELL_AURA_APPLIED" | "SPELL_AURA_APPLIED_DOSE" | "SPELL_AURA_REFRESH" | "SPELL_AURA_REMOVED" => {
                let debuff = f.get(13).map(|t| t.trim()) == Some("DEBUFF");
                record.kind = match (subevent, debuff) {
                    ("SPELL_AURA_APPLIED", false) => "applybuff",
                    ("SPELL_AURA_APPLIED", true) => "applydebuff",
                    ("SPELL_AURA_APPLIED_DOSE", false) => "applybuffstack",
                    ("SPELL_AURA_REFRESH", false) => "refreshbuff",
                    ("SPELL_AURA_REFRESH", true) => "refreshdebuff",
                    ("SPELL_AURA_REMOVED", false) => "removebuff",
                    ("SPELL_AURA_REMOVED", true) => "removedebuff",
                    _ => return None,
                }
                .into();
                record.ability = Some(spell()?);
            }
            "SPELL_INTERRUPT" => {
                // the interrupted spell, not the kick, is what matters downstream
                record.kind = "interrupt".into();
                record.ability = Some(RawAbility { guid: num(f, 13)?, name: unquote(f.get(14)?).to_owned() });
            }
            "UNIT_DIED" => {
                record.kind = "death".into();
                record.source_id = None;
            }
            _ => return None,
        }
        Some(record)
    }

    pub fn finish(self) -> CombatLog {
        let start = self.start.or(self.first_ts).unwrap_or(0);
        let end = self.end.or(self.last_ts).unwrap_or(start).max(start);
        let fight = Fight {
            id:       self.boss.as_ref().map(|b| b.id).unwrap_or(0),
            name:     self.boss.as_ref().map(|b| b.name.clone()).unwrap_or_default(),
            start_ms: start,
            end_ms:   end,
            boss:     self.boss,
        };
        CombatLog {
            fight,
            roster: Roster { combatants: self.roster },
            records: self.records,
            skipped: self.skipped,
            actors: self.actors,
        }
    }
}

// ---------------------------------------------------------------------------
// Logs directory
// ---------------------------------------------------------------------------

fn is_combat_log(name: &str) -> bool {
    name.starts_with("WoWCombatLog") && name.ends_with(".txt")
}

fn has_encounter(path: &Path) -> bool {
    let Ok(file) = std::fs::File::open(path) else {
        return false;
    };
    BufReader::new(file)
        .lines()
        .map_while(|line| line.ok())
        .any(|line| line.contains("  ENCOUNTER_START,"))
}

/// Pick the log to analyze from a WoW `Logs` directory: the newest
/// `WoWCombatLog*.txt` that contains an encounter, else the newest one.
pub fn find_encounter_log(logs_dir: &Path) -> Result<PathBuf> {
    let entries = std::fs::read_dir(logs_dir)
        .with_context(|| format!("Failed to list {}", logs_dir.display()))?;

    let mut logs: Vec<(SystemTime, PathBuf)> = entries
        .flatten()
        .filter(|e| is_combat_log(&e.file_name().to_string_lossy()))
        .filter_map(|e| Some((e.metadata().and_then(|m| m.modified()).ok()?, e.path())))
        .collect();
    logs.sort_by(|a, b| b.0.cmp(&a.0));

    let Some((_, newest)) = logs.first() else {
        bail!("No WoWCombatLog*.txt in {}", logs_dir.display());
    };
    match logs.iter().find(|(_, path)| has_encounter(path)) {
        Some((_, path)) => {
            tracing::debug!("Selected {} (newest log with an encounter)", path.display());
            Ok(path.clone())
        }
        None => {
            tracing::debug!("No log in {} has an encounter, using {}", logs_dir.display(), newest.display());
            Ok(newest.clone())
        }
    }
}
