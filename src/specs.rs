/// Spec profile library, embedded at compile time from `data/specs/*.toml`.
///
/// A profile names the analysis modules that make sense for one class/spec.
/// When the configuration requests no modules explicitly, the run uses the
/// shared list plus the observed combatant's profile.
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Embedded TOML data
// ---------------------------------------------------------------------------

const SHARED:          &str = include_str!("../data/specs/shared.toml");
const MONK_MISTWEAVER: &str = include_str!("../data/specs/monk_mistweaver.toml");
const PALADIN_HOLY:    &str = include_str!("../data/specs/paladin_holy.toml");

static ALL_SPEC_DATA: &[&str] = &[
    MONK_MISTWEAVER,
    PALADIN_HOLY,
];

static PROFILES: Lazy<Vec<SpecProfile>> = Lazy::new(parse_all);
static SHARED_MODULES: Lazy<Vec<String>> = Lazy::new(|| {
    toml::from_str::<TomlShared>(SHARED)
        .map(|s| s.modules.ids)
        .map_err(|e| tracing::warn!("Failed to parse shared module list: {}", e))
        .unwrap_or_default()
});

// ---------------------------------------------------------------------------
// TOML deserialization structs (private)
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct TomlFile {
    spec:    TomlSpecMeta,
    modules: TomlModules,
}

#[derive(Deserialize)]
struct TomlSpecMeta {
    class:       String,
    spec:        String,
    role:        String,
    #[serde(default)]
    description: String,
}

#[derive(Deserialize)]
struct TomlModules {
    ids: Vec<String>,
}

#[derive(Deserialize)]
struct TomlShared {
    modules: TomlModules,
}

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SpecProfile {
    pub class:       String,
    pub spec_name:   String,
    pub role:        String,
    pub description: String,
    /// Spec-specific module ids, without the shared ones.
    pub modules:     Vec<String>,
}

impl SpecProfile {
    /// Canonical "Class/Spec" key.
    pub fn key(&self) -> String {
        format!("{}/{}", self.class, self.spec_name)
    }
}

/// Lightweight descriptor for listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecInfo {
    pub key:     String,
    pub class:   String,
    pub spec:    String,
    pub role:    String,
    pub modules: Vec<String>,
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

fn parse_all() -> Vec<SpecProfile> {
    ALL_SPEC_DATA
        .iter()
        .filter_map(|toml_str| {
            let file: TomlFile = toml::from_str(toml_str)
                .map_err(|e| tracing::warn!("Failed to parse spec TOML: {}", e))
                .ok()?;
            Some(SpecProfile {
                class:       file.spec.class,
                spec_name:   file.spec.spec,
                role:        file.spec.role,
                description: file.spec.description,
                modules:     file.modules.ids,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

pub fn list_all() -> Vec<SpecInfo> {
    PROFILES
        .iter()
        .map(|p| SpecInfo {
            key:     p.key(),
            class:   p.class.clone(),
            spec:    p.spec_name.clone(),
            role:    p.role.clone(),
            modules: p.modules.clone(),
        })
        .collect()
}

/// Load a spec profile by class and spec name (case-insensitive).
pub fn load_spec(class: &str, spec_name: &str) -> Option<SpecProfile> {
    PROFILES
        .iter()
        .find(|p| p.class.eq_ignore_ascii_case(class) && p.spec_name.eq_ignore_ascii_case(spec_name))
        .cloned()
}

/// Load a spec profile by its canonical "Class/Spec" key.
pub fn load_by_key(key: &str) -> Option<SpecProfile> {
    let (class, spec) = key.split_once('/')?;
    load_spec(class, spec)
}

/// Modules every actor gets.
pub fn shared_modules() -> Vec<String> {
    SHARED_MODULES.clone()
}

/// Shared modules followed by the profile's own; unknown specs get only
/// the shared list.
pub fn modules_for(class: &str, spec_name: &str) -> Vec<String> {
    let mut modules = shared_modules();
    match load_spec(class, spec_name) {
        Some(profile) => {
            for id in profile.modules {
                if !modules.contains(&id) {
                    modules.push(id);
                }
            }
        }
        None => tracing::debug!("No spec profile for {}/{}, using shared modules only", class, spec_name),
    }
    modules
}
