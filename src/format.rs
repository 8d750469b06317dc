/// Display formatting, the boundary to the localization collaborator.
///
/// Modules never build display strings. They hand over a `Template` (a
/// message id plus named arguments) and raw numbers; a `Formatter` turns
/// them into text during the pull phase. The built-in `CatalogFormatter`
/// reads an English catalog embedded from `data/messages.toml`; callers
/// with their own localization pass a different `Formatter`.
///
/// Ability names are catalog entries too, under `ability.<id>`.
use crate::event::AbilityId;
use anyhow::Result;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const ENGLISH_TOML: &str = include_str!("../data/messages.toml");

static ENGLISH: Lazy<HashMap<String, String>> = Lazy::new(|| {
    parse_catalog(ENGLISH_TOML)
        .map_err(|e| tracing::warn!("Failed to parse embedded message catalog: {}", e))
        .unwrap_or_default()
});

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueStyle {
    /// Compact integer: 950, 12.3k, 1.25m
    Number,
    /// Fixed number of decimals.
    Decimal(u8),
    /// Ratio rendered as percent (0.125 → 12.50%).
    Percentage,
    Seconds,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Number(f64, ValueStyle),
    Text(String),
    Ability(AbilityId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    id:   &'static str,
    args: Vec<(&'static str, Arg)>,
}

impl Template {
    pub fn new(id: &'static str) -> Self {
        Self { id, args: Vec::new() }
    }

    pub fn number(mut self, name: &'static str, value: f64, style: ValueStyle) -> Self {
        self.args.push((name, Arg::Number(value, style)));
        self
    }

    pub fn text(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.args.push((name, Arg::Text(value.into())));
        self
    }

    pub fn ability(mut self, name: &'static str, id: AbilityId) -> Self {
        self.args.push((name, Arg::Ability(id)));
        self
    }

    pub fn id(&self) -> &'static str {
        self.id
    }

    pub fn args(&self) -> &[(&'static str, Arg)] {
        &self.args
    }
}

// ---------------------------------------------------------------------------
// Formatter
// ---------------------------------------------------------------------------

pub trait Formatter {
    fn render(&self, template: &Template) -> String;
    fn value(&self, value: f64, style: ValueStyle) -> String;
}

#[derive(Debug, Clone)]
pub struct CatalogFormatter {
    messages: HashMap<String, String>,
}

impl Default for CatalogFormatter {
    fn default() -> Self {
        Self::english()
    }
}

impl CatalogFormatter {
    /// Formatter backed by the embedded English catalog.
    pub fn english() -> Self {
        Self { messages: ENGLISH.clone() }
    }

    /// Formatter backed by a caller-supplied catalog in the same TOML shape
    /// as `data/messages.toml`.
    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(Self { messages: parse_catalog(raw)? })
    }

    pub fn with_message(mut self, id: &str, text: &str) -> Self {
        self.messages.insert(id.to_owned(), text.to_owned());
        self
    }

    fn ability_name(&self, id: AbilityId) -> String {
        self.messages
            .get(&format!("ability.{}", id))
            .cloned()
            .unwrap_or_else(|| format!("Ability {}", id))
    }

    fn render_arg(&self, arg: &Arg) -> String {
        match arg {
            Arg::Number(v, style) => self.value(*v, *style),
            Arg::Text(s) => s.clone(),
            Arg::Ability(id) => self.ability_name(*id),
        }
    }
}

impl Formatter for CatalogFormatter {
    fn render(&self, template: &Template) -> String {
        let Some(pattern) = self.messages.get(template.id()) else {
            tracing::debug!("No catalog entry for '{}'", template.id());
            return template.id().to_owned();
        };
        let mut out = pattern.clone();
        for (name, arg) in template.args() {
            let placeholder = format!("{{{}}}", name);
            if out.contains(&placeholder) {
                out = out.replace(&placeholder, &self.render_arg(arg));
            }
        }
        out
    }

    fn value(&self, value: f64, style: ValueStyle) -> String {
        let value = if value.is_finite() { value } else { 0.0 };
        match style {
            ValueStyle::Number => format_number(value),
            ValueStyle::Decimal(places) => format!("{:.*}", places as usize, value),
            ValueStyle::Percentage => format!("{:.2}%", value * 100.0),
            ValueStyle::Seconds => format!("{:.1}s", value),
        }
    }
}

#[derive(Deserialize)]
struct CatalogFile {
    messages: HashMap<String, String>,
}

fn parse_catalog(raw: &str) -> Result<HashMap<String, String>> {
    let file: CatalogFile =
        toml::from_str(raw).map_err(|e| anyhow::anyhow!("Message catalog parse error: {}", e))?;
    Ok(file.messages)
}

// ---------------------------------------------------------------------------
// Number helpers
// ---------------------------------------------------------------------------

/// Compact number: millions with two decimals, ten-thousands with one,
/// everything smaller as a grouped integer.
pub fn format_number(value: f64) -> String {
    let abs = value.abs();
    if abs >= 1_000_000.0 {
        format!("{:.2}m", value / 1_000_000.0)
    } else if abs >= 10_000.0 {
        format!("{:.1}k", value / 1_000.0)
    } else {
        group_thousands(value.round() as i64)
    }
}

fn group_thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_numbers() {
        assert_eq!(format_number(950.0), "950");
        assert_eq!(format_number(9_999.4), "9,999");
        assert_eq!(format_number(12_345.0), "12.3k");
        assert_eq!(format_number(1_250_000.0), "1.25m");
        assert_eq!(format_number(-1_234.0), "-1,234");
    }

    #[test]
    fn value_styles() {
        let f = CatalogFormatter::english();
        assert_eq!(f.value(2.0, ValueStyle::Decimal(2)), "2.00");
        assert_eq!(f.value(0.125, ValueStyle::Percentage), "12.50%");
        assert_eq!(f.value(f64::NAN, ValueStyle::Decimal(1)), "0.0");
        assert_eq!(f.value(3.25, ValueStyle::Seconds), "3.2s");
    }

    #[test]
    fn renders_named_placeholders() {
        let f = CatalogFormatter::from_toml(
            "[messages]\n\"greet\" = \"{who} healed for {amount}\"\n\"ability.5\" = \"Renew\"\n",
        )
        .unwrap();
        let t = Template::new("greet")
            .ability("who", AbilityId(5))
            .number("amount", 12_345.0, ValueStyle::Number);
        assert_eq!(f.render(&t), "Renew healed for 12.3k");
    }

    #[test]
    fn unknown_template_renders_its_id() {
        let f = CatalogFormatter::from_toml("[messages]\n").unwrap();
        assert_eq!(f.render(&Template::new("nope.missing")), "nope.missing");
    }

    #[test]
    fn unknown_ability_falls_back_to_id() {
        let f = CatalogFormatter::from_toml("[messages]\n\"x\" = \"{a}\"\n").unwrap();
        assert_eq!(f.render(&Template::new("x").ability("a", AbilityId(42))), "Ability 42");
    }

    #[test]
    fn embedded_catalog_has_ability_names() {
        let f = CatalogFormatter::english();
        let t = Template::new("essence_font.statistic.label");
        assert_ne!(f.render(&t), "essence_font.statistic.label");
        assert_eq!(f.ability_name(AbilityId(191837)), "Essence Font");
    }

    #[test]
    fn with_message_overrides_entry() {
        let f = CatalogFormatter::english().with_message("suggestion.recommended", "aim for {recommended}");
        let t = Template::new("suggestion.recommended").number("recommended", 17.0, ValueStyle::Number);
        assert_eq!(f.render(&t), "aim for 17");
    }
}
