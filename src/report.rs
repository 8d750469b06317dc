/// Pull-phase outputs and the assembled result.
///
/// Modules return `Statistic`s and `View`s holding templates and raw
/// numbers. The run renders them through the `Formatter` into the
/// `AnalysisResult` handed to the presentation layer.
use crate::{
    error::Diagnostic,
    event::AbilityId,
    format::{Formatter, Template, ValueStyle},
    module::ModuleId,
    threshold::{Severity, Suggestion},
};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatisticCategory {
    #[default]
    General,
    Talents,
    Items,
    Spells,
}

/// Relative placement hint. Lower positions come first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatisticOrder {
    Core(u32),
    #[default]
    Default,
    Optional(u32),
    Unimportant(u32),
}

impl StatisticOrder {
    pub fn position(self) -> u32 {
        match self {
            Self::Core(n)        => n,
            Self::Default        => 1000,
            Self::Optional(n)    => 2000 + n,
            Self::Unimportant(n) => 3000 + n,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statistic {
    pub category: StatisticCategory,
    pub order:    StatisticOrder,
    pub icon:     Option<AbilityId>,
    pub label:    Template,
    pub value:    Template,
    pub tooltip:  Option<Template>,
    /// The number behind `value`, for consumers that do their own display.
    pub raw:      f64,
}

impl Statistic {
    pub fn new(label: Template, value: Template, raw: f64) -> Self {
        Self {
            category: StatisticCategory::default(),
            order: StatisticOrder::default(),
            icon: None,
            label,
            value,
            tooltip: None,
            raw,
        }
    }

    pub fn category(mut self, category: StatisticCategory) -> Self {
        self.category = category;
        self
    }

    pub fn order(mut self, order: StatisticOrder) -> Self {
        self.order = order;
        self
    }

    pub fn icon(mut self, ability: AbilityId) -> Self {
        self.icon = Some(ability);
        self
    }

    pub fn tooltip(mut self, tooltip: Template) -> Self {
        self.tooltip = Some(tooltip);
        self
    }
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ViewRow {
    pub label: Template,
    pub value: f64,
    pub style: ValueStyle,
}

/// Auxiliary named output, e.g. a per-ability breakdown tab.
#[derive(Debug, Clone, PartialEq)]
pub struct View {
    pub key:   String,
    pub title: Template,
    pub order: u32,
    pub rows:  Vec<ViewRow>,
}

impl View {
    pub fn new(key: impl Into<String>, title: Template, order: u32) -> Self {
        Self { key: key.into(), title, order, rows: Vec::new() }
    }

    pub fn row(mut self, label: Template, value: f64, style: ValueStyle) -> Self {
        self.rows.push(ViewRow { label, value, style });
        self
    }
}

// ---------------------------------------------------------------------------
// Rendered entries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticEntry {
    pub module:   ModuleId,
    pub category: StatisticCategory,
    pub position: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon:     Option<AbilityId>,
    pub label:    String,
    pub value:    String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tooltip:  Option<String>,
    pub raw:      f64,
}

impl StatisticEntry {
    pub fn render(module: ModuleId, stat: &Statistic, f: &dyn Formatter) -> Self {
        Self {
            module,
            category: stat.category,
            position: stat.order.position(),
            icon: stat.icon,
            label: f.render(&stat.label),
            value: f.render(&stat.value),
            tooltip: stat.tooltip.as_ref().map(|t| f.render(t)),
            raw: stat.raw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuggestionEntry {
    pub module: ModuleId,
    #[serde(flatten)]
    pub suggestion: Suggestion,
}

impl SuggestionEntry {
    pub fn severity(&self) -> Severity {
        self.suggestion.severity
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedRow {
    pub label:   String,
    pub value:   f64,
    pub display: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewEntry {
    pub module: ModuleId,
    pub key:    String,
    pub title:  String,
    pub order:  u32,
    pub rows:   Vec<RenderedRow>,
}

impl ViewEntry {
    pub fn render(module: ModuleId, view: &View, f: &dyn Formatter) -> Self {
        Self {
            module,
            key: view.key.clone(),
            title: f.render(&view.title),
            order: view.order,
            rows: view
                .rows
                .iter()
                .map(|row| RenderedRow {
                    label: f.render(&row.label),
                    value: row.value,
                    display: f.value(row.value, row.style),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InactiveModule {
    pub id:     ModuleId,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// AnalysisResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub statistics:        Vec<StatisticEntry>,
    pub suggestions:       Vec<SuggestionEntry>,
    pub views:             Vec<ViewEntry>,
    pub active_modules:    Vec<ModuleId>,
    pub inactive_modules:  Vec<InactiveModule>,
    pub events_dispatched: usize,
    pub diagnostics:       Vec<Diagnostic>,
}

impl AnalysisResult {
    pub fn view(&self, key: &str) -> Option<&ViewEntry> {
        self.views.iter().find(|v| v.key == key)
    }

    pub fn statistic(&self, module: ModuleId) -> Option<&StatisticEntry> {
        self.statistics.iter().find(|s| s.module == module)
    }

    /// Stable orderings for presentation. Entries must have been pushed in
    /// module order; sorting is stable so that order breaks ties.
    pub(crate) fn sort(&mut self) {
        self.statistics.sort_by_key(|s| s.position);
        self.suggestions.sort_by(|a, b| b.severity().cmp(&a.severity()));
        self.views.sort_by_key(|v| v.order);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::CatalogFormatter;

    fn suggestion(module: &'static str, severity: Severity) -> SuggestionEntry {
        SuggestionEntry {
            module: ModuleId::new(module),
            suggestion: Suggestion {
                severity,
                explanation: String::new(),
                icon: None,
                actual: String::new(),
                recommended: String::new(),
                actual_value: 0.0,
                recommended_value: None,
            },
        }
    }

    #[test]
    fn positions() {
        assert_eq!(StatisticOrder::Core(60).position(), 60);
        assert_eq!(StatisticOrder::Default.position(), 1000);
        assert_eq!(StatisticOrder::Optional(50).position(), 2050);
        assert_eq!(StatisticOrder::Unimportant(0).position(), 3000);
    }

    #[test]
    fn suggestions_sort_by_severity_then_module_order() {
        let mut r = AnalysisResult {
            suggestions: vec![
                suggestion("a", Severity::Minor),
                suggestion("b", Severity::Major),
                suggestion("c", Severity::Minor),
                suggestion("d", Severity::Major),
            ],
            ..AnalysisResult::default()
        };
        r.sort();
        let order: Vec<&str> = r.suggestions.iter().map(|s| s.module.as_str()).collect();
        assert_eq!(order, vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn renders_view_rows() {
        let f = CatalogFormatter::from_toml("[messages]\n\"t\" = \"Title\"\n\"r\" = \"{a}\"\n\"ability.3\" = \"Renew\"\n").unwrap();
        let view = View::new("healing", Template::new("t"), 10)
            .row(Template::new("r").ability("a", AbilityId(3)), 12_345.0, ValueStyle::Number);
        let entry = ViewEntry::render(ModuleId::new("m"), &view, &f);
        assert_eq!(entry.title, "Title");
        assert_eq!(entry.rows[0].label, "Renew");
        assert_eq!(entry.rows[0].display, "12.3k");
    }
}
