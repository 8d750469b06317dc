/// Threshold evaluation and suggestion collection.
///
/// A `SuggestionThreshold` pairs an actual value with a comparison mode and
/// up to three severity bands. Bands are scanned most severe first (major,
/// average, minor); the first band whose condition holds decides the
/// severity. If none holds there is no finding.
///
///   actual 11, is_less_than { minor 17, average 14, major 12 } -> major
///   actual 12                                                -> average
///   actual 15                                                -> minor
///   actual 20                                                -> none
///
/// The strict modes compare strictly, so a value sitting exactly on a band's
/// limit falls into the next milder band (12 is not less than 12).
use crate::{
    context::RunContext,
    event::AbilityId,
    format::{Formatter, Template, ValueStyle},
    module::ModuleId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-module band overrides, keyed by module id.
pub type ThresholdOverrides = BTreeMap<String, Bands>;

// ---------------------------------------------------------------------------
// Severity & comparison
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Minor,
    Average,
    Major,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Equal,
}

impl Comparison {
    pub fn holds(self, actual: f64, band: f64) -> bool {
        match self {
            Self::LessThan           => actual < band,
            Self::LessThanOrEqual    => actual <= band,
            Self::GreaterThan        => actual > band,
            Self::GreaterThanOrEqual => actual >= band,
            Self::Equal              => actual == band,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Self::LessThan           => ">",
            Self::LessThanOrEqual    => ">",
            Self::GreaterThan        => "<",
            Self::GreaterThanOrEqual => "<",
            Self::Equal              => "≠",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Bands {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minor:   Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub major:   Option<f64>,
}

impl Bands {
    pub fn new(minor: f64, average: f64, major: f64) -> Self {
        Self { minor: Some(minor), average: Some(average), major: Some(major) }
    }

    /// Bands set in `overrides` replace ours; unset ones keep our value.
    pub fn merged(&self, overrides: &Bands) -> Bands {
        Bands {
            minor:   overrides.minor.or(self.minor),
            average: overrides.average.or(self.average),
            major:   overrides.major.or(self.major),
        }
    }

    fn most_severe_first(&self) -> [(Severity, Option<f64>); 3] {
        [
            (Severity::Major, self.major),
            (Severity::Average, self.average),
            (Severity::Minor, self.minor),
        ]
    }
}

// ---------------------------------------------------------------------------
// SuggestionThreshold
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SuggestionThreshold {
    pub actual:     f64,
    pub comparison: Comparison,
    pub bands:      Bands,
    pub style:      ValueStyle,
}

impl SuggestionThreshold {
    pub fn new(actual: f64, comparison: Comparison, bands: Bands) -> Self {
        Self { actual, comparison, bands, style: ValueStyle::Number }
    }

    pub fn is_less_than(actual: f64, bands: Bands) -> Self {
        Self::new(actual, Comparison::LessThan, bands)
    }

    pub fn is_less_than_or_equal(actual: f64, bands: Bands) -> Self {
        Self::new(actual, Comparison::LessThanOrEqual, bands)
    }

    pub fn is_greater_than(actual: f64, bands: Bands) -> Self {
        Self::new(actual, Comparison::GreaterThan, bands)
    }

    pub fn is_greater_than_or_equal(actual: f64, bands: Bands) -> Self {
        Self::new(actual, Comparison::GreaterThanOrEqual, bands)
    }

    pub fn is_equal(actual: f64, bands: Bands) -> Self {
        Self::new(actual, Comparison::Equal, bands)
    }

    pub fn with_style(mut self, style: ValueStyle) -> Self {
        self.style = style;
        self
    }

    /// Actual value with NaN and infinities mapped to 0.
    pub fn actual(&self) -> f64 {
        finite_or_zero(self.actual)
    }

    pub fn severity(&self) -> Option<Severity> {
        let actual = self.actual();
        self.bands
            .most_severe_first()
            .into_iter()
            .find_map(|(severity, band)| match band {
                Some(b) if self.comparison.holds(actual, b) => Some(severity),
                _ => None,
            })
    }

    /// The value to aim for: the least severe band that is set.
    pub fn recommended(&self) -> Option<f64> {
        self.bands.minor.or(self.bands.average).or(self.bands.major)
    }
}

/// `numerator / denominator`, or 0 when the division is undefined.
pub fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        return 0.0;
    }
    finite_or_zero(numerator / denominator)
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() { v } else { 0.0 }
}

// ---------------------------------------------------------------------------
// Suggestions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub severity:          Severity,
    pub explanation:       String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon:              Option<AbilityId>,
    pub actual:            String,
    pub recommended:       String,
    pub actual_value:      f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended_value: Option<f64>,
}

/// What a module says about a finding; rendered by the collector.
#[derive(Debug, Clone)]
pub struct SuggestionBuilder {
    explanation: Template,
    icon:        Option<AbilityId>,
    actual:      Option<Template>,
    recommended: Option<Template>,
}

impl SuggestionBuilder {
    pub fn new(explanation: Template) -> Self {
        Self { explanation, icon: None, actual: None, recommended: None }
    }

    pub fn icon(mut self, ability: AbilityId) -> Self {
        self.icon = Some(ability);
        self
    }

    pub fn actual(mut self, text: Template) -> Self {
        self.actual = Some(text);
        self
    }

    pub fn recommended(mut self, text: Template) -> Self {
        self.recommended = Some(text);
        self
    }
}

/// Sink handed to `Module::suggestions`. Keeps findings in the order the
/// module declares them.
pub struct SuggestionCollector<'a> {
    module:      ModuleId,
    context:     &'a RunContext,
    formatter:   &'a dyn Formatter,
    overrides:   Option<&'a Bands>,
    suggestions: Vec<Suggestion>,
}

impl<'a> SuggestionCollector<'a> {
    pub fn new(
        module: ModuleId,
        context: &'a RunContext,
        formatter: &'a dyn Formatter,
        overrides: Option<&'a Bands>,
    ) -> Self {
        Self { module, context, formatter, overrides, suggestions: Vec::new() }
    }

    pub fn context(&self) -> &'a RunContext {
        self.context
    }

    pub fn module_id(&self) -> ModuleId {
        self.module
    }

    pub fn when(&mut self, threshold: SuggestionThreshold) -> Assertion<'_, 'a> {
        let threshold = match self.overrides {
            Some(o) => SuggestionThreshold { bands: threshold.bands.merged(o), ..threshold },
            None => threshold,
        };
        Assertion { collector: self, threshold }
    }

    pub fn into_suggestions(self) -> Vec<Suggestion> {
        self.suggestions
    }
}

pub struct Assertion<'c, 'a> {
    collector: &'c mut SuggestionCollector<'a>,
    threshold: SuggestionThreshold,
}

impl Assertion<'_, '_> {
    pub fn severity(&self) -> Option<Severity> {
        self.threshold.severity()
    }

    /// Emit a suggestion if a band fires. `build` receives the actual and
    /// recommended values and is not called when nothing fires.
    pub fn add_suggestion<F>(self, build: F) -> Option<Severity>
    where
        F: FnOnce(f64, f64) -> SuggestionBuilder,
    {
        let severity = self.threshold.severity()?;
        let t = &self.threshold;
        let actual = t.actual();
        let recommended = t.recommended();
        let builder = build(actual, recommended.unwrap_or_default());

        let f = self.collector.formatter;
        let actual_text = match &builder.actual {
            Some(template) => f.render(template),
            None => f.value(actual, t.style),
        };
        let recommended_text = match (&builder.recommended, recommended) {
            (Some(template), _) => f.render(template),
            (None, Some(r)) => f.render(
                &Template::new("suggestion.recommended")
                    .text("operator", t.comparison.symbol())
                    .text("recommended", f.value(r, t.style)),
            ),
            (None, None) => String::new(),
        };

        self.collector.suggestions.push(Suggestion {
            severity,
            explanation: f.render(&builder.explanation),
            icon: builder.icon,
            actual: actual_text,
            recommended: recommended_text,
            actual_value: actual,
            recommended_value: recommended,
        });
        Some(severity)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Fight;
    use crate::event::ActorId;
    use crate::format::CatalogFormatter;

    fn bands() -> Bands {
        Bands::new(17.0, 14.0, 12.0)
    }

    fn ctx() -> RunContext {
        RunContext::new(ActorId(1), Fight { id: 1, name: String::new(), start_ms: 0, end_ms: 1, boss: None })
    }

    #[test]
    fn less_than_scans_most_severe_first() {
        let sev = |a| SuggestionThreshold::is_less_than(a, bands()).severity();
        assert_eq!(sev(11.0), Some(Severity::Major));
        assert_eq!(sev(12.0), Some(Severity::Average));
        assert_eq!(sev(15.0), Some(Severity::Minor));
        assert_eq!(sev(17.0), None);
        assert_eq!(sev(20.0), None);
    }

    #[test]
    fn greater_than_is_the_mirror() {
        let b = Bands::new(0.1, 0.2, 0.3);
        let sev = |a| SuggestionThreshold::is_greater_than(a, b).severity();
        assert_eq!(sev(0.35), Some(Severity::Major));
        assert_eq!(sev(0.25), Some(Severity::Average));
        assert_eq!(sev(0.15), Some(Severity::Minor));
        assert_eq!(sev(0.1), None);
    }

    #[test]
    fn inclusive_modes_fire_on_the_boundary() {
        assert_eq!(SuggestionThreshold::is_less_than_or_equal(12.0, bands()).severity(), Some(Severity::Major));
        assert_eq!(
            SuggestionThreshold::is_greater_than_or_equal(0.2, Bands::new(0.1, 0.2, 0.3)).severity(),
            Some(Severity::Average)
        );
    }

    #[test]
    fn equal_mode_needs_exact_match() {
        let b = Bands { minor: Some(1.0), average: None, major: Some(0.0) };
        assert_eq!(SuggestionThreshold::is_equal(0.0, b).severity(), Some(Severity::Major));
        assert_eq!(SuggestionThreshold::is_equal(1.0, b).severity(), Some(Severity::Minor));
        assert_eq!(SuggestionThreshold::is_equal(0.5, b).severity(), None);
    }

    #[test]
    fn missing_bands_are_skipped() {
        let b = Bands { minor: Some(0.9), average: None, major: None };
        assert_eq!(SuggestionThreshold::is_less_than(0.0, b).severity(), Some(Severity::Minor));
    }

    #[test]
    fn non_finite_actual_is_zero() {
        let t = SuggestionThreshold::is_greater_than(f64::NAN, Bands::new(-1.0, -2.0, -3.0));
        assert_eq!(t.actual(), 0.0);
        assert_eq!(t.severity(), Some(Severity::Major));
    }

    #[test]
    fn ratio_guards_zero_denominator() {
        assert_eq!(ratio(5.0, 0.0), 0.0);
        assert_eq!(ratio(0.0, 0.0), 0.0);
        assert_eq!(ratio(9.0, 3.0), 3.0);
        assert_eq!(ratio(f64::INFINITY, 1.0), 0.0);
    }

    #[test]
    fn recommended_is_least_severe_band() {
        assert_eq!(SuggestionThreshold::is_less_than(0.0, bands()).recommended(), Some(17.0));
        let b = Bands { minor: None, average: Some(3.0), major: Some(1.0) };
        assert_eq!(SuggestionThreshold::is_less_than(0.0, b).recommended(), Some(3.0));
    }

    #[test]
    fn overrides_replace_individual_bands() {
        let merged = bands().merged(&Bands { minor: None, average: None, major: Some(13.0) });
        assert_eq!(merged, Bands::new(17.0, 14.0, 13.0));
    }

    #[test]
    fn collector_renders_and_skips_quiet_thresholds() {
        let ctx = ctx();
        let f = CatalogFormatter::english()
            .with_message("test.explain", "do better")
            .with_message("suggestion.recommended", "{operator} {recommended} is recommended");
        let mut when = SuggestionCollector::new(ModuleId::new("m"), &ctx, &f, None);

        let fired = when
            .when(SuggestionThreshold::is_less_than(11.0, bands()))
            .add_suggestion(|_, _| SuggestionBuilder::new(Template::new("test.explain")).icon(AbilityId(7)));
        assert_eq!(fired, Some(Severity::Major));

        let quiet = when
            .when(SuggestionThreshold::is_less_than(30.0, bands()))
            .add_suggestion(|_, _| panic!("builder must not run for a quiet threshold"));
        assert_eq!(quiet, None);

        let out = when.into_suggestions();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].explanation, "do better");
        assert_eq!(out[0].actual, "11");
        assert_eq!(out[0].recommended, "> 17 is recommended");
        assert_eq!(out[0].recommended_value, Some(17.0));
        assert_eq!(out[0].icon, Some(AbilityId(7)));
    }

    #[test]
    fn collector_applies_overrides() {
        let ctx = ctx();
        let f = CatalogFormatter::english();
        let o = Bands { minor: Some(25.0), average: None, major: None };
        let mut when = SuggestionCollector::new(ModuleId::new("m"), &ctx, &f, Some(&o));
        let fired = when
            .when(SuggestionThreshold::is_less_than(20.0, bands()))
            .add_suggestion(|_, recommended| {
                assert_eq!(recommended, 25.0);
                SuggestionBuilder::new(Template::new("x"))
            });
        assert_eq!(fired, Some(Severity::Minor));
    }
}
