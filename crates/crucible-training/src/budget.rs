//! Budget ceilings evaluated against a time/cost estimate.

use serde::{Deserialize, Serialize};

use crate::estimate::TimeEstimation;

/// Warn threshold used when the caller does not set one.
pub const DEFAULT_WARN_AT_PERCENT: u8 = 80;

/// Ceilings on how long and how much a job may run.
///
/// Either axis may be absent; an absent axis is never evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetLimits {
    /// Ceiling on estimated wall-clock hours.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_hours: Option<f64>,
    /// Ceiling on estimated cost in USD.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_cost_usd: Option<f64>,
    /// Percentage of a ceiling at which a soft warning fires.
    #[serde(default = "default_warn_at_percent")]
    pub warn_at_percent: u8,
}

fn default_warn_at_percent() -> u8 {
    DEFAULT_WARN_AT_PERCENT
}

impl Default for BudgetLimits {
    fn default() -> Self {
        Self { max_hours: None, max_cost_usd: None, warn_at_percent: DEFAULT_WARN_AT_PERCENT }
    }
}

impl BudgetLimits {
    /// Limits with only an hour ceiling.
    #[must_use]
    pub fn hours(max_hours: f64) -> Self {
        Self { max_hours: Some(max_hours), ..Self::default() }
    }

    /// Limits with only a cost ceiling.
    #[must_use]
    pub fn cost(max_cost_usd: f64) -> Self {
        Self { max_cost_usd: Some(max_cost_usd), ..Self::default() }
    }
}

/// Overall outcome of a budget check, worst axis wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetVerdict {
    /// All axes comfortably under their ceilings.
    Clear,
    /// At least one axis is past its warn threshold but under the ceiling.
    Warned,
    /// At least one axis is over its ceiling; do not dispatch.
    Exceeded,
}

/// Result of checking an estimate against [`BudgetLimits`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetReport {
    pub verdict: BudgetVerdict,
    /// One human-readable message per breached threshold.
    pub messages: Vec<String>,
}

impl BudgetReport {
    /// Whether any ceiling was exceeded outright.
    #[must_use]
    pub fn exceeded(&self) -> bool {
        self.verdict == BudgetVerdict::Exceeded
    }

    /// Whether the check produced at least a soft warning.
    #[must_use]
    pub fn warned(&self) -> bool {
        self.verdict >= BudgetVerdict::Warned
    }
}

/// Checks an estimate against hour and cost ceilings.
///
/// The axes are evaluated independently and both may contribute messages;
/// the overall verdict is the worst individual outcome. Meeting a ceiling
/// exactly counts as warned, not exceeded.
#[must_use]
pub fn check_budget(estimate: &TimeEstimation, limits: &BudgetLimits) -> BudgetReport {
    let mut verdict = BudgetVerdict::Clear;
    let mut messages = Vec::new();
    let warn_fraction = f64::from(limits.warn_at_percent) / 100.0;

    if let Some(max_hours) = limits.max_hours {
        let hours = estimate.fractional_hours();
        if hours > max_hours {
            verdict = verdict.max(BudgetVerdict::Exceeded);
            messages.push(format!(
                "estimated {hours:.1}h exceeds the {max_hours:.1}h ceiling"
            ));
        } else if hours >= max_hours * warn_fraction {
            verdict = verdict.max(BudgetVerdict::Warned);
            messages.push(format!(
                "estimated {hours:.1}h is above {}% of the {max_hours:.1}h ceiling",
                limits.warn_at_percent
            ));
        }
    }

    if let (Some(max_cost), Some(cost)) = (limits.max_cost_usd, estimate.estimated_cost_usd) {
        if cost > max_cost {
            verdict = verdict.max(BudgetVerdict::Exceeded);
            messages.push(format!(
                "estimated ${cost:.2} exceeds the ${max_cost:.2} ceiling"
            ));
        } else if cost >= max_cost * warn_fraction {
            verdict = verdict.max(BudgetVerdict::Warned);
            messages.push(format!(
                "estimated ${cost:.2} is above {}% of the ${max_cost:.2} ceiling",
                limits.warn_at_percent
            ));
        }
    }

    BudgetReport { verdict, messages }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimate_with(hours: f64, cost: Option<f64>) -> TimeEstimation {
        TimeEstimation {
            gpu: "Test GPU".to_string(),
            model_tier: "3-7B".to_string(),
            total_tokens: 0,
            effective_batch_size: 8,
            total_steps: 0,
            raw_seconds: hours * 3600.0 / crate::OVERHEAD_MULTIPLIER,
            estimated_seconds: hours * 3600.0,
            hours: hours as u64,
            minutes: 0,
            estimated_cost_usd: cost,
            gpu_utilization_percent: 85,
            feasible: true,
            required_vram_gb: 10.0,
            usable_vram_gb: 20.0,
            warnings: Vec::new(),
            recommendations: Vec::new(),
            recommended_settings: None,
        }
    }

    #[test]
    fn test_nine_hours_against_ten_hour_ceiling_warns() {
        let report = check_budget(&estimate_with(9.0, None), &BudgetLimits::hours(10.0));
        assert_eq!(report.verdict, BudgetVerdict::Warned);
        assert!(!report.exceeded());
        assert!(report.warned());
        assert_eq!(report.messages.len(), 1);
        assert!(report.messages[0].contains("80%"));
    }

    #[test]
    fn test_eleven_hours_against_ten_hour_ceiling_exceeds() {
        let report = check_budget(&estimate_with(11.0, None), &BudgetLimits::hours(10.0));
        assert!(report.exceeded());
        assert!(report.messages[0].contains("exceeds"));
    }

    #[test]
    fn test_clear_when_well_under() {
        let report = check_budget(&estimate_with(2.0, None), &BudgetLimits::hours(10.0));
        assert_eq!(report.verdict, BudgetVerdict::Clear);
        assert!(report.messages.is_empty());
    }

    #[test]
    fn test_axes_evaluated_independently() {
        let limits = BudgetLimits {
            max_hours: Some(10.0),
            max_cost_usd: Some(5.0),
            warn_at_percent: 80,
        };
        // Hours warn, cost exceeds: both messages, worst verdict wins.
        let report = check_budget(&estimate_with(9.0, Some(7.50)), &limits);
        assert!(report.exceeded());
        assert_eq!(report.messages.len(), 2);
    }

    #[test]
    fn test_missing_cost_skips_cost_axis() {
        let report = check_budget(&estimate_with(1.0, None), &BudgetLimits::cost(5.0));
        assert_eq!(report.verdict, BudgetVerdict::Clear);
    }

    #[test]
    fn test_meeting_ceiling_exactly_warns_not_exceeds() {
        let report = check_budget(&estimate_with(10.0, None), &BudgetLimits::hours(10.0));
        assert_eq!(report.verdict, BudgetVerdict::Warned);
    }

    #[test]
    fn test_custom_warn_threshold() {
        let limits = BudgetLimits { warn_at_percent: 50, ..BudgetLimits::hours(10.0) };
        let report = check_budget(&estimate_with(6.0, None), &limits);
        assert_eq!(report.verdict, BudgetVerdict::Warned);
    }
}
