//! Budget variance: actual spend against forecast and budget.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::analysis::stats::safe_ratio;
use crate::detect::Severity;
use crate::forecast::Forecast;
use crate::recommendation::{Priority, Recommendation, RecommendationKind};

/// Utilization levels (percent of budget) that raise an alert.
pub const ALERT_LEVELS: [f64; 4] = [50.0, 75.0, 90.0, 100.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarianceCategory {
    Minimal,
    Minor,
    Moderate,
    Significant,
}

impl VarianceCategory {
    /// Bucket by the magnitude of the variance percentage.
    pub fn from_variance_pct(variance_pct: f64) -> Self {
        match variance_pct.abs() {
            v if v >= 25.0 => VarianceCategory::Significant,
            v if v >= 10.0 => VarianceCategory::Moderate,
            v if v >= 5.0 => VarianceCategory::Minor,
            _ => VarianceCategory::Minimal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BudgetStatus {
    Healthy,
    Warning,
    Critical,
    Exceeded,
}

impl BudgetStatus {
    pub fn from_utilization(utilization_pct: f64) -> Self {
        match utilization_pct {
            u if u >= 100.0 => BudgetStatus::Exceeded,
            u if u >= 90.0 => BudgetStatus::Critical,
            u if u >= 75.0 => BudgetStatus::Warning,
            _ => BudgetStatus::Healthy,
        }
    }
}

/// A crossed utilization level. Ids are stable per budget and level so the
/// caller can deduplicate repeated alerts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetAlert {
    pub id: String,
    pub threshold_pct: f64,
    pub utilization_pct: f64,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetVariance {
    pub budget_id: String,
    pub actual_spend: f64,
    pub budget_amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicted_spend: Option<f64>,
    pub actual_vs_budget_pct: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forecast_variance_pct: Option<f64>,
    pub category: VarianceCategory,
    pub status: BudgetStatus,
    pub alerts: Vec<BudgetAlert>,
    pub recommendations: Vec<Recommendation>,
}

/// Compare actual spend with the forecast's current month and the budget.
pub fn analyze_variance(forecast: &Forecast, actual_spend: f64, budget_amount: f64) -> BudgetVariance {
    let predicted_spend = forecast.base_forecast.first().copied();

    let forecast_variance_pct = predicted_spend.map(|predicted| {
        if predicted <= 0.0 {
            warn!(budget_id = %forecast.budget_id, "forecast predicts zero spend, variance set to 0");
        }
        safe_ratio(actual_spend - predicted, predicted) * 100.0
    });
    let category = VarianceCategory::from_variance_pct(forecast_variance_pct.unwrap_or(0.0));

    if budget_amount <= 0.0 {
        warn!(budget_id = %forecast.budget_id, budget_amount, "budget amount is not positive, utilization set to 0");
    }
    let actual_vs_budget_pct = if budget_amount > 0.0 {
        safe_ratio(actual_spend, budget_amount) * 100.0
    } else {
        0.0
    };
    let status = BudgetStatus::from_utilization(actual_vs_budget_pct);
    let alerts = budget_alerts(&forecast.budget_id, actual_vs_budget_pct);

    let recommendations = recommendations(
        actual_spend,
        budget_amount,
        actual_vs_budget_pct,
        status,
        forecast_variance_pct,
        category,
    );

    debug!(
        budget_id = %forecast.budget_id,
        utilization = actual_vs_budget_pct,
        ?status,
        ?category,
        alerts = alerts.len(),
        "budget variance analyzed"
    );

    BudgetVariance {
        budget_id: forecast.budget_id.clone(),
        actual_spend,
        budget_amount,
        predicted_spend,
        actual_vs_budget_pct,
        forecast_variance_pct,
        category,
        status,
        alerts,
        recommendations,
    }
}

fn budget_alerts(budget_id: &str, utilization_pct: f64) -> Vec<BudgetAlert> {
    ALERT_LEVELS
        .iter()
        .filter(|&&level| utilization_pct >= level)
        .map(|&level| {
            let severity = match level as u32 {
                100 => Severity::Critical,
                90 => Severity::High,
                75 => Severity::Medium,
                _ => Severity::Low,
            };
            BudgetAlert {
                id: format!("{}:{}", budget_id, level as u32),
                threshold_pct: level,
                utilization_pct,
                severity,
                message: format!(
                    "Budget {} has reached {:.1}% of its amount (threshold {}%)",
                    budget_id, utilization_pct, level as u32
                ),
            }
        })
        .collect()
}

fn recommendations(
    actual_spend: f64,
    budget_amount: f64,
    utilization_pct: f64,
    status: BudgetStatus,
    variance_pct: Option<f64>,
    category: VarianceCategory,
) -> Vec<Recommendation> {
    let mut out = Vec::new();

    if budget_amount <= 0.0 {
        out.push(Recommendation::new(
            RecommendationKind::AdjustBudget,
            Priority::Medium,
            "Set a budget amount",
            "No positive budget amount is configured, so utilization cannot be tracked.",
            "Define a monthly budget for this scope.",
        ));
    }

    match status {
        BudgetStatus::Exceeded => out.push(Recommendation::new(
            RecommendationKind::ReduceSpend,
            Priority::High,
            "Budget exceeded",
            format!(
                "Spend of ${:.2} is {:.1}% of the ${:.2} budget.",
                actual_spend, utilization_pct, budget_amount
            ),
            "Pause non-essential workloads and approve any further spend explicitly.",
        )),
        BudgetStatus::Critical => out.push(Recommendation::new(
            RecommendationKind::ReduceSpend,
            Priority::High,
            "Budget nearly exhausted",
            format!(
                "{:.1}% of the budget is used; ${:.2} remains.",
                utilization_pct,
                budget_amount - actual_spend
            ),
            "Review the largest cost drivers and defer discretionary spend.",
        )),
        BudgetStatus::Warning => out.push(Recommendation::new(
            RecommendationKind::ReviewForecast,
            Priority::Medium,
            "Monitor spend closely",
            format!("{:.1}% of the budget is used.", utilization_pct),
            "Check the forecast against the remaining budget weekly.",
        )),
        BudgetStatus::Healthy => {}
    }

    if let (Some(variance), VarianceCategory::Significant) = (variance_pct, category) {
        if variance > 0.0 {
            out.push(Recommendation::new(
                RecommendationKind::ReviewForecast,
                Priority::Medium,
                "Spend is running above forecast",
                format!("Actual spend is {:.1}% above the forecast.", variance),
                "Re-run the forecast with current growth and recent infrastructure changes.",
            ));
        } else {
            out.push(Recommendation::new(
                RecommendationKind::ReallocateBudget,
                Priority::Low,
                "Spend is running below forecast",
                format!("Actual spend is {:.1}% below the forecast.", variance.abs()),
                "Consider releasing unused budget to other teams.",
            ));
        }
    }

    if out.is_empty() {
        out.push(Recommendation::new(
            RecommendationKind::OnTrack,
            Priority::Low,
            "Spend on track",
            format!("{:.1}% of the budget is used and spend matches the forecast.", utilization_pct),
            "No action needed.",
        ));
    }

    out
}
