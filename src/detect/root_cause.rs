//! Root cause attribution: decomposes the cost delta behind an anomaly
//! across services and resources and turns the result into recommendations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::analysis::stats::safe_ratio;
use crate::detect::{Anomaly, Severity};
use crate::model::ResourceRecord;
use crate::recommendation::{Priority, Recommendation, RecommendationKind};

/// Number of resources listed as contributing factors by default.
pub const DEFAULT_TOP_RESOURCES: usize = 5;

/// Share of the total increase above which one service is called out.
const DOMINANT_SERVICE_PCT: f64 = 50.0;

/// Resources listed in one service before a scaling review is suggested.
const SCALING_RESOURCE_COUNT: usize = 3;

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorKind {
    Service,
    Resource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributingFactor {
    pub kind: FactorKind,
    /// Service name, or resource display name.
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    pub cost_increase: f64,
    /// Share of the explained increase, in [0, 100].
    pub contribution_pct: f64,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceContribution {
    pub service: String,
    pub cost_increase: f64,
    pub resource_count: usize,
    pub contribution_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceContribution {
    pub resource_id: String,
    pub name: String,
    pub service: String,
    pub region: String,
    pub current_cost: f64,
    pub historical_average_cost: f64,
    pub cost_increase: f64,
    pub contribution_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootCauseAnalysis {
    pub anomaly_id: Uuid,
    pub contributing_factors: Vec<ContributingFactor>,
    pub service_breakdown: Vec<ServiceContribution>,
    pub resource_breakdown: Vec<ResourceContribution>,
    pub recommendations: Vec<Recommendation>,
}

impl RootCauseAnalysis {
    /// Analysis with no breakdowns, used until attribution runs.
    pub fn empty(anomaly_id: Uuid) -> Self {
        Self {
            anomaly_id,
            contributing_factors: Vec::new(),
            service_breakdown: Vec::new(),
            resource_breakdown: Vec::new(),
            recommendations: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Attributor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RootCauseAttributor {
    top_resources: usize,
}

impl Default for RootCauseAttributor {
    fn default() -> Self {
        Self::new(DEFAULT_TOP_RESOURCES)
    }
}

impl RootCauseAttributor {
    pub fn new(top_resources: usize) -> Self {
        Self { top_resources }
    }

    /// Attribute `anomaly` to the supplied resources.
    ///
    /// With no resource data the breakdowns stay empty and only generic
    /// recommendations are produced; the recommendation list is never empty.
    pub fn attribute(&self, anomaly: &Anomaly, resources: &[ResourceRecord]) -> RootCauseAnalysis {
        let service_breakdown = service_breakdown(resources);
        let resource_breakdown = resource_breakdown(resources, anomaly.absolute_delta.abs());

        let mut contributing_factors: Vec<ContributingFactor> = service_breakdown
            .iter()
            .filter(|s| s.cost_increase > 0.0)
            .map(|s| ContributingFactor {
                kind: FactorKind::Service,
                name: s.service.clone(),
                resource_id: None,
                cost_increase: s.cost_increase,
                contribution_pct: s.contribution_percentage,
                description: format!(
                    "{} costs rose by ${:.2} across {} resource(s), {:.1}% of the total increase",
                    s.service, s.cost_increase, s.resource_count, s.contribution_percentage
                ),
            })
            .collect();

        contributing_factors.extend(
            resource_breakdown
                .iter()
                .filter(|r| r.cost_increase > 0.0)
                .take(self.top_resources)
                .map(|r| ContributingFactor {
                    kind: FactorKind::Resource,
                    name: r.name.clone(),
                    resource_id: Some(r.resource_id.clone()),
                    cost_increase: r.cost_increase,
                    contribution_pct: r.contribution_percentage,
                    description: format!(
                        "{} ({}) rose from ${:.2} to ${:.2} (+${:.2})",
                        r.name, r.service, r.historical_average_cost, r.current_cost, r.cost_increase
                    ),
                }),
        );

        let recommendations =
            recommendations(anomaly, &service_breakdown, &resource_breakdown);

        debug!(
            anomaly_id = %anomaly.id,
            factors = contributing_factors.len(),
            recommendations = recommendations.len(),
            "attributed anomaly"
        );

        RootCauseAnalysis {
            anomaly_id: anomaly.id,
            contributing_factors,
            service_breakdown,
            resource_breakdown,
            recommendations,
        }
    }
}

/// Per-service increase; shares are relative to the summed increase.
fn service_breakdown(resources: &[ResourceRecord]) -> Vec<ServiceContribution> {
    let mut by_service: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for r in resources {
        let entry = by_service.entry(r.resource_type.as_str()).or_insert((0.0, 0));
        entry.0 += r.cost_increase();
        entry.1 += 1;
    }

    let total: f64 = by_service.values().map(|(inc, _)| inc).sum();
    let mut breakdown: Vec<ServiceContribution> = by_service
        .into_iter()
        .map(|(service, (cost_increase, resource_count))| ServiceContribution {
            service: service.to_string(),
            cost_increase,
            resource_count,
            contribution_percentage: (safe_ratio(cost_increase, total) * 100.0).clamp(0.0, 100.0),
        })
        .collect();

    breakdown.sort_by(|a, b| {
        b.cost_increase
            .total_cmp(&a.cost_increase)
            .then_with(|| a.service.cmp(&b.service))
    });
    breakdown
}

/// Per-resource increase; shares are relative to the anomaly's own delta.
fn resource_breakdown(resources: &[ResourceRecord], anomaly_delta: f64) -> Vec<ResourceContribution> {
    let mut breakdown: Vec<ResourceContribution> = resources
        .iter()
        .map(|r| {
            let cost_increase = r.cost_increase();
            ResourceContribution {
                resource_id: r.resource_id.clone(),
                name: r.display_name().to_string(),
                service: r.resource_type.clone(),
                region: r.region.clone(),
                current_cost: r.current_cost,
                historical_average_cost: r.historical_average_cost,
                cost_increase,
                contribution_percentage: (safe_ratio(cost_increase, anomaly_delta) * 100.0)
                    .clamp(0.0, 100.0),
            }
        })
        .collect();

    breakdown.sort_by(|a, b| {
        b.cost_increase
            .total_cmp(&a.cost_increase)
            .then_with(|| a.resource_id.cmp(&b.resource_id))
    });
    breakdown
}

fn recommendations(
    anomaly: &Anomaly,
    services: &[ServiceContribution],
    resources: &[ResourceContribution],
) -> Vec<Recommendation> {
    let mut out = Vec::new();

    if let Some(top) = services
        .first()
        .filter(|s| s.cost_increase > 0.0 && s.contribution_percentage >= DOMINANT_SERVICE_PCT)
    {
        out.push(Recommendation::new(
            RecommendationKind::InvestigateService,
            Priority::High,
            format!("Investigate {} spend", top.service),
            format!(
                "{} accounts for {:.1}% of the cost increase (${:.2}).",
                top.service, top.contribution_percentage, top.cost_increase
            ),
            format!(
                "Review recent deployments, scaling events and usage changes for {} in {}.",
                top.service, anomaly.region
            ),
        ));
    }

    if let Some(r) = resources
        .iter()
        .find(|r| r.historical_average_cost > 0.0 && r.current_cost >= 2.0 * r.historical_average_cost)
    {
        out.push(Recommendation::new(
            RecommendationKind::RightSizeResource,
            Priority::High,
            format!("Review {}", r.name),
            format!(
                "{} costs ${:.2} against a historical average of ${:.2}.",
                r.name, r.current_cost, r.historical_average_cost
            ),
            format!(
                "Check utilization of {} and right-size or stop it if the extra capacity is unused.",
                r.resource_id
            ),
        ));
    }

    if anomaly.severity >= Severity::High {
        out.push(Recommendation::new(
            RecommendationKind::BudgetGuardrail,
            Priority::High,
            "Add a spend guardrail",
            format!(
                "A {} anomaly of ${:.2} above expected was detected.",
                anomaly.severity, anomaly.absolute_delta
            ),
            format!(
                "Create a budget alert for {} in {} near ${:.2} per period.",
                anomaly.service, anomaly.region, anomaly.expected_cost
            ),
        ));
    }

    if let Some(s) = services
        .iter()
        .find(|s| s.cost_increase > 0.0 && s.resource_count >= SCALING_RESOURCE_COUNT)
    {
        let growing = resources
            .iter()
            .filter(|r| r.service == s.service && r.cost_increase > 0.0)
            .count();
        if growing >= SCALING_RESOURCE_COUNT {
            out.push(Recommendation::new(
                RecommendationKind::ScalingPolicy,
                Priority::Medium,
                format!("Review {} scaling policy", s.service),
                format!("{} {} resources grew in cost at the same time.", growing, s.service),
                format!(
                    "Check auto-scaling limits and scheduled capacity for {}.",
                    s.service
                ),
            ));
        }
    }

    if out.is_empty() {
        let priority = if anomaly.severity == Severity::Low {
            Priority::Low
        } else {
            Priority::Medium
        };
        out.push(Recommendation::new(
            RecommendationKind::ReviewCostDrivers,
            priority,
            "Review cost drivers",
            format!(
                "Cost was ${:.2} against an expected ${:.2} ({:+.1}%).",
                anomaly.actual_cost, anomaly.expected_cost, anomaly.deviation_pct
            ),
            format!(
                "Inspect the billing breakdown for {} in {} around {}.",
                anomaly.service,
                anomaly.region,
                anomaly.timestamp.format("%Y-%m-%d")
            ),
        ));
    }

    out
}
