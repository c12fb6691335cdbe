//! Input records consumed by the analysis core.
//!
//! Scanners and transports hand over [`RawCostRecord`]s; the core only ever
//! reasons about validated [`CostObservation`]s.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::AnalysisError;

/// A single validated cost observation for one service in one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostObservation {
    pub timestamp: DateTime<Utc>,
    pub cost: f64,
    pub service: String,
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
}

impl CostObservation {
    pub fn new(
        timestamp: DateTime<Utc>,
        cost: f64,
        service: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            cost,
            service: service.into(),
            region: region.into(),
            resource_id: None,
        }
    }

    /// Costs must be finite and non-negative to take part in any statistic.
    pub fn is_well_formed(&self) -> bool {
        self.cost.is_finite() && self.cost >= 0.0
    }
}

/// Cost record as it arrives from a scanner, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCostRecord {
    pub timestamp: String,
    pub cost: f64,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub resource_id: Option<String>,
}

impl TryFrom<&RawCostRecord> for CostObservation {
    type Error = AnalysisError;

    fn try_from(raw: &RawCostRecord) -> Result<Self, Self::Error> {
        let timestamp = parse_timestamp(&raw.timestamp)?;
        if !raw.cost.is_finite() || raw.cost < 0.0 {
            return Err(AnalysisError::MalformedRecord {
                reason: format!("cost {} is negative or not a number", raw.cost),
            });
        }

        Ok(Self {
            timestamp,
            cost: raw.cost,
            service: raw.service.clone(),
            region: raw.region.clone(),
            resource_id: raw.resource_id.clone(),
        })
    }
}

/// Accepts RFC 3339 timestamps or bare `YYYY-MM-DD` dates (midnight UTC).
fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, AnalysisError> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| AnalysisError::MalformedRecord {
            reason: format!("unparseable timestamp '{}'", value),
        })
}

/// Validate a batch of raw records, dropping malformed ones with a warning.
///
/// The result is sorted by timestamp; records sharing a timestamp keep their
/// input order.
pub fn sanitize_records(records: &[RawCostRecord]) -> Vec<CostObservation> {
    let mut observations = Vec::with_capacity(records.len());
    for (index, raw) in records.iter().enumerate() {
        match CostObservation::try_from(raw) {
            Ok(obs) => observations.push(obs),
            Err(e) => warn!(index, reason = %e, "skipping malformed cost record"),
        }
    }
    observations.sort_by_key(|o| o.timestamp);
    observations
}

/// Roll observations up into calendar-month totals, one per month, ordered.
///
/// Each total is stamped at midnight UTC on the first of its month. Service
/// and region carry over when the whole month agrees on them and are left
/// empty otherwise. Malformed observations are skipped.
pub fn monthly_totals(observations: &[CostObservation]) -> Vec<CostObservation> {
    let mut months: BTreeMap<(i32, u32), CostObservation> = BTreeMap::new();
    for obs in observations.iter().filter(|o| o.is_well_formed()) {
        let key = (obs.timestamp.year(), obs.timestamp.month());
        match months.get_mut(&key) {
            Some(total) => {
                total.cost += obs.cost;
                if total.service != obs.service {
                    total.service.clear();
                }
                if total.region != obs.region {
                    total.region.clear();
                }
            }
            None => {
                let Some(start) = NaiveDate::from_ymd_opt(key.0, key.1, 1)
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                else {
                    continue;
                };
                months.insert(
                    key,
                    CostObservation::new(start.and_utc(), obs.cost, obs.service.clone(), obs.region.clone()),
                );
            }
        }
    }
    months.into_values().collect()
}

/// Resource-level cost snapshot used for root cause attribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub resource_id: String,
    /// Service the resource belongs to (e.g. `ec2`, `rds`).
    pub resource_type: String,
    #[serde(default)]
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub current_cost: f64,
    pub historical_average_cost: f64,
}

impl ResourceRecord {
    /// Cost growth over the historical average; decreases count as zero.
    pub fn cost_increase(&self) -> f64 {
        let delta = self.current_cost - self.historical_average_cost;
        if delta.is_finite() {
            delta.max(0.0)
        } else {
            0.0
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.resource_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(ts: &str, cost: f64) -> RawCostRecord {
        RawCostRecord {
            timestamp: ts.to_string(),
            cost,
            service: "ec2".to_string(),
            region: "us-east-1".to_string(),
            resource_id: None,
        }
    }

    #[test]
    fn test_parse_rfc3339_and_date() {
        let a = CostObservation::try_from(&raw("2024-03-01T12:00:00Z", 10.0)).unwrap();
        assert_eq!(a.timestamp.to_rfc3339(), "2024-03-01T12:00:00+00:00");

        let b = CostObservation::try_from(&raw("2024-03-02", 10.0)).unwrap();
        assert_eq!(b.timestamp.to_rfc3339(), "2024-03-02T00:00:00+00:00");
    }

    #[test]
    fn test_rejects_negative_cost_and_bad_timestamp() {
        assert!(matches!(
            CostObservation::try_from(&raw("2024-03-01", -1.0)),
            Err(AnalysisError::MalformedRecord { .. })
        ));
        assert!(matches!(
            CostObservation::try_from(&raw("yesterday", 1.0)),
            Err(AnalysisError::MalformedRecord { .. })
        ));
        assert!(CostObservation::try_from(&raw("2024-03-01", f64::NAN)).is_err());
    }

    #[test]
    fn test_sanitize_drops_and_sorts() {
        let records = vec![
            raw("2024-03-03", 3.0),
            raw("not-a-date", 9.0),
            raw("2024-03-01", 1.0),
            raw("2024-03-02", -5.0),
            raw("2024-03-02", 2.0),
        ];
        let obs = sanitize_records(&records);
        let costs: Vec<f64> = obs.iter().map(|o| o.cost).collect();
        assert_eq!(costs, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_monthly_totals_sum_per_calendar_month() {
        let mut records: Vec<RawCostRecord> = (1..=31).map(|d| raw(&format!("2024-01-{:02}", d), 10.0)).collect();
        records.extend((1..=29).map(|d| raw(&format!("2024-02-{:02}", d), 20.0)));
        records.push(raw("2024-03-05T18:30:00Z", 7.5));
        let mut obs = sanitize_records(&records);
        obs[40].region = "eu-west-1".to_string();
        obs.push(CostObservation::new(obs[0].timestamp, -4.0, "ec2", "us-east-1"));

        let months = monthly_totals(&obs);
        let costs: Vec<f64> = months.iter().map(|m| m.cost).collect();
        assert_eq!(costs, vec![310.0, 580.0, 7.5]);
        assert_eq!(months[1].timestamp.to_rfc3339(), "2024-02-01T00:00:00+00:00");
        assert_eq!(months[0].region, "us-east-1");
        assert_eq!(months[1].region, "");
        assert_eq!(months[1].service, "ec2");
    }

    #[test]
    fn test_resource_cost_increase_floors_at_zero() {
        let mut r = ResourceRecord {
            resource_id: "i-1".to_string(),
            resource_type: "ec2".to_string(),
            region: String::new(),
            name: None,
            current_cost: 50.0,
            historical_average_cost: 80.0,
        };
        assert_eq!(r.cost_increase(), 0.0);
        r.current_cost = 120.0;
        assert_eq!(r.cost_increase(), 40.0);
        assert_eq!(r.display_name(), "i-1");
    }
}
