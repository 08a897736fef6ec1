//! Aggregation over a time window of compliance checks

use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite};

use crate::error::{GraphError, Result};
use crate::model::ViolationType;
use crate::risk::RiskLevel;
use crate::schema::encode_ts;
use crate::store::GraphStore;

pub const DEFAULT_WINDOW_DAYS: u32 = 30;
pub const MAX_WINDOW_DAYS: u32 = 365;

#[derive(Debug, Clone, Deserialize)]
pub struct StatsQuery {
    #[serde(default)]
    pub marketplace: Option<String>,
    #[serde(default = "default_days")]
    pub days: u32,
}

fn default_days() -> u32 {
    DEFAULT_WINDOW_DAYS
}

impl Default for StatsQuery {
    fn default() -> Self {
        Self {
            marketplace: None,
            days: DEFAULT_WINDOW_DAYS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationTypeCount {
    #[serde(rename = "type")]
    pub violation_type: ViolationType,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplianceStats {
    pub total_checks: u64,
    pub total_products: u64,
    /// Summed across checks, not distinct
    pub total_violations: u64,
    pub high_risk_count: u64,
    pub medium_risk_count: u64,
    /// Low tier excluding the clear scores
    pub low_risk_count: u64,
    /// Checks scored exactly 0
    pub clear_count: u64,
    pub avg_violation_score: f64,
    /// Most frequent first
    pub top_violation_types: Vec<ViolationTypeCount>,
}

impl ComplianceStats {
    /// Tally per-check `(asin, score)` pairs and per-type violation counts.
    ///
    /// Each check contributes exactly once to the check and tier counts no
    /// matter how many violations it has.
    pub fn tally<'a>(
        checks: impl IntoIterator<Item = (&'a str, u8)>,
        type_counts: impl IntoIterator<Item = (ViolationType, u64)>,
    ) -> Self {
        let mut stats = ComplianceStats::default();
        let mut products = std::collections::BTreeSet::new();
        let mut score_sum: u64 = 0;

        for (asin, score) in checks {
            stats.total_checks += 1;
            products.insert(asin);
            score_sum += u64::from(score);

            if score == 0 {
                stats.clear_count += 1;
                continue;
            }
            match RiskLevel::classify(score) {
                RiskLevel::High => stats.high_risk_count += 1,
                RiskLevel::Medium => stats.medium_risk_count += 1,
                RiskLevel::Low => stats.low_risk_count += 1,
            }
        }

        stats.total_products = products.len() as u64;
        if stats.total_checks > 0 {
            stats.avg_violation_score = score_sum as f64 / stats.total_checks as f64;
        }

        let mut merged: BTreeMap<ViolationType, u64> = BTreeMap::new();
        for (violation_type, count) in type_counts {
            *merged.entry(violation_type).or_default() += count;
        }
        stats.total_violations = merged.values().sum();

        let mut ranked: Vec<ViolationTypeCount> = merged
            .into_iter()
            .map(|(violation_type, count)| ViolationTypeCount {
                violation_type,
                count,
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.violation_type.as_str().cmp(b.violation_type.as_str()))
        });
        stats.top_violation_types = ranked;

        stats
    }
}

impl GraphStore {
    /// Statistics over checks in `[now - days, now]`, optionally for one marketplace
    pub async fn compute_stats(&self, query: &StatsQuery) -> Result<ComplianceStats> {
        if !(1..=MAX_WINDOW_DAYS).contains(&query.days) {
            return Err(GraphError::Validation(format!(
                "days must be within 1-{} (got {})",
                MAX_WINDOW_DAYS, query.days
            )));
        }
        self.bounded(self.aggregate(query)).await
    }

    async fn aggregate(&self, query: &StatsQuery) -> Result<ComplianceStats> {
        let now = Utc::now();
        let since = encode_ts(&(now - Duration::days(i64::from(query.days))));
        let until = encode_ts(&now);

        // Both reads share one snapshot so a concurrent ingestion is either
        // fully counted or not at all.
        let mut tx = self.pool().begin().await?;

        let mut checks_qb = QueryBuilder::<Sqlite>::new(
            "SELECT c.asin, c.violation_score FROM compliance_checks c WHERE ",
        );
        push_scope(&mut checks_qb, &since, &until, query.marketplace.as_deref());
        let checks: Vec<(String, i64)> = checks_qb
            .build_query_as::<(String, i64)>()
            .fetch_all(&mut *tx)
            .await?;

        let mut types_qb = QueryBuilder::<Sqlite>::new(
            "SELECT v.violation_type, COUNT(*) FROM violations v \
             JOIN compliance_checks c ON c.check_id = v.check_id WHERE ",
        );
        push_scope(&mut types_qb, &since, &until, query.marketplace.as_deref());
        types_qb.push(" GROUP BY v.violation_type");
        let types: Vec<(String, i64)> = types_qb
            .build_query_as::<(String, i64)>()
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(ComplianceStats::tally(
            checks
                .iter()
                .map(|(asin, score)| (asin.as_str(), (*score).clamp(0, 100) as u8)),
            types.into_iter().map(|(violation_type, count)| {
                (
                    ViolationType::from_stored(&violation_type),
                    count.max(0) as u64,
                )
            }),
        ))
    }
}

fn push_scope(
    qb: &mut QueryBuilder<'_, Sqlite>,
    since: &str,
    until: &str,
    marketplace: Option<&str>,
) {
    qb.push("c.checked_at >= ")
        .push_bind(since.to_string())
        .push(" AND c.checked_at <= ")
        .push_bind(until.to_string());
    if let Some(code) = marketplace {
        qb.push(" AND c.marketplace_code = ").push_bind(code.to_string());
    }
}
