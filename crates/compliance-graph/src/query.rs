//! Query side: reconstruct denormalized results from the graph
//!
//! A result is the join Check ⋈ Product ⋈ Seller? ⋈ Marketplace? ⋈ Violations*.
//! Marketplace and minimum-score filters are pushed into SQL; the risk filter
//! runs on reconstructed rows through [`RiskLevel::classify`], and pagination
//! is applied to whatever survives every filter.

use std::collections::HashMap;

use serde::Deserialize;
use sqlx::{FromRow, QueryBuilder, Sqlite};
use tracing::debug;

use crate::error::{GraphError, Result};
use crate::model::{
    ComplianceResult, RecommendedAction, ScoreBreakdown, SellerInfo, Severity, ViolationDetail,
    ViolationType,
};
use crate::risk::RiskLevel;
use crate::schema::decode_ts;
use crate::store::GraphStore;

pub const DEFAULT_LIMIT: u32 = 50;
pub const MAX_LIMIT: u32 = 200;

/// Filters and paging for [`GraphStore::list_results`]; all filters are ANDed
#[derive(Debug, Clone, Deserialize)]
pub struct ResultQuery {
    #[serde(default)]
    pub marketplace: Option<String>,
    #[serde(default)]
    pub risk_level: Option<RiskLevel>,
    /// Inclusive lower bound on the violation score
    #[serde(default, alias = "min_violation_score")]
    pub min_score: Option<u8>,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    DEFAULT_LIMIT
}

impl Default for ResultQuery {
    fn default() -> Self {
        Self {
            marketplace: None,
            risk_level: None,
            min_score: None,
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl ResultQuery {
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_LIMIT).contains(&self.limit) {
            return Err(GraphError::Validation(format!(
                "limit must be within 1-{} (got {})",
                MAX_LIMIT, self.limit
            )));
        }
        if let Some(min) = self.min_score {
            if min > 100 {
                return Err(GraphError::Validation(format!(
                    "min_score must be within 0-100 (got {})",
                    min
                )));
            }
        }
        Ok(())
    }
}

const RESULT_SELECT: &str = r#"
    SELECT c.check_id, c.asin, c.checked_at, c.violations_detected, c.ce_certification_claimed,
           c.is_baby_product, c.product_age_range, c.ce_mark_visible, c.confidence_score,
           c.violation_score, c.recommended_action, c.reasoning, c.summary, c.images_analyzed,
           c.score_breakdown_json,
           p.url, p.title, p.fulfilled_by,
           s.name AS seller_name, s.seller_id, s.website AS seller_website,
           s.website_search_confidence, s.alternative_urls_json, s.search_notes,
           m.code AS marketplace
    FROM compliance_checks c
    JOIN products p ON p.asin = c.asin
    LEFT JOIN product_sellers ps ON ps.asin = p.asin
    LEFT JOIN sellers s ON s.name = ps.seller_name
    LEFT JOIN marketplaces m ON m.code = c.marketplace_code
"#;

/// One joined check row, before violations are attached
#[derive(Debug, FromRow)]
struct CheckRow {
    check_id: String,
    asin: String,
    checked_at: String,
    violations_detected: bool,
    ce_certification_claimed: bool,
    is_baby_product: bool,
    product_age_range: Option<String>,
    ce_mark_visible: bool,
    confidence_score: i64,
    violation_score: i64,
    recommended_action: String,
    reasoning: String,
    summary: String,
    images_analyzed: i64,
    score_breakdown_json: String,
    url: String,
    title: String,
    fulfilled_by: String,
    seller_name: Option<String>,
    seller_id: Option<String>,
    seller_website: Option<String>,
    website_search_confidence: Option<String>,
    alternative_urls_json: Option<String>,
    search_notes: Option<String>,
    marketplace: Option<String>,
}

impl CheckRow {
    fn score(&self) -> u8 {
        clamp_score(self.violation_score)
    }

    fn seller(&self) -> Result<SellerInfo> {
        let Some(name) = &self.seller_name else {
            return Ok(SellerInfo::unknown());
        };
        let alternative_urls = match &self.alternative_urls_json {
            Some(raw) => serde_json::from_str(raw)?,
            None => Vec::new(),
        };
        Ok(SellerInfo {
            seller_name: name.clone(),
            seller_id: self.seller_id.clone(),
            seller_website: self.seller_website.clone(),
            website_search_confidence: self
                .website_search_confidence
                .clone()
                .unwrap_or_else(|| "NOT_FOUND".to_string()),
            alternative_urls,
            search_notes: self.search_notes.clone(),
        })
    }

    fn into_result(self, violations: Vec<ViolationDetail>) -> Result<ComplianceResult> {
        let breakdown: ScoreBreakdown = serde_json::from_str(&self.score_breakdown_json)?;
        let seller_information = self.seller()?;
        let violation_score = self.score();

        Ok(ComplianceResult {
            checked_at: decode_ts(&self.checked_at)?,
            check_id: self.check_id,
            asin: self.asin,
            url: self.url,
            title: self.title,
            marketplace: self.marketplace.unwrap_or_else(|| "unknown".to_string()),
            violations_detected: self.violations_detected,
            ce_certification_claimed: self.ce_certification_claimed,
            is_baby_product: self.is_baby_product,
            product_age_range: self.product_age_range,
            ce_mark_visible: self.ce_mark_visible,
            violation_types: violations.iter().map(|v| v.violation_type).collect(),
            violation_details: violations,
            seller_information,
            confidence_score: clamp_score(self.confidence_score),
            violation_score,
            violation_score_breakdown: breakdown,
            reasoning: self.reasoning,
            recommended_action: RecommendedAction::from_stored(&self.recommended_action),
            summary: self.summary,
            risk_level: RiskLevel::classify(violation_score),
            fulfilled_by: self.fulfilled_by,
            images_analyzed: u32::try_from(self.images_analyzed).unwrap_or(0),
        })
    }
}

#[derive(Debug, FromRow)]
struct ViolationRow {
    check_id: String,
    violation_type: String,
    evidence_text: String,
    evidence_text_translated: String,
    location: String,
    severity: String,
    explanation: String,
    regulatory_reference: Option<String>,
}

impl From<ViolationRow> for ViolationDetail {
    fn from(row: ViolationRow) -> Self {
        ViolationDetail {
            violation_type: ViolationType::from_stored(&row.violation_type),
            evidence_text: row.evidence_text,
            evidence_text_translated: row.evidence_text_translated,
            location: row.location,
            severity: Severity::from_stored(&row.severity),
            explanation: row.explanation,
            regulatory_reference: row.regulatory_reference,
        }
    }
}

fn clamp_score(raw: i64) -> u8 {
    raw.clamp(0, 100) as u8
}

impl GraphStore {
    /// List results newest first, filtered and paginated
    pub async fn list_results(&self, query: &ResultQuery) -> Result<Vec<ComplianceResult>> {
        query.validate()?;
        self.bounded(self.load_results(query)).await
    }

    /// Fetch a single result by check id
    pub async fn get_result(&self, check_id: &str) -> Result<ComplianceResult> {
        self.bounded(self.load_result(check_id)).await
    }

    async fn load_result(&self, check_id: &str) -> Result<ComplianceResult> {
        let mut qb = QueryBuilder::<Sqlite>::new(RESULT_SELECT);
        qb.push(" WHERE c.check_id = ").push_bind(check_id);

        let row: Option<CheckRow> = qb
            .build_query_as::<CheckRow>()
            .fetch_optional(self.pool())
            .await?;
        let row = row.ok_or_else(|| GraphError::NotFound {
            kind: "ComplianceCheck",
            id: check_id.to_string(),
        })?;

        let mut results = self.attach_violations(vec![row]).await?;
        results.pop().ok_or_else(|| GraphError::NotFound {
            kind: "ComplianceCheck",
            id: check_id.to_string(),
        })
    }

    async fn load_results(&self, query: &ResultQuery) -> Result<Vec<ComplianceResult>> {
        debug!("Listing results: {:?}", query);

        let mut qb = QueryBuilder::<Sqlite>::new(RESULT_SELECT);
        qb.push(" WHERE 1 = 1");
        if let Some(marketplace) = &query.marketplace {
            qb.push(" AND c.marketplace_code = ").push_bind(marketplace.clone());
        }
        if let Some(min) = query.min_score {
            qb.push(" AND c.violation_score >= ").push_bind(i64::from(min));
        }
        qb.push(" ORDER BY c.checked_at DESC, c.seq ASC");

        // Without a derived filter the page can be cut in SQL
        if query.risk_level.is_none() {
            qb.push(" LIMIT ")
                .push_bind(i64::from(query.limit))
                .push(" OFFSET ")
                .push_bind(i64::from(query.offset));
        }

        let rows: Vec<CheckRow> = qb.build_query_as::<CheckRow>().fetch_all(self.pool()).await?;

        let page: Vec<CheckRow> = match query.risk_level {
            Some(level) => rows
                .into_iter()
                .filter(|row| RiskLevel::classify(row.score()) == level)
                .skip(query.offset as usize)
                .take(query.limit as usize)
                .collect(),
            None => rows,
        };

        self.attach_violations(page).await
    }

    async fn attach_violations(&self, rows: Vec<CheckRow>) -> Result<Vec<ComplianceResult>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT check_id, violation_type, evidence_text, evidence_text_translated, location, \
             severity, explanation, regulatory_reference FROM violations WHERE check_id IN (",
        );
        let mut ids = qb.separated(", ");
        for row in &rows {
            ids.push_bind(row.check_id.clone());
        }
        ids.push_unseparated(") ORDER BY check_id, position");

        let violation_rows: Vec<ViolationRow> =
            qb.build_query_as::<ViolationRow>().fetch_all(self.pool()).await?;

        let mut by_check: HashMap<String, Vec<ViolationDetail>> = HashMap::new();
        for row in violation_rows {
            by_check
                .entry(row.check_id.clone())
                .or_default()
                .push(row.into());
        }

        rows.into_iter()
            .map(|row| {
                let violations = by_check.remove(&row.check_id).unwrap_or_default();
                row.into_result(violations)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::sample_result;
    use crate::store::testing::temp_store;
    use chrono::{Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn scored(check_id: &str, score: u8, marketplace: &str, minutes: i64) -> ComplianceResult {
        let mut result = sample_result(check_id, &format!("ASIN-{}", check_id));
        result.violation_score = score;
        result.marketplace = marketplace.to_string();
        result.checked_at =
            Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes);
        result
    }

    fn ids(results: &[ComplianceResult]) -> Vec<&str> {
        results.iter().map(|r| r.check_id.as_str()).collect()
    }

    #[test]
    fn test_query_validation_bounds() {
        assert!(ResultQuery::default().validate().is_ok());
        let zero = ResultQuery {
            limit: 0,
            ..ResultQuery::default()
        };
        assert!(zero.validate().is_err());
        let too_many = ResultQuery {
            limit: 201,
            ..ResultQuery::default()
        };
        assert!(too_many.validate().is_err());
        let bad_score = ResultQuery {
            min_score: Some(101),
            ..ResultQuery::default()
        };
        assert!(bad_score.validate().is_err());
    }

    proptest! {
        #[test]
        fn limit_accepted_iff_within_bounds(limit in 0u32..1000) {
            let query = ResultQuery { limit, ..ResultQuery::default() };
            prop_assert_eq!(query.validate().is_ok(), (1..=MAX_LIMIT).contains(&limit));
        }

        #[test]
        fn min_score_accepted_iff_at_most_100(min in any::<u8>()) {
            let query = ResultQuery { min_score: Some(min), ..ResultQuery::default() };
            prop_assert_eq!(query.validate().is_ok(), min <= 100);
        }
    }

    #[tokio::test]
    async fn test_get_result_not_found() {
        let (_dir, store) = temp_store().await;
        let err = store.get_result("chk-does-not-exist").await.unwrap_err();
        assert!(matches!(err, GraphError::NotFound { kind: "ComplianceCheck", .. }));
    }

    #[tokio::test]
    async fn test_list_orders_newest_first_with_stable_ties() {
        let (_dir, store) = temp_store().await;
        store.ingest(scored("old", 10, "de", 0)).await.unwrap();
        store.ingest(scored("tie-a", 10, "de", 5)).await.unwrap();
        store.ingest(scored("tie-b", 10, "de", 5)).await.unwrap();
        store.ingest(scored("new", 10, "de", 9)).await.unwrap();

        let results = store.list_results(&ResultQuery::default()).await.unwrap();
        assert_eq!(ids(&results), vec!["new", "tie-a", "tie-b", "old"]);
    }

    #[tokio::test]
    async fn test_risk_filter_paginates_over_filtered_set() {
        let (_dir, store) = temp_store().await;
        store.ingest(scored("h1", 90, "de", 6)).await.unwrap();
        store.ingest(scored("l1", 5, "de", 5)).await.unwrap();
        store.ingest(scored("h2", 70, "de", 4)).await.unwrap();
        store.ingest(scored("l2", 0, "de", 3)).await.unwrap();
        store.ingest(scored("h3", 61, "de", 2)).await.unwrap();

        let query = ResultQuery {
            risk_level: Some(RiskLevel::High),
            limit: 2,
            offset: 1,
            ..ResultQuery::default()
        };
        let results = store.list_results(&query).await.unwrap();
        assert_eq!(ids(&results), vec!["h2", "h3"]);
        assert!(results.iter().all(|r| r.risk_level == RiskLevel::High));
    }

    #[tokio::test]
    async fn test_missing_seller_renders_unknown() {
        let (_dir, store) = temp_store().await;
        let mut input = scored("anon", 20, "fr", 0);
        input.seller_information = SellerInfo::default();
        store.ingest(input).await.unwrap();

        let result = store.get_result("anon").await.unwrap();
        assert_eq!(result.seller_information.seller_name, "Unknown");
        assert_eq!(result.seller_information.seller_id, None);
        assert_eq!(result.marketplace, "fr");
    }

    #[tokio::test]
    async fn test_checks_without_violations_have_empty_details() {
        let (_dir, store) = temp_store().await;
        let mut input = scored("clean", 0, "de", 0);
        input.violation_details.clear();
        input.violations_detected = false;
        store.ingest(input).await.unwrap();

        let result = store.get_result("clean").await.unwrap();
        assert!(result.violation_details.is_empty());
        assert!(result.violation_types.is_empty());
        assert_eq!(result.risk_level, RiskLevel::Low);
    }
}
