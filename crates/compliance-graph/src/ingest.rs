//! Ingestion: idempotent upsert of a scan result into the graph
//!
//! One call is one transaction. Product, seller and marketplace edges are
//! upserted, then the check and its violations are created exactly once per
//! `check_id`. A repeated `check_id` rolls the whole unit back and returns the
//! record that is already stored.

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::{debug, info};

use crate::error::{GraphError, Result};
use crate::model::{ComplianceResult, SellerInfo, ViolationDetail};
use crate::schema::encode_ts;
use crate::store::GraphStore;

/// Whether an ingestion created the check or found it already recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Created,
    AlreadyRecorded,
}

impl GraphStore {
    /// Record a scan result and return it as persisted
    pub async fn ingest(&self, result: ComplianceResult) -> Result<ComplianceResult> {
        let (stored, _) = self.ingest_with_outcome(result).await?;
        Ok(stored)
    }

    /// Like [`GraphStore::ingest`], also reporting whether this call wrote the check
    pub async fn ingest_with_outcome(
        &self,
        result: ComplianceResult,
    ) -> Result<(ComplianceResult, IngestOutcome)> {
        result.validate()?;

        if !self.has_marketplace(&result.marketplace) {
            return Err(GraphError::ReferenceNotFound {
                kind: "Marketplace",
                key: result.marketplace.clone(),
            });
        }

        let outcome = self.bounded(self.write_check(&result)).await?;
        match outcome {
            IngestOutcome::Created => info!(
                "Recorded check {} for {} ({}): score {}, {} violations",
                result.check_id,
                result.asin,
                result.marketplace,
                result.violation_score,
                result.violation_details.len()
            ),
            IngestOutcome::AlreadyRecorded => {
                debug!("Check {} already recorded, returning stored copy", result.check_id)
            }
        }

        let stored = self.get_result(&result.check_id).await?;
        Ok((stored, outcome))
    }

    async fn write_check(&self, result: &ComplianceResult) -> Result<IngestOutcome> {
        let now = encode_ts(&Utc::now());
        let mut tx = self.pool().begin().await?;

        // Leading write: takes the database write lock, so concurrent
        // ingestions queue here for the rest of the unit.
        upsert_product(&mut tx, result, &now).await?;

        let existing: Option<i64> =
            sqlx::query_scalar("SELECT seq FROM compliance_checks WHERE check_id = ?")
                .bind(&result.check_id)
                .fetch_optional(&mut *tx)
                .await?;
        if existing.is_some() {
            tx.rollback().await?;
            return Ok(IngestOutcome::AlreadyRecorded);
        }

        if let Some(name) = result.seller_information.name() {
            upsert_seller(&mut tx, name, &result.seller_information, &now).await?;
            link_seller(&mut tx, &result.asin, name, &now).await?;
        }

        sqlx::query("INSERT OR IGNORE INTO product_marketplaces (asin, code) VALUES (?, ?)")
            .bind(&result.asin)
            .bind(&result.marketplace)
            .execute(&mut *tx)
            .await?;

        if !insert_check(&mut tx, result).await? {
            tx.rollback().await?;
            return Ok(IngestOutcome::AlreadyRecorded);
        }

        for (index, violation) in result.violation_details.iter().enumerate() {
            insert_violation(&mut tx, &result.check_id, index, violation).await?;
        }

        tx.commit().await?;
        Ok(IngestOutcome::Created)
    }
}

async fn upsert_product(
    conn: &mut SqliteConnection,
    result: &ComplianceResult,
    now: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO products (asin, url, title, fulfilled_by, current_risk_score, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(asin) DO UPDATE SET
            url = excluded.url,
            title = excluded.title,
            fulfilled_by = excluded.fulfilled_by,
            current_risk_score = excluded.current_risk_score,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&result.asin)
    .bind(&result.url)
    .bind(&result.title)
    .bind(&result.fulfilled_by)
    .bind(i64::from(result.violation_score))
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn upsert_seller(
    conn: &mut SqliteConnection,
    name: &str,
    seller: &SellerInfo,
    now: &str,
) -> Result<()> {
    let alternative_urls_json = serde_json::to_string(&seller.alternative_urls)?;

    sqlx::query(
        r#"
        INSERT INTO sellers (name, website, seller_id, website_search_confidence,
                             alternative_urls_json, search_notes, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(name) DO UPDATE SET
            website = excluded.website,
            seller_id = excluded.seller_id,
            website_search_confidence = excluded.website_search_confidence,
            alternative_urls_json = excluded.alternative_urls_json,
            search_notes = excluded.search_notes,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(name)
    .bind(&seller.seller_website)
    .bind(&seller.seller_id)
    .bind(&seller.website_search_confidence)
    .bind(&alternative_urls_json)
    .bind(&seller.search_notes)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Point the product's single SOLD_BY edge at `seller_name`, replacing any previous seller
async fn link_seller(
    conn: &mut SqliteConnection,
    asin: &str,
    seller_name: &str,
    now: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO product_sellers (asin, seller_name, linked_at)
        VALUES (?, ?, ?)
        ON CONFLICT(asin) DO UPDATE SET
            seller_name = excluded.seller_name,
            linked_at = excluded.linked_at
        WHERE product_sellers.seller_name <> excluded.seller_name
        "#,
    )
    .bind(asin)
    .bind(seller_name)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Returns false when another writer already holds this check_id
async fn insert_check(conn: &mut SqliteConnection, result: &ComplianceResult) -> Result<bool> {
    let breakdown_json = serde_json::to_string(&result.violation_score_breakdown)?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO compliance_checks (
            check_id, asin, marketplace_code, checked_at, violations_detected,
            ce_certification_claimed, is_baby_product, product_age_range, ce_mark_visible,
            confidence_score, violation_score, recommended_action, reasoning, summary,
            images_analyzed, score_breakdown_json
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(check_id) DO NOTHING
        "#,
    )
    .bind(&result.check_id)
    .bind(&result.asin)
    .bind(&result.marketplace)
    .bind(encode_ts(&result.checked_at))
    .bind(result.violations_detected)
    .bind(result.ce_certification_claimed)
    .bind(result.is_baby_product)
    .bind(&result.product_age_range)
    .bind(result.ce_mark_visible)
    .bind(i64::from(result.confidence_score))
    .bind(i64::from(result.violation_score))
    .bind(result.recommended_action.as_str())
    .bind(&result.reasoning)
    .bind(&result.summary)
    .bind(i64::from(result.images_analyzed))
    .bind(&breakdown_json)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    Ok(inserted == 1)
}

async fn insert_violation(
    conn: &mut SqliteConnection,
    check_id: &str,
    index: usize,
    violation: &ViolationDetail,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO violations (
            violation_id, check_id, position, violation_type, evidence_text,
            evidence_text_translated, location, severity, explanation, regulatory_reference
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(ComplianceResult::violation_id(check_id, index))
    .bind(check_id)
    .bind(index as i64)
    .bind(violation.violation_type.as_str())
    .bind(&violation.evidence_text)
    .bind(&violation.evidence_text_translated)
    .bind(&violation.location)
    .bind(violation.severity.as_str())
    .bind(&violation.explanation)
    .bind(&violation.regulatory_reference)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::sample_result;
    use crate::model::{Severity, ViolationType};
    use crate::risk::RiskLevel;
    use crate::store::testing::temp_store;
    use pretty_assertions::assert_eq;

    async fn count(store: &GraphStore, sql: &str) -> i64 {
        sqlx::query_scalar(sql).fetch_one(store.pool()).await.unwrap()
    }

    #[tokio::test]
    async fn test_ingest_returns_persisted_result() {
        let (_dir, store) = temp_store().await;
        let input = sample_result("chk-1", "B08XYZ1234");

        let stored = store.ingest(input.clone()).await.unwrap();

        assert_eq!(stored.check_id, "chk-1");
        assert_eq!(stored.risk_level, RiskLevel::High);
        assert_eq!(stored.violation_types, vec![ViolationType::AgeClaimWithoutCe]);
        assert_eq!(stored.violation_details, input.violation_details);
        assert_eq!(stored.violation_score_breakdown, input.violation_score_breakdown);
        assert_eq!(stored.seller_information.seller_name, "BabySafe Products");
        assert_eq!(stored.checked_at, input.checked_at);
    }

    #[tokio::test]
    async fn test_derived_fields_ignore_producer_values() {
        let (_dir, store) = temp_store().await;
        let mut input = sample_result("chk-derived", "B08XYZ1234");
        input.violation_score = 40;
        input.risk_level = RiskLevel::High;
        input.violation_types = vec![ViolationType::Other, ViolationType::MisleadingSafety];

        let stored = store.ingest(input).await.unwrap();

        assert_eq!(stored.risk_level, RiskLevel::Medium);
        assert_eq!(stored.violation_types, vec![ViolationType::AgeClaimWithoutCe]);
    }

    #[tokio::test]
    async fn test_violations_keyed_by_check_and_index() {
        let (_dir, store) = temp_store().await;
        let mut input = sample_result("chk-multi", "B08XYZ1234");
        let mut second = input.violation_details[0].clone();
        second.violation_type = ViolationType::MisleadingSafety;
        second.severity = Severity::High;
        input.violation_details.push(second);

        store.ingest(input).await.unwrap();

        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT violation_id FROM violations WHERE check_id = 'chk-multi' ORDER BY position",
        )
        .fetch_all(store.pool())
        .await
        .unwrap();
        assert_eq!(ids, vec!["chk-multi-v0", "chk-multi-v1"]);
    }

    #[tokio::test]
    async fn test_retry_is_a_noop() {
        let (_dir, store) = temp_store().await;
        let input = sample_result("chk-retry", "B08XYZ1234");

        let (first, first_outcome) = store.ingest_with_outcome(input.clone()).await.unwrap();
        let updated_at: String =
            sqlx::query_scalar("SELECT updated_at FROM products WHERE asin = 'B08XYZ1234'")
                .fetch_one(store.pool())
                .await
                .unwrap();

        let (second, second_outcome) = store.ingest_with_outcome(input).await.unwrap();

        assert_eq!(first_outcome, IngestOutcome::Created);
        assert_eq!(second_outcome, IngestOutcome::AlreadyRecorded);
        assert_eq!(first, second);
        assert_eq!(count(&store, "SELECT COUNT(*) FROM compliance_checks").await, 1);
        assert_eq!(count(&store, "SELECT COUNT(*) FROM violations").await, 1);

        let updated_after: String =
            sqlx::query_scalar("SELECT updated_at FROM products WHERE asin = 'B08XYZ1234'")
                .fetch_one(store.pool())
                .await
                .unwrap();
        assert_eq!(updated_at, updated_after);
    }

    #[tokio::test]
    async fn test_seller_change_replaces_edge() {
        let (_dir, store) = temp_store().await;
        store
            .ingest(sample_result("chk-a", "B08XYZ1234"))
            .await
            .unwrap();

        let mut next = sample_result("chk-b", "B08XYZ1234");
        next.seller_information.seller_name = "New Owner GmbH".to_string();
        store.ingest(next).await.unwrap();

        assert_eq!(count(&store, "SELECT COUNT(*) FROM product_sellers").await, 1);
        assert_eq!(count(&store, "SELECT COUNT(*) FROM sellers").await, 2);

        let first = store.get_result("chk-a").await.unwrap();
        assert_eq!(first.seller_information.seller_name, "New Owner GmbH");
    }

    #[tokio::test]
    async fn test_missing_seller_keeps_existing_edge() {
        let (_dir, store) = temp_store().await;
        store
            .ingest(sample_result("chk-a", "B08XYZ1234"))
            .await
            .unwrap();

        let mut anonymous = sample_result("chk-b", "B08XYZ1234");
        anonymous.seller_information = SellerInfo::default();
        let stored = store.ingest(anonymous).await.unwrap();

        assert_eq!(stored.seller_information.seller_name, "BabySafe Products");
    }

    #[tokio::test]
    async fn test_listing_edge_not_duplicated() {
        let (_dir, store) = temp_store().await;
        store
            .ingest(sample_result("chk-a", "B08XYZ1234"))
            .await
            .unwrap();
        store
            .ingest(sample_result("chk-b", "B08XYZ1234"))
            .await
            .unwrap();

        assert_eq!(count(&store, "SELECT COUNT(*) FROM product_marketplaces").await, 1);
    }

    #[tokio::test]
    async fn test_unknown_marketplace_writes_nothing() {
        let (_dir, store) = temp_store().await;
        let mut input = sample_result("chk-xx", "B08XYZ1234");
        input.marketplace = "xx".to_string();

        let err = store.ingest(input).await.unwrap_err();

        assert!(matches!(err, GraphError::ReferenceNotFound { kind: "Marketplace", .. }));
        assert_eq!(count(&store, "SELECT COUNT(*) FROM products").await, 0);
        assert_eq!(count(&store, "SELECT COUNT(*) FROM sellers").await, 0);
        assert_eq!(count(&store, "SELECT COUNT(*) FROM compliance_checks").await, 0);
    }

    #[tokio::test]
    async fn test_invalid_result_rejected_before_write() {
        let (_dir, store) = temp_store().await;
        let mut input = sample_result("chk-bad", "B08XYZ1234");
        input.violation_score = 140;

        let err = store.ingest(input).await.unwrap_err();

        assert!(matches!(err, GraphError::Validation(_)));
        assert_eq!(count(&store, "SELECT COUNT(*) FROM products").await, 0);
    }
}
