//! Graph schema: node and relationship tables with their uniqueness constraints
//!
//! Each node type is a table keyed by its unique field. Relationships are
//! either foreign keys (`CHECKED`, `FOUND_VIOLATION`) or edge tables
//! (`SOLD_BY`, `LISTED_IN`) whose primary keys make duplicate edges impossible.

use std::collections::BTreeSet;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqlitePool;

use crate::error::{GraphError, Result};

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS marketplaces (
        code TEXT PRIMARY KEY
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS products (
        asin TEXT PRIMARY KEY,
        url TEXT NOT NULL,
        title TEXT NOT NULL,
        fulfilled_by TEXT NOT NULL,
        current_risk_score INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sellers (
        name TEXT PRIMARY KEY,
        website TEXT,
        seller_id TEXT,
        website_search_confidence TEXT NOT NULL,
        alternative_urls_json TEXT NOT NULL DEFAULT '[]',
        search_notes TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    // SOLD_BY: keyed by asin, so a product has at most one current seller
    r#"
    CREATE TABLE IF NOT EXISTS product_sellers (
        asin TEXT PRIMARY KEY REFERENCES products(asin),
        seller_name TEXT NOT NULL REFERENCES sellers(name),
        linked_at TEXT NOT NULL
    )
    "#,
    // LISTED_IN
    r#"
    CREATE TABLE IF NOT EXISTS product_marketplaces (
        asin TEXT NOT NULL REFERENCES products(asin),
        code TEXT NOT NULL REFERENCES marketplaces(code),
        PRIMARY KEY (asin, code)
    )
    "#,
    // seq records arrival order and breaks checked_at ties
    r#"
    CREATE TABLE IF NOT EXISTS compliance_checks (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        check_id TEXT NOT NULL UNIQUE,
        asin TEXT NOT NULL REFERENCES products(asin),
        marketplace_code TEXT NOT NULL REFERENCES marketplaces(code),
        checked_at TEXT NOT NULL,
        violations_detected INTEGER NOT NULL,
        ce_certification_claimed INTEGER NOT NULL,
        is_baby_product INTEGER NOT NULL,
        product_age_range TEXT,
        ce_mark_visible INTEGER NOT NULL,
        confidence_score INTEGER NOT NULL,
        violation_score INTEGER NOT NULL,
        recommended_action TEXT NOT NULL,
        reasoning TEXT NOT NULL,
        summary TEXT NOT NULL,
        images_analyzed INTEGER NOT NULL DEFAULT 0,
        score_breakdown_json TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS violations (
        violation_id TEXT PRIMARY KEY,
        check_id TEXT NOT NULL REFERENCES compliance_checks(check_id),
        position INTEGER NOT NULL,
        violation_type TEXT NOT NULL,
        evidence_text TEXT NOT NULL,
        evidence_text_translated TEXT NOT NULL,
        location TEXT NOT NULL,
        severity TEXT NOT NULL,
        explanation TEXT NOT NULL,
        regulatory_reference TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS learnings (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        learning_id TEXT NOT NULL UNIQUE,
        text TEXT NOT NULL,
        category TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_checks_checked_at ON compliance_checks(checked_at DESC, seq)",
    "CREATE INDEX IF NOT EXISTS idx_checks_marketplace ON compliance_checks(marketplace_code, checked_at)",
    "CREATE INDEX IF NOT EXISTS idx_checks_score ON compliance_checks(violation_score)",
    "CREATE INDEX IF NOT EXISTS idx_violations_check ON violations(check_id, position)",
    "CREATE INDEX IF NOT EXISTS idx_learnings_category ON learnings(category, created_at)",
];

/// Create every table and index that does not exist yet
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    tracing::info!("Running compliance graph migrations...");

    for statement in MIGRATIONS {
        sqlx::query(statement).execute(pool).await?;
    }

    tracing::info!("Migrations complete");
    Ok(())
}

/// Seed reference marketplaces; codes already present are left alone
pub async fn provision_marketplaces(pool: &SqlitePool, codes: &[String]) -> Result<()> {
    for code in codes {
        sqlx::query("INSERT OR IGNORE INTO marketplaces (code) VALUES (?)")
            .bind(code)
            .execute(pool)
            .await?;
    }
    Ok(())
}

pub async fn load_marketplaces(pool: &SqlitePool) -> Result<BTreeSet<String>> {
    let codes: Vec<String> = sqlx::query_scalar("SELECT code FROM marketplaces")
        .fetch_all(pool)
        .await?;
    Ok(codes.into_iter().collect())
}

/// Fixed-width UTC timestamp; lexical order matches chronological order for
/// years 0000-9999, the range ingestion accepts
pub(crate) fn encode_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| GraphError::Corrupt(format!("bad timestamp '{}': {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamps_sort_lexically() {
        let earlier = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let later = earlier + chrono::Duration::milliseconds(500);
        assert!(encode_ts(&earlier) < encode_ts(&later));
        assert_eq!(encode_ts(&earlier).len(), encode_ts(&later).len());
    }

    #[test]
    fn test_timestamp_roundtrip_keeps_micros() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap()
            + chrono::Duration::microseconds(123_456);
        assert_eq!(decode_ts(&encode_ts(&ts)).unwrap(), ts);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode_ts("yesterday"), Err(GraphError::Corrupt(_))));
    }
}
