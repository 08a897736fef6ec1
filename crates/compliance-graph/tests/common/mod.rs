//! Shared fixtures for the graph store integration tests

#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use compliance_graph::{
    ComplianceResult, GraphConfig, GraphStore, RecommendedAction, RiskLevel, ScoreBreakdown,
    SellerInfo, Severity, ViolationDetail, ViolationType,
};
use tempfile::TempDir;

pub struct TestGraph {
    pub dir: TempDir,
    pub config: GraphConfig,
    pub store: GraphStore,
}

pub async fn test_graph() -> TestGraph {
    test_graph_with(|config| config).await
}

pub async fn test_graph_with(tune: impl FnOnce(GraphConfig) -> GraphConfig) -> TestGraph {
    let dir = TempDir::new().unwrap();
    let config = tune(GraphConfig::sqlite_file(&dir.path().join("graph.db")));
    let store = GraphStore::connect(&config).await.unwrap();
    TestGraph { dir, config, store }
}

pub fn violation(violation_type: ViolationType, severity: Severity) -> ViolationDetail {
    ViolationDetail {
        violation_type,
        evidence_text: "Für Kinder ab 3 Jahren".to_string(),
        evidence_text_translated: "For children from 3 years".to_string(),
        location: "bullet_points".to_string(),
        severity,
        explanation: "Age claim without visible CE marking".to_string(),
        regulatory_reference: None,
    }
}

/// A result for `asin` checked `minutes_ago` minutes before now
pub fn result(check_id: &str, asin: &str, score: u8, minutes_ago: i64) -> ComplianceResult {
    result_at(check_id, asin, score, Utc::now() - Duration::minutes(minutes_ago))
}

pub fn result_at(
    check_id: &str,
    asin: &str,
    score: u8,
    checked_at: DateTime<Utc>,
) -> ComplianceResult {
    ComplianceResult {
        check_id: check_id.to_string(),
        asin: asin.to_string(),
        url: format!("https://www.amazon.de/dp/{}", asin),
        title: "Kids Noise Cancelling Headphones".to_string(),
        marketplace: "de".to_string(),
        violations_detected: score > 0,
        ce_certification_claimed: true,
        is_baby_product: false,
        product_age_range: None,
        ce_mark_visible: true,
        violation_types: Vec::new(),
        violation_details: if score > 0 {
            vec![violation(ViolationType::UndocumentedCertification, Severity::Medium)]
        } else {
            Vec::new()
        },
        seller_information: SellerInfo {
            seller_name: "AudioGuard EU".to_string(),
            seller_website: Some("https://audioguard.eu".to_string()),
            ..SellerInfo::default()
        },
        confidence_score: 70,
        violation_score: score,
        violation_score_breakdown: ScoreBreakdown {
            base_score: i64::from(score),
            final_calculation: format!("Base {}", score),
            ..ScoreBreakdown::default()
        },
        reasoning: "CE marking visible but documentation not linked".to_string(),
        recommended_action: RecommendedAction::Review,
        summary: "Documentation gap".to_string(),
        risk_level: RiskLevel::Low,
        fulfilled_by: "Amazon".to_string(),
        checked_at,
        images_analyzed: 4,
    }
}

pub async fn count(graph: &TestGraph, sql: &str) -> i64 {
    let pool = sqlx::SqlitePool::connect(&graph.config.database_url)
        .await
        .unwrap();
    let n: i64 = sqlx::query_scalar(sql).fetch_one(&pool).await.unwrap();
    pool.close().await;
    n
}
