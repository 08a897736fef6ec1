//! Wire and domain types for compliance scan results
//!
//! A [`ComplianceResult`] is the only contract between the store and the
//! external analyzers: producers post one per scanned listing, and the query
//! side reconstructs the same shape from the graph.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};
use crate::risk::RiskLevel;

/// Kind of CE-marking problem a violation records
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    AgeClaimWithoutCe,
    UndocumentedCertification,
    MisleadingSafety,
    Other,
}

impl ViolationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationType::AgeClaimWithoutCe => "age_claim_without_ce",
            ViolationType::UndocumentedCertification => "undocumented_certification",
            ViolationType::MisleadingSafety => "misleading_safety",
            ViolationType::Other => "other",
        }
    }

    /// Decode a stored value, falling back to `Other` for anything unrecognised
    pub fn from_stored(value: &str) -> Self {
        match value {
            "age_claim_without_ce" => ViolationType::AgeClaimWithoutCe,
            "undocumented_certification" => ViolationType::UndocumentedCertification,
            "misleading_safety" => ViolationType::MisleadingSafety,
            _ => ViolationType::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }

    pub fn from_stored(value: &str) -> Self {
        match value {
            "LOW" => Severity::Low,
            "HIGH" => Severity::High,
            "CRITICAL" => Severity::Critical,
            _ => Severity::Medium,
        }
    }
}

/// Action the analyzer recommends for the listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendedAction {
    Clear,
    Monitor,
    Review,
    ComplaintPack,
    UrgentReport,
}

impl RecommendedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendedAction::Clear => "CLEAR",
            RecommendedAction::Monitor => "MONITOR",
            RecommendedAction::Review => "REVIEW",
            RecommendedAction::ComplaintPack => "COMPLAINT_PACK",
            RecommendedAction::UrgentReport => "URGENT_REPORT",
        }
    }

    pub fn from_stored(value: &str) -> Self {
        match value {
            "MONITOR" => RecommendedAction::Monitor,
            "REVIEW" => RecommendedAction::Review,
            "COMPLAINT_PACK" => RecommendedAction::ComplaintPack,
            "URGENT_REPORT" => RecommendedAction::UrgentReport,
            _ => RecommendedAction::Clear,
        }
    }
}

/// One detected violation within a check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationDetail {
    #[serde(rename = "type")]
    pub violation_type: ViolationType,
    pub evidence_text: String,
    pub evidence_text_translated: String,
    pub location: String,
    pub severity: Severity,
    pub explanation: String,
    #[serde(default)]
    pub regulatory_reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellerInfo {
    #[serde(default)]
    pub seller_name: String,
    #[serde(default)]
    pub seller_id: Option<String>,
    #[serde(default)]
    pub seller_website: Option<String>,
    #[serde(default = "default_search_confidence")]
    pub website_search_confidence: String,
    #[serde(default)]
    pub alternative_urls: Vec<String>,
    #[serde(default)]
    pub search_notes: Option<String>,
}

fn default_search_confidence() -> String {
    "NOT_FOUND".to_string()
}

impl SellerInfo {
    /// Placeholder rendered when a product has no linked seller
    pub fn unknown() -> Self {
        Self {
            seller_name: "Unknown".to_string(),
            ..Self::default()
        }
    }

    /// The seller identity, if the producer supplied one
    pub fn name(&self) -> Option<&str> {
        let name = self.seller_name.trim();
        (!name.is_empty()).then_some(name)
    }
}

impl Default for SellerInfo {
    fn default() -> Self {
        Self {
            seller_name: String::new(),
            seller_id: None,
            seller_website: None,
            website_search_confidence: default_search_confidence(),
            alternative_urls: Vec::new(),
            search_notes: None,
        }
    }
}

/// Audit trail of the upstream score calculation.
///
/// Stored verbatim and never recomputed here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub base_score: i64,
    #[serde(default)]
    pub baby_product_ce_penalty: i64,
    #[serde(default)]
    pub severity_breakdown: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub multipliers_applied: Vec<String>,
    #[serde(default)]
    pub final_calculation: String,
}

/// Complete, denormalized result of one compliance scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceResult {
    pub check_id: String,
    pub asin: String,
    pub url: String,
    pub title: String,
    pub marketplace: String,
    pub violations_detected: bool,
    pub ce_certification_claimed: bool,
    #[serde(default)]
    pub is_baby_product: bool,
    #[serde(default)]
    pub product_age_range: Option<String>,
    pub ce_mark_visible: bool,
    /// Derived from `violation_details` when read back from the store
    #[serde(default)]
    pub violation_types: Vec<ViolationType>,
    #[serde(default)]
    pub violation_details: Vec<ViolationDetail>,
    pub seller_information: SellerInfo,
    pub confidence_score: u8,
    pub violation_score: u8,
    pub violation_score_breakdown: ScoreBreakdown,
    pub reasoning: String,
    pub recommended_action: RecommendedAction,
    pub summary: String,
    /// Always `RiskLevel::classify(violation_score)` when read back from the store
    #[serde(default)]
    pub risk_level: RiskLevel,
    #[serde(default = "default_fulfilled_by")]
    pub fulfilled_by: String,
    #[serde(default = "Utc::now")]
    pub checked_at: DateTime<Utc>,
    #[serde(default)]
    pub images_analyzed: u32,
}

fn default_fulfilled_by() -> String {
    "Unknown".to_string()
}

impl ComplianceResult {
    /// Reject malformed input before anything touches the store
    pub fn validate(&self) -> Result<()> {
        if self.check_id.trim().is_empty() {
            return Err(GraphError::validation("check_id must not be empty"));
        }
        if self.asin.trim().is_empty() {
            return Err(GraphError::validation("asin must not be empty"));
        }
        if self.marketplace.trim().is_empty() {
            return Err(GraphError::validation("marketplace must not be empty"));
        }
        if self.violation_score > 100 {
            return Err(GraphError::Validation(format!(
                "violation_score must be within 0-100 (got {})",
                self.violation_score
            )));
        }
        // Stored timestamps only sort chronologically within four-digit years
        if !(0..=9999).contains(&self.checked_at.year()) {
            return Err(GraphError::Validation(format!(
                "checked_at year must be within 0-9999 (got {})",
                self.checked_at.year()
            )));
        }
        if self.confidence_score > 100 {
            return Err(GraphError::Validation(format!(
                "confidence_score must be within 0-100 (got {})",
                self.confidence_score
            )));
        }
        Ok(())
    }

    /// Id of the violation at `index` within a check
    pub fn violation_id(check_id: &str, index: usize) -> String {
        format!("{}-v{}", check_id, index)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;

    /// A baby-product listing with one critical violation, scored 85
    pub fn sample_result(check_id: &str, asin: &str) -> ComplianceResult {
        ComplianceResult {
            check_id: check_id.to_string(),
            asin: asin.to_string(),
            url: format!("https://www.amazon.de/dp/{}", asin),
            title: "Premium Baby Ear Muffs - Hearing Protection for Infants".to_string(),
            marketplace: "de".to_string(),
            violations_detected: true,
            ce_certification_claimed: true,
            is_baby_product: true,
            product_age_range: Some("0-36 months".to_string()),
            ce_mark_visible: false,
            violation_types: vec![ViolationType::AgeClaimWithoutCe],
            violation_details: vec![ViolationDetail {
                violation_type: ViolationType::AgeClaimWithoutCe,
                evidence_text: "Für Babys ab 0 Monaten geeignet".to_string(),
                evidence_text_translated: "Suitable for babies from 0 months".to_string(),
                location: "title".to_string(),
                severity: Severity::Critical,
                explanation: "Product marketed for infants without visible CE certification"
                    .to_string(),
                regulatory_reference: Some("EN 352-1".to_string()),
            }],
            seller_information: SellerInfo {
                seller_name: "BabySafe Products".to_string(),
                seller_id: Some("A1234567890".to_string()),
                ..SellerInfo::default()
            },
            confidence_score: 85,
            violation_score: 85,
            violation_score_breakdown: ScoreBreakdown {
                base_score: 55,
                baby_product_ce_penalty: 35,
                severity_breakdown: BTreeMap::from([
                    ("CRITICAL".to_string(), serde_json::json!(1)),
                    ("HIGH".to_string(), serde_json::json!(0)),
                ]),
                multipliers_applied: vec!["child_safety".to_string(), "ce_gap".to_string()],
                final_calculation: "Base 35 (CRITICAL) x 1.3 (child) + 15 (CE gap) = 85"
                    .to_string(),
            },
            reasoning: "Baby product without visible CE marking".to_string(),
            recommended_action: RecommendedAction::ComplaintPack,
            summary: "Baby hearing protection lacks visible CE certification".to_string(),
            risk_level: RiskLevel::High,
            fulfilled_by: "Amazon".to_string(),
            checked_at: Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, 0).unwrap(),
            images_analyzed: 5,
        }
    }
}
