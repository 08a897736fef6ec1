//! Risk classification of violation scores
//!
//! The tier is never stored. Ingestion, query filtering and aggregation all
//! derive it through [`RiskLevel::classify`].

use serde::{Deserialize, Serialize};

/// Lowest score classified as [`RiskLevel::Medium`]
pub const MEDIUM_THRESHOLD: u8 = 31;
/// Lowest score classified as [`RiskLevel::High`]
pub const HIGH_THRESHOLD: u8 = 61;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Map a violation score to its risk tier.
    ///
    /// Total over every `u8`; scores above 100 are rejected at ingestion and
    /// would classify as `High` here.
    pub fn classify(violation_score: u8) -> Self {
        if violation_score >= HIGH_THRESHOLD {
            RiskLevel::High
        } else if violation_score >= MEDIUM_THRESHOLD {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
