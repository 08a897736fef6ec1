//! Compliance graph store
//!
//! Persists the results of marketplace CE-compliance scans as a graph of
//! products, sellers, marketplaces, checks and violations, and serves them
//! back as denormalized [`ComplianceResult`] views.
//!
//! - [`risk`]: score to risk tier, shared by every reader and writer
//! - [`ingest`]: idempotent, transactional ingestion
//! - [`query`]: filtered, paginated reconstruction
//! - [`stats`]: windowed aggregation
//! - [`learnings`]: free-text operator notes

pub mod config;
pub mod error;
pub mod ingest;
pub mod learnings;
pub mod model;
pub mod query;
pub mod risk;
pub mod schema;
pub mod stats;
pub mod store;

pub use config::GraphConfig;
pub use error::{GraphError, Result};
pub use ingest::IngestOutcome;
pub use learnings::{Learning, LearningQuery, NewLearning};
pub use model::{
    ComplianceResult, RecommendedAction, ScoreBreakdown, SellerInfo, Severity, ViolationDetail,
    ViolationType,
};
pub use query::ResultQuery;
pub use risk::RiskLevel;
pub use stats::{ComplianceStats, StatsQuery, ViolationTypeCount};
pub use store::GraphStore;
