//! # ctide-compliance: Compliance Scoring
//!
//! Scores a controller by how its consents end:
//!
//! ```text
//! score = clamp(100 − 0.5 · revokedRate − 0.3 · expiredRate, 0, 100)
//! ```
//!
//! Rates are percentages of all records ever granted to the controller.
//! A controller with no records scores 100.

pub mod metrics;

pub use metrics::{compliance_score, ComplianceMetrics, StatusCounts};
