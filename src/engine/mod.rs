//! Evaluation engine: guard rules, approval verification, and the
//! seven-domain risk engine.

pub mod approvals;
pub mod domains;
pub mod guard;
