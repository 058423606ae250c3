//! Persisted outputs of a computation

pub mod cache;
pub mod report;
