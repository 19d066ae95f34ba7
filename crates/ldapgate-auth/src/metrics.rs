//! Authentication metrics
//!
//! Emitted through the `metrics` facade; the hosting process decides where
//! they are exported.

use metrics::counter;

/// Metric names
pub mod names {
    pub const AUTH_ATTEMPTS_TOTAL: &str = "ldapgate_auth_attempts_total";
    pub const AUTH_CACHE_HITS_TOTAL: &str = "ldapgate_auth_cache_hits_total";
    pub const AUTH_CACHE_MISSES_TOTAL: &str = "ldapgate_auth_cache_misses_total";
    pub const DIRECTORY_ERRORS_TOTAL: &str = "ldapgate_directory_errors_total";
}

/// Directory step that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryStage {
    Search,
    Bind,
    Probe,
}

impl DirectoryStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            DirectoryStage::Search => "search",
            DirectoryStage::Bind => "bind",
            DirectoryStage::Probe => "probe",
        }
    }
}

pub fn record_attempt(outcome: &'static str) {
    counter!(names::AUTH_ATTEMPTS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_cache_hit() {
    counter!(names::AUTH_CACHE_HITS_TOTAL).increment(1);
}

pub fn record_cache_miss() {
    counter!(names::AUTH_CACHE_MISSES_TOTAL).increment(1);
}

pub fn record_directory_error(stage: DirectoryStage) {
    counter!(names::DIRECTORY_ERRORS_TOTAL, "stage" => stage.as_str()).increment(1);
}
