//! Queued retry operations and their persisted form.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::backoff::Backoff;
use super::executor::OperationExecutor;

/// Category of a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationType {
    /// Fetching dashboard data from the backend
    DataFetch,
    /// Post-processing fetched data
    DataProcessing,
    /// Expanding a course listing
    CourseExpansion,
    /// Running a scrape
    Scrape,
}

impl OperationType {
    /// Whether a successful run of this operation refreshes the displayed data
    #[must_use]
    pub const fn refreshes_data(self) -> bool {
        matches!(self, Self::DataFetch | Self::Scrape)
    }

    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DataFetch => "data-fetch",
            Self::DataProcessing => "data-processing",
            Self::CourseExpansion => "course-expansion",
            Self::Scrape => "scrape",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Presentation priority. Never affects scheduling order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Blocks the dashboard
    Critical,
    /// Degrades the dashboard
    High,
    /// Default
    #[default]
    Medium,
    /// Cosmetic
    Low,
}

impl Priority {
    /// Badge colour classes for the priority
    #[must_use]
    pub const fn badge_class(self) -> &'static str {
        match self {
            Self::Critical => "bg-red-100 text-red-800 border-red-200",
            Self::High => "bg-orange-100 text-orange-800 border-orange-200",
            Self::Medium => "bg-yellow-100 text-yellow-800 border-yellow-200",
            Self::Low => "bg-blue-100 text-blue-800 border-blue-200",
        }
    }

    /// Upper-case badge label
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }
}

/// Primitive metadata value attached to an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Floating point
    Float(f64),
    /// String
    String(String),
    /// Explicit null
    Null,
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

/// Non-finite values have no JSON form and become [`MetadataValue::Null`].
impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        if value.is_finite() {
            Self::Float(value)
        } else {
            Self::Null
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// Opaque operation metadata
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Where an operation sits in its retry lifecycle at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    /// Backing off until `next_retry_at`
    Waiting,
    /// `next_retry_at` has elapsed
    Eligible,
    /// Dispatched, executor result outstanding
    Retrying,
    /// Reached `max_retries`; kept for display only
    Exhausted,
}

impl OperationStatus {
    /// Short user-facing label
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Waiting => "Waiting",
            Self::Eligible => "Ready",
            Self::Retrying => "Retrying",
            Self::Exhausted => "Failed",
        }
    }
}

/// Registration request for an operation whose first attempt failed.
pub struct RetryRequest {
    pub(crate) id: String,
    pub(crate) operation_type: OperationType,
    pub(crate) executor: Arc<dyn OperationExecutor>,
    pub(crate) error: String,
    pub(crate) priority: Priority,
    pub(crate) max_retries: Option<u32>,
    pub(crate) backoff: Option<Backoff>,
    pub(crate) metadata: Metadata,
    pub(crate) first_attempt_at: Option<DateTime<Utc>>,
}

impl RetryRequest {
    /// Create a request with coordinator defaults for retries and backoff
    pub fn new(
        id: impl Into<String>,
        operation_type: OperationType,
        executor: Arc<dyn OperationExecutor>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            operation_type,
            executor,
            error: error.into(),
            priority: Priority::default(),
            max_retries: None,
            backoff: None,
            metadata: Metadata::new(),
            first_attempt_at: None,
        }
    }

    /// Set presentation priority
    #[must_use]
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Override the retry ceiling (clamped to at least 1)
    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Override the backoff policy
    #[must_use]
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Attach a metadata entry
    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Instant of the failed first attempt (defaults to registration time)
    #[must_use]
    pub fn first_attempt_at(mut self, at: DateTime<Utc>) -> Self {
        self.first_attempt_at = Some(at);
        self
    }
}

impl fmt::Debug for RetryRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryRequest")
            .field("id", &self.id)
            .field("operation_type", &self.operation_type)
            .field("error", &self.error)
            .field("priority", &self.priority)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

/// An operation held by the coordinator.
#[derive(Clone)]
pub struct RetryOperation {
    pub(crate) record: OperationRecord,
    pub(crate) executor: Arc<dyn OperationExecutor>,
    pub(crate) in_flight: bool,
    pub(crate) generation: u64,
}

impl RetryOperation {
    /// Caller-assigned id
    #[must_use]
    pub fn id(&self) -> &str {
        &self.record.id
    }

    /// Operation category
    #[must_use]
    pub fn operation_type(&self) -> OperationType {
        self.record.operation_type
    }

    /// Instant of the first failed attempt
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.record.timestamp
    }

    /// Last failure message
    #[must_use]
    pub fn error(&self) -> &str {
        &self.record.error
    }

    /// Attempts made so far
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.record.retry_count
    }

    /// Attempt ceiling
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.record.max_retries
    }

    /// Earliest instant the next retry may run
    #[must_use]
    pub fn next_retry_at(&self) -> DateTime<Utc> {
        self.record.next_retry_at
    }

    /// Presentation priority
    #[must_use]
    pub fn priority(&self) -> Priority {
        self.record.priority
    }

    /// Opaque metadata
    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.record.metadata
    }

    /// Backoff policy in use
    #[must_use]
    pub fn backoff(&self) -> &Backoff {
        &self.record.backoff
    }

    /// Executor capability
    #[must_use]
    pub fn executor(&self) -> &Arc<dyn OperationExecutor> {
        &self.executor
    }

    /// True once `retry_count == max_retries`
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.record.retry_count >= self.record.max_retries
    }

    /// True while a dispatch is outstanding
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Lifecycle status at `now`
    #[must_use]
    pub fn status(&self, now: DateTime<Utc>) -> OperationStatus {
        if self.is_exhausted() {
            OperationStatus::Exhausted
        } else if self.in_flight {
            OperationStatus::Retrying
        } else if self.record.next_retry_at <= now {
            OperationStatus::Eligible
        } else {
            OperationStatus::Waiting
        }
    }

    /// Persistable copy without the executor
    #[must_use]
    pub fn record(&self) -> &OperationRecord {
        &self.record
    }
}

impl fmt::Debug for RetryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOperation")
            .field("record", &self.record)
            .field("in_flight", &self.in_flight)
            .finish_non_exhaustive()
    }
}

/// Persisted form of a queued operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRecord {
    /// Caller-assigned id
    pub id: String,
    /// Operation category
    #[serde(rename = "type")]
    pub operation_type: OperationType,
    /// Instant of the first failed attempt
    pub timestamp: DateTime<Utc>,
    /// Last failure message
    pub error: String,
    /// Attempts made so far
    pub retry_count: u32,
    /// Attempt ceiling
    pub max_retries: u32,
    /// Earliest instant of the next retry
    pub next_retry_at: DateTime<Utc>,
    /// Presentation priority
    #[serde(default)]
    pub priority: Priority,
    /// Opaque metadata
    #[serde(default)]
    pub metadata: Metadata,
    /// Backoff policy
    #[serde(default)]
    pub backoff: Backoff,
}

/// Persisted form of the whole retry queue, in registration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetryQueueSnapshot {
    /// Queued operations
    pub operations: Vec<OperationRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn non_finite_floats_become_null() {
        assert_eq!(MetadataValue::from(f64::NAN), MetadataValue::Null);
        assert_eq!(MetadataValue::from(f64::INFINITY), MetadataValue::Null);
        assert_eq!(MetadataValue::from(f64::NEG_INFINITY), MetadataValue::Null);
        assert_eq!(MetadataValue::from(2.5), MetadataValue::Float(2.5));
    }

    #[test]
    fn metadata_survives_json() {
        let values = vec![
            MetadataValue::from(f64::NAN),
            MetadataValue::from(2.5),
            MetadataValue::from(3_i64),
            MetadataValue::from("CS101"),
            MetadataValue::from(true),
        ];
        let json = serde_json::to_string(&values).unwrap();
        let restored: Vec<MetadataValue> = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, values);
    }
}
