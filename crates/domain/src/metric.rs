//! Route performance metrics.
//!
//! A [`RouteMetric`] records one call: its route, its HTTP-style status
//! class and its start/end timestamps.

use crate::errors::{DomainError, DomainResult};
use crate::identifiers::MetricId;
use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Verb label recorded for every gRPC call
pub const METHOD_POST: &str = "POST";

/// Status class of a successful call
pub const STATUS_OK: u16 = 200;

/// Status class used when no better classification exists
pub const STATUS_INTERNAL_SERVER_ERROR: u16 = 500;

/// Performance record of a single call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteMetric {
    pub id: MetricId,
    pub method: String,
    pub route: String,
    pub status_code: u16,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl RouteMetric {
    /// Start a metric now, with the success status class
    pub fn start(method: impl Into<String>, route: impl Into<String>) -> Self {
        Self::start_at(method, route, Utc::now())
    }

    /// Start a metric at a given instant
    pub fn start_at(
        method: impl Into<String>,
        route: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MetricId::new(),
            method: method.into(),
            route: route.into(),
            status_code: STATUS_OK,
            started_at,
            ended_at: None,
        }
    }

    /// Mark the metric as ended at `ended_at` and return its duration
    pub fn finish_at(&mut self, ended_at: DateTime<Utc>) -> DomainResult<TimeDelta> {
        if self.route.is_empty() {
            return Err(DomainError::EmptyRoute);
        }
        if self.ended_at.is_some() {
            return Err(DomainError::MetricAlreadyFinished(self.route.clone()));
        }
        if ended_at < self.started_at {
            return Err(DomainError::MetricEndsBeforeStart(self.route.clone()));
        }
        self.ended_at = Some(ended_at);
        Ok(ended_at - self.started_at)
    }

    /// Mark the metric as ended now
    pub fn finish(&mut self) -> DomainResult<TimeDelta> {
        self.finish_at(Utc::now())
    }

    /// Duration of the call, if it has ended
    pub fn duration(&self) -> Option<TimeDelta> {
        self.ended_at.map(|end| end - self.started_at)
    }

    /// Start time truncated to the minute, used as the aggregation bucket
    pub fn minute_bucket(&self) -> DateTime<Utc> {
        self.started_at
            .duration_trunc(TimeDelta::minutes(1))
            .unwrap_or(self.started_at)
    }

    pub fn is_success(&self) -> bool {
        self.status_code < 400
    }
}
