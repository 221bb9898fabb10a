// /////////////////////////////////////////////////////////////////////////////
// Pipeline Kit RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Metrics Recorder Interface
//!
//! This module defines the metrics port consumed by the dispatch core. The
//! executor, semaphore, and resilience primitives emit [`MetricSnapshot`]
//! values through a [`MetricsRecorder`] handle; exporters (Prometheus, test
//! recorders) live in the infrastructure layer.
//!
//! ## Overview
//!
//! - **Snapshots**: Self-describing measurements (name, type, value,
//!   timestamp, tags, optional unit)
//! - **Recorder Port**: `record` accepts one snapshot; `flush` drains any
//!   buffering an exporter performs
//! - **Metric Types**: counter, gauge, histogram, timer
//!
//! Recording must never fail the dispatch path: `record` is infallible from
//! the caller's perspective, and exporters swallow their own I/O problems.

use crate::error::PipelineError;
use crate::services::datetime_serde;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Kind of measurement a snapshot carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
    Timer,
}

/// One self-describing measurement emitted by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub name: String,
    pub metric_type: MetricType,
    pub value: f64,
    #[serde(with = "datetime_serde")]
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub tags: HashMap<String, String>,
    pub unit: Option<String>,
}

impl MetricSnapshot {
    /// Creates a snapshot stamped with the current time and no tags
    pub fn new(name: impl Into<String>, metric_type: MetricType, value: f64) -> Self {
        Self {
            name: name.into(),
            metric_type,
            value,
            timestamp: chrono::Utc::now(),
            tags: HashMap::new(),
            unit: None,
        }
    }

    /// Creates a counter increment snapshot
    pub fn counter(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, MetricType::Counter, value)
    }

    /// Creates a gauge snapshot
    pub fn gauge(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, MetricType::Gauge, value)
    }

    /// Creates a timer snapshot measured in seconds
    pub fn timer(name: impl Into<String>, seconds: f64) -> Self {
        Self::new(name, MetricType::Timer, seconds).with_unit("seconds")
    }

    /// Attaches a tag
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Sets the unit annotation
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
}

/// Metrics collaborator port.
///
/// # Thread Safety
///
/// Implementations must be thread-safe (`Send + Sync`); one recorder handle
/// is shared by every primitive that emits measurements.
#[async_trait]
pub trait MetricsRecorder: Send + Sync {
    /// Records one measurement
    async fn record(&self, snapshot: MetricSnapshot);

    /// Flushes any buffered measurements to the backing exporter
    async fn flush(&self) -> Result<(), PipelineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_builders() {
        let snapshot = MetricSnapshot::counter("commands_executed", 1.0)
            .with_tag("pipeline", "default")
            .with_unit("commands");

        assert_eq!(snapshot.metric_type, MetricType::Counter);
        assert_eq!(snapshot.value, 1.0);
        assert_eq!(snapshot.tags.get("pipeline").map(String::as_str), Some("default"));
        assert_eq!(snapshot.unit.as_deref(), Some("commands"));
    }

    #[test]
    fn test_timer_carries_seconds_unit() {
        let snapshot = MetricSnapshot::timer("execution", 0.25);
        assert_eq!(snapshot.metric_type, MetricType::Timer);
        assert_eq!(snapshot.unit.as_deref(), Some("seconds"));
    }

    #[test]
    fn test_snapshot_serde_round_trip() {
        let snapshot = MetricSnapshot::gauge("saturation", 0.5).with_tag("component", "semaphore");
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: MetricSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }
}
