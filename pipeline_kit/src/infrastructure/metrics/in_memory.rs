// /////////////////////////////////////////////////////////////////////////////
// Pipeline Kit RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # In-Memory Metrics Recorder
//!
//! Buffering [`MetricsRecorder`] used by tests and embedders that want to
//! inspect what the core emits without standing up an exporter.

use pipeline_kit_domain::error::PipelineError;
use pipeline_kit_domain::services::{MetricSnapshot, MetricType, MetricsRecorder};
use async_trait::async_trait;
use parking_lot::Mutex;

/// Recorder that appends every snapshot to an inspectable buffer.
#[derive(Default)]
pub struct InMemoryMetricsRecorder {
    snapshots: Mutex<Vec<MetricSnapshot>>,
}

impl InMemoryMetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies out every recorded snapshot
    pub fn snapshots(&self) -> Vec<MetricSnapshot> {
        self.snapshots.lock().clone()
    }

    /// Sums the recorded counter increments under `name`
    pub fn counter_total(&self, name: &str) -> f64 {
        self.snapshots
            .lock()
            .iter()
            .filter(|s| s.metric_type == MetricType::Counter && s.name == name)
            .map(|s| s.value)
            .sum()
    }

    /// Drops every recorded snapshot
    pub fn reset(&self) {
        self.snapshots.lock().clear();
    }
}

#[async_trait]
impl MetricsRecorder for InMemoryMetricsRecorder {
    async fn record(&self, snapshot: MetricSnapshot) {
        self.snapshots.lock().push(snapshot);
    }

    async fn flush(&self) -> Result<(), PipelineError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_and_sums_counters() {
        let recorder = InMemoryMetricsRecorder::new();
        recorder.record(MetricSnapshot::counter("executed", 1.0)).await;
        recorder.record(MetricSnapshot::counter("executed", 2.0)).await;
        recorder.record(MetricSnapshot::gauge("saturation", 0.5)).await;

        assert_eq!(recorder.snapshots().len(), 3);
        assert_eq!(recorder.counter_total("executed"), 3.0);
        assert_eq!(recorder.counter_total("missing"), 0.0);

        recorder.reset();
        assert!(recorder.snapshots().is_empty());
    }
}
