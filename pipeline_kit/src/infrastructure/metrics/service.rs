// /////////////////////////////////////////////////////////////////////////////
// Pipeline Kit RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Metrics Service Implementation
//!
//! Prometheus-based exporter for the dispatch core's metric snapshots.
//! Snapshots are routed by metric type into three labelled collector
//! families (counter, gauge, histogram/timer), all namespaced under
//! `pipeline_kit`. Thread-safe with low overhead; recording never fails the
//! dispatch path.

use pipeline_kit_domain::error::PipelineError;
use pipeline_kit_domain::services::{MetricSnapshot, MetricType, MetricsRecorder};
use async_trait::async_trait;
use prometheus::{CounterVec, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::Arc;
use tracing::debug;

/// Prometheus metrics service for dispatch observability.
///
/// One labelled collector family per metric type keeps the registry stable
/// while snapshots stay free-form: the snapshot name becomes the `name`
/// label value.
#[derive(Clone)]
pub struct PrometheusMetricsService {
    registry: Arc<Registry>,
    counters: CounterVec,
    gauges: GaugeVec,
    histograms: HistogramVec,
}

impl PrometheusMetricsService {
    /// Create a new service with its own Prometheus registry
    pub fn new() -> Result<Self, PipelineError> {
        let registry = Registry::new();

        let counters = CounterVec::new(
            Opts::new("events_total", "Counter snapshots emitted by the dispatch core")
                .namespace("pipeline_kit"),
            &["name"],
        )
        .map_err(|e| PipelineError::internal(format!("Failed to create events_total metric: {}", e)))?;

        let gauges = GaugeVec::new(
            Opts::new("gauge", "Gauge snapshots emitted by the dispatch core").namespace("pipeline_kit"),
            &["name"],
        )
        .map_err(|e| PipelineError::internal(format!("Failed to create gauge metric: {}", e)))?;

        let histograms = HistogramVec::new(
            HistogramOpts::new("observation_seconds", "Histogram and timer snapshots")
                .namespace("pipeline_kit")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]),
            &["name"],
        )
        .map_err(|e| PipelineError::internal(format!("Failed to create observation_seconds metric: {}", e)))?;

        registry
            .register(Box::new(counters.clone()))
            .map_err(|e| PipelineError::internal(format!("Failed to register events_total: {}", e)))?;
        registry
            .register(Box::new(gauges.clone()))
            .map_err(|e| PipelineError::internal(format!("Failed to register gauge: {}", e)))?;
        registry
            .register(Box::new(histograms.clone()))
            .map_err(|e| PipelineError::internal(format!("Failed to register observation_seconds: {}", e)))?;

        debug!("PrometheusMetricsService initialized");

        Ok(Self {
            registry: Arc::new(registry),
            counters,
            gauges,
            histograms,
        })
    }

    /// Renders the registry in the Prometheus text exposition format
    pub fn export(&self) -> Result<String, PipelineError> {
        let encoder = TextEncoder::new();
        encoder
            .encode_to_string(&self.registry.gather())
            .map_err(|e| PipelineError::internal(format!("Failed to encode metrics: {}", e)))
    }

    /// The underlying registry, for embedders that scrape several sources
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}

#[async_trait]
impl MetricsRecorder for PrometheusMetricsService {
    async fn record(&self, snapshot: MetricSnapshot) {
        match snapshot.metric_type {
            MetricType::Counter => {
                self.counters
                    .with_label_values(&[snapshot.name.as_str()])
                    .inc_by(snapshot.value);
            }
            MetricType::Gauge => {
                self.gauges.with_label_values(&[snapshot.name.as_str()]).set(snapshot.value);
            }
            MetricType::Histogram | MetricType::Timer => {
                self.histograms
                    .with_label_values(&[snapshot.name.as_str()])
                    .observe(snapshot.value);
            }
        }
    }

    async fn flush(&self) -> Result<(), PipelineError> {
        // Prometheus is pull-based; nothing is buffered here.
        Ok(())
    }
}
