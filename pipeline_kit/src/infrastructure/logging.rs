// /////////////////////////////////////////////////////////////////////////////
// Pipeline Kit RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Logging Integration
//!
//! Bridges the domain's diagnostic hooks onto `tracing`. The library never
//! installs a subscriber; embedders wire their own and call
//! [`install_tracing_guard_diagnostics`] once at startup so guard warnings
//! land in the application's structured logs instead of stderr.

use pipeline_kit_domain::services::{set_guard_diagnostics_sink, GuardDiagnosticsSink};
use std::sync::Arc;
use tracing::warn;

/// Guard diagnostics sink emitting `tracing` warnings.
pub struct TracingGuardDiagnostics;

impl GuardDiagnosticsSink for TracingGuardDiagnostics {
    fn unused_next(&self, middleware_name: &str) {
        warn!(
            middleware = middleware_name,
            "middleware returned without invoking next; short-circuiting middleware should suppress this diagnostic"
        );
    }
}

/// Routes guard diagnostics through `tracing`
pub fn install_tracing_guard_diagnostics() {
    set_guard_diagnostics_sink(Arc::new(TracingGuardDiagnostics));
}
