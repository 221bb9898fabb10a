// /////////////////////////////////////////////////////////////////////////////
// Pipeline Kit RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Execution Priority Value Object - Middleware Phase Ordering
//!
//! This module provides the execution priority value object that partitions
//! middleware into ordered phases within a compiled pipeline chain. The
//! numeric values define a total order; equal priorities preserve insertion
//! order at chain-build time.
//!
//! ## Overview
//!
//! The priority system provides:
//!
//! - **Type-Safe Phase Ordering**: Named phases instead of magic numbers
//! - **Deterministic Chain Layout**: Lower values execute earlier; the chain
//!   compiler sorts by `(priority value, insertion index)` exactly once
//! - **Extensibility**: The `Custom` phase (largest value) hosts middleware
//!   that declares no particular phase
//!
//! ## Phase Table
//!
//! | Phase            | Value | Typical middleware                  |
//! |------------------|-------|-------------------------------------|
//! | Authentication   | 100   | Identity establishment              |
//! | Authorization    | 200   | Permission checks                   |
//! | Validation       | 300   | Input shape and business rules      |
//! | Sanitization     | 400   | Input normalization                 |
//! | RateLimiting     | 500   | Admission throttling                |
//! | PreProcessing    | 600   | Enrichment before the handler       |
//! | Processing       | 700   | Work adjacent to the handler        |
//! | PostProcessing   | 800   | Result transformation               |
//! | ErrorHandling    | 900   | Failure interception and mapping    |
//! | Custom           | 1000  | Default for unphased middleware     |
//!
//! ## Business Rules
//!
//! - The numeric values preserve the total order above; they are part of the
//!   public contract and never change between releases
//! - Equal priorities keep insertion order (stable sort in the compiler)
//! - `Custom` is the default phase

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::{self, Display};

/// Middleware phase within a compiled pipeline chain.
///
/// Priorities form a total order by their numeric value; smaller values run
/// earlier. Two middleware with the same priority run in the order they were
/// added to the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPriority {
    Authentication,
    Authorization,
    Validation,
    Sanitization,
    RateLimiting,
    PreProcessing,
    Processing,
    PostProcessing,
    ErrorHandling,
    Custom,
}

impl ExecutionPriority {
    /// Returns the numeric phase value
    ///
    /// The values define the public total order of phases; smaller is
    /// earlier.
    pub const fn value(&self) -> u16 {
        match self {
            ExecutionPriority::Authentication => 100,
            ExecutionPriority::Authorization => 200,
            ExecutionPriority::Validation => 300,
            ExecutionPriority::Sanitization => 400,
            ExecutionPriority::RateLimiting => 500,
            ExecutionPriority::PreProcessing => 600,
            ExecutionPriority::Processing => 700,
            ExecutionPriority::PostProcessing => 800,
            ExecutionPriority::ErrorHandling => 900,
            ExecutionPriority::Custom => 1000,
        }
    }

    /// Looks up the phase for an exact numeric value
    pub fn from_value(value: u16) -> Option<Self> {
        match value {
            100 => Some(ExecutionPriority::Authentication),
            200 => Some(ExecutionPriority::Authorization),
            300 => Some(ExecutionPriority::Validation),
            400 => Some(ExecutionPriority::Sanitization),
            500 => Some(ExecutionPriority::RateLimiting),
            600 => Some(ExecutionPriority::PreProcessing),
            700 => Some(ExecutionPriority::Processing),
            800 => Some(ExecutionPriority::PostProcessing),
            900 => Some(ExecutionPriority::ErrorHandling),
            1000 => Some(ExecutionPriority::Custom),
            _ => None,
        }
    }

    /// Returns all phases in execution order
    pub const fn all() -> [ExecutionPriority; 10] {
        [
            ExecutionPriority::Authentication,
            ExecutionPriority::Authorization,
            ExecutionPriority::Validation,
            ExecutionPriority::Sanitization,
            ExecutionPriority::RateLimiting,
            ExecutionPriority::PreProcessing,
            ExecutionPriority::Processing,
            ExecutionPriority::PostProcessing,
            ExecutionPriority::ErrorHandling,
            ExecutionPriority::Custom,
        ]
    }

    /// Returns the phase name as a stable identifier
    pub const fn as_str(&self) -> &'static str {
        match self {
            ExecutionPriority::Authentication => "authentication",
            ExecutionPriority::Authorization => "authorization",
            ExecutionPriority::Validation => "validation",
            ExecutionPriority::Sanitization => "sanitization",
            ExecutionPriority::RateLimiting => "rate_limiting",
            ExecutionPriority::PreProcessing => "pre_processing",
            ExecutionPriority::Processing => "processing",
            ExecutionPriority::PostProcessing => "post_processing",
            ExecutionPriority::ErrorHandling => "error_handling",
            ExecutionPriority::Custom => "custom",
        }
    }
}

impl Default for ExecutionPriority {
    fn default() -> Self {
        ExecutionPriority::Custom
    }
}

impl PartialOrd for ExecutionPriority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ExecutionPriority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value().cmp(&other.value())
    }
}

impl Display for ExecutionPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_values_preserve_total_order() {
        let phases = ExecutionPriority::all();
        for pair in phases.windows(2) {
            assert!(pair[0] < pair[1], "{} must precede {}", pair[0], pair[1]);
            assert!(pair[0].value() < pair[1].value());
        }
    }

    #[test]
    fn test_exact_phase_values() {
        assert_eq!(ExecutionPriority::Authentication.value(), 100);
        assert_eq!(ExecutionPriority::RateLimiting.value(), 500);
        assert_eq!(ExecutionPriority::ErrorHandling.value(), 900);
        assert_eq!(ExecutionPriority::Custom.value(), 1000);
    }

    #[test]
    fn test_from_value_round_trip() {
        for phase in ExecutionPriority::all() {
            assert_eq!(ExecutionPriority::from_value(phase.value()), Some(phase));
        }
        assert_eq!(ExecutionPriority::from_value(101), None);
        assert_eq!(ExecutionPriority::from_value(0), None);
    }

    #[test]
    fn test_default_is_custom() {
        assert_eq!(ExecutionPriority::default(), ExecutionPriority::Custom);
    }

    #[test]
    fn test_serde_uses_snake_case_names() {
        let json = serde_json::to_string(&ExecutionPriority::PreProcessing).unwrap();
        assert_eq!(json, "\"pre_processing\"");
        let back: ExecutionPriority = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ExecutionPriority::PreProcessing);
    }
}
