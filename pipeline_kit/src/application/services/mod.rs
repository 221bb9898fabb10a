// /////////////////////////////////////////////////////////////////////////////
// Pipeline Kit RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Application Services Module
//!
//! Orchestration services applying the domain contracts:
//!
//! - [`pipeline_service`]: pipeline builder and executor (admission,
//!   timeout, retry, metrics)
//! - [`batch_processor`]: command coalescing with per-caller resolution

pub mod batch_processor;
pub mod pipeline_service;

pub use batch_processor::{BatchConfig, BatchContext, BatchContextKey, BatchProcessor, PartialBatchStrategy};
pub use pipeline_service::{Pipeline, PipelineBuilder, PipelineOptions};
