// /////////////////////////////////////////////////////////////////////////////
// Pipeline Kit RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Error Module
//!
//! Typed error taxonomy for the PipelineKit dispatch domain. See
//! [`pipeline_error`] for the full architecture discussion.

pub mod pipeline_error;

pub use pipeline_error::{
    AuthorizationReason, BackPressureError, EncryptionError, PipelineError, ValidationReason,
};
