// /////////////////////////////////////////////////////////////////////////////
// Pipeline Kit RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Registry Key Value Object
//!
//! Composite key identifying one pipeline registration: the command type
//! plus a registration name. A command type may carry several pipelines
//! under different names; the unnamed registration uses
//! [`RegistryKey::DEFAULT_NAME`].
//!
//! The canonical display form is `TypeName|name`, which is what registry
//! statistics and diagnostics print.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// Key for one pipeline registration: command type name plus pipeline name.
///
/// Equality covers both components. The in-memory registry keys its primary
/// map by `(TypeId, name)`; this value object is the stable, printable
/// projection used in snapshots, statistics, and error messages.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegistryKey {
    command_type: String,
    name: String,
}

impl RegistryKey {
    /// Name used for registrations that do not specify one
    pub const DEFAULT_NAME: &'static str = "default";

    /// Creates a key for a command type and explicit pipeline name
    pub fn new(command_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            command_type: command_type.into(),
            name: name.into(),
        }
    }

    /// Creates a key for the default registration of a command type
    pub fn default_for(command_type: impl Into<String>) -> Self {
        Self::new(command_type, Self::DEFAULT_NAME)
    }

    /// Returns the command type name component
    pub fn command_type(&self) -> &str {
        &self.command_type
    }

    /// Returns the pipeline name component
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true when this is the default registration for its type
    pub fn is_default(&self) -> bool {
        self.name == Self::DEFAULT_NAME
    }
}

impl Display for RegistryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.command_type, self.name)
    }
}
