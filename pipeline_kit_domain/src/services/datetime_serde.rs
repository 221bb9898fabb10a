// /////////////////////////////////////////////////////////////////////////////
// Pipeline Kit RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # DateTime Serde Module
//!
//! RFC3339-compliant serialization and deserialization for `DateTime<Utc>`
//! fields across the dispatch domain. All timestamps are normalized to UTC
//! and serialized as `YYYY-MM-DDTHH:MM:SS.sssZ`, keeping metadata, metric
//! snapshots, and journal entries interoperable across storage backends.
//!
//! Apply with the field attribute `#[serde(with = "datetime_serde")]`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serializer};

/// Serializes a `DateTime<Utc>` to an RFC3339 string
pub fn serialize<S>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let rfc3339_string = dt.to_rfc3339();
    serializer.serialize_str(&rfc3339_string)
}

/// Deserializes an RFC3339 datetime string to `DateTime<Utc>`
///
/// Accepts any RFC3339 offset and converts the result to UTC.
pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(serde::de::Error::custom)
}
