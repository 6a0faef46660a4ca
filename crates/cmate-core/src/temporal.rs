//! # Temporal Types: UTC-Only Timestamps
//!
//! Every time value in an audit row or an issue log line is a [`Timestamp`]:
//! UTC, whole seconds, rendered as `YYYY-MM-DDTHH:MM:SSZ`. The same string
//! form is used for `Display` and for serde, and reading it back is strict,
//! so a value hashed into canonical bytes always re-serializes identically.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CmateError;

const WIRE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Seconds-precision UTC instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    pub fn now() -> Self {
        Utc::now().into()
    }

    /// Drops any fractional second.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt.trunc_subsecs(0))
    }

    /// Parse RFC 3339 text that ends in `Z`. Numeric offsets are refused,
    /// `+00:00` included; fractional seconds are accepted and dropped.
    pub fn parse(s: &str) -> Result<Self, CmateError> {
        if !s.ends_with('Z') {
            return Err(CmateError::timestamp(s, "Z suffix required (UTC only)"));
        }
        DateTime::parse_from_rfc3339(s)
            .map(|dt| Self::from_utc(dt.with_timezone(&Utc)))
            .map_err(|e| CmateError::timestamp(s, e))
    }

    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    pub fn to_iso8601(&self) -> String {
        self.0.format(WIRE_FORMAT).to_string()
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::from_utc(dt)
    }
}

impl FromStr for Timestamp {
    type Err = CmateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(WIRE_FORMAT))
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
