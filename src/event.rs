//! Routing event: the call/data/SMS attempt a ranking is computed for.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Well-known event field names.
pub mod fields {
    pub const ACCOUNT: &str = "Account";
    pub const SUBJECT: &str = "Subject";
    pub const DESTINATION: &str = "Destination";
    pub const USAGE: &str = "Usage";
}

/// An event to be routed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteEvent {
    /// Tenant the event belongs to (empty = default tenant)
    #[serde(default)]
    pub tenant: String,
    /// Event identifier (for logging)
    #[serde(default)]
    pub id: String,
    /// Event time, used for profile activation checks
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
    /// Event fields
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl RouteEvent {
    /// Create an event with no fields.
    pub fn new(tenant: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            id: id.into(),
            ..Default::default()
        }
    }

    /// Set a field.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Set the event time.
    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time);
        self
    }

    /// Get a field value.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Account the event is charged to.
    pub fn account(&self) -> Option<&str> {
        self.field(fields::ACCOUNT).filter(|s| !s.is_empty())
    }

    /// Rating subject, falling back to the account.
    pub fn subject(&self) -> Option<&str> {
        self.field(fields::SUBJECT)
            .filter(|s| !s.is_empty())
            .or_else(|| self.account())
    }

    /// Dialed destination.
    pub fn destination(&self) -> Option<&str> {
        self.field(fields::DESTINATION).filter(|s| !s.is_empty())
    }

    /// Requested usage.
    ///
    /// Accepts humantime strings (`90s`, `1m30s`) or a bare number of seconds.
    /// Returns `Ok(None)` when the event carries no usage.
    pub fn usage(&self) -> Result<Option<Duration>, String> {
        let Some(raw) = self.field(fields::USAGE).map(str::trim) else {
            return Ok(None);
        };
        if raw.is_empty() {
            return Ok(None);
        }
        if let Ok(secs) = raw.parse::<f64>() {
            return Duration::try_from_secs_f64(secs)
                .map(Some)
                .map_err(|e| format!("invalid usage '{}': {}", raw, e));
        }
        humantime::parse_duration(raw)
            .map(Some)
            .map_err(|e| format!("invalid usage '{}': {}", raw, e))
    }
}
