//! Event builders for fluent API.

use crate::types::{merge_traits, Event, Traits};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

/// Format a timestamp the way the API expects it.
fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Builder for track events.
#[derive(Debug)]
pub struct TrackBuilder {
    user_id: String,
    event_name: String,
    group_id: String,
    round_traits: Option<Traits>,
    traits: Traits,
    value: Option<i64>,
    timestamp: Option<DateTime<Utc>>,
}

impl TrackBuilder {
    pub(crate) fn new(user_id: impl Into<String>, event_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            event_name: event_name.into(),
            group_id: String::new(),
            round_traits: None,
            traits: Traits::new(),
            value: None,
            timestamp: None,
        }
    }

    /// Attach the event to a round. Round traits are used as defaults.
    pub(crate) fn round(mut self, id: impl Into<String>, traits: Traits) -> Self {
        self.group_id = id.into();
        self.round_traits = Some(traits);
        self
    }

    /// Set the numeric value.
    pub fn value(mut self, value: i64) -> Self {
        self.value = Some(value);
        self
    }

    /// Add a trait.
    pub fn trait_(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.traits.insert(key.into(), value.into());
        self
    }

    /// Add several traits at once.
    pub fn traits(mut self, traits: Traits) -> Self {
        self.traits.extend(traits);
        self
    }

    /// Set a custom timestamp instead of the time of the call.
    pub fn timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.timestamp = Some(ts);
        self
    }

    /// Build the event.
    pub(crate) fn build(self) -> Event {
        let traits = match self.round_traits {
            Some(round_traits) => Some(merge_traits(&round_traits, &self.traits)),
            None if self.traits.is_empty() => None,
            None => Some(self.traits),
        };

        Event {
            user_id: self.user_id,
            time: format_time(self.timestamp.unwrap_or_else(Utc::now)),
            event: self.event_name,
            group_id: self.group_id,
            traits,
            value: self.value,
        }
    }
}
