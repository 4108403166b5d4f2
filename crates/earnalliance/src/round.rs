//! Rounds group events under a shared id.

use crate::builders::TrackBuilder;
use crate::client::{Client, SendableTrack};
use crate::types::Traits;

/// A group of events sharing a group id and default traits.
///
/// Created by [`Client::start_round`]. Traits passed to an individual
/// [`Round::track`] call override the round's traits with the same key.
#[derive(Debug)]
pub struct Round<'a> {
    id: String,
    traits: Traits,
    client: &'a Client,
}

impl<'a> Round<'a> {
    pub(crate) fn new(client: &'a Client, id: String, traits: Traits) -> Self {
        let id = if id.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            id
        };

        Self { id, traits, client }
    }

    /// Get the round id, used as the group id of its events.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the default traits of the round.
    pub fn traits(&self) -> &Traits {
        &self.traits
    }

    /// Track an event in this round.
    pub fn track(
        &self,
        user_id: impl Into<String>,
        event_name: impl Into<String>,
    ) -> SendableTrack<'a> {
        SendableTrack::new(
            self.client,
            TrackBuilder::new(user_id, event_name).round(&self.id, self.traits.clone()),
        )
    }
}
