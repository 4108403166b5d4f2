//! Event types and serialization.

use crate::identifier::Identifier;
use serde::Serialize;
use std::collections::HashMap;

/// Free-form properties attached to an event.
pub type Traits = HashMap<String, serde_json::Value>;

/// Name of the event sent by [`Client::start_game`](crate::Client::start_game).
pub const START_GAME_EVENT: &str = "START_GAME";

/// Combine two trait maps. Keys in `overrides` win over keys in `base`.
pub fn merge_traits(base: &Traits, overrides: &Traits) -> Traits {
    let mut merged = Traits::with_capacity(base.len() + overrides.len());
    merged.extend(base.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// A tracked game event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub user_id: String,
    /// RFC 3339 timestamp.
    pub time: String,
    pub event: String,
    /// Round id, empty when the event is not part of a round.
    pub group_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traits: Option<Traits>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<i64>,
}

/// Identifiers supported by Earn Alliance.
///
/// `None` leaves the identifier untouched, [`Identifier::remove`] deletes it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identifiers {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apple_id: Option<Identifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discord_id: Option<Identifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<Identifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epic_games_id: Option<Identifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steam_id: Option<Identifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub twitter_id: Option<Identifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_address: Option<Identifier>,
}

impl Identifiers {
    /// Set the Apple ID.
    pub fn apple_id(mut self, id: impl Into<Identifier>) -> Self {
        self.apple_id = Some(id.into());
        self
    }

    /// Set the Discord ID.
    pub fn discord_id(mut self, id: impl Into<Identifier>) -> Self {
        self.discord_id = Some(id.into());
        self
    }

    /// Set the email address.
    pub fn email(mut self, email: impl Into<Identifier>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Set the Epic Games ID.
    pub fn epic_games_id(mut self, id: impl Into<Identifier>) -> Self {
        self.epic_games_id = Some(id.into());
        self
    }

    /// Set the Steam ID.
    pub fn steam_id(mut self, id: impl Into<Identifier>) -> Self {
        self.steam_id = Some(id.into());
        self
    }

    /// Set the Twitter ID.
    pub fn twitter_id(mut self, id: impl Into<Identifier>) -> Self {
        self.twitter_id = Some(id.into());
        self
    }

    /// Set the wallet address.
    pub fn wallet_address(mut self, address: impl Into<Identifier>) -> Self {
        self.wallet_address = Some(address.into());
        self
    }
}

/// Identifier update for one user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifierRecord {
    pub user_id: String,
    #[serde(flatten)]
    pub identifiers: Identifiers,
}

/// Payload sent to the custom events API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestPayload<'a> {
    pub game_id: &'a str,
    pub events: &'a [Event],
    pub identifiers: &'a [IdentifierRecord],
}
