//! Earn Alliance game analytics SDK for Rust.
//!
//! Events and identifier updates are buffered in memory and sent to the
//! Earn Alliance custom events API in signed batches.
//!
//! # Example
//!
//! ```rust,ignore
//! use earnalliance::{Client, Identifiers, Traits};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), earnalliance::Error> {
//!     let client = Client::builder()
//!         .client_id("client")
//!         .client_secret("secret")
//!         .game_id("game")
//!         .build()?;
//!
//!     let round = client.start_round("", Traits::from([("map".into(), json!("castle"))]));
//!     round.track("player-1", "KILL").value(1).send().await;
//!
//!     client
//!         .set_identifiers("player-1", Identifiers::default().email("p1@example.com"))
//!         .await;
//!
//!     client.flush().await?;
//!     client.close().await;
//!     Ok(())
//! }
//! ```

mod builders;
mod client;
mod config;
mod error;
mod identifier;
mod queue;
mod round;
mod signer;
mod transport;
pub mod types;

pub use client::{Client, SendableTrack};
pub use config::{
    ClientBuilder, Config, DEFAULT_BATCH_SIZE, DEFAULT_DSN, DEFAULT_FLUSH_COOLDOWN,
    DEFAULT_FLUSH_INTERVAL, DEFAULT_MAX_RETRY_ATTEMPTS,
};
pub use error::Error;
pub use identifier::Identifier;
pub use round::Round;
pub use signer::Signer;
pub use types::{merge_traits, Event, IdentifierRecord, Identifiers, Traits, START_GAME_EVENT};
