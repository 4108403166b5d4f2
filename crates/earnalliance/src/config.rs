//! Client configuration.

use crate::Error;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

/// Default custom events endpoint.
pub const DEFAULT_DSN: &str = "https://events.earnalliance.com/v2/custom-events";

/// Default batch size.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default flush interval.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(30);

/// Default flush cooldown.
pub const DEFAULT_FLUSH_COOLDOWN: Duration = Duration::from_secs(10);

/// Default number of retries for a failed request.
pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 5;

/// Default delay before the first retry.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const ENV_CLIENT_ID: &str = "ALLIANCE_CLIENT_ID";
const ENV_CLIENT_SECRET: &str = "ALLIANCE_CLIENT_SECRET";
const ENV_GAME_ID: &str = "ALLIANCE_GAME_ID";
const ENV_DSN: &str = "ALLIANCE_DSN";

/// Earn Alliance client configuration.
#[derive(Clone)]
pub struct Config {
    pub(crate) client_id: String,
    pub(crate) client_secret: String,
    pub(crate) game_id: String,
    pub(crate) dsn: String,
    pub(crate) batch_size: usize,
    pub(crate) flush_interval: Duration,
    pub(crate) flush_cooldown: Duration,
    pub(crate) max_retry_attempts: u32,
    pub(crate) retry_backoff: Duration,
    pub(crate) timeout: Duration,
}

impl Config {
    /// Get the client ID.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Get the game ID.
    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    /// Get the endpoint events are posted to.
    pub fn dsn(&self) -> &str {
        &self.dsn
    }

    /// Get the batch size.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Get the flush interval.
    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }

    /// Get the flush cooldown.
    pub fn flush_cooldown(&self) -> Duration {
        self.flush_cooldown
    }

    /// Get the maximum number of retries per request.
    pub fn max_retry_attempts(&self) -> u32 {
        self.max_retry_attempts
    }

    /// Get the initial retry backoff.
    pub fn retry_backoff(&self) -> Duration {
        self.retry_backoff
    }

    /// Get the request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("game_id", &self.game_id)
            .field("dsn", &self.dsn)
            .field("batch_size", &self.batch_size)
            .field("flush_interval", &self.flush_interval)
            .field("flush_cooldown", &self.flush_cooldown)
            .field("max_retry_attempts", &self.max_retry_attempts)
            .field("retry_backoff", &self.retry_backoff)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Builder for the Earn Alliance client.
#[derive(Debug, Default)]
pub struct ClientBuilder {
    client_id: Option<String>,
    client_secret: Option<String>,
    game_id: Option<String>,
    dsn: Option<String>,
    batch_size: Option<usize>,
    flush_interval: Option<Duration>,
    flush_cooldown: Option<Duration>,
    max_retry_attempts: Option<u32>,
    retry_backoff: Option<Duration>,
    timeout: Option<Duration>,
    pub(crate) error_sink: Option<UnboundedSender<Error>>,
}

impl ClientBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder seeded from `ALLIANCE_CLIENT_ID`, `ALLIANCE_CLIENT_SECRET`,
    /// `ALLIANCE_GAME_ID` and `ALLIANCE_DSN`.
    ///
    /// Unset or blank variables are ignored. Explicit setters override them.
    pub fn from_env() -> Self {
        let var = |name: &str| {
            std::env::var(name)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Self {
            client_id: var(ENV_CLIENT_ID),
            client_secret: var(ENV_CLIENT_SECRET),
            game_id: var(ENV_GAME_ID),
            dsn: var(ENV_DSN),
            ..Self::default()
        }
    }

    /// Set the client ID. Required.
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Set the client secret. Required.
    pub fn client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(client_secret.into());
        self
    }

    /// Set the game ID. Required.
    pub fn game_id(mut self, game_id: impl Into<String>) -> Self {
        self.game_id = Some(game_id.into());
        self
    }

    /// Set the URL requests are sent to.
    pub fn dsn(mut self, dsn: impl Into<String>) -> Self {
        self.dsn = Some(dsn.into());
        self
    }

    /// Set the queue length that triggers an immediate flush.
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    /// Set the time between background flushes. Zero disables them.
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = Some(interval);
        self
    }

    /// Set the minimum time between flushes triggered by [`Client::flush`](crate::Client::flush).
    pub fn flush_cooldown(mut self, cooldown: Duration) -> Self {
        self.flush_cooldown = Some(cooldown);
        self
    }

    /// Set how many times a failed request is retried.
    pub fn max_retry_attempts(mut self, attempts: u32) -> Self {
        self.max_retry_attempts = Some(attempts);
        self
    }

    /// Set the delay before the first retry. Doubles on each attempt.
    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = Some(backoff);
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the channel that receives errors from background flushes.
    pub fn error_sink(mut self, sink: UnboundedSender<Error>) -> Self {
        self.error_sink = Some(sink);
        self
    }

    /// Build the configuration.
    pub(crate) fn build_config(&self) -> Result<Config, Error> {
        let client_id = required(&self.client_id, "client id")?;
        let client_secret = required(&self.client_secret, "client secret")?;
        let game_id = required(&self.game_id, "game id")?;
        let dsn = parse_dsn(self.dsn.as_deref().unwrap_or(DEFAULT_DSN))?;

        let batch_size = self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
        if batch_size < 1 {
            return Err(Error::Config("batch size must be at least 1".into()));
        }

        let max_retry_attempts = self.max_retry_attempts.unwrap_or(DEFAULT_MAX_RETRY_ATTEMPTS);
        if max_retry_attempts < 1 {
            return Err(Error::Config("max retry attempts must be at least 1".into()));
        }

        Ok(Config {
            client_id,
            client_secret,
            game_id,
            dsn,
            batch_size,
            flush_interval: self.flush_interval.unwrap_or(DEFAULT_FLUSH_INTERVAL),
            flush_cooldown: self.flush_cooldown.unwrap_or(DEFAULT_FLUSH_COOLDOWN),
            max_retry_attempts,
            retry_backoff: self.retry_backoff.unwrap_or(DEFAULT_RETRY_BACKOFF),
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
        })
    }
}

fn required(value: &Option<String>, name: &str) -> Result<String, Error> {
    match value.as_deref() {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(Error::Config(format!("{} cannot be empty", name))),
    }
}

fn parse_dsn(dsn: &str) -> Result<String, Error> {
    if dsn.is_empty() {
        return Err(Error::Config("dsn cannot be empty".into()));
    }

    let dsn = dsn.strip_suffix('/').unwrap_or(dsn);
    let url = url::Url::parse(dsn)
        .map_err(|e| Error::Config(format!("failed to parse dsn: {}", e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::Config(format!(
            "dsn must be an http or https url, got scheme {}",
            url.scheme()
        )));
    }

    Ok(dsn.to_string())
}
