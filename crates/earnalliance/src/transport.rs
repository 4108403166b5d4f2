//! HTTP transport for sending batches.

use crate::config::Config;
use crate::queue::Batch;
use crate::signer::Signer;
use crate::types::IngestPayload;
use crate::Error;
use reqwest::StatusCode;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// HTTP transport for sending signed batches to the Earn Alliance API.
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    game_id: String,
    signer: Signer,
    max_retries: u32,
    initial_backoff: Duration,
}

impl HttpTransport {
    /// Create a new HTTP transport.
    pub fn new(config: &Config) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            client,
            endpoint: config.dsn().to_string(),
            game_id: config.game_id().to_string(),
            signer: Signer::new(&config.client_id, &config.client_secret),
            max_retries: config.max_retry_attempts(),
            initial_backoff: config.retry_backoff().min(MAX_BACKOFF),
        })
    }

    /// Serialize, sign and send a batch.
    pub async fn send(&self, batch: &Batch) -> Result<(), Error> {
        let payload = IngestPayload {
            game_id: &self.game_id,
            events: &batch.events,
            identifiers: &batch.identifiers,
        };
        let body = serde_json::to_vec(&payload)?;

        debug!(
            endpoint = %self.endpoint,
            event_count = batch.events.len(),
            identifier_count = batch.identifiers.len(),
            "sending batch"
        );

        let text = self.post_with_retry(body).await?;
        interpret_response(&text)?;

        debug!("batch sent successfully");
        Ok(())
    }

    /// POST the body, retrying connection failures, 429 and 5xx responses.
    async fn post_with_retry(&self, body: Vec<u8>) -> Result<String, Error> {
        let mut attempt = 0;
        let mut backoff = self.initial_backoff;

        loop {
            let err = match self.post(body.clone()).await {
                Ok(response) if is_retryable(response.status()) => {
                    let status = response.status();
                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".into());
                    Error::Status { status, body }
                }
                Ok(response) => return Ok(response.text().await?),
                Err(e) => e,
            };

            attempt += 1;
            if attempt > self.max_retries {
                warn!(error = %err, attempts = attempt, "giving up on request");
                return Err(err);
            }

            warn!(
                error = %err,
                attempt,
                max_retries = self.max_retries,
                delay_ms = backoff.as_millis() as u64,
                "request failed, retrying"
            );
            tokio::time::sleep(backoff).await;
            backoff = next_backoff(backoff);
        }
    }

    async fn post(&self, body: Vec<u8>) -> Result<reqwest::Response, Error> {
        let timestamp = now_ms().to_string();
        let signature = self.signer.sign(&body, &timestamp);

        let response = self
            .client
            .post(&self.endpoint)
            .header("Accept", "application/json")
            .header("Content-Type", "application/json")
            .header("x-client-id", self.signer.client_id())
            .header("x-timestamp", timestamp)
            .header("x-signature", signature)
            .body(body)
            .send()
            .await?;

        Ok(response)
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// Double the delay, capped at [`MAX_BACKOFF`].
fn next_backoff(backoff: Duration) -> Duration {
    backoff.saturating_mul(2).min(MAX_BACKOFF)
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Map the API response body to a result.
///
/// `{"message":"OK"}` is success and `{"error":"..."}` is a rejection.
fn interpret_response(body: &str) -> Result<(), Error> {
    let value: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(body).map_err(|e| Error::Decode(e.to_string()))?;

    if value.get("message").and_then(|m| m.as_str()) == Some("OK") {
        return Ok(());
    }

    if let Some(error) = value.get("error").and_then(|e| e.as_str()) {
        warn!(error = %error, "API rejected batch");
        return Err(Error::Server(error.to_string()));
    }

    Err(Error::UnexpectedResponse(
        serde_json::Value::Object(value).to_string(),
    ))
}
