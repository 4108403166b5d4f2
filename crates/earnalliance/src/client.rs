//! Earn Alliance client implementation.

use crate::builders::TrackBuilder;
use crate::config::{ClientBuilder, Config};
use crate::queue::EventQueue;
use crate::round::Round;
use crate::transport::HttpTransport;
use crate::types::{Event, IdentifierRecord, Identifiers, Traits, START_GAME_EVENT};
use crate::Error;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

/// Earn Alliance analytics client.
///
/// Events and identifier updates are queued in memory and sent in signed
/// batches. A batch is sent when the queue reaches the batch size, when
/// [`Client::flush`] is called outside the flush cooldown, or on every flush
/// interval tick. Flushes requested during the cooldown are coalesced into a
/// single deferred flush.
///
/// # Example
///
/// ```rust,no_run
/// use earnalliance::{Client, Identifiers};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), earnalliance::Error> {
///     let client = Client::builder()
///         .client_id("client")
///         .client_secret("secret")
///         .game_id("game")
///         .flush_cooldown(Duration::from_secs(5))
///         .build()?;
///
///     client.start_game("player-1").await;
///
///     client.track("player-1", "KILL")
///         .value(3)
///         .trait_("weapon", "sword")
///         .send()
///         .await;
///
///     client
///         .set_identifiers("player-1", Identifiers::default().discord_id("player#1234"))
///         .await;
///
///     client.flush().await?;
///     client.close().await;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct Client {
    inner: Arc<Inner>,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    batch_handle: Mutex<Option<JoinHandle<()>>>,
}

/// State shared with the background tasks.
#[derive(Debug)]
struct Inner {
    config: Config,
    queue: EventQueue,
    transport: HttpTransport,
    flush_state: Mutex<FlushState>,
    error_sink: Option<UnboundedSender<Error>>,
    is_shutdown: AtomicBool,
}

#[derive(Debug, Default)]
struct FlushState {
    /// `None` until the first cooldown-gated flush.
    last_flush: Option<Instant>,
    /// The deferred flush scheduled during a cooldown, if any.
    waiting: Option<JoinHandle<()>>,
}

impl ClientBuilder {
    /// Build the client and start the background flush task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build(self) -> Result<Client, Error> {
        let config = self.build_config()?;
        Client::from_config(config, self.error_sink)
    }
}

impl Client {
    /// Create a new builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Create a new client from config.
    pub(crate) fn from_config(
        config: Config,
        error_sink: Option<UnboundedSender<Error>>,
    ) -> Result<Self, Error> {
        let transport = HttpTransport::new(&config)?;
        let inner = Arc::new(Inner {
            queue: EventQueue::new(config.batch_size()),
            transport,
            flush_state: Mutex::new(FlushState::default()),
            error_sink,
            is_shutdown: AtomicBool::new(false),
            config,
        });

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let period = inner.config.flush_interval();
        let batch_handle = if period.is_zero() {
            debug!("flush interval is zero, background flush disabled");
            None
        } else {
            Some(spawn_batch_handler(inner.clone(), period, shutdown_rx))
        };

        Ok(Self {
            inner,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            batch_handle: Mutex::new(batch_handle),
        })
    }

    /// Get the client configuration.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the number of queued events and identifier updates.
    pub async fn pending_count(&self) -> usize {
        self.inner.queue.len().await
    }

    /// Whether a deferred flush is waiting for the cooldown to end.
    pub async fn has_pending_flush(&self) -> bool {
        self.inner.flush_state.lock().await.waiting.is_some()
    }

    // ============================================
    // TRACK
    // ============================================

    /// Track an event.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # async fn example(client: &earnalliance::Client) {
    /// client.track("player-1", "DEATH")
    ///     .trait_("cause", "lava")
    ///     .send()
    ///     .await;
    /// # }
    /// ```
    pub fn track(
        &self,
        user_id: impl Into<String>,
        event_name: impl Into<String>,
    ) -> SendableTrack<'_> {
        SendableTrack::new(self, TrackBuilder::new(user_id, event_name))
    }

    /// Track a `START_GAME` event without traits or value.
    pub async fn start_game(&self, user_id: impl Into<String>) {
        let event = TrackBuilder::new(user_id, START_GAME_EVENT).build();
        self.enqueue_event(event).await;
    }

    /// Start a round of events sharing a group id.
    ///
    /// An empty `id` generates a random UUID. The round's traits are the
    /// defaults for every event tracked through it.
    pub fn start_round(&self, id: impl Into<String>, traits: Traits) -> Round<'_> {
        Round::new(self, id.into(), traits)
    }

    // ============================================
    // IDENTIFIERS
    // ============================================

    /// Queue an identifier update for a user.
    ///
    /// Always requests a flush afterwards; whether it is sent right away
    /// depends on the flush cooldown.
    pub async fn set_identifiers(&self, user_id: impl Into<String>, identifiers: Identifiers) {
        if self.is_shutdown() {
            debug!("client closed, dropping identifiers");
            return;
        }

        let record = IdentifierRecord {
            user_id: user_id.into(),
            identifiers,
        };
        let len = self.inner.queue.push_identifier(record).await;
        if self.inner.queue.is_full(len) {
            self.inner.drain_and_report().await;
        }

        if let Err(e) = self.inner.flush().await {
            self.inner.report(e);
        }
    }

    // ============================================
    // LIFECYCLE
    // ============================================

    /// Flush the queue, respecting the flush cooldown.
    ///
    /// Outside the cooldown the batch is sent now and the outcome is returned.
    /// During the cooldown a single deferred flush is scheduled for when it
    /// ends and `Ok(())` is returned right away; its errors go to the error
    /// sink. Further calls during the same cooldown do nothing.
    #[instrument(skip(self))]
    pub async fn flush(&self) -> Result<(), Error> {
        self.ensure_not_shutdown()?;
        self.inner.flush().await
    }

    /// Stop the background flush task and cancel any deferred flush.
    ///
    /// Queued events that have not been sent are discarded. Flush first if
    /// they matter.
    #[instrument(skip(self))]
    pub async fn close(&self) {
        if self.inner.is_shutdown.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("closing client");

        if let Some(waiting) = self.inner.flush_state.lock().await.waiting.take() {
            debug!("cancelling deferred flush");
            waiting.abort();
        }

        if let Some(tx) = self.shutdown_tx.lock().await.take() {
            let _ = tx.send(());
        }

        if let Some(handle) = self.batch_handle.lock().await.take() {
            let _ = handle.await;
        }

        let dropped = self.inner.queue.len().await;
        if dropped > 0 {
            debug!(dropped, "discarding unsent records");
        }
    }

    // ============================================
    // INTERNAL
    // ============================================

    fn is_shutdown(&self) -> bool {
        self.inner.is_shutdown.load(Ordering::SeqCst)
    }

    fn ensure_not_shutdown(&self) -> Result<(), Error> {
        if self.is_shutdown() {
            return Err(Error::Shutdown);
        }
        Ok(())
    }

    async fn enqueue_event(&self, event: Event) {
        if self.is_shutdown() {
            debug!(event = %event.event, "client closed, dropping event");
            return;
        }

        let len = self.inner.queue.push_event(event).await;
        if self.inner.queue.is_full(len) {
            self.inner.drain_and_report().await;
        }
    }
}

impl Inner {
    /// Cooldown-gated flush shared by the public API and background tasks.
    async fn flush(self: &Arc<Self>) -> Result<(), Error> {
        let cooldown = self.config.flush_cooldown();
        let mut state = self.flush_state.lock().await;

        let elapsed = state.last_flush.map(|last| last.elapsed());
        let elapsed = match elapsed {
            Some(elapsed) if elapsed < cooldown => elapsed,
            _ => {
                state.last_flush = Some(Instant::now());
                drop(state);
                return self.drain().await;
            }
        };

        if state.waiting.is_some() {
            return Ok(());
        }

        let remaining = cooldown.saturating_sub(elapsed);
        debug!(delay_ms = remaining.as_millis() as u64, "scheduling deferred flush");

        let inner = Arc::clone(self);
        state.waiting = Some(tokio::spawn(async move {
            tokio::time::sleep(remaining).await;
            inner.run_deferred().await;
        }));

        Ok(())
    }

    async fn run_deferred(&self) {
        {
            let mut state = self.flush_state.lock().await;
            state.last_flush = Some(Instant::now());
            state.waiting = None;
        }

        if self.is_shutdown.load(Ordering::SeqCst) {
            return;
        }

        self.drain_and_report().await;
    }

    /// Send up to one batch. Records are not requeued on failure.
    async fn drain(&self) -> Result<(), Error> {
        let batch = self.queue.drain().await;
        if batch.is_empty() {
            return Ok(());
        }

        info!(
            event_count = batch.events.len(),
            identifier_count = batch.identifiers.len(),
            "flushing batch"
        );

        if let Err(e) = self.transport.send(&batch).await {
            error!(error = %e, dropped = batch.len(), "flush failed, dropping batch");
            return Err(e);
        }

        Ok(())
    }

    async fn drain_and_report(&self) {
        if let Err(e) = self.drain().await {
            self.report(e);
        }
    }

    /// Hand an error from a background flush to the error sink.
    fn report(&self, err: Error) {
        if let Some(sink) = &self.error_sink {
            let _ = sink.send(err);
        }
    }
}

fn spawn_batch_handler(
    inner: Arc<Inner>,
    period: Duration,
    mut shutdown_rx: oneshot::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let Some(start) = Instant::now().checked_add(period) else {
            warn!(?period, "flush interval out of range, background flush disabled");
            return;
        };
        let mut timer = interval_at(start, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => break,
                _ = timer.tick() => {
                    debug!("periodic flush");
                    if let Err(e) = inner.flush().await {
                        inner.report(e);
                    }
                }
            }
        }

        debug!("background flush stopped");
    })
}

// ============================================
// SENDABLE WRAPPERS
// ============================================

/// Sendable track event builder.
#[must_use = "the event is only queued once `send` is awaited"]
pub struct SendableTrack<'a> {
    builder: TrackBuilder,
    client: &'a Client,
}

impl<'a> SendableTrack<'a> {
    pub(crate) fn new(client: &'a Client, builder: TrackBuilder) -> Self {
        Self { builder, client }
    }

    /// Set the numeric value.
    pub fn value(mut self, value: i64) -> Self {
        self.builder = self.builder.value(value);
        self
    }

    /// Add a trait.
    pub fn trait_(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.builder = self.builder.trait_(key, value);
        self
    }

    /// Add several traits at once.
    pub fn traits(mut self, traits: Traits) -> Self {
        self.builder = self.builder.traits(traits);
        self
    }

    /// Set a custom timestamp.
    pub fn timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.builder = self.builder.timestamp(ts);
        self
    }

    /// Queue the event, sending a batch if the queue is full.
    pub async fn send(self) {
        self.client.enqueue_event(self.builder.build()).await
    }
}
