//! Write connection: lifecycle state machine and periodic flushing.
//!
//! A [`WriteConnection`] buffers events and snapshots in memory and sends
//! them to the service on a fixed interval once connected.
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected --connect()--> Connecting --status/gameVersion/player OK--> Connected
//!      ^                          |                                          |
//!      +------- any step fails ---+                                          |
//!      +----------------------- disconnect() (final flush) ------------------+
//! ```
//!
//! # Architecture
//!
//! All mutable state lives in one [`std::sync::Mutex`] behind an [`Arc`]
//! shared with the timer task. The lock is only held for short synchronous
//! sections and never across an `.await`. A separate async lock serializes
//! `connect()` and `disconnect()` so a disconnect issued while a connect is
//! in flight waits for it instead of racing it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use redmetrics_types::{PlayerId, PlayerInfo, Record, time};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::ConnectionConfig;
use crate::error::ClientError;
use crate::flush::{CycleResult, FlushOutcome, FlushTicket, PendingQueues, run_cycle};
use crate::transport::{HttpRequest, Transport, send_checked};

/// Connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Not connected; records are only buffered.
    Disconnected,
    /// `connect()` is running its registration steps.
    Connecting,
    /// Registered; the flush timer is running.
    Connected,
}

impl core::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let label = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        };
        f.write_str(label)
    }
}

/// Mutable connection state, guarded by [`Shared::inner`].
#[derive(Debug)]
struct Inner {
    state: ConnectionState,
    player_id: Option<PlayerId>,
    /// Latest player description set by the caller.
    player_info: PlayerInfo,
    /// Bumped on every `update_player`, so `connect()` can tell whether the
    /// caller changed the player while registration was in flight.
    player_revision: u64,
    /// Configured player merged with every `player_info` seen at connect.
    player_defaults: PlayerInfo,
    queues: PendingQueues,
    timer: Option<JoinHandle<()>>,
}

#[derive(Debug)]
struct Shared<T> {
    transport: T,
    base_url: String,
    game_version_id: String,
    buffering_delay: Duration,
    inner: Mutex<Inner>,
    lifecycle: tokio::sync::Mutex<()>,
}

impl<T: Transport> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stop_timer(&self) {
        let timer = self.lock().timer.take();
        if let Some(timer) = timer {
            timer.abort();
            debug!("flush timer stopped");
        }
    }

    /// Run one flush cycle. Returns `None` when there was nothing to send.
    async fn flush(&self) -> Option<CycleResult> {
        let dispatch = {
            let mut inner = self.lock();
            let player_id = inner.player_id.clone();
            inner.queues.take(player_id)
        }?;

        debug!(
            events = dispatch.event_count(),
            snapshots = dispatch.snapshot_count(),
            "flush cycle dispatched"
        );

        let result = run_cycle(
            &self.transport,
            &self.base_url,
            &self.game_version_id,
            dispatch,
        )
        .await;

        match &result {
            Ok(outcome) => debug!(
                events_sent = outcome.events_sent,
                snapshots_sent = outcome.snapshots_sent,
                "flush cycle complete"
            ),
            Err(e) => warn!(error = %e, "flush cycle failed"),
        }
        Some(result)
    }

    /// Probe the service, check the game version, and register the player.
    async fn register(&self, player: &PlayerInfo) -> Result<PlayerId, ClientError> {
        let base = &self.base_url;

        send_checked(&self.transport, HttpRequest::get(format!("{base}/status")))
            .await
            .map_err(|reason| ClientError::ServiceUnreachable {
                base_url: base.clone(),
                reason,
            })?;

        send_checked(
            &self.transport,
            HttpRequest::get(format!("{base}/v1/gameVersion/{}", self.game_version_id)),
        )
        .await
        .map_err(|reason| ClientError::InvalidGameVersion {
            game_version_id: self.game_version_id.clone(),
            reason,
        })?;

        let response = send_checked(
            &self.transport,
            HttpRequest::post(format!("{base}/v1/player/"), player.to_wire()),
        )
        .await
        .map_err(ClientError::PlayerRegistrationFailed)?;

        response
            .data
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(PlayerId::from)
            .ok_or_else(|| {
                ClientError::PlayerRegistrationFailed(format!(
                    "response carries no player id: {}",
                    response.data
                ))
            })
    }

    /// PUT the given player description and return the local one.
    async fn push_player(
        &self,
        player_id: &PlayerId,
        player: &PlayerInfo,
    ) -> Result<PlayerInfo, ClientError> {
        let url = format!("{}/v1/player/{player_id}", self.base_url);
        send_checked(&self.transport, HttpRequest::put(url, player.to_wire()))
            .await
            .map_err(|reason| {
                warn!(player_id = %player_id, error = %reason, "player update failed");
                ClientError::PlayerUpdateFailed(reason)
            })?;
        debug!(player_id = %player_id, "player updated");
        Ok(self.lock().player_info.clone())
    }
}

/// Puts an unfinished connect back to `Disconnected`.
///
/// Covers both a failed registration step and a `connect()` future dropped
/// while its requests were in flight.
struct ConnectGuard<'a, T: Transport> {
    shared: &'a Shared<T>,
    armed: bool,
}

impl<'a, T: Transport> ConnectGuard<'a, T> {
    const fn new(shared: &'a Shared<T>) -> Self {
        Self {
            shared,
            armed: true,
        }
    }

    /// The connect reached `Connected`; leave the state alone.
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<T: Transport> Drop for ConnectGuard<'_, T> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = self.shared.lock();
        if inner.state == ConnectionState::Connecting {
            inner.state = ConnectionState::Disconnected;
            inner.player_id = None;
            drop(inner);
            debug!("unfinished connect reset to disconnected");
        }
    }
}

/// Spawn the interval task driving flush cycles.
///
/// The first tick fires one period after the call. Each tick runs its cycle
/// as a separate task so a slow round trip never delays the next tick. The
/// task holds only a weak reference and exits once the connection is gone.
fn spawn_timer<T: Transport>(shared: &Arc<Shared<T>>) -> JoinHandle<()> {
    let period = shared.buffering_delay;
    let weak: Weak<Shared<T>> = Arc::downgrade(shared);

    tokio::spawn(async move {
        let now = Instant::now();
        let mut ticker = tokio::time::interval_at(now.checked_add(period).unwrap_or(now), period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let Some(shared) = weak.upgrade() else {
                break;
            };
            tokio::spawn(async move {
                shared.flush().await;
            });
        }
    })
}

/// Buffered, periodically flushed connection to the service.
///
/// Records can be posted in any state. They are sent on the next timer
/// tick while connected, or by the final flush in
/// [`disconnect`](Self::disconnect).
#[derive(Debug)]
pub struct WriteConnection<T: Transport> {
    shared: Arc<Shared<T>>,
}

impl<T: Transport> WriteConnection<T> {
    /// Create a disconnected connection. No request is made.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Configuration`] if the game version is
    /// missing or empty or the buffering delay is zero.
    pub fn new(config: ConnectionConfig, transport: T) -> Result<Self, ClientError> {
        let game_version_id = config.validate()?.to_owned();
        let base_url = config.endpoint.base_url();

        Ok(Self {
            shared: Arc::new(Shared {
                transport,
                base_url,
                game_version_id,
                buffering_delay: config.buffering_delay(),
                inner: Mutex::new(Inner {
                    state: ConnectionState::Disconnected,
                    player_id: None,
                    player_info: PlayerInfo::new(),
                    player_revision: 0,
                    player_defaults: config.player,
                    queues: PendingQueues::default(),
                    timer: None,
                }),
                lifecycle: tokio::sync::Mutex::new(()),
            }),
        })
    }

    /// Register with the service and start the flush timer.
    ///
    /// Runs three sequential requests: a status probe, a game-version
    /// check, and player registration with the configured player merged
    /// with the current player info. Any failure leaves the connection
    /// `Disconnected`.
    ///
    /// If the player info changed while registering, the new value is
    /// pushed once after connecting. Should that push fail, the error is
    /// returned but the connection stays `Connected`.
    ///
    /// # Errors
    ///
    /// - [`ClientError::ConnectionState`] if already connected (no request).
    /// - [`ClientError::ServiceUnreachable`], [`ClientError::InvalidGameVersion`],
    ///   or [`ClientError::PlayerRegistrationFailed`] from the failed step.
    /// - [`ClientError::PlayerUpdateFailed`] if the follow-up push failed.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.ensure_not_connected()?;
        let _lifecycle = self.shared.lifecycle.lock().await;
        self.ensure_not_connected()?;

        let (player, revision) = {
            let mut inner = self.shared.lock();
            inner.state = ConnectionState::Connecting;
            let current = inner.player_info.clone();
            inner.player_defaults.merge(&current);
            (inner.player_defaults.clone(), inner.player_revision)
        };
        let guard = ConnectGuard::new(&self.shared);

        info!(
            base_url = %self.shared.base_url,
            game_version_id = %self.shared.game_version_id,
            "connecting"
        );

        let player_id = match self.shared.register(&player).await {
            Ok(player_id) => player_id,
            Err(e) => {
                drop(guard);
                warn!(error = %e, "connect failed");
                return Err(e);
            }
        };

        let pending_update = {
            let mut inner = self.shared.lock();
            inner.state = ConnectionState::Connected;
            inner.player_id = Some(player_id.clone());
            inner.timer = Some(spawn_timer(&self.shared));
            (inner.player_revision != revision).then(|| inner.player_info.clone())
        };
        guard.disarm();

        info!(player_id = %player_id, "connected");

        if let Some(player) = pending_update {
            debug!(player_id = %player_id, "player changed while connecting");
            self.shared.push_player(&player_id, &player).await?;
        }
        Ok(())
    }

    fn ensure_not_connected(&self) -> Result<(), ClientError> {
        if self.state() == ConnectionState::Connected {
            return Err(ClientError::ConnectionState(
                "already connected; call disconnect() first".to_owned(),
            ));
        }
        Ok(())
    }

    /// Stop the timer, send what is pending, and reset to `Disconnected`.
    ///
    /// Safe in any state and idempotent. Waits for an in-flight
    /// [`connect`](Self::connect). When not connected, pending records are
    /// discarded instead of sent and their tickets fail.
    ///
    /// Returns the counts sent by the final flush (zero when nothing was
    /// sent).
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::FlushFailed`] if the final flush failed. The
    /// connection is `Disconnected` either way.
    pub async fn disconnect(&self) -> Result<FlushOutcome, ClientError> {
        self.shared.stop_timer();
        let _lifecycle = self.shared.lifecycle.lock().await;
        self.shared.stop_timer();

        let connected = self.state() == ConnectionState::Connected;
        let result = if connected {
            self.shared
                .flush()
                .await
                .unwrap_or_else(|| Ok(FlushOutcome::default()))
        } else {
            let (events, snapshots) = self
                .shared
                .lock()
                .queues
                .discard("disconnected before the records could be sent");
            if events > 0 || snapshots > 0 {
                warn!(events, snapshots, "discarding records buffered while not connected");
            }
            Ok(FlushOutcome::default())
        };

        {
            let mut inner = self.shared.lock();
            inner.state = ConnectionState::Disconnected;
            inner.player_id = None;
        }

        if connected {
            info!("disconnected");
        }
        result
    }

    /// Buffer an event for the next flush cycle.
    ///
    /// A `section` given as an array is joined with `.` and `userTime` is
    /// stamped now. The returned ticket resolves with the outcome of the
    /// cycle that sends this event; it can be dropped.
    pub fn post_event(&self, event: Record) -> FlushTicket {
        let record = event.prepared(time::now());
        self.shared.lock().queues.push_event(record)
    }

    /// Buffer a snapshot for the next flush cycle.
    ///
    /// Same preparation and ticket semantics as
    /// [`post_event`](Self::post_event).
    pub fn post_snapshot(&self, snapshot: Record) -> FlushTicket {
        let record = snapshot.prepared(time::now());
        self.shared.lock().queues.push_snapshot(record)
    }

    /// Replace the local player description.
    ///
    /// When connected the new description is sent to the service; otherwise
    /// it is kept locally and applied at the next connect.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::PlayerUpdateFailed`] if the request failed.
    /// The local description is kept regardless.
    pub async fn update_player(&self, player: PlayerInfo) -> Result<PlayerInfo, ClientError> {
        let player_id = {
            let mut inner = self.shared.lock();
            inner.player_info = player.clone();
            inner.player_revision = inner.player_revision.wrapping_add(1);
            match (inner.state, inner.player_id.clone()) {
                (ConnectionState::Connected, Some(player_id)) => player_id,
                _ => return Ok(player),
            }
        };
        self.shared.push_player(&player_id, &player).await
    }

    /// Current connection status.
    pub fn state(&self) -> ConnectionState {
        self.shared.lock().state
    }

    /// Server-assigned player id, present only while connected.
    pub fn player_id(&self) -> Option<PlayerId> {
        self.shared.lock().player_id.clone()
    }

    /// Latest player description set through [`update_player`](Self::update_player).
    pub fn player_info(&self) -> PlayerInfo {
        self.shared.lock().player_info.clone()
    }

    /// Base URL every request is built from.
    pub fn base_url(&self) -> &str {
        &self.shared.base_url
    }

    /// Game version every record is attributed to.
    pub fn game_version_id(&self) -> &str {
        &self.shared.game_version_id
    }

    /// Interval between flush cycles.
    pub fn buffering_delay(&self) -> Duration {
        self.shared.buffering_delay
    }

    /// Events waiting for the next flush cycle.
    pub fn pending_events(&self) -> usize {
        self.shared.lock().queues.event_count()
    }

    /// Snapshots waiting for the next flush cycle.
    pub fn pending_snapshots(&self) -> usize {
        self.shared.lock().queues.snapshot_count()
    }

    /// The transport requests are sent through.
    pub fn transport(&self) -> &T {
        &self.shared.transport
    }
}

impl<T: Transport> Drop for WriteConnection<T> {
    fn drop(&mut self) {
        self.shared.stop_timer();
    }
}
