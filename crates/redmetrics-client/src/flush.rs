//! Flush engine: pending queues, per-cycle completion signals, batch sends.
//!
//! Records wait in two append-only queues (events and snapshots) until a
//! flush cycle takes them. Taking is a single synchronous step under the
//! connection lock: both queues are swapped for empty ones and the cycle's
//! completion signal is swapped for a fresh one, so anything enqueued while
//! the cycle's requests are in flight belongs to the next cycle and is
//! answered by the next signal.
//!
//! Each cycle sends at most two requests, one per non-empty queue, and runs
//! them concurrently. Both always settle; a failure on one side does not
//! cancel or roll back the other, so a cycle can fail after one batch was
//! stored by the service.

use std::future::IntoFuture;

use futures::future::BoxFuture;
use redmetrics_types::{PlayerId, Record};
use serde_json::Value;
use tokio::sync::watch;
use tracing::debug;

use crate::error::ClientError;
use crate::transport::{HttpRequest, Transport, send_checked};

/// Result shared by every record dispatched in one cycle.
pub type CycleResult = Result<FlushOutcome, ClientError>;

/// Counts reported by a successful flush cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushOutcome {
    /// Events the service accepted.
    pub events_sent: usize,
    /// Snapshots the service accepted.
    pub snapshots_sent: usize,
}

/// Awaitable outcome of the flush cycle that dispatches a posted record.
///
/// Every record enqueued between two dispatches shares the same outcome.
/// Dropping a ticket does not affect the record; it is sent regardless.
#[derive(Debug)]
#[must_use = "a ticket does nothing unless awaited; drop it to fire and forget"]
pub struct FlushTicket {
    rx: watch::Receiver<Option<CycleResult>>,
}

impl FlushTicket {
    /// Wait for the cycle to settle.
    ///
    /// Resolves with [`ClientError::FlushFailed`] if the connection is
    /// dropped or the records are discarded before they could be sent.
    pub async fn wait(mut self) -> CycleResult {
        let settled = self
            .rx
            .wait_for(Option::is_some)
            .await
            .map(|value| (*value).clone());
        match settled {
            Ok(Some(result)) => result,
            Ok(None) | Err(_) => Err(ClientError::FlushFailed(
                "connection dropped before the records were sent".to_owned(),
            )),
        }
    }
}

impl IntoFuture for FlushTicket {
    type Output = CycleResult;
    type IntoFuture = BoxFuture<'static, CycleResult>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}

/// Completion signal for one cycle, replaced whenever a cycle is dispatched.
#[derive(Debug)]
struct CycleSignal {
    tx: watch::Sender<Option<CycleResult>>,
}

impl CycleSignal {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    fn ticket(&self) -> FlushTicket {
        FlushTicket {
            rx: self.tx.subscribe(),
        }
    }

    fn settle(self, result: CycleResult) {
        self.tx.send_replace(Some(result));
    }
}

/// Which queue a batch came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchKind {
    Events,
    Snapshots,
}

impl BatchKind {
    const fn path(self) -> &'static str {
        match self {
            Self::Events => "/v1/event/",
            Self::Snapshots => "/v1/snapshot/",
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::Events => "events",
            Self::Snapshots => "snapshots",
        }
    }
}

/// Everything one cycle took from the queues.
#[derive(Debug)]
pub(crate) struct Dispatch {
    events: Vec<Record>,
    snapshots: Vec<Record>,
    player_id: Option<PlayerId>,
    signal: CycleSignal,
}

impl Dispatch {
    pub(crate) fn event_count(&self) -> usize {
        self.events.len()
    }

    pub(crate) fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }
}

/// The two pending queues and the signal their waiters share.
#[derive(Debug)]
pub(crate) struct PendingQueues {
    events: Vec<Record>,
    snapshots: Vec<Record>,
    signal: CycleSignal,
}

impl Default for PendingQueues {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            snapshots: Vec::new(),
            signal: CycleSignal::new(),
        }
    }
}

impl PendingQueues {
    pub(crate) fn push_event(&mut self, record: Record) -> FlushTicket {
        self.events.push(record);
        self.signal.ticket()
    }

    pub(crate) fn push_snapshot(&mut self, record: Record) -> FlushTicket {
        self.snapshots.push(record);
        self.signal.ticket()
    }

    pub(crate) fn event_count(&self) -> usize {
        self.events.len()
    }

    pub(crate) fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }

    /// Take both queues and the current signal, arming a fresh one.
    ///
    /// Returns `None` without touching anything when both queues are empty.
    pub(crate) fn take(&mut self, player_id: Option<PlayerId>) -> Option<Dispatch> {
        if self.events.is_empty() && self.snapshots.is_empty() {
            return None;
        }
        Some(Dispatch {
            events: std::mem::take(&mut self.events),
            snapshots: std::mem::take(&mut self.snapshots),
            player_id,
            signal: std::mem::replace(&mut self.signal, CycleSignal::new()),
        })
    }

    /// Drop everything pending and fail its waiters with `reason`.
    ///
    /// Returns how many events and snapshots were dropped.
    pub(crate) fn discard(&mut self, reason: &str) -> (usize, usize) {
        let counts = (self.events.len(), self.snapshots.len());
        self.events.clear();
        self.snapshots.clear();
        let signal = std::mem::replace(&mut self.signal, CycleSignal::new());
        signal.settle(Err(ClientError::FlushFailed(reason.to_owned())));
        counts
    }
}

/// Stamp, send, and settle one dispatched cycle.
///
/// Every record gets the game version and the player id current at
/// dispatch. The event and snapshot batches are sent concurrently; the
/// cycle fails if either fails (the events error wins when both do).
pub(crate) async fn run_cycle<T: Transport>(
    transport: &T,
    base_url: &str,
    game_version_id: &str,
    dispatch: Dispatch,
) -> CycleResult {
    let Dispatch {
        mut events,
        mut snapshots,
        player_id,
        signal,
    } = dispatch;

    for record in events.iter_mut().chain(snapshots.iter_mut()) {
        record.stamp(game_version_id, player_id.as_ref());
    }

    let (events_sent, snapshots_sent) = tokio::join!(
        send_batch(transport, base_url, BatchKind::Events, events),
        send_batch(transport, base_url, BatchKind::Snapshots, snapshots),
    );

    let result = match (events_sent, snapshots_sent) {
        (Ok(events_sent), Ok(snapshots_sent)) => Ok(FlushOutcome {
            events_sent,
            snapshots_sent,
        }),
        (Err(reason), _) | (_, Err(reason)) => Err(ClientError::FlushFailed(reason)),
    };

    signal.settle(result.clone());
    result
}

/// POST one batch as a JSON array; an empty batch sends nothing.
///
/// The service echoes the stored records back, so the sent count is the
/// length of the returned array (the batch length if the body is not one).
async fn send_batch<T: Transport>(
    transport: &T,
    base_url: &str,
    kind: BatchKind,
    records: Vec<Record>,
) -> Result<usize, String> {
    if records.is_empty() {
        return Ok(0);
    }

    let batch_len = records.len();
    let body = Value::Array(
        records
            .into_iter()
            .map(|record| Value::Object(record.into_fields()))
            .collect(),
    );

    debug!(kind = kind.label(), count = batch_len, "posting batch");
    let request = HttpRequest::post(format!("{base_url}{}", kind.path()), body);
    let response = send_checked(transport, request)
        .await
        .map_err(|e| format!("error posting {}: {e}", kind.label()))?;

    Ok(response.data.as_array().map_or(batch_len, Vec::len))
}
