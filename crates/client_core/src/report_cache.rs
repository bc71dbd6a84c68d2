use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::Duration,
};

use shared::protocol::ReportAggregate;
use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
    time::{timeout_at, Instant},
};
use tokio_stream::{
    wrappers::{errors::BroadcastStreamRecvError, BroadcastStream},
    StreamExt,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{coordinator::ChangeEvent, error::SyncError, gateway::ReportSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Stale,
    Refreshing,
    Fresh,
}

#[derive(Default)]
struct CacheSlot {
    /// Sequence number of the request that produced `snapshot`.
    applied_seq: u64,
    /// Highest sequence issued when the cache was last invalidated.
    stale_through: u64,
    inflight: usize,
    snapshot: Option<Arc<ReportAggregate>>,
    last_error: Option<String>,
}

impl CacheSlot {
    fn state(&self) -> CacheState {
        if self.inflight > 0 {
            CacheState::Refreshing
        } else if self.snapshot.is_some() && self.applied_seq > self.stale_through {
            CacheState::Fresh
        } else {
            CacheState::Stale
        }
    }
}

/// Latest analytics aggregate plus its freshness.
///
/// Every refresh draws a sequence number. A response only replaces the stored
/// snapshot when its number is at least the stored one, so a slow early
/// refresh never overwrites a later one.
pub struct ReportAggregateCache {
    source: Arc<dyn ReportSource>,
    issued: AtomicU64,
    slot: Mutex<CacheSlot>,
    state_tx: watch::Sender<CacheState>,
}

impl ReportAggregateCache {
    pub fn new(source: Arc<dyn ReportSource>) -> Self {
        let (state_tx, _) = watch::channel(CacheState::Stale);
        Self {
            source,
            issued: AtomicU64::new(0),
            slot: Mutex::new(CacheSlot::default()),
            state_tx,
        }
    }

    pub fn state(&self) -> CacheState {
        self.lock().state()
    }

    pub fn snapshot(&self) -> Option<Arc<ReportAggregate>> {
        self.lock().snapshot.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CacheState> {
        self.state_tx.subscribe()
    }

    /// Marks every snapshot requested so far as outdated.
    pub fn invalidate(&self) {
        let mut slot = self.lock();
        slot.stale_through = self.issued.load(Ordering::SeqCst);
        self.publish(&slot);
    }

    /// Fetches a new aggregate. Returns the snapshot held once the response was handled.
    ///
    /// A failed refresh leaves the cache Stale. A response that arrives after
    /// `cancel` fired is dropped and reported as `Cancelled`.
    pub async fn refresh(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Arc<ReportAggregate>, SyncError> {
        let seq = {
            let mut slot = self.lock();
            let seq = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
            slot.inflight += 1;
            self.publish(&slot);
            seq
        };
        debug!(seq, "report: refresh started");

        let outcome = match self.source.fetch_report_aggregate(cancel).await {
            Ok(_) if cancel.is_cancelled() => Err(SyncError::Cancelled),
            outcome => outcome,
        };

        let mut slot = self.lock();
        slot.inflight = slot.inflight.saturating_sub(1);
        let result = match outcome {
            Ok(report) => {
                if seq >= slot.applied_seq {
                    slot.applied_seq = seq;
                    slot.snapshot = Some(Arc::new(report));
                    slot.last_error = None;
                    debug!(seq, "report: snapshot applied");
                } else {
                    debug!(seq, applied = slot.applied_seq, "report: stale response discarded");
                }
                slot.snapshot
                    .clone()
                    .ok_or_else(|| SyncError::InvalidResponse("no report snapshot".into()))
            }
            Err(SyncError::Cancelled) => {
                debug!(seq, "report: refresh abandoned");
                Err(SyncError::Cancelled)
            }
            Err(err) => {
                warn!(seq, error = %err, "report: refresh failed");
                slot.last_error = Some(err.to_string());
                // Nothing newer has landed, so the held snapshot can no longer count as fresh.
                if seq > slot.applied_seq {
                    slot.stale_through = slot.stale_through.max(seq);
                }
                Err(err)
            }
        };
        self.publish(&slot);
        result
    }

    /// Invalidates on every change event and refreshes once per burst.
    ///
    /// Events arriving within `debounce` of the first one in a burst share a
    /// single refresh. A lagged receiver counts as a change.
    pub fn spawn_invalidation_listener(
        self: &Arc<Self>,
        events: broadcast::Receiver<ChangeEvent>,
        debounce: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut stream = BroadcastStream::new(events);
            let mut open = true;
            while open {
                let first = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    next = stream.next() => next,
                };
                match first {
                    None => break,
                    Some(item) => note_event(item),
                }
                cache.invalidate();

                let deadline = Instant::now() + debounce;
                let mut coalesced = 1usize;
                loop {
                    tokio::select! {
                        _ = shutdown.cancelled() => return,
                        next = timeout_at(deadline, stream.next()) => match next {
                            Ok(Some(item)) => {
                                note_event(item);
                                cache.invalidate();
                                coalesced += 1;
                            }
                            Ok(None) => {
                                open = false;
                                break;
                            }
                            Err(_) => break,
                        },
                    }
                }

                debug!(coalesced, "report: burst settled, refreshing");
                let refresher = Arc::clone(&cache);
                let cancel = shutdown.child_token();
                tokio::spawn(async move {
                    let _ = refresher.refresh(&cancel).await;
                });
            }
            info!("report: invalidation listener stopped");
        })
    }

    fn lock(&self) -> MutexGuard<'_, CacheSlot> {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, slot: &CacheSlot) {
        let state = slot.state();
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }
}

fn note_event(item: Result<ChangeEvent, BroadcastStreamRecvError>) {
    match item {
        Ok(event) => debug!(kind = %event.kind, id = %event.id, change = ?event.change, "report: change observed"),
        Err(BroadcastStreamRecvError::Lagged(missed)) => {
            warn!(missed, "report: change feed lagged, treating as invalidation")
        }
    }
}

#[cfg(test)]
#[path = "tests/report_cache_tests.rs"]
mod tests;
