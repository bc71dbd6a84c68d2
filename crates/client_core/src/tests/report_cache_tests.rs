use super::*;

use std::{
    collections::{BTreeMap, VecDeque},
    sync::atomic::AtomicUsize,
};

use async_trait::async_trait;
use shared::domain::EntityKind;

use crate::coordinator::ChangeKind;

fn report(total: u64) -> ReportAggregate {
    ReportAggregate {
        total_leads: total,
        closed_leads: 0,
        active_leads: total,
        average_time_to_close: 0.0,
        leads_by_status: BTreeMap::new(),
        leads_by_priority: BTreeMap::new(),
        leads_by_agent: Vec::new(),
        recent_activity: Vec::new(),
    }
}

type Step = (Duration, Result<ReportAggregate, SyncError>);

/// Plays back canned responses in call order; once the script runs out it
/// answers immediately with the number of calls made so far.
#[derive(Default)]
struct ScriptedSource {
    calls: AtomicUsize,
    script: Mutex<VecDeque<Step>>,
}

impl ScriptedSource {
    fn with_script(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            script: Mutex::new(steps.into()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReportSource for ScriptedSource {
    async fn fetch_report_aggregate(
        &self,
        _cancel: &CancellationToken,
    ) -> Result<ReportAggregate, SyncError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let step = self.script.lock().expect("script").pop_front();
        match step {
            Some((delay, outcome)) => {
                tokio::time::sleep(delay).await;
                outcome
            }
            None => Ok(report(call as u64)),
        }
    }
}

async fn wait_for_state(cache: &ReportAggregateCache, wanted: CacheState) {
    let mut rx = cache.subscribe();
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|state| *state == wanted))
        .await
        .expect("state reached in time")
        .expect("cache alive");
}

fn change(id: &str) -> ChangeEvent {
    ChangeEvent {
        kind: EntityKind::Lead,
        id: id.to_string(),
        change: ChangeKind::Updated,
    }
}

#[tokio::test]
async fn starts_stale_and_becomes_fresh_after_refresh() {
    let source = ScriptedSource::with_script(vec![(Duration::ZERO, Ok(report(3)))]);
    let cache = ReportAggregateCache::new(source.clone());
    assert_eq!(cache.state(), CacheState::Stale);
    assert!(cache.snapshot().is_none());

    let snapshot = cache
        .refresh(&CancellationToken::new())
        .await
        .expect("refresh");
    assert_eq!(snapshot.total_leads, 3);
    assert_eq!(cache.state(), CacheState::Fresh);
    assert!(cache.last_error().is_none());
}

#[tokio::test]
async fn refreshing_is_visible_while_in_flight() {
    let source =
        ScriptedSource::with_script(vec![(Duration::from_millis(150), Ok(report(1)))]);
    let cache = Arc::new(ReportAggregateCache::new(source.clone()));
    let running = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.refresh(&CancellationToken::new()).await })
    };
    wait_for_state(&cache, CacheState::Refreshing).await;
    running.await.expect("join").expect("refresh");
    assert_eq!(cache.state(), CacheState::Fresh);
}

#[tokio::test]
async fn failure_leaves_cache_stale_with_error() {
    let source = ScriptedSource::with_script(vec![(
        Duration::ZERO,
        Err(SyncError::Network("connection reset".into())),
    )]);
    let cache = ReportAggregateCache::new(source.clone());

    let err = cache
        .refresh(&CancellationToken::new())
        .await
        .expect_err("failure");
    assert!(matches!(err, SyncError::Network(_)));
    assert_eq!(cache.state(), CacheState::Stale);
    assert_eq!(
        cache.last_error().as_deref(),
        Some("network error: connection reset")
    );
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn failed_refresh_after_success_turns_fresh_cache_stale() {
    let source = ScriptedSource::with_script(vec![
        (Duration::ZERO, Ok(report(1))),
        (Duration::ZERO, Err(SyncError::Network("down".into()))),
    ]);
    let cache = ReportAggregateCache::new(source.clone());
    let cancel = CancellationToken::new();

    cache.refresh(&cancel).await.expect("first refresh");
    assert_eq!(cache.state(), CacheState::Fresh);

    let err = cache.refresh(&cancel).await.expect_err("second refresh");
    assert_eq!(err, SyncError::Network("down".into()));
    assert_eq!(cache.state(), CacheState::Stale);
    assert_eq!(cache.snapshot().map(|s| s.total_leads), Some(1));
    assert_eq!(cache.last_error().as_deref(), Some("network error: down"));

    cache.refresh(&cancel).await.expect("recovery");
    assert_eq!(cache.state(), CacheState::Fresh);
    assert!(cache.last_error().is_none());
}

/// Answers successfully, but only after cancelling the caller's token.
struct CancelsThenAnswers;

#[async_trait]
impl ReportSource for CancelsThenAnswers {
    async fn fetch_report_aggregate(
        &self,
        cancel: &CancellationToken,
    ) -> Result<ReportAggregate, SyncError> {
        cancel.cancel();
        Ok(report(7))
    }
}

#[tokio::test]
async fn response_arriving_after_cancellation_is_dropped() {
    let cache = ReportAggregateCache::new(Arc::new(CancelsThenAnswers));

    let err = cache
        .refresh(&CancellationToken::new())
        .await
        .expect_err("cancelled");
    assert_eq!(err, SyncError::Cancelled);
    assert!(cache.snapshot().is_none());
    assert!(cache.last_error().is_none());
    assert_eq!(cache.state(), CacheState::Stale);
}

#[tokio::test]
async fn older_response_never_overwrites_newer_snapshot() {
    let source = ScriptedSource::with_script(vec![
        (Duration::from_millis(200), Ok(report(1))),
        (Duration::from_millis(10), Ok(report(2))),
    ]);
    let cache = ReportAggregateCache::new(source.clone());
    let cancel = CancellationToken::new();

    let (slow, fast) = tokio::join!(cache.refresh(&cancel), cache.refresh(&cancel));
    assert_eq!(fast.expect("fast").total_leads, 2);
    assert_eq!(slow.expect("slow").total_leads, 2);
    assert_eq!(cache.snapshot().map(|s| s.total_leads), Some(2));
    assert_eq!(cache.state(), CacheState::Fresh);
}

#[tokio::test]
async fn invalidation_during_flight_keeps_result_stale() {
    let source = ScriptedSource::with_script(vec![
        (Duration::from_millis(100), Ok(report(1))),
        (Duration::ZERO, Ok(report(2))),
    ]);
    let cache = Arc::new(ReportAggregateCache::new(source.clone()));
    let running = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.refresh(&CancellationToken::new()).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    cache.invalidate();
    running.await.expect("join").expect("refresh");

    assert_eq!(cache.snapshot().map(|s| s.total_leads), Some(1));
    assert_eq!(cache.state(), CacheState::Stale);

    cache
        .refresh(&CancellationToken::new())
        .await
        .expect("second refresh");
    assert_eq!(cache.state(), CacheState::Fresh);
}

#[tokio::test]
async fn listener_coalesces_a_burst_into_one_refresh() {
    let source = Arc::new(ScriptedSource::default());
    let cache = Arc::new(ReportAggregateCache::new(source.clone()));
    let (events, rx) = broadcast::channel(16);
    let shutdown = CancellationToken::new();
    let listener =
        cache.spawn_invalidation_listener(rx, Duration::from_millis(100), shutdown.clone());

    for n in 0..5 {
        events.send(change(&format!("l{n}"))).expect("send");
    }
    wait_for_state(&cache, CacheState::Fresh).await;
    assert_eq!(source.calls(), 1);

    events.send(change("l9")).expect("send");
    tokio::time::timeout(Duration::from_secs(2), async {
        while source.calls() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("second refresh");
    wait_for_state(&cache, CacheState::Fresh).await;

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(1), listener)
        .await
        .expect("listener stops")
        .expect("join");
}

#[tokio::test]
async fn lagged_listener_still_refreshes() {
    let source = Arc::new(ScriptedSource::default());
    let cache = Arc::new(ReportAggregateCache::new(source.clone()));
    let (events, rx) = broadcast::channel(1);
    for n in 0..4 {
        events.send(change(&format!("l{n}"))).expect("send");
    }
    let shutdown = CancellationToken::new();
    let _listener =
        cache.spawn_invalidation_listener(rx, Duration::from_millis(20), shutdown.clone());

    wait_for_state(&cache, CacheState::Fresh).await;
    assert!(source.calls() >= 1);
    shutdown.cancel();
}

#[tokio::test]
async fn listener_exits_when_feed_closes() {
    let source = Arc::new(ScriptedSource::default());
    let cache = Arc::new(ReportAggregateCache::new(source.clone()));
    let (events, rx) = broadcast::channel::<ChangeEvent>(4);
    let listener =
        cache.spawn_invalidation_listener(rx, Duration::from_millis(10), CancellationToken::new());
    drop(events);
    tokio::time::timeout(Duration::from_secs(1), listener)
        .await
        .expect("listener stops")
        .expect("join");
}
