use std::sync::{Arc, Mutex};

use shared::domain::{Agent, Lead};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{info, warn};

pub mod config;
pub mod coordinator;
pub mod error;
pub mod gateway;
pub mod report_cache;
pub mod store;
pub mod views;

pub use config::{load_client_settings, ClientSettings};
pub use coordinator::{ChangeEvent, ChangeKind, MutationCoordinator, Notifier, TracingNotifier};
pub use error::SyncError;
pub use gateway::{RemoteGateway, ReportSource};
pub use report_cache::{CacheState, ReportAggregateCache};
pub use store::{EntityStore, Mirrored};
pub use tokio_util::sync::CancellationToken;
pub use views::LeadRow;

/// Wires gateway, store, coordinator and report cache for one client session.
///
/// Must be created inside a tokio runtime: construction spawns the report
/// invalidation listener, which runs until [`PipelineClient::shutdown`] or drop.
pub struct PipelineClient {
    settings: ClientSettings,
    gateway: RemoteGateway,
    store: Arc<EntityStore>,
    coordinator: MutationCoordinator,
    reports: Arc<ReportAggregateCache>,
    shutdown: CancellationToken,
    listener: Mutex<Option<JoinHandle<()>>>,
    load_error: Mutex<Option<SyncError>>,
}

impl PipelineClient {
    pub fn new(settings: ClientSettings) -> anyhow::Result<Self> {
        Self::with_notifier(settings, Arc::new(TracingNotifier))
    }

    pub fn with_notifier(
        settings: ClientSettings,
        notifier: Arc<dyn Notifier>,
    ) -> anyhow::Result<Self> {
        let gateway = RemoteGateway::from_settings(&settings)?;
        let store = Arc::new(EntityStore::new());
        let (events, _) = broadcast::channel(settings.event_buffer.max(1));
        let reports = Arc::new(ReportAggregateCache::new(Arc::new(gateway.clone())));
        let shutdown = CancellationToken::new();
        let listener = reports.spawn_invalidation_listener(
            events.subscribe(),
            settings.report_debounce,
            shutdown.child_token(),
        );
        let coordinator =
            MutationCoordinator::new(Arc::clone(&store), gateway.clone(), events, notifier)
                .with_report_cache(Arc::clone(&reports));
        info!(api = %gateway.base_url(), "client: session ready");

        Ok(Self {
            settings,
            gateway,
            store,
            coordinator,
            reports,
            shutdown,
            listener: Mutex::new(Some(listener)),
            load_error: Mutex::new(None),
        })
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Read-only endpoints that do not touch the store, such as comment listings.
    pub fn gateway(&self) -> &RemoteGateway {
        &self.gateway
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn coordinator(&self) -> &MutationCoordinator {
        &self.coordinator
    }

    pub fn reports(&self) -> &ReportAggregateCache {
        &self.reports
    }

    pub fn subscribe_changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.coordinator.subscribe()
    }

    /// Hydrates the store, then fetches a first report.
    ///
    /// A hydration failure is kept as the page-level error and returned. A
    /// report failure is left on the cache (`reports().last_error()`).
    pub async fn load(&self, cancel: &CancellationToken) -> Result<(), SyncError> {
        let outcome = self.coordinator.sync_all(cancel).await;
        *self.lock_load_error() = outcome.as_ref().err().cloned();
        if let Err(err) = &outcome {
            warn!(error = %err, "client: initial load failed");
            return outcome;
        }
        if let Err(err) = self.reports.refresh(cancel).await {
            warn!(error = %err, "client: first report unavailable");
        }
        Ok(())
    }

    pub fn load_error(&self) -> Option<SyncError> {
        self.lock_load_error().clone()
    }

    /// Mirrored leads with their agent names resolved, in service order.
    pub fn lead_rows(&self) -> Vec<LeadRow> {
        views::resolve_leads(&self.store.all::<Lead>(), &self.store.all::<Agent>())
    }

    /// Stops the invalidation listener and cancels refreshes it started.
    /// The first call hands back the listener task so callers can await it.
    pub fn shutdown(&self) -> Option<JoinHandle<()>> {
        self.shutdown.cancel();
        let handle = self
            .listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if handle.is_some() {
            info!("client: shut down");
        }
        handle
    }

    fn lock_load_error(&self) -> std::sync::MutexGuard<'_, Option<SyncError>> {
        self.load_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for PipelineClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
