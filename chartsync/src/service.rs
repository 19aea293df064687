//! Chart data service
//!
//! Owns the cached score snapshot and runs synchronization attempts against a
//! [`ChartRepository`].
//!
//! **Attempt rules:**
//! - At most one attempt is "current"; `ensure_initialized` callers attach to
//!   it instead of issuing another `getScoreInformation` round trip.
//! - `refresh` always starts a new attempt, which becomes current.
//! - A snapshot is committed only on success, and only if no newer attempt
//!   has already committed (last-committed-wins).
//! - Every attempt emits exactly one [`ChartDataUpdated`] event.
//!
//! Attempts run on spawned Tokio tasks, so they complete even if the caller
//! that started them is dropped. All methods that start attempts must be
//! called from within a Tokio runtime.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{error, info, warn};

use chartsync_common::events::{ChartDataUpdated, Subscription, UpdateNotifier};
use chartsync_common::{Error, Result, ScoreInformation};

use crate::repository::ChartRepository;

/// Failure message for a score without staves
pub const NO_CHART_DATA: &str = "no chart data available";

/// Failure message for a successful attempt that lost to a newer commit
pub const SUPERSEDED: &str = "superseded by a newer synchronization attempt";

type AttemptFuture = Shared<BoxFuture<'static, ()>>;

/// Point-in-time view of the service state
#[derive(Debug, Clone, Default)]
pub struct ChartDataStatus {
    pub staves: Option<Arc<ScoreInformation>>,
    pub is_loading: bool,
    /// Empty when the latest attempt has not failed
    pub error_message: String,
    /// Attempt number of the committed snapshot (0 = never loaded)
    pub committed_attempt: u64,
}

#[derive(Default)]
struct ChartState {
    staves: Option<Arc<ScoreInformation>>,
    error_message: String,
    active_attempts: usize,
    committed_attempt: u64,
    latest_started: u64,
}

struct InFlight {
    attempt: u64,
    future: AttemptFuture,
}

struct Inner {
    repository: Arc<dyn ChartRepository>,
    state: RwLock<ChartState>,
    /// Current attempt; cleared by that attempt when it finishes.
    /// Lock order: `in_flight` before `state`.
    in_flight: Mutex<Option<InFlight>>,
    next_attempt: AtomicU64,
    notifier: UpdateNotifier,
}

/// Cloneable handle to one chart data cache
#[derive(Clone)]
pub struct ChartDataService {
    inner: Arc<Inner>,
}

impl ChartDataService {
    pub fn new(repository: Arc<dyn ChartRepository>) -> Self {
        Self {
            inner: Arc::new(Inner {
                repository,
                state: RwLock::new(ChartState::default()),
                in_flight: Mutex::new(None),
                next_attempt: AtomicU64::new(0),
                notifier: UpdateNotifier::new(),
            }),
        }
    }

    /// Load data once
    ///
    /// Attaches to the in-flight attempt if there is one. Otherwise returns at
    /// once if a snapshot is already committed, or starts a new attempt.
    pub async fn ensure_initialized(&self) {
        let pending = {
            let mut slot = self.inner.in_flight();
            match slot.as_ref() {
                Some(current) => current.future.clone(),
                None => {
                    if self.inner.read_state().staves.is_some() {
                        return;
                    }
                    self.start_attempt(&mut slot).1
                }
            }
        };
        pending.await;
    }

    /// Start a new attempt unconditionally and wait for it
    pub async fn refresh(&self) {
        let pending = {
            let mut slot = self.inner.in_flight();
            self.start_attempt(&mut slot).1
        };
        pending.await;
    }

    /// Start a new attempt without waiting for it
    ///
    /// Returns the attempt number, which the matching
    /// [`ChartDataUpdated::attempt`] will carry.
    pub fn request_sync(&self) -> u64 {
        let mut slot = self.inner.in_flight();
        self.start_attempt(&mut slot).0
    }

    /// Last committed snapshot, without waiting for any attempt
    pub fn get_staves(&self) -> Option<Arc<ScoreInformation>> {
        self.inner.read_state().staves.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.read_state().active_attempts > 0
    }

    pub fn error_message(&self) -> String {
        self.inner.read_state().error_message.clone()
    }

    pub fn status(&self) -> ChartDataStatus {
        let state = self.inner.read_state();
        ChartDataStatus {
            staves: state.staves.clone(),
            is_loading: state.active_attempts > 0,
            error_message: state.error_message.clone(),
            committed_attempt: state.committed_attempt,
        }
    }

    /// Receive one [`ChartDataUpdated`] per future attempt
    pub fn subscribe(&self) -> Subscription {
        self.inner.notifier.subscribe()
    }

    fn start_attempt(&self, slot: &mut Option<InFlight>) -> (u64, AttemptFuture) {
        let attempt = self.inner.next_attempt.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut state = self.inner.write_state();
            state.active_attempts += 1;
            state.latest_started = attempt;
            state.error_message.clear();
        }

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(inner.run_attempt(attempt));
        let future = async move {
            if let Err(e) = handle.await {
                error!(attempt, "Synchronization task failed: {}", e);
            }
        }
        .boxed()
        .shared();

        *slot = Some(InFlight {
            attempt,
            future: future.clone(),
        });
        (attempt, future)
    }
}

impl Inner {
    fn read_state(&self) -> RwLockReadGuard<'_, ChartState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, ChartState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn in_flight(&self) -> MutexGuard<'_, Option<InFlight>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn fetch_score(&self) -> Result<ScoreInformation> {
        let fetched = AssertUnwindSafe(self.repository.get_score_information())
            .catch_unwind()
            .await
            .map_err(|_| Error::Domain("chart repository panicked".to_string()))?;

        let score = fetched?;
        if score.is_empty() {
            return Err(Error::Domain(NO_CHART_DATA.to_string()));
        }
        score.validate()?;
        Ok(score)
    }

    async fn run_attempt(self: Arc<Self>, attempt: u64) {
        info!(attempt, "Starting chart data synchronization");
        let outcome = self.fetch_score().await;

        let event = {
            let mut state = self.write_state();
            let superseded = state.committed_attempt > attempt;

            let event = match outcome {
                Ok(_) if superseded => {
                    warn!(
                        attempt,
                        committed = state.committed_attempt,
                        "Discarding chart data from superseded attempt"
                    );
                    ChartDataUpdated::failure(attempt, SUPERSEDED)
                }
                Ok(score) => {
                    let snapshot = Arc::new(score);
                    state.staves = Some(Arc::clone(&snapshot));
                    state.committed_attempt = attempt;
                    info!(
                        attempt,
                        staves = snapshot.staves.len(),
                        periods = snapshot.period_count(),
                        "Chart data synchronized"
                    );
                    ChartDataUpdated::success(attempt, snapshot)
                }
                Err(e) => {
                    let message = e.to_string();
                    if !superseded && attempt == state.latest_started {
                        state.error_message = message.clone();
                    }
                    warn!(attempt, "Chart data synchronization failed: {}", message);
                    ChartDataUpdated::failure(attempt, message)
                }
            };

            state.active_attempts = state.active_attempts.saturating_sub(1);
            event
        };

        {
            let mut slot = self.in_flight();
            if slot.as_ref().map(|current| current.attempt) == Some(attempt) {
                *slot = None;
            }
        }

        self.notifier.emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chartsync_common::{Element, Staff};
    use std::sync::atomic::AtomicUsize;

    struct FixedRepository {
        score: ScoreInformation,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChartRepository for FixedRepository {
        async fn get_score_information(&self) -> Result<ScoreInformation> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.score.clone())
        }

        async fn get_period_elements(&self, _: &str, _: &str) -> Result<Vec<Element>> {
            Ok(Vec::new())
        }
    }

    struct PanickingRepository;

    #[async_trait]
    impl ChartRepository for PanickingRepository {
        async fn get_score_information(&self) -> Result<ScoreInformation> {
            panic!("server adapter bug");
        }

        async fn get_period_elements(&self, _: &str, _: &str) -> Result<Vec<Element>> {
            Ok(Vec::new())
        }
    }

    fn one_staff() -> ScoreInformation {
        ScoreInformation {
            staves: vec![Staff {
                class_name: "S".to_string(),
                form: "Dremu".to_string(),
                ..Default::default()
            }],
        }
    }

    #[tokio::test]
    async fn test_fresh_service_has_no_data() {
        let service = ChartDataService::new(Arc::new(FixedRepository {
            score: one_staff(),
            calls: AtomicUsize::new(0),
        }));
        let status = service.status();
        assert!(status.staves.is_none());
        assert!(!status.is_loading);
        assert!(status.error_message.is_empty());
        assert_eq!(status.committed_attempt, 0);
    }

    #[tokio::test]
    async fn test_ensure_initialized_is_idempotent_after_load() {
        let repository = Arc::new(FixedRepository {
            score: one_staff(),
            calls: AtomicUsize::new(0),
        });
        let service = ChartDataService::new(repository.clone());

        service.ensure_initialized().await;
        service.ensure_initialized().await;
        service.ensure_initialized().await;

        assert_eq!(repository.calls.load(Ordering::SeqCst), 1);
        assert_eq!(service.status().committed_attempt, 1);
    }

    #[tokio::test]
    async fn test_refresh_always_fetches() {
        let repository = Arc::new(FixedRepository {
            score: one_staff(),
            calls: AtomicUsize::new(0),
        });
        let service = ChartDataService::new(repository.clone());

        service.refresh().await;
        service.refresh().await;

        assert_eq!(repository.calls.load(Ordering::SeqCst), 2);
        assert_eq!(service.status().committed_attempt, 2);
    }

    #[tokio::test]
    async fn test_repository_panic_becomes_failed_attempt() {
        let service = ChartDataService::new(Arc::new(PanickingRepository));
        let mut events = service.subscribe();

        service.refresh().await;

        let event = events.recv().await.unwrap();
        assert!(!event.is_success);
        assert_eq!(service.error_message(), "chart repository panicked");
        assert!(!service.is_loading());
        assert!(service.get_staves().is_none());
    }
}
