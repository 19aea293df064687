//! Filter manager
//!
//! Runs every registered [`ElementFilter`] over the elements of each period
//! of the gameplay staves. A pass is triggered automatically after every
//! successful synchronization and can also be run on demand.

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex as StdMutex, PoisonError, Weak};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use chartsync_common::{Element, Error, Result, Subscription};

use super::ElementFilter;
use crate::repository::ChartRepository;
use crate::service::ChartDataService;

/// Outcome counters for one filter pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterRunSummary {
    pub staves_visited: usize,
    pub periods_processed: usize,
    /// Periods skipped because their elements could not be fetched
    pub periods_failed: usize,
    /// Filter invocations that returned an error or panicked
    pub filter_failures: usize,
}

pub struct FilterManager {
    repository: Arc<dyn ChartRepository>,
    service: ChartDataService,
    gameplay_form: String,
    filters: RwLock<Vec<Arc<dyn ElementFilter>>>,
    /// Held for the whole pass so batches of two passes never interleave
    pass_lock: Mutex<()>,
    listener: StdMutex<Option<JoinHandle<()>>>,
}

impl FilterManager {
    /// Create a manager with no filters
    ///
    /// Must be called from within a Tokio runtime: the update listener is
    /// spawned here.
    pub fn new(
        repository: Arc<dyn ChartRepository>,
        service: ChartDataService,
        gameplay_form: impl Into<String>,
    ) -> Arc<Self> {
        Self::with_filters(repository, service, gameplay_form, Vec::new())
    }

    /// Create a manager with an initial filter set, in registration order
    pub fn with_filters(
        repository: Arc<dyn ChartRepository>,
        service: ChartDataService,
        gameplay_form: impl Into<String>,
        filters: Vec<Arc<dyn ElementFilter>>,
    ) -> Arc<Self> {
        let subscription = service.subscribe();
        let manager = Arc::new(Self {
            repository,
            service,
            gameplay_form: gameplay_form.into(),
            filters: RwLock::new(filters),
            pass_lock: Mutex::new(()),
            listener: StdMutex::new(None),
        });

        let handle = tokio::spawn(listen(Arc::downgrade(&manager), subscription));
        *manager
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);

        manager
    }

    pub fn gameplay_form(&self) -> &str {
        &self.gameplay_form
    }

    /// Append a filter to the chain
    ///
    /// # Errors
    /// `Error::InvalidArgument` if the filter reports an empty name.
    pub async fn register_filter(&self, filter: Arc<dyn ElementFilter>) -> Result<()> {
        let name = filter.name().to_string();
        if name.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "filter name must not be empty".to_string(),
            ));
        }

        let mut filters = self.filters.write().await;
        if filters.iter().any(|f| f.name() == name) {
            warn!(filter = %name, "A filter with this name is already registered");
        }
        filters.push(filter);
        info!(filter = %name, total = filters.len(), "Filter registered");
        Ok(())
    }

    /// Remove a previously registered filter instance
    ///
    /// Returns false if it was not registered.
    pub async fn unregister_filter(&self, filter: &Arc<dyn ElementFilter>) -> bool {
        let mut filters = self.filters.write().await;
        match filters.iter().position(|f| same_filter(f, filter)) {
            Some(index) => {
                let removed = filters.remove(index);
                info!(filter = %removed.name(), "Filter unregistered");
                true
            }
            None => false,
        }
    }

    /// Names of registered filters, in execution order
    pub async fn filter_names(&self) -> Vec<String> {
        self.filters
            .read()
            .await
            .iter()
            .map(|f| f.name().to_string())
            .collect()
    }

    /// Run one full filter pass over the committed snapshot
    ///
    /// The filter list is captured at the start of the pass. Period fetch
    /// failures skip that period; filter failures are contained to the
    /// filter and period they happened in.
    pub async fn execute_filters(&self) -> FilterRunSummary {
        let _pass = self.pass_lock.lock().await;
        let filters: Vec<Arc<dyn ElementFilter>> = self.filters.read().await.clone();
        let mut summary = FilterRunSummary::default();

        let score = match self.service.get_staves() {
            Some(score) => score,
            None => {
                warn!("No chart data loaded, skipping filter pass");
                return summary;
            }
        };

        debug!(
            filters = filters.len(),
            form = %self.gameplay_form,
            "Starting filter pass"
        );

        for staff in score.staves_of_form(&self.gameplay_form) {
            summary.staves_visited += 1;

            for period in &staff.periods {
                let elements = match self
                    .repository
                    .get_period_elements(&staff.class_name, &period.method_name)
                    .await
                {
                    Ok(elements) => elements,
                    Err(e) => {
                        warn!(
                            staff = %staff.class_name,
                            period = %period.method_name,
                            "Skipping period, failed to fetch elements: {}",
                            e
                        );
                        summary.periods_failed += 1;
                        continue;
                    }
                };

                summary.periods_processed += 1;
                summary.filter_failures += apply_filters(&filters, &elements).await;
            }
        }

        info!(
            staves = summary.staves_visited,
            periods = summary.periods_processed,
            skipped = summary.periods_failed,
            filter_failures = summary.filter_failures,
            "Filter pass complete"
        );
        summary
    }
}

impl Drop for FilterManager {
    fn drop(&mut self) {
        let handle = self
            .listener
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

/// Run a pass after every successful synchronization
async fn listen(manager: Weak<FilterManager>, mut subscription: Subscription) {
    while let Some(event) = subscription.recv().await {
        if !event.is_success {
            debug!(attempt = event.attempt, "Synchronization failed, no filter pass");
            continue;
        }

        let Some(strong) = manager.upgrade() else {
            break;
        };
        debug!(attempt = event.attempt, "Chart data updated, running filters");
        strong.execute_filters().await;
    }
    debug!("Filter listener stopped");
}

/// Feed one period's elements through every filter, returning the failure count
async fn apply_filters(filters: &[Arc<dyn ElementFilter>], elements: &[Element]) -> usize {
    let mut failures = 0;

    for filter in filters {
        let outcome = AssertUnwindSafe(async {
            let accepted: Vec<Element> = elements
                .iter()
                .filter(|element| filter.should_process(element))
                .cloned()
                .collect();
            filter.process_elements(&accepted).await
        })
        .catch_unwind()
        .await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                failures += 1;
                warn!(filter = %filter.name(), "Filter failed: {:#}", e);
            }
            Err(panic) => {
                failures += 1;
                error!(filter = %filter.name(), "Filter panicked: {}", panic_message(&*panic));
            }
        }
    }

    failures
}

fn same_filter(a: &Arc<dyn ElementFilter>, b: &Arc<dyn ElementFilter>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
