//! Element filter pipeline
//!
//! A filter is a strategy object that selects the elements it cares about
//! from a period's batch and processes them. Filters are constructed by the
//! composing layer and handed to [`FilterManager::register_filter`]; building
//! a filter has no side effects.
//!
//! # Example
//! ```rust,ignore
//! use chartsync::filters::ElementFilter;
//! use chartsync_common::Element;
//!
//! pub struct TapCounter(std::sync::atomic::AtomicUsize);
//!
//! #[async_trait::async_trait]
//! impl ElementFilter for TapCounter {
//!     fn name(&self) -> &str { "TapCounter" }
//!
//!     fn should_process(&self, element: &Element) -> bool {
//!         element.is_kind("Dremu.DremuTap")
//!     }
//!
//!     async fn process_elements(&self, elements: &[Element]) -> anyhow::Result<()> {
//!         self.0.fetch_add(elements.len(), std::sync::atomic::Ordering::Relaxed);
//!         Ok(())
//!     }
//! }
//! ```

mod census;
mod judgement_line;
mod manager;

pub use census::ElementCensusFilter;
pub use judgement_line::JudgementLineFilter;
pub use manager::{FilterManager, FilterRunSummary};

use async_trait::async_trait;
use chartsync_common::Element;

/// Contract implemented by every element filter
#[async_trait]
pub trait ElementFilter: Send + Sync {
    /// Stable name used in logs
    fn name(&self) -> &str;

    /// Whether `element` belongs in the batch passed to
    /// [`process_elements`](Self::process_elements). Accepts everything
    /// unless overridden.
    fn should_process(&self, element: &Element) -> bool {
        let _ = element;
        true
    }

    /// Process the accepted subset of one period's elements
    ///
    /// Awaited by the manager before the next filter runs. Errors are logged
    /// and do not stop the pipeline.
    async fn process_elements(&self, elements: &[Element]) -> anyhow::Result<()>;
}
