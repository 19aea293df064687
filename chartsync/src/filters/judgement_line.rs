//! Judgement line filter

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::{info, warn};

use chartsync_common::model::JUDGEMENT_LINE_CLASS;
use chartsync_common::Element;

use super::ElementFilter;

/// Keeps the judgement line elements of the most recent batch
///
/// Other components read the stored subset through
/// [`judgement_lines`](Self::judgement_lines).
#[derive(Default)]
pub struct JudgementLineFilter {
    judgement_lines: RwLock<Vec<Element>>,
    batches_processed: AtomicUsize,
}

impl JudgementLineFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Judgement line elements from the latest processed batch
    pub async fn judgement_lines(&self) -> Vec<Element> {
        self.judgement_lines.read().await.clone()
    }

    pub fn batches_processed(&self) -> usize {
        self.batches_processed.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ElementFilter for JudgementLineFilter {
    fn name(&self) -> &str {
        "JudgementLineFilter"
    }

    fn should_process(&self, element: &Element) -> bool {
        element.is_kind(JUDGEMENT_LINE_CLASS)
    }

    async fn process_elements(&self, elements: &[Element]) -> anyhow::Result<()> {
        if elements.is_empty() {
            warn!("No judgement line elements in batch");
        }

        *self.judgement_lines.write().await = elements.to_vec();
        self.batches_processed.fetch_add(1, Ordering::Relaxed);

        info!(count = elements.len(), "Judgement line elements stored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_only_main_lane() {
        let filter = JudgementLineFilter::new();
        assert!(filter.should_process(&Element::new("Dremu.DremuMainLane")));
        assert!(!filter.should_process(&Element::new("Dremu.DremuTap")));
        assert!(!filter.should_process(&Element::new("")));
    }

    #[tokio::test]
    async fn test_latest_batch_replaces_previous() {
        let filter = JudgementLineFilter::new();
        let lane = Element::new(JUDGEMENT_LINE_CLASS);

        filter
            .process_elements(&[lane.clone(), lane.clone()])
            .await
            .unwrap();
        assert_eq!(filter.judgement_lines().await.len(), 2);

        filter.process_elements(&[]).await.unwrap();
        assert!(filter.judgement_lines().await.is_empty());
        assert_eq!(filter.batches_processed(), 2);
    }
}
