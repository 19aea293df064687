//! Element census filter

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use tracing::debug;

use chartsync_common::Element;

use super::ElementFilter;

/// Tallies every element it sees by class tag, across batches
#[derive(Default)]
pub struct ElementCensusFilter {
    counts: Mutex<BTreeMap<String, usize>>,
}

impl ElementCensusFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Element count per class tag since creation or the last reset
    pub async fn counts(&self) -> BTreeMap<String, usize> {
        self.counts.lock().await.clone()
    }

    pub async fn total(&self) -> usize {
        self.counts.lock().await.values().sum()
    }

    pub async fn reset(&self) {
        self.counts.lock().await.clear();
    }
}

#[async_trait]
impl ElementFilter for ElementCensusFilter {
    fn name(&self) -> &str {
        "ElementCensusFilter"
    }

    async fn process_elements(&self, elements: &[Element]) -> anyhow::Result<()> {
        let mut counts = self.counts.lock().await;
        for element in elements {
            *counts.entry(element.class_name.clone()).or_insert(0) += 1;
        }
        debug!(batch = elements.len(), kinds = counts.len(), "Census updated");
        Ok(())
    }
}
