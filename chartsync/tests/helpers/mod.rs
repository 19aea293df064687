//! Shared test doubles for chartsync integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{oneshot, Notify};

use chartsync::filters::ElementFilter;
use chartsync::repository::ChartRepository;
use chartsync_common::{Element, Error, Period, Result, ScoreInformation, Staff};

// ============================================================================
// Fixtures
// ============================================================================

/// Build a score from `(staff name, form, period names)` triples
pub fn score(staves: &[(&str, &str, &[&str])]) -> ScoreInformation {
    ScoreInformation {
        staves: staves
            .iter()
            .map(|(name, form, periods)| Staff {
                class_name: name.to_string(),
                display_name: name.to_string(),
                form: form.to_string(),
                periods: periods
                    .iter()
                    .enumerate()
                    .map(|(i, period)| Period {
                        method_name: period.to_string(),
                        time_offset: i as f64 * 4.0,
                    })
                    .collect(),
            })
            .collect(),
    }
}

pub fn elements(kinds: &[&str]) -> Vec<Element> {
    kinds.iter().map(|kind| Element::new(*kind)).collect()
}

/// Poll `condition` until it holds, failing the test after two seconds
pub async fn eventually<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met within 2s");
}

/// Await `future`, failing the test after two seconds
pub async fn within<T>(future: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(2), future)
        .await
        .expect("timed out")
}

// ============================================================================
// Scripted chart repository
// ============================================================================

struct ScoreStep {
    result: Result<ScoreInformation>,
    gate: Option<oneshot::Receiver<()>>,
}

struct ElementGate {
    entered: Arc<Notify>,
    release: oneshot::Receiver<()>,
}

/// In-memory [`ChartRepository`] answering from a script
///
/// Score requests consume scripted steps in order; once the script is
/// exhausted they fail with a transport error. Period requests answer from
/// the element table and default to an empty batch.
#[derive(Default)]
pub struct ScriptedRepository {
    score_steps: Mutex<VecDeque<ScoreStep>>,
    score_calls: AtomicUsize,
    elements: Mutex<HashMap<(String, String), Vec<Element>>>,
    failing_periods: Mutex<HashSet<(String, String)>>,
    element_calls: Mutex<Vec<(String, String)>>,
    element_gate: Mutex<Option<ElementGate>>,
}

impl ScriptedRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_score(&self, score: ScoreInformation) {
        self.push_step(Ok(score), None);
    }

    pub fn push_error(&self, error: Error) {
        self.push_step(Err(error), None);
    }

    /// Script a score response that is held until the returned sender fires
    pub fn push_gated_score(&self, score: ScoreInformation) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.push_step(Ok(score), Some(rx));
        tx
    }

    fn push_step(&self, result: Result<ScoreInformation>, gate: Option<oneshot::Receiver<()>>) {
        self.score_steps
            .lock()
            .unwrap()
            .push_back(ScoreStep { result, gate });
    }

    pub fn set_elements(&self, staff: &str, period: &str, batch: Vec<Element>) {
        self.elements
            .lock()
            .unwrap()
            .insert((staff.to_string(), period.to_string()), batch);
    }

    pub fn fail_period(&self, staff: &str, period: &str) {
        self.failing_periods
            .lock()
            .unwrap()
            .insert((staff.to_string(), period.to_string()));
    }

    /// Hold the next period request until the returned sender fires
    ///
    /// The notify fires once that request has started.
    pub fn gate_next_elements(&self) -> (Arc<Notify>, oneshot::Sender<()>) {
        let entered = Arc::new(Notify::new());
        let (tx, rx) = oneshot::channel();
        *self.element_gate.lock().unwrap() = Some(ElementGate {
            entered: Arc::clone(&entered),
            release: rx,
        });
        (entered, tx)
    }

    pub fn score_calls(&self) -> usize {
        self.score_calls.load(Ordering::SeqCst)
    }

    pub fn element_calls(&self) -> Vec<(String, String)> {
        self.element_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChartRepository for ScriptedRepository {
    async fn get_score_information(&self) -> Result<ScoreInformation> {
        self.score_calls.fetch_add(1, Ordering::SeqCst);
        let step = self.score_steps.lock().unwrap().pop_front();
        let Some(step) = step else {
            return Err(Error::Transport("no scripted response".to_string()));
        };

        if let Some(gate) = step.gate {
            let _ = gate.await;
        }
        step.result
    }

    async fn get_period_elements(&self, staff_name: &str, period_name: &str) -> Result<Vec<Element>> {
        let key = (staff_name.to_string(), period_name.to_string());
        self.element_calls.lock().unwrap().push(key.clone());

        let gate = self.element_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            let _ = gate.release.await;
        }

        if self.failing_periods.lock().unwrap().contains(&key) {
            return Err(Error::Transport(format!(
                "connection reset while fetching {}/{}",
                staff_name, period_name
            )));
        }

        Ok(self
            .elements
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or_default())
    }
}

// ============================================================================
// Recording filters
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    Succeed,
    Fail,
    Panic,
}

/// Filter that records every batch it is given
pub struct RecordingFilter {
    name: String,
    accepts: Option<String>,
    behaviour: Behaviour,
    batches: Mutex<Vec<Vec<Element>>>,
    /// Shared across filters to observe invocation order
    log: Option<Arc<Mutex<Vec<String>>>>,
}

impl RecordingFilter {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            accepts: None,
            behaviour: Behaviour::Succeed,
            batches: Mutex::new(Vec::new()),
            log: None,
        }
    }

    /// Only accept elements of class `kind`
    pub fn accepting(mut self, kind: &str) -> Self {
        self.accepts = Some(kind.to_string());
        self
    }

    pub fn behaving(mut self, behaviour: Behaviour) -> Self {
        self.behaviour = behaviour;
        self
    }

    pub fn logging_to(mut self, log: Arc<Mutex<Vec<String>>>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn batches(&self) -> Vec<Vec<Element>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl ElementFilter for RecordingFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn should_process(&self, element: &Element) -> bool {
        match &self.accepts {
            Some(kind) => element.is_kind(kind),
            None => true,
        }
    }

    async fn process_elements(&self, elements: &[Element]) -> anyhow::Result<()> {
        if let Some(log) = &self.log {
            log.lock().unwrap().push(self.name.clone());
        }
        self.batches.lock().unwrap().push(elements.to_vec());

        match self.behaviour {
            Behaviour::Succeed => Ok(()),
            Behaviour::Fail => anyhow::bail!("{} rejected the batch", self.name),
            Behaviour::Panic => panic!("{} blew up", self.name),
        }
    }
}
