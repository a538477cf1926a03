//! Per-job cooperative control state.
//!
//! A [`ControlState`] carries every signal an operator can send a running
//! job: pause, abort, and a queue of manual override actions. The job
//! consumes them only at its per-iteration yield point -- abort is
//! cooperative, never preemptive. The state also owns the job's preview
//! channel and its producer task handle so teardown has one place to look.
//!
//! [`ControlRegistry`] maps job ids to control states, creating them on
//! first access and tearing them down when the job reaches a terminal
//! state.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use autopub_core::action::Action;
use autopub_core::types::DbId;
use autopub_session::PreviewChannel;

/// Control signals and live-view plumbing for one job.
pub struct ControlState {
    paused: watch::Sender<bool>,
    abort: CancellationToken,
    manual: std::sync::Mutex<VecDeque<Action>>,
    preview: Arc<PreviewChannel>,
    producer: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ControlState {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            paused,
            abort: CancellationToken::new(),
            manual: std::sync::Mutex::new(VecDeque::new()),
            preview: Arc::new(PreviewChannel::new()),
            producer: std::sync::Mutex::new(None),
        }
    }

    // -- pause ---------------------------------------------------------------

    pub fn set_paused(&self, paused: bool) {
        self.paused.send_replace(paused);
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Receiver for the pausable wait inside the execution loop.
    pub fn pause_rx(&self) -> watch::Receiver<bool> {
        self.paused.subscribe()
    }

    // -- abort ---------------------------------------------------------------

    /// Request cooperative abort. Takes effect at the job's next yield
    /// point.
    pub fn request_abort(&self) {
        self.abort.cancel();
    }

    pub fn is_abort_requested(&self) -> bool {
        self.abort.is_cancelled()
    }

    pub fn abort_token(&self) -> CancellationToken {
        self.abort.clone()
    }

    // -- manual overrides ----------------------------------------------------

    /// Queue an operator-supplied action. The job executes queued manual
    /// actions, in order, before its next planning step.
    pub fn push_manual(&self, action: Action) {
        self.manual
            .lock()
            .expect("manual queue mutex poisoned")
            .push_back(action);
    }

    /// Take all queued manual actions.
    pub fn drain_manual(&self) -> Vec<Action> {
        self.manual
            .lock()
            .expect("manual queue mutex poisoned")
            .drain(..)
            .collect()
    }

    // -- preview -------------------------------------------------------------

    pub fn preview(&self) -> Arc<PreviewChannel> {
        Arc::clone(&self.preview)
    }

    /// Record the preview producer's task handle for later teardown.
    pub fn attach_producer(&self, handle: JoinHandle<()>) {
        *self.producer.lock().expect("producer mutex poisoned") = Some(handle);
    }

    pub fn take_producer(&self) -> Option<JoinHandle<()>> {
        self.producer.lock().expect("producer mutex poisoned").take()
    }
}

impl Default for ControlState {
    fn default() -> Self {
        Self::new()
    }
}

/// All live control states, keyed by job id.
///
/// Thread-safe via interior `RwLock`; designed to be owned by one
/// orchestrator instance.
#[derive(Default)]
pub struct ControlRegistry {
    states: RwLock<HashMap<DbId, Arc<ControlState>>>,
}

impl ControlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The control state for `job_id`, created on first access.
    pub async fn get_or_create(&self, job_id: DbId) -> Arc<ControlState> {
        if let Some(state) = self.states.read().await.get(&job_id) {
            return Arc::clone(state);
        }
        let mut states = self.states.write().await;
        Arc::clone(
            states
                .entry(job_id)
                .or_insert_with(|| Arc::new(ControlState::new())),
        )
    }

    pub async fn get(&self, job_id: DbId) -> Option<Arc<ControlState>> {
        self.states.read().await.get(&job_id).cloned()
    }

    /// Remove and return the state, ending its registry lifetime.
    pub async fn remove(&self, job_id: DbId) -> Option<Arc<ControlState>> {
        self.states.write().await.remove(&job_id)
    }

    /// Snapshot of all live states (used for shutdown fan-out).
    pub async fn all(&self) -> Vec<Arc<ControlState>> {
        self.states.read().await.values().cloned().collect()
    }

    pub async fn count(&self) -> usize {
        self.states.read().await.len()
    }
}
