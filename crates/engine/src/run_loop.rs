//! The plan -> execute -> verify state machine driving one job.
//!
//! Each iteration ("batch") starts at the single cooperative yield point,
//! then picks exactly one source of actions -- manual overrides, an
//! autopilot rule, the planner, or the heuristic fallback -- executes the
//! batch, records artifacts, and verifies progress. The loop terminates as
//! `Published` (completion confirmed), `Exhausted` (batch budget spent --
//! a warning, not an error), or `Aborted` (cooperative stop). Planner
//! failures never terminate it.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use autopub_core::action::{Action, PRIMARY_AFFORDANCE};
use autopub_core::exec::Executor;
use autopub_core::gate::AdaptiveGate;
use autopub_core::job_events::{EVENT_ARTIFACT, EVENT_CHECK, EVENT_PLAN, EVENT_STAGE};
use autopub_core::plan::{CompletionCheck, HistoryEntry, JobTask, PlanContext, Planner, PlannerError};
use autopub_core::session::{bound_state, SessionHandle, MAX_STATE_CHARS};
use autopub_core::types::DbId;
use autopub_events::EventLog;

use crate::control::ControlState;
use crate::error::EngineError;

/// Tunables for one execution loop.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Soft exhaustion limit: maximum number of batches before the loop
    /// gives up without confirmed completion.
    pub max_batches: u32,
    /// Upper bound on actions per planner call.
    pub max_steps: usize,
    /// Poll interval of the pausable wait. Pause is re-checked (and abort
    /// honored) at least this often.
    pub pause_poll: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_batches: 30,
            max_steps: 5,
            pause_poll: Duration::from_millis(250),
        }
    }
}

/// How an execution loop ended. All three are normal terminations;
/// failures surface as `Err(EngineError)` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Completion confirmed by the planner.
    Published,
    /// Batch budget spent without confirmed completion.
    Exhausted,
    /// Cooperative stop honored at a yield point.
    Aborted,
}

enum Cooperate {
    Continue,
    Abort,
}

/// One job's state machine. Constructed by the orchestrator per run.
pub struct ExecutionLoop {
    job_id: DbId,
    task: JobTask,
    planner: Arc<dyn Planner>,
    executor: Arc<dyn Executor>,
    session: Arc<dyn SessionHandle>,
    events: Arc<EventLog>,
    control: Arc<ControlState>,
    gate: AdaptiveGate,
    config: LoopConfig,
}

impl ExecutionLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        job_id: DbId,
        task: JobTask,
        planner: Arc<dyn Planner>,
        executor: Arc<dyn Executor>,
        session: Arc<dyn SessionHandle>,
        events: Arc<EventLog>,
        control: Arc<ControlState>,
        gate: AdaptiveGate,
        config: LoopConfig,
    ) -> Self {
        Self {
            job_id,
            task,
            planner,
            executor,
            session,
            events,
            control,
            gate,
            config,
        }
    }

    /// Drive the job to a terminal outcome.
    pub async fn run(self) -> Result<RunOutcome, EngineError> {
        let mut history: Vec<HistoryEntry> = Vec::new();

        for batch in 1..=self.config.max_batches {
            if let Cooperate::Abort = self.cooperate().await {
                self.stage(batch, "aborted").await?;
                return Ok(RunOutcome::Aborted);
            }

            // Operator overrides replace planning for this batch.
            let manual = self.control.drain_manual();
            if !manual.is_empty() {
                self.run_batch(batch, "manual", manual, &mut history).await?;
                continue;
            }

            let state = self.session.capture_state().await;

            // Autopilot: one atomic action, no planner call this iteration.
            if let Some((rule, action)) = crate::autopilot::evaluate(&state) {
                tracing::debug!(job_id = self.job_id, rule, "Autopilot rule matched");
                self.run_batch(batch, rule, vec![action], &mut history).await?;
                continue;
            }

            let steps = self.plan(&state, &history).await;
            let (source, actions) = if steps.is_empty() {
                // The planner had nothing. Whether that means "done" or
                // "stuck" is the completion check's call.
                match self.check(batch, &state, &history).await? {
                    CompletionCheck::Published => {
                        self.stage(batch, "published").await?;
                        return Ok(RunOutcome::Published);
                    }
                    CompletionCheck::ReadyToPublish(finals) if !finals.is_empty() => {
                        ("finalize", finals)
                    }
                    // In progress, unreadable, or ready with nothing to do:
                    // fall back to the one generic heuristic action.
                    _ => ("fallback", vec![Action::click(PRIMARY_AFFORDANCE)]),
                }
            } else {
                ("planner", steps)
            };

            self.run_batch(batch, source, actions, &mut history).await?;

            // Verify before spending another batch.
            let verify_state = self.session.capture_state().await;
            if let CompletionCheck::Published = self.check(batch, &verify_state, &history).await? {
                self.stage(batch, "published").await?;
                return Ok(RunOutcome::Published);
            }
        }

        self.stage(self.config.max_batches, "exhausted").await?;
        Ok(RunOutcome::Exhausted)
    }

    /// The single yield point: honor abort, wait out pause.
    ///
    /// Pause is a timed wait re-checked every `pause_poll` (and immediately
    /// on flag changes); abort takes effect here and only here.
    async fn cooperate(&self) -> Cooperate {
        let abort = self.control.abort_token();
        if abort.is_cancelled() {
            return Cooperate::Abort;
        }
        let mut paused = self.control.pause_rx();
        while *paused.borrow_and_update() {
            tokio::select! {
                _ = abort.cancelled() => return Cooperate::Abort,
                _ = paused.changed() => {}
                _ = tokio::time::sleep(self.config.pause_poll) => {}
            }
        }
        Cooperate::Continue
    }

    /// Execute one action batch and record its events.
    ///
    /// Artifacts (state snapshot + frame metadata) are captured and logged
    /// regardless of whether execution succeeded; only then does an
    /// executor failure propagate.
    async fn run_batch(
        &self,
        batch: u32,
        source: &str,
        actions: Vec<Action>,
        history: &mut Vec<HistoryEntry>,
    ) -> Result<(), EngineError> {
        self.events
            .append(
                self.job_id,
                EVENT_PLAN,
                json!({ "batch": batch, "source": source, "actions": &actions }),
            )
            .await?;

        let result = self.executor.execute(self.session.as_ref(), &actions).await;

        let state = self.session.capture_state().await;
        let frame = self.session.capture_frame().await;
        self.events
            .append(
                self.job_id,
                EVENT_ARTIFACT,
                json!({
                    "batch": batch,
                    "state": bound_state(&state, MAX_STATE_CHARS),
                    "frame_bytes": frame.len(),
                }),
            )
            .await?;

        let note = match &result {
            Ok(()) => "ok".to_string(),
            Err(e) => e.to_string(),
        };
        history.push(HistoryEntry {
            batch,
            actions,
            note,
        });

        result.map_err(EngineError::from)
    }

    /// Gate-wrapped planning call. Every failure is recovered locally as
    /// an empty plan; rate limiting additionally tightens the gate.
    async fn plan(&self, state: &str, history: &[HistoryEntry]) -> Vec<Action> {
        let ctx = PlanContext {
            state,
            task: &self.task,
            history,
            max_steps: self.config.max_steps,
        };
        let _permit = self.gate.acquire().await;
        match self.planner.next_steps(&ctx).await {
            Ok(steps) => {
                self.gate.mark_success();
                steps
            }
            Err(e) => {
                self.note_planner_failure("next_steps", &e);
                Vec::new()
            }
        }
    }

    /// Gate-wrapped completion check, recorded as an event. Failures
    /// degrade to `InProgress`.
    async fn check(
        &self,
        batch: u32,
        state: &str,
        history: &[HistoryEntry],
    ) -> Result<CompletionCheck, EngineError> {
        let ctx = PlanContext {
            state,
            task: &self.task,
            history,
            max_steps: self.config.max_steps,
        };
        let check = {
            let _permit = self.gate.acquire().await;
            match self.planner.completion_check(&ctx).await {
                Ok(check) => {
                    self.gate.mark_success();
                    check
                }
                Err(e) => {
                    self.note_planner_failure("completion_check", &e);
                    CompletionCheck::InProgress
                }
            }
        };

        let status = match &check {
            CompletionCheck::Published => "published",
            CompletionCheck::ReadyToPublish(_) => "ready_to_publish",
            CompletionCheck::InProgress => "in_progress",
        };
        self.events
            .append(
                self.job_id,
                EVENT_CHECK,
                json!({ "batch": batch, "status": status }),
            )
            .await?;
        Ok(check)
    }

    fn note_planner_failure(&self, call: &str, error: &PlannerError) {
        if matches!(error, PlannerError::RateLimited) {
            self.gate.tighten(1);
        }
        tracing::warn!(
            job_id = self.job_id,
            call,
            error = %error,
            "Planner call failed, continuing without it",
        );
    }

    async fn stage(&self, batch: u32, stage: &str) -> Result<(), EngineError> {
        self.events
            .append(
                self.job_id,
                EVENT_STAGE,
                json!({ "batch": batch, "stage": stage }),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use sqlx::SqlitePool;

    use autopub_core::gate::GateConfig;
    use autopub_core::job_events::EVENT_STAGE;
    use autopub_db::models::job::SubmitJob;
    use autopub_db::repositories::JobRepo;
    use autopub_session::inproc::{InProcSession, SessionScript};
    use autopub_session::SessionExecutor;

    use super::*;

    /// Planner stub that serves scripted plans and completion checks.
    /// Exhausted scripts repeat the default (empty plan / in-progress).
    struct ScriptedPlanner {
        plans: Mutex<VecDeque<Vec<Action>>>,
        checks: Mutex<VecDeque<CompletionCheck>>,
        plan_calls: AtomicUsize,
        check_calls: AtomicUsize,
    }

    impl ScriptedPlanner {
        fn new(
            plans: impl IntoIterator<Item = Vec<Action>>,
            checks: impl IntoIterator<Item = CompletionCheck>,
        ) -> Arc<Self> {
            Arc::new(Self {
                plans: Mutex::new(plans.into_iter().collect()),
                checks: Mutex::new(checks.into_iter().collect()),
                plan_calls: AtomicUsize::new(0),
                check_calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Planner for ScriptedPlanner {
        async fn next_steps(&self, _ctx: &PlanContext<'_>) -> Result<Vec<Action>, PlannerError> {
            self.plan_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.plans.lock().unwrap().pop_front().unwrap_or_default())
        }

        async fn completion_check(
            &self,
            _ctx: &PlanContext<'_>,
        ) -> Result<CompletionCheck, PlannerError> {
            self.check_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .checks
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(CompletionCheck::InProgress))
        }
    }

    struct Fixture {
        session: Arc<InProcSession>,
        events: Arc<EventLog>,
        control: Arc<ControlState>,
    }

    fn run_loop_for(
        pool: &SqlitePool,
        job_id: DbId,
        planner: Arc<ScriptedPlanner>,
        script: SessionScript,
        config: LoopConfig,
    ) -> (ExecutionLoop, Fixture) {
        let session = Arc::new(InProcSession::new("p1", script));
        let events = Arc::new(EventLog::new(pool.clone()));
        let control = Arc::new(ControlState::new());
        let gate = AdaptiveGate::new(GateConfig::default()).unwrap();

        let exec_loop = ExecutionLoop::new(
            job_id,
            JobTask::new("publish the draft"),
            planner,
            Arc::new(SessionExecutor::with_retry_delay(Duration::from_millis(1))),
            Arc::clone(&session) as Arc<dyn SessionHandle>,
            Arc::clone(&events),
            Arc::clone(&control),
            gate,
            config,
        );
        (
            exec_loop,
            Fixture {
                session,
                events,
                control,
            },
        )
    }

    async fn make_job(pool: &SqlitePool) -> DbId {
        JobRepo::create(
            pool,
            &SubmitJob {
                resource_id: "p1".to_string(),
                goal: "publish the draft".to_string(),
                known_vars: None,
            },
        )
        .await
        .unwrap()
        .id
    }

    fn pages(n: usize) -> SessionScript {
        SessionScript {
            pages: (0..n).map(|i| format!("page {i}")).collect(),
            fail_targets: Vec::new(),
        }
    }

    // -- termination ----------------------------------------------------------

    #[sqlx::test(migrations = "../db/migrations")]
    async fn publishes_when_third_check_confirms(pool: SqlitePool) {
        let job_id = make_job(&pool).await;
        // Empty plans throughout; the third completion check confirms.
        let planner = ScriptedPlanner::new(
            Vec::<Vec<Action>>::new(),
            [
                CompletionCheck::InProgress,
                CompletionCheck::InProgress,
                CompletionCheck::Published,
            ],
        );
        let (exec_loop, fx) =
            run_loop_for(&pool, job_id, Arc::clone(&planner), pages(8), LoopConfig::default());

        let outcome = exec_loop.run().await.unwrap();

        assert_eq!(outcome, RunOutcome::Published);
        assert_eq!(planner.check_calls.load(Ordering::SeqCst), 3);
        // Two fallback batches ran before the confirmation.
        assert_eq!(fx.session.performed().len(), 2);
        assert!(fx
            .session
            .performed()
            .iter()
            .all(|a| a.target.as_deref() == Some(PRIMARY_AFFORDANCE)));
    }

    #[sqlx::test(migrations = "../db/migrations")]
    async fn degrades_to_exhausted_when_nothing_resolves(pool: SqlitePool) {
        let job_id = make_job(&pool).await;
        let planner = ScriptedPlanner::new(Vec::<Vec<Action>>::new(), Vec::<CompletionCheck>::new());
        let config = LoopConfig {
            max_batches: 3,
            ..Default::default()
        };
        let (exec_loop, fx) = run_loop_for(&pool, job_id, planner, pages(8), config);

        let outcome = exec_loop.run().await.unwrap();

        assert_eq!(outcome, RunOutcome::Exhausted);
        // Strictly bounded by the batch budget: one fallback per batch.
        assert_eq!(fx.session.performed().len(), 3);

        let events = fx.events.events_since(job_id, 0).await.unwrap();
        let last = events.last().unwrap();
        assert_eq!(last.event_type, EVENT_STAGE);
        assert_eq!(last.payload_json()["stage"], "exhausted");
    }

    #[sqlx::test(migrations = "../db/migrations")]
    async fn ready_to_publish_runs_final_actions_then_confirms(pool: SqlitePool) {
        let job_id = make_job(&pool).await;
        let planner = ScriptedPlanner::new(
            Vec::<Vec<Action>>::new(),
            [
                CompletionCheck::ReadyToPublish(vec![Action::click("publish_button")]),
                CompletionCheck::Published,
            ],
        );
        let (exec_loop, fx) =
            run_loop_for(&pool, job_id, planner, pages(4), LoopConfig::default());

        let outcome = exec_loop.run().await.unwrap();

        assert_eq!(outcome, RunOutcome::Published);
        assert_eq!(fx.session.performed(), vec![Action::click("publish_button")]);
    }

    // -- sources --------------------------------------------------------------

    #[sqlx::test(migrations = "../db/migrations")]
    async fn planner_steps_execute_in_order(pool: SqlitePool) {
        let job_id = make_job(&pool).await;
        let steps = vec![Action::fill("title", "Lamp"), Action::click("save")];
        let planner = ScriptedPlanner::new(
            [steps.clone()],
            [CompletionCheck::Published],
        );
        let (exec_loop, fx) =
            run_loop_for(&pool, job_id, planner, pages(4), LoopConfig::default());

        let outcome = exec_loop.run().await.unwrap();

        assert_eq!(outcome, RunOutcome::Published);
        assert_eq!(fx.session.performed(), steps);
    }

    #[sqlx::test(migrations = "../db/migrations")]
    async fn autopilot_acts_without_calling_the_planner(pool: SqlitePool) {
        let job_id = make_job(&pool).await;
        let script = SessionScript {
            pages: vec![
                "listing form [cookie-consent banner]".to_string(),
                "listing form, clean".to_string(),
            ],
            fail_targets: Vec::new(),
        };
        let planner = ScriptedPlanner::new(
            Vec::<Vec<Action>>::new(),
            [CompletionCheck::Published],
        );
        let (exec_loop, fx) =
            run_loop_for(&pool, job_id, Arc::clone(&planner), script, LoopConfig::default());

        let outcome = exec_loop.run().await.unwrap();

        assert_eq!(outcome, RunOutcome::Published);
        // Batch 1 was pure autopilot: the banner dismissal happened before
        // the planner was consulted at all.
        assert_eq!(fx.session.performed()[0], Action::click("cookie_accept"));
        assert_eq!(planner.plan_calls.load(Ordering::SeqCst), 1);
    }

    #[sqlx::test(migrations = "../db/migrations")]
    async fn manual_overrides_run_before_planning(pool: SqlitePool) {
        let job_id = make_job(&pool).await;
        let planner = ScriptedPlanner::new(
            Vec::<Vec<Action>>::new(),
            [CompletionCheck::Published],
        );
        let (exec_loop, fx) =
            run_loop_for(&pool, job_id, Arc::clone(&planner), pages(4), LoopConfig::default());

        fx.control.push_manual(Action::click("retry_upload"));

        let outcome = exec_loop.run().await.unwrap();

        assert_eq!(outcome, RunOutcome::Published);
        assert_eq!(fx.session.performed()[0], Action::click("retry_upload"));
    }

    // -- cooperation ----------------------------------------------------------

    #[sqlx::test(migrations = "../db/migrations")]
    async fn abort_while_paused_honored_within_poll_interval(pool: SqlitePool) {
        let job_id = make_job(&pool).await;
        let planner = ScriptedPlanner::new(Vec::<Vec<Action>>::new(), Vec::<CompletionCheck>::new());
        let (exec_loop, fx) =
            run_loop_for(&pool, job_id, planner, pages(4), LoopConfig::default());

        fx.control.set_paused(true);
        let control = Arc::clone(&fx.control);
        let runner = tokio::spawn(exec_loop.run());

        // Let the loop settle into the pausable wait, then abort.
        tokio::time::sleep(Duration::from_millis(50)).await;
        control.request_abort();

        let started = std::time::Instant::now();
        let outcome = runner.await.unwrap().unwrap();
        assert_eq!(outcome, RunOutcome::Aborted);
        assert!(
            started.elapsed() <= Duration::from_millis(300),
            "abort took {:?}",
            started.elapsed()
        );
        // Nothing executed: the job unwound at the yield point.
        assert!(fx.session.performed().is_empty());
    }

    #[sqlx::test(migrations = "../db/migrations")]
    async fn pause_then_resume_continues_the_batch(pool: SqlitePool) {
        let job_id = make_job(&pool).await;
        let planner = ScriptedPlanner::new(
            Vec::<Vec<Action>>::new(),
            [CompletionCheck::Published],
        );
        let (exec_loop, fx) =
            run_loop_for(&pool, job_id, planner, pages(4), LoopConfig::default());

        fx.control.set_paused(true);
        let control = Arc::clone(&fx.control);
        let runner = tokio::spawn(exec_loop.run());

        tokio::time::sleep(Duration::from_millis(50)).await;
        control.set_paused(false);

        let outcome = tokio::time::timeout(Duration::from_secs(2), runner)
            .await
            .expect("resume must unblock the loop")
            .unwrap()
            .unwrap();
        assert_eq!(outcome, RunOutcome::Published);
    }

    // -- failure --------------------------------------------------------------

    #[sqlx::test(migrations = "../db/migrations")]
    async fn executor_failure_propagates_after_artifacts(pool: SqlitePool) {
        let job_id = make_job(&pool).await;
        let script = SessionScript {
            pages: vec!["form".to_string()],
            fail_targets: vec!["save".to_string()],
        };
        let planner = ScriptedPlanner::new(
            [vec![Action::click("save")]],
            Vec::<CompletionCheck>::new(),
        );
        let (exec_loop, fx) = run_loop_for(&pool, job_id, planner, script, LoopConfig::default());

        let err = exec_loop.run().await.unwrap_err();
        assert!(matches!(err, EngineError::Executor(_)));

        // The artifact event for the failed batch was still recorded.
        let events = fx.events.events_since(job_id, 0).await.unwrap();
        assert!(events.iter().any(|e| e.event_type == EVENT_ARTIFACT));
    }

    #[sqlx::test(migrations = "../db/migrations")]
    async fn planner_errors_recover_as_fallback(pool: SqlitePool) {
        let job_id = make_job(&pool).await;

        /// Planner that always fails transport.
        struct BrokenPlanner;

        #[async_trait]
        impl Planner for BrokenPlanner {
            async fn next_steps(
                &self,
                _ctx: &PlanContext<'_>,
            ) -> Result<Vec<Action>, PlannerError> {
                Err(PlannerError::Transport("connection refused".to_string()))
            }

            async fn completion_check(
                &self,
                _ctx: &PlanContext<'_>,
            ) -> Result<CompletionCheck, PlannerError> {
                Err(PlannerError::Malformed("not json".to_string()))
            }
        }

        let session = Arc::new(InProcSession::new("p1", pages(4)));
        let events = Arc::new(EventLog::new(pool.clone()));
        let control = Arc::new(ControlState::new());
        let gate = AdaptiveGate::new(GateConfig::default()).unwrap();
        let config = LoopConfig {
            max_batches: 2,
            ..Default::default()
        };

        let exec_loop = ExecutionLoop::new(
            job_id,
            JobTask::new("publish"),
            Arc::new(BrokenPlanner),
            Arc::new(SessionExecutor::with_retry_delay(Duration::from_millis(1))),
            Arc::clone(&session) as Arc<dyn SessionHandle>,
            events,
            control,
            gate,
            config,
        );

        // A planner that never works is not a job failure -- the loop runs
        // its fallback actions and exhausts the budget.
        let outcome = exec_loop.run().await.unwrap();
        assert_eq!(outcome, RunOutcome::Exhausted);
        assert_eq!(session.performed().len(), 2);
    }

    #[sqlx::test(migrations = "../db/migrations")]
    async fn rate_limited_planner_tightens_the_gate(pool: SqlitePool) {
        let job_id = make_job(&pool).await;

        struct RateLimitedPlanner;

        #[async_trait]
        impl Planner for RateLimitedPlanner {
            async fn next_steps(
                &self,
                _ctx: &PlanContext<'_>,
            ) -> Result<Vec<Action>, PlannerError> {
                Err(PlannerError::RateLimited)
            }

            async fn completion_check(
                &self,
                _ctx: &PlanContext<'_>,
            ) -> Result<CompletionCheck, PlannerError> {
                Err(PlannerError::RateLimited)
            }
        }

        let session = Arc::new(InProcSession::new("p1", pages(4)));
        let events = Arc::new(EventLog::new(pool.clone()));
        let control = Arc::new(ControlState::new());
        let gate = AdaptiveGate::new(GateConfig {
            min_limit: 1,
            max_limit: 8,
            initial_limit: 4,
            relax_threshold: 10,
        })
        .unwrap();

        let exec_loop = ExecutionLoop::new(
            job_id,
            JobTask::new("publish"),
            Arc::new(RateLimitedPlanner),
            Arc::new(SessionExecutor::with_retry_delay(Duration::from_millis(1))),
            session as Arc<dyn SessionHandle>,
            events,
            control,
            gate.clone(),
            LoopConfig {
                max_batches: 2,
                ..Default::default()
            },
        );

        exec_loop.run().await.unwrap();
        // Every failing call tightened by 1, floored at min_limit.
        assert_eq!(gate.current_limit(), 1);
    }
}
