//! Per-run execution state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Instant;
use tracing::warn;

use super::StepResult;

/// Highest step progress reachable before the invocation settles.
pub const IN_FLIGHT_CEILING: f64 = 99.0;

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowState {
    /// Created, no step started.
    #[default]
    Initialized,
    /// Steps are executing.
    Running,
    /// Every step was processed.
    Completed,
    /// Aborted or cancelled.
    Failed,
}

impl WorkflowState {
    /// Whether moving to `next` is a legal transition.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Initialized, Self::Running)
                | (Self::Running, Self::Completed | Self::Failed)
        )
    }

    /// True for `Completed` and `Failed`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initialized => "initialized",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Point-in-time view of a run for observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    /// Run id.
    pub workflow_id: String,
    /// State.
    pub state: WorkflowState,
    /// Index of the step being (or last) processed.
    pub current_step: usize,
    /// Steps processed so far.
    pub completed_steps: usize,
    /// Steps in the definition.
    pub total_steps: usize,
    /// Fractional progress of the current step (0..100).
    pub step_progress: f64,
    /// Overall progress (0..=100).
    pub progress: f64,
    /// Start time.
    pub started_at: DateTime<Utc>,
    /// Time since start.
    pub elapsed_ms: u64,
}

/// Mutable state owned by exactly one run.
#[derive(Debug)]
pub struct ExecutionContext {
    workflow_id: String,
    started_at: DateTime<Utc>,
    clock: Instant,
    state: WorkflowState,
    current_step: usize,
    completed_steps: usize,
    total_steps: usize,
    step_progress: f64,
    progress: f64,
    latest: HashMap<String, StepResult>,
    history: Vec<StepResult>,
}

impl ExecutionContext {
    /// Creates a context for a run of `total_steps` steps.
    #[must_use]
    pub fn new(workflow_id: impl Into<String>, total_steps: usize) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            started_at: Utc::now(),
            clock: Instant::now(),
            state: WorkflowState::Initialized,
            current_step: 0,
            completed_steps: 0,
            total_steps,
            step_progress: 0.0,
            progress: 0.0,
            latest: HashMap::new(),
            history: Vec::new(),
        }
    }

    /// Run id.
    #[must_use]
    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    /// Start time.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Elapsed milliseconds since the run started.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.clock.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> WorkflowState {
        self.state
    }

    /// Moves to `next`, ignoring illegal transitions.
    pub fn transition(&mut self, next: WorkflowState) -> bool {
        if self.state.can_transition_to(next) {
            self.state = next;
            true
        } else {
            warn!(
                workflow_id = %self.workflow_id,
                from = %self.state,
                to = %next,
                "Ignoring illegal workflow state transition"
            );
            false
        }
    }

    /// Marks `index` as the step in progress.
    pub fn begin_step(&mut self, index: usize) {
        self.current_step = index;
        self.step_progress = 0.0;
    }

    /// Index of the step in progress.
    #[must_use]
    pub fn current_step(&self) -> usize {
        self.current_step
    }

    /// Advances the current step's progress by `increment`, never past
    /// `cap` nor [`IN_FLIGHT_CEILING`]. Returns the new overall progress
    /// when it moved.
    pub fn tick(&mut self, increment: f64, cap: f64) -> Option<f64> {
        let next = (self.step_progress + increment)
            .min(cap)
            .min(IN_FLIGHT_CEILING);
        if next <= self.step_progress {
            return None;
        }
        self.step_progress = next;
        let before = self.progress;
        self.recompute();
        (self.progress > before).then_some(self.progress)
    }

    /// Records a processed step and resets step progress.
    pub fn finish_step(&mut self, result: StepResult) {
        self.completed_steps += 1;
        self.step_progress = 0.0;
        self.latest.insert(result.stage_id.clone(), result.clone());
        self.history.push(result);
        self.recompute();
    }

    fn recompute(&mut self) {
        let overall = if self.total_steps == 0 || self.completed_steps >= self.total_steps {
            100.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let (done, total) = (self.completed_steps as f64, self.total_steps as f64);
            (done / total * 100.0 + self.step_progress / total).clamp(0.0, 100.0)
        };
        // Observers must never see progress go backwards.
        self.progress = self.progress.max(overall);
    }

    /// Overall progress (0..=100).
    #[must_use]
    pub fn progress(&self) -> f64 {
        self.progress
    }

    /// Fractional progress of the current step.
    #[must_use]
    pub fn step_progress(&self) -> f64 {
        self.step_progress
    }

    /// Steps processed so far.
    #[must_use]
    pub fn completed_steps(&self) -> usize {
        self.completed_steps
    }

    /// Steps in the definition.
    #[must_use]
    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    /// Latest result recorded for `stage_id`.
    #[must_use]
    pub fn result_for(&self, stage_id: &str) -> Option<&StepResult> {
        self.latest.get(stage_id)
    }

    /// All results, in execution order.
    #[must_use]
    pub fn history(&self) -> &[StepResult] {
        &self.history
    }

    /// Consumes the context, returning all results.
    #[must_use]
    pub fn into_history(self) -> Vec<StepResult> {
        self.history
    }

    /// Observer view.
    #[must_use]
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            workflow_id: self.workflow_id.clone(),
            state: self.state,
            current_step: self.current_step,
            completed_steps: self.completed_steps,
            total_steps: self.total_steps,
            step_progress: self.step_progress,
            progress: self.progress,
            started_at: self.started_at,
            elapsed_ms: self.elapsed_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn done(index: usize, stage: &str) -> StepResult {
        StepResult::success(index, stage, stage, Utc::now(), 0, 1, json!({}))
    }

    #[test]
    fn test_state_machine() {
        let mut ctx = ExecutionContext::new("wf", 2);
        assert_eq!(ctx.state(), WorkflowState::Initialized);
        assert!(!ctx.transition(WorkflowState::Completed));
        assert!(ctx.transition(WorkflowState::Running));
        assert!(ctx.transition(WorkflowState::Failed));
        assert!(ctx.state().is_terminal());
        assert!(!ctx.transition(WorkflowState::Running));
    }

    #[test]
    fn test_progress_formula() {
        let mut ctx = ExecutionContext::new("wf", 4);
        ctx.begin_step(0);
        assert_eq!(ctx.tick(40.0, 95.0), Some(10.0));
        ctx.finish_step(done(0, "a"));
        assert_eq!(ctx.progress(), 25.0);

        ctx.begin_step(1);
        ctx.tick(200.0, 95.0);
        assert_eq!(ctx.step_progress(), 95.0);
        assert!(ctx.tick(5.0, 95.0).is_none());
        assert!(ctx.progress() < 50.0);
    }

    #[test]
    fn test_in_flight_progress_stays_below_complete() {
        let mut ctx = ExecutionContext::new("wf", 1);
        ctx.begin_step(0);
        for _ in 0..10 {
            ctx.tick(50.0, 150.0);
        }
        assert_eq!(ctx.step_progress(), IN_FLIGHT_CEILING);
        assert!(ctx.progress() < 100.0);

        ctx.finish_step(done(0, "a"));
        assert_eq!(ctx.progress(), 100.0);
    }

    #[test]
    fn test_progress_monotonic_and_exact_at_end() {
        let mut ctx = ExecutionContext::new("wf", 3);
        let mut seen = vec![ctx.progress()];
        for (i, stage) in ["a", "b", "c"].iter().enumerate() {
            ctx.begin_step(i);
            for _ in 0..30 {
                if let Some(p) = ctx.tick(5.0, 95.0) {
                    seen.push(p);
                }
            }
            ctx.finish_step(done(i, stage));
            seen.push(ctx.progress());
        }

        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(ctx.progress(), 100.0);
    }

    #[test]
    fn test_results_by_stage_and_snapshot() {
        let mut ctx = ExecutionContext::new("wf", 2);
        ctx.transition(WorkflowState::Running);
        ctx.finish_step(done(0, "a"));
        ctx.begin_step(1);

        assert!(ctx.result_for("a").is_some());
        assert!(ctx.result_for("b").is_none());

        let snap = ctx.snapshot();
        assert_eq!(snap.workflow_id, "wf");
        assert_eq!(snap.state, WorkflowState::Running);
        assert_eq!(snap.current_step, 1);
        assert_eq!(snap.completed_steps, 1);
        assert_eq!(snap.progress, 50.0);
    }
}
