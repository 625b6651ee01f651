//! Exploration results: trace snapshots, violations, and the report.
//!
//! A trace snapshot is a rendered copy of the applied trace and the
//! per-runner pending transitions at the moment of capture. Its `Display`
//! output matches the classic driver's printing: a `TRACE <id>` block
//! followed by `NEXT THREAD OPERATIONS`.

use crate::model::state::ProgramState;
use crate::types::RunnerId;
use serde::Serialize;
use std::fmt;

/// One rendered line of a snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct TraceLine {
    /// The runner executing the operation.
    pub runner: RunnerId,
    /// Human-readable rendering of the transition.
    pub operation: String,
}

/// A rendered copy of the current trace and pending operations.
#[derive(Debug, Clone, Serialize)]
pub struct TraceSnapshot {
    /// Driver-assigned id of the trace this snapshot belongs to.
    pub trace_id: u64,
    /// The applied transitions, in order.
    pub steps: Vec<TraceLine>,
    /// The pending transition of each live runner, in runner order.
    pub next_operations: Vec<TraceLine>,
}

impl TraceSnapshot {
    /// Capture the given state.
    #[must_use]
    pub fn capture(trace_id: u64, state: &ProgramState) -> Self {
        let steps = state
            .trace()
            .iter()
            .map(|t| TraceLine {
                runner: t.executor,
                operation: t.to_string(),
            })
            .collect();
        let next_operations = state
            .pending_snapshot()
            .into_iter()
            .map(|(runner, t)| TraceLine {
                runner,
                operation: t.to_string(),
            })
            .collect();
        Self {
            trace_id,
            steps,
            next_operations,
        }
    }

    /// Number of applied transitions in the snapshot.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.steps.len()
    }
}

impl fmt::Display for TraceSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "TRACE {}", self.trace_id)?;
        for line in &self.steps {
            writeln!(f, "thread {}: {}", line.runner, line.operation)?;
        }
        writeln!(f)?;
        writeln!(f, "NEXT THREAD OPERATIONS")?;
        for line in &self.next_operations {
            writeln!(f, "thread {}: {}", line.runner, line.operation)?;
        }
        Ok(())
    }
}

/// A property violation found during exploration.
#[derive(Debug, Clone, Serialize)]
pub enum Violation {
    /// No runner is enabled while some runner is unfinished.
    Deadlock {
        /// The trace exhibiting the deadlock.
        snapshot: TraceSnapshot,
    },
    /// The target invoked an operation on an object in a forbidden state.
    UndefinedBehavior {
        /// The runner whose pending transition is undefined.
        runner: RunnerId,
        /// What went wrong.
        message: String,
        /// The trace leading up to the violation.
        snapshot: TraceSnapshot,
    },
    /// A runner was marked as possibly starved and never passed a
    /// progress goal.
    Starvation {
        /// The starved runner.
        runner: RunnerId,
        /// The trace exhibiting the starvation.
        snapshot: TraceSnapshot,
    },
}

impl Violation {
    /// One-line summary for logs.
    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            Self::Deadlock { snapshot } => {
                format!("deadlock after {} transitions", snapshot.depth())
            }
            Self::UndefinedBehavior { runner, message, .. } => {
                format!("undefined behavior by thread {runner}: {message}")
            }
            Self::Starvation { runner, .. } => format!("possible starvation of thread {runner}"),
        }
    }

    /// The snapshot attached to the violation.
    #[must_use]
    pub fn snapshot(&self) -> &TraceSnapshot {
        match self {
            Self::Deadlock { snapshot }
            | Self::UndefinedBehavior { snapshot, .. }
            | Self::Starvation { snapshot, .. } => snapshot,
        }
    }
}

/// Outcome of a whole exploration.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExplorationReport {
    /// Number of maximal traces explored.
    pub traces_explored: u64,
    /// Number of transitions executed, replays included.
    pub transitions_executed: u64,
    /// Length of the longest trace seen.
    pub max_trace_depth: usize,
    /// Every violation found, in discovery order.
    pub violations: Vec<Violation>,
    /// True iff the state space was exhausted (no cancellation, no
    /// early-stop configuration cut the search short).
    pub completed: bool,
}

impl ExplorationReport {
    /// Number of deadlocks found.
    #[must_use]
    pub fn deadlock_count(&self) -> usize {
        self.violations
            .iter()
            .filter(|v| matches!(v, Violation::Deadlock { .. }))
            .count()
    }

    /// Number of undefined-behavior reports.
    #[must_use]
    pub fn undefined_behavior_count(&self) -> usize {
        self.violations
            .iter()
            .filter(|v| matches!(v, Violation::UndefinedBehavior { .. }))
            .count()
    }

    /// True iff any violation was found.
    #[must_use]
    pub fn has_violations(&self) -> bool {
        !self.violations.is_empty()
    }

    /// Serialize for artifact storage.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Hooks the driver invokes as exploration proceeds.
#[derive(Default)]
pub struct Callbacks {
    /// Invoked with every completed maximal trace.
    pub trace_completed: Option<Box<dyn FnMut(&TraceSnapshot)>>,
    /// Invoked with every violation as it is found.
    pub violation: Option<Box<dyn FnMut(&Violation)>>,
}

impl Callbacks {
    /// No hooks.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    pub(crate) fn notify_trace(&mut self, snapshot: &TraceSnapshot) {
        if let Some(hook) = self.trace_completed.as_mut() {
            hook(snapshot);
        }
    }

    pub(crate) fn notify_violation(&mut self, violation: &Violation) {
        if let Some(hook) = self.violation.as_mut() {
            hook(violation);
        }
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("trace_completed", &self.trace_completed.is_some())
            .field("violation", &self.violation.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::state::ProgramState;

    #[test]
    fn snapshot_renders_in_classic_format() {
        let state = ProgramState::with_main_thread();
        let snapshot = TraceSnapshot::capture(3, &state);
        let rendered = snapshot.to_string();
        assert!(rendered.starts_with("TRACE 3\n"));
        assert!(rendered.contains("NEXT THREAD OPERATIONS"));
        assert!(rendered.contains("thread 0: starts"));
    }

    #[test]
    fn report_counts_violations_by_kind() {
        let state = ProgramState::with_main_thread();
        let mut report = ExplorationReport::default();
        report.violations.push(Violation::Deadlock {
            snapshot: TraceSnapshot::capture(0, &state),
        });
        report.violations.push(Violation::UndefinedBehavior {
            runner: RunnerId::MAIN,
            message: "unlocking a mutex that is not locked".into(),
            snapshot: TraceSnapshot::capture(1, &state),
        });
        assert_eq!(report.deadlock_count(), 1);
        assert_eq!(report.undefined_behavior_count(), 1);
        assert!(report.has_violations());
        assert!(report.to_json().is_object());
    }
}
