//! Classic DPOR: stateless depth-first exploration with backtrack sets,
//! sleep sets, and the dependency/co-enabled relations.
//!
//! Per step `i` of the current trace the search keeps the set of runners
//! that must still be explored from the pre-state (`backtrack`), the set
//! already explored (`done`), and the set whose next transition is known
//! to yield an equivalent continuation (`sleep`). After executing a
//! transition it walks the earlier steps looking for *races*: a pair of
//! dependent, co-enabled transitions not ordered by happens-before. Each
//! race adds a runner to an earlier backtrack set; popping a state replays
//! the remaining prefix through the coordinator.
//!
//! # References
//!
//! - Flanagan & Godefroid, "Dynamic partial-order reduction" (POPL 2005)

use crate::checker::clock::ClockVector;
use crate::checker::config::CheckerConfig;
use crate::checker::relations::TransitionRelations;
use crate::checker::report::{Callbacks, ExplorationReport, TraceSnapshot, Violation};
use crate::coordinator::{Coordinator, ExecutionError};
use crate::model::state::ProgramState;
use crate::model::transition::{Transition, TransitionStatus};
use crate::types::RunnerId;
use std::collections::BTreeSet;
use tracing::{debug, trace};

/// Per-state bookkeeping on the exploration stack. `frames[i]` describes
/// the state reached after the first `i` trace steps.
struct Frame {
    backtrack: BTreeSet<RunnerId>,
    done: BTreeSet<RunnerId>,
    sleep: BTreeSet<RunnerId>,
    /// Runners schedulable at this state (depth bound applied), recorded
    /// when the state was first reached.
    enabled: Vec<RunnerId>,
    /// Set when undefined behavior pruned this branch.
    pruned: bool,
}

impl Frame {
    fn at(
        state: &ProgramState,
        sleep: BTreeSet<RunnerId>,
        depths: &[usize],
        max_depth: Option<usize>,
    ) -> Self {
        let enabled: Vec<RunnerId> = state
            .enabled_runners()
            .into_iter()
            .filter(|r| {
                max_depth.map_or(true, |bound| depths.get(r.index()).copied().unwrap_or(0) < bound)
            })
            .collect();
        let mut backtrack = BTreeSet::new();
        if let Some(first) = enabled.iter().find(|r| !sleep.contains(r)) {
            backtrack.insert(*first);
        }
        Self {
            backtrack,
            done: BTreeSet::new(),
            sleep,
            enabled,
            pruned: false,
        }
    }

    /// Some runner from `backtrack` minus `done` and `sleep`, if any.
    fn candidate(&self) -> Option<RunnerId> {
        self.backtrack
            .iter()
            .copied()
            .find(|r| !self.done.contains(r) && !self.sleep.contains(r))
    }
}

/// One executed step, with the clock stamps race analysis needs.
struct Step {
    executor: RunnerId,
    transition: Transition,
    /// The executor's clock after this step.
    clock: ClockVector,
    /// The executor's clock before this step, restored on pop.
    prev_clock: ClockVector,
}

/// The classic DPOR exploration driver.
#[derive(Debug)]
pub struct ClassicDpor {
    relations: TransitionRelations,
    config: CheckerConfig,
}

impl ClassicDpor {
    /// A driver with the standard relations for the full vocabulary.
    #[must_use]
    pub fn new(config: CheckerConfig) -> Self {
        Self::with_relations(TransitionRelations::standard(), config)
    }

    /// A driver with custom relation tables.
    #[must_use]
    pub fn with_relations(relations: TransitionRelations, config: CheckerConfig) -> Self {
        Self { relations, config }
    }

    /// Exhaustively explore the target's interleavings through the
    /// coordinator, invoking `callbacks` as traces complete and
    /// violations surface.
    ///
    /// # Errors
    ///
    /// Any [`ExecutionError`] from the coordinator is fatal and aborts
    /// the exploration.
    pub fn verify(
        &self,
        coordinator: &mut Coordinator,
        callbacks: &mut Callbacks,
    ) -> Result<ExplorationReport, ExecutionError> {
        let mut report = ExplorationReport::default();
        let mut frames: Vec<Frame> = Vec::new();
        let mut steps: Vec<Step> = Vec::new();
        let mut clocks: Vec<ClockVector> = Vec::new();
        let mut depths: Vec<usize> = Vec::new();
        let mut starvation_reported: BTreeSet<RunnerId> = BTreeSet::new();
        let mut trace_id: u64 = 0;
        let mut stopped_early = false;
        // A coordinator reused across verifications starts mid-trace.
        let mut needs_replay = !coordinator.state().trace().is_empty();

        let mut first = Frame::at(
            coordinator.state(),
            BTreeSet::new(),
            &depths,
            self.config.max_depth_per_thread,
        );
        if let Some(halt) =
            self.report_undefined(coordinator.state(), trace_id, callbacks, &mut report)
        {
            if halt {
                return Ok(report);
            }
            first.pruned = true;
            first.backtrack.clear();
        }
        frames.push(first);

        loop {
            if self.config.is_cancelled() {
                debug!("exploration cancelled");
                stopped_early = true;
                break;
            }

            let top = frames.len() - 1;
            let Some(runner) = frames[top].candidate() else {
                // Nothing left to explore here: traverse upward.
                if frames.len() == 1 {
                    break;
                }
                frames.pop();
                let Some(step) = steps.pop() else { break };
                clocks[step.executor.index()] = step.prev_clock;
                depths[step.executor.index()] -= 1;
                if let Some(parent) = frames.last_mut() {
                    parent.sleep.insert(step.executor);
                }
                needs_replay = true;
                continue;
            };

            if needs_replay {
                let prefix: Vec<(RunnerId, Transition)> = steps
                    .iter()
                    .map(|s| (s.executor, s.transition.clone()))
                    .collect();
                coordinator.reset_to(&prefix)?;
                needs_replay = false;
            }

            let applied = coordinator.execute_runner(runner)?;
            report.transitions_executed += 1;
            frames[top].done.insert(runner);
            trace!(step = steps.len(), %runner, transition = %applied, "executed");

            let runner_count = coordinator.state().runner_count();
            if clocks.len() < runner_count {
                clocks.resize(runner_count, ClockVector::new());
            }
            if depths.len() < runner_count {
                depths.resize(runner_count, 0);
            }

            // Stamp the step: join the clocks of every earlier dependent
            // step (plus program order), then tick.
            let prev_clock = clocks[runner.index()].clone();
            let mut clock = prev_clock.clone();
            for step in &steps {
                if step.executor == runner
                    || self.relations.dependent(&step.transition, &applied)
                {
                    clock.join(&step.clock);
                }
            }
            clock.increment(runner);

            // Race analysis: earlier dependent co-enabled steps not
            // already ordered before this runner's past.
            for j in (0..steps.len()).rev() {
                let earlier_executor = steps[j].executor;
                if earlier_executor == runner {
                    continue;
                }
                if !self.relations.dependent(&steps[j].transition, &applied) {
                    continue;
                }
                if !self.relations.coenabled(&steps[j].transition, &applied) {
                    continue;
                }
                if steps[j].clock.get(earlier_executor) <= prev_clock.get(earlier_executor) {
                    continue;
                }

                // Runners enabled at j that could have raced to reach the
                // new step: the runner itself, or anyone whose later step
                // happens-before it.
                let witnesses: Vec<RunnerId> = frames[j]
                    .enabled
                    .iter()
                    .copied()
                    .filter(|&q| {
                        q == runner
                            || steps[j + 1..]
                                .iter()
                                .any(|s| s.executor == q && s.clock.get(q) <= clock.get(q))
                    })
                    .collect();

                let frame = &mut frames[j];
                if witnesses.is_empty() {
                    let everyone = frame.enabled.clone();
                    frame.backtrack.extend(everyone);
                } else if witnesses.contains(&runner) {
                    frame.backtrack.insert(runner);
                } else {
                    frame.backtrack.insert(witnesses[0]);
                }
                trace!(at = j, %runner, "race found, backtrack point added");
            }

            // The new state's sleep set keeps only runners whose pending
            // transition is independent of what just ran.
            let child_sleep: BTreeSet<RunnerId> = {
                let state = coordinator.state();
                frames[top]
                    .sleep
                    .iter()
                    .copied()
                    .filter(|&q| q != runner)
                    .filter(|&q| {
                        state
                            .pending(q)
                            .is_some_and(|p| !self.relations.dependent(p, &applied))
                    })
                    .collect()
            };

            depths[runner.index()] += 1;
            clocks[runner.index()] = clock.clone();
            steps.push(Step {
                executor: runner,
                transition: applied.clone(),
                clock,
                prev_clock,
            });

            let mut frame = Frame::at(
                coordinator.state(),
                child_sleep,
                &depths,
                self.config.max_depth_per_thread,
            );

            if let Some(halt) =
                self.report_undefined(coordinator.state(), trace_id, callbacks, &mut report)
            {
                if halt {
                    stopped_early = true;
                    break;
                }
                frame.pruned = true;
                frame.backtrack.clear();
            }

            if !frame.pruned && frame.enabled.is_empty() {
                let state = coordinator.state();
                let snapshot = TraceSnapshot::capture(trace_id, state);
                report.traces_explored += 1;
                report.max_trace_depth = report.max_trace_depth.max(snapshot.depth());
                debug!(trace_id, depth = snapshot.depth(), "trace completed");
                callbacks.notify_trace(&snapshot);
                trace_id += 1;

                let main_exited = state.thread(RunnerId::MAIN).is_finished();
                let deadlocked = state.enabled_runners().is_empty()
                    && !main_exited
                    && !state.unfinished_runners().is_empty();
                if deadlocked {
                    let violation = Violation::Deadlock { snapshot };
                    callbacks.notify_violation(&violation);
                    report.violations.push(violation);
                    if self.config.first_deadlock {
                        stopped_early = true;
                        break;
                    }
                } else if self.config.check_forward_progress {
                    self.report_starvation(
                        state,
                        &depths,
                        &snapshot,
                        &mut starvation_reported,
                        callbacks,
                        &mut report,
                    );
                }

                if self
                    .config
                    .max_traces
                    .is_some_and(|bound| report.traces_explored >= bound)
                {
                    stopped_early = true;
                    break;
                }
            }

            frames.push(frame);
        }

        report.completed = !stopped_early;
        Ok(report)
    }

    /// Report the first pending transition whose status is undefined, if
    /// any. Returns `Some(halt)` when one was found.
    fn report_undefined(
        &self,
        state: &ProgramState,
        trace_id: u64,
        callbacks: &mut Callbacks,
        report: &mut ExplorationReport,
    ) -> Option<bool> {
        let (runner, message) = state.runners().find_map(|r| {
            state.pending(r).and_then(|p| match p.status(state) {
                TransitionStatus::Undefined(message) => Some((r, message)),
                _ => None,
            })
        })?;

        let violation = Violation::UndefinedBehavior {
            runner,
            message: message.to_string(),
            snapshot: TraceSnapshot::capture(trace_id, state),
        };
        callbacks.notify_violation(&violation);
        report.violations.push(violation);
        Some(self.config.halt_on_undefined_behavior)
    }

    /// Flag runners that hit the depth bound without finishing: within
    /// the bounded exploration they never made progress toward an exit.
    fn report_starvation(
        &self,
        state: &ProgramState,
        depths: &[usize],
        snapshot: &TraceSnapshot,
        already_reported: &mut BTreeSet<RunnerId>,
        callbacks: &mut Callbacks,
        report: &mut ExplorationReport,
    ) {
        let Some(bound) = self.config.max_depth_per_thread else {
            return;
        };
        for runner in state.runners() {
            let capped = depths.get(runner.index()).copied().unwrap_or(0) >= bound;
            if capped && !state.thread(runner).is_finished() && already_reported.insert(runner) {
                let violation = Violation::Starvation {
                    runner,
                    snapshot: snapshot.clone(),
                };
                callbacks.notify_violation(&violation);
                report.violations.push(violation);
            }
        }
    }
}
