//! The operational model of the target program.
//!
//! The model tracks the target only through its synchronization
//! vocabulary: visible objects (mutexes, condition variables, semaphores),
//! runners (threads), and the transitions between interception points.
//!
//! # Submodules
//!
//! - [`object`]: visible-object value types and state machines
//! - [`transition`]: the transition taxonomy with enabledness, effects,
//!   and undefined-behavior classification
//! - [`state`]: the program state (objects + pending map + trace)

pub mod object;
pub mod state;
pub mod transition;

pub use object::{
    CondLifecycle, CondObject, MutexObject, MutexState, SemaphoreObject, ThreadObject, ThreadState,
    VisibleObject,
};
pub use state::ProgramState;
pub use transition::{Op, OpKind, Transition, TransitionStatus};
