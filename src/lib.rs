#![deny(unsafe_code)]
#![warn(missing_docs)]
//! McMini: a stateless model checker for multithreaded programs.
//!
//! McMini systematically explores the interleavings of a target program
//! that uses a fixed vocabulary of synchronization primitives (mutexes,
//! condition variables, semaphores, threads). It repeatedly re-executes
//! the target under the control of a coordinator, intercepts each
//! synchronization call through a shared-memory mailbox, and prunes
//! interleavings that are provably equivalent to ones already explored
//! using Dynamic Partial-Order Reduction. It reports deadlocks, undefined
//! synchronization usage, and optionally starvation.
//!
//! # Architecture
//!
//! - [`model`]: visible objects, transitions, and the program state
//! - [`remote`]: the mailbox wire protocol and target-process plumbing
//! - [`coordinator`]: the model-to-system bridge driving one target
//! - [`checker`]: the classic DPOR search
//! - [`sim`]: a scripted in-process target for tests
//!
//! # Example
//!
//! ```ignore
//! use mcmini::checker::{Callbacks, CheckerConfig, ClassicDpor};
//! use mcmini::coordinator::{default_registry, Coordinator};
//! use mcmini::model::ProgramState;
//! use mcmini::remote::ForkProcessSource;
//!
//! let source = ForkProcessSource::new("./target_program", "libmcmini.so");
//! let mut coordinator = Coordinator::new(
//!     ProgramState::with_main_thread(),
//!     default_registry(),
//!     Box::new(source),
//! )?;
//! let checker = ClassicDpor::new(CheckerConfig::new().first_deadlock(true));
//! let report = checker.verify(&mut coordinator, &mut Callbacks::none())?;
//! println!("explored {} traces", report.traces_explored);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod checker;
pub mod cli;
pub mod coordinator;
pub mod model;
pub mod remote;
pub mod sim;
pub mod types;

pub use checker::{Callbacks, CheckerConfig, ClassicDpor, ExplorationReport, Violation};
pub use coordinator::{default_registry, Coordinator, ExecutionError, TransitionRegistry};
pub use model::{ProgramState, Transition};
pub use remote::{ForkProcessSource, ProcessHandle, ProcessSource};
pub use types::{ObjectId, RemoteAddr, RunnerId};
