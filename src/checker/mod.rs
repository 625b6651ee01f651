//! The DPOR search driver and its supporting pieces.
//!
//! # Submodules
//!
//! - [`clock`]: vector clocks for happens-before
//! - [`relations`]: dependency and co-enabled dispatch tables
//! - [`config`]: exploration knobs
//! - [`report`]: trace snapshots, violations, and the final report
//! - [`dpor`]: the classic DPOR depth-first exploration

pub mod clock;
pub mod config;
pub mod dpor;
pub mod relations;
pub mod report;

pub use clock::ClockVector;
pub use config::CheckerConfig;
pub use dpor::ClassicDpor;
pub use relations::{coenabled_relation, dependency_relation, RelationTable, TransitionRelations};
pub use report::{Callbacks, ExplorationReport, TraceLine, TraceSnapshot, Violation};
