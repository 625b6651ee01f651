//! Core identifier types shared across the model, coordinator, and checker.
//!
//! Identifiers are dense indices assigned on first observation and stable
//! within a single exploration run. Remote addresses are opaque wide-word
//! values taken from the target's address space; they are compared and
//! hashed by bit pattern and never dereferenced on the coordinator side.

use serde::Serialize;
use std::fmt;

/// Identifier of a visible object (mutex, condition variable, semaphore)
/// inside the program model.
///
/// Assigned densely in observation order by the model-to-system map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ObjectId(u32);

impl ObjectId {
    /// Reserved sentinel meaning "no such object".
    pub const INVALID: Self = Self(u32::MAX);

    /// Construct from a dense index.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// The dense index, usable to address the model's object table.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// True for the reserved sentinel.
    #[must_use]
    pub const fn is_invalid(self) -> bool {
        self.0 == u32::MAX
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_invalid() {
            write!(f, "obj(invalid)")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Identifier of a runner (a thread inside the target under the
/// coordinator's scheduling).
///
/// Runner 0 is always the target's main thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RunnerId(u32);

impl RunnerId {
    /// The target's main thread.
    pub const MAIN: Self = Self(0);

    /// Construct from a dense index.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// The dense index, usable to address the model's runner table.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// True for the main thread (runner 0).
    #[must_use]
    pub const fn is_main(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for RunnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An opaque pointer-shaped value identifying a primitive inside the
/// target's address space (e.g. the value of a `pthread_mutex_t*`).
///
/// Handles are assumed stable across re-executions of the target: the same
/// bit pattern names the same conceptual object. The coordinator never
/// dereferences one. Keeping this a dedicated newtype makes the map's key
/// type easy to swap should targets ever randomize addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RemoteAddr(u64);

impl RemoteAddr {
    /// Construct from the raw bit pattern.
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// The raw bit pattern.
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// True for the all-zero pattern, which no live primitive may have.
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for RemoteAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
