//! The model-to-system map: remote addresses to model identifiers.
//!
//! The target refers to its primitives by pointers into its own address
//! space; the model refers to them by dense ids. The [`AddressMap`] keeps
//! the bijection for non-runner objects, plus a separate map for runners.
//! Addresses are compared by bit pattern only and never dereferenced.
//!
//! Handles are assumed to remain valid across process-source invocations:
//! the same address names the same conceptual object in every
//! re-execution. Should a target ever randomize addresses, the key type
//! ([`RemoteAddr`]) is the single thing to swap for a trace-order
//! canonical id.

use crate::model::object::{ThreadState, VisibleObject};
use crate::model::state::ProgramState;
use crate::model::transition::Transition;
use crate::types::{ObjectId, RemoteAddr, RunnerId};
use std::collections::HashMap;

/// Persistent bijection between live remote addresses and model ids.
#[derive(Debug, Default, Clone)]
pub struct AddressMap {
    objects: HashMap<RemoteAddr, ObjectId>,
    runners: HashMap<RemoteAddr, RunnerId>,
}

impl AddressMap {
    /// An empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True iff the address names a known non-runner object.
    #[must_use]
    pub fn contains(&self, addr: RemoteAddr) -> bool {
        self.objects.contains_key(&addr)
    }

    /// The object id for the address, or [`ObjectId::INVALID`] if absent.
    #[must_use]
    pub fn get_model_of(&self, addr: RemoteAddr) -> ObjectId {
        self.objects.get(&addr).copied().unwrap_or(ObjectId::INVALID)
    }

    /// The runner id for the address, if a create announced it.
    #[must_use]
    pub fn runner_of(&self, addr: RemoteAddr) -> Option<RunnerId> {
        self.runners.get(&addr).copied()
    }

    /// Forget everything; ids are reassigned on the next observation.
    pub fn clear(&mut self) {
        self.objects.clear();
        self.runners.clear();
    }
}

/// Decode-time facade pairing the address map with the current state.
///
/// Constructed by the coordinator for each decode; registry callbacks use
/// it to resolve addresses and to record newly discovered objects.
#[derive(Debug)]
pub struct ModelToSystemMap<'a> {
    addresses: &'a mut AddressMap,
    state: &'a mut ProgramState,
}

impl<'a> ModelToSystemMap<'a> {
    pub(crate) fn new(addresses: &'a mut AddressMap, state: &'a mut ProgramState) -> Self {
        Self { addresses, state }
    }

    /// True iff the address names a known non-runner object.
    #[must_use]
    pub fn contains(&self, addr: RemoteAddr) -> bool {
        self.addresses.contains(addr)
    }

    /// The object id for the address, or [`ObjectId::INVALID`] if absent.
    #[must_use]
    pub fn get_model_of(&self, addr: RemoteAddr) -> ObjectId {
        self.addresses.get_model_of(addr)
    }

    /// The runner id for the address, if known.
    #[must_use]
    pub fn runner_of(&self, addr: RemoteAddr) -> Option<RunnerId> {
        self.addresses.runner_of(addr)
    }

    /// Record a visible object at the given address.
    ///
    /// Idempotent: a second call with the same address returns the
    /// first-assigned id and leaves the existing object untouched;
    /// `initial` is used only on first observation.
    pub fn observe_object(&mut self, addr: RemoteAddr, initial: VisibleObject) -> ObjectId {
        let existing = self.addresses.get_model_of(addr);
        if !existing.is_invalid() {
            return existing;
        }
        let id = self.state.add_object(initial);
        self.addresses.objects.insert(addr, id);
        id
    }

    /// Record a runner at the given address.
    ///
    /// Same idempotence as [`observe_object`](Self::observe_object); on
    /// first observation the runner's pending transition is seeded from
    /// `first_transition`.
    pub fn observe_runner(
        &mut self,
        addr: RemoteAddr,
        initial: ThreadState,
        first_transition: impl FnOnce(RunnerId) -> Transition,
    ) -> RunnerId {
        if let Some(existing) = self.addresses.runner_of(addr) {
            return existing;
        }
        let id = self.state.add_runner(initial);
        self.state.set_pending(id, first_transition(id));
        self.addresses.runners.insert(addr, id);
        id
    }

    /// Read-only view of the state being decoded into.
    #[must_use]
    pub fn state(&self) -> &ProgramState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::object::MutexObject;

    #[test]
    fn observe_object_is_idempotent() {
        let mut addresses = AddressMap::new();
        let mut state = ProgramState::with_main_thread();
        let addr = RemoteAddr::from_bits(0x1000);

        let mut map = ModelToSystemMap::new(&mut addresses, &mut state);
        let first = map.observe_object(addr, VisibleObject::Mutex(MutexObject::uninitialized()));

        // Second observation carries a different initial state; it must be
        // ignored and the original object left untouched.
        let mut again = MutexObject::uninitialized();
        again.state = crate::model::object::MutexState::Unlocked;
        let second = map.observe_object(addr, VisibleObject::Mutex(again));

        assert_eq!(first, second);
        assert!(matches!(
            state.mutex(first).state,
            crate::model::object::MutexState::Uninitialized
        ));
    }

    #[test]
    fn absent_address_maps_to_invalid() {
        let addresses = AddressMap::new();
        assert!(!addresses.contains(RemoteAddr::from_bits(0x2000)));
        assert!(addresses.get_model_of(RemoteAddr::from_bits(0x2000)).is_invalid());
    }

    #[test]
    fn observe_runner_seeds_first_transition() {
        let mut addresses = AddressMap::new();
        let mut state = ProgramState::with_main_thread();
        let addr = RemoteAddr::from_bits(0x3000);

        let mut map = ModelToSystemMap::new(&mut addresses, &mut state);
        let child = map.observe_runner(addr, ThreadState::Embryo, Transition::thread_start);
        let again = map.observe_runner(addr, ThreadState::Running, Transition::thread_start);

        assert_eq!(child, again);
        assert_eq!(state.runner_count(), 2);
        assert_eq!(
            state.pending(child),
            Some(&Transition::thread_start(child))
        );
        assert_eq!(state.thread(child).state, ThreadState::Embryo);
    }
}
