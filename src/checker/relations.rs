//! The dependency and co-enabled relations between transitions.
//!
//! Both relations are dispatch tables keyed by operation-kind pairs and
//! registered at startup, so cross-variant predicates live in one place
//! instead of being scattered through a class hierarchy. Queries try the
//! exact kind pair (in either order), then single-sided entries that match
//! any partner, then the table default.
//!
//! Structural rules sit above the tables: two transitions of the same
//! runner are always dependent (program order) and never co-enabled (a
//! runner has one pending transition at a time).
//!
//! A condition-variable wait acts on its mutex as well: the enqueue half
//! releases it and the awake half reacquires it, so both participate in
//! the mutex rules for that mutex.

use crate::model::transition::{Op, OpKind, Transition};
use crate::types::ObjectId;
use std::collections::HashMap;

/// A cross-variant predicate over two transitions.
pub type RelationFn = fn(&Transition, &Transition) -> bool;

/// A symmetric relation over transitions, dispatched by operation kind.
#[derive(Debug, Clone)]
pub struct RelationTable {
    pairs: HashMap<(OpKind, OpKind), RelationFn>,
    unary: HashMap<OpKind, RelationFn>,
    default: bool,
}

impl RelationTable {
    /// An empty table answering `default` for unregistered pairs.
    #[must_use]
    pub fn with_default(default: bool) -> Self {
        Self {
            pairs: HashMap::new(),
            unary: HashMap::new(),
            default,
        }
    }

    /// Register a predicate for a kind pair (both orders).
    pub fn register_pair(&mut self, lhs: OpKind, rhs: OpKind, f: RelationFn) {
        self.pairs.insert((lhs, rhs), f);
    }

    /// Register a predicate matching `kind` against any partner. The
    /// registered side is always passed first.
    pub fn register_unary(&mut self, kind: OpKind, f: RelationFn) {
        self.unary.insert(kind, f);
    }

    /// Evaluate the relation for a pair of transitions.
    ///
    /// Exact kind pairs win. Otherwise single-sided verdicts from both
    /// sides are combined so the result stays symmetric: under a `false`
    /// default any single-sided `true` decides (the entries add edges),
    /// under a `true` default any single-sided `false` decides (the
    /// entries remove them).
    #[must_use]
    pub fn query(&self, a: &Transition, b: &Transition) -> bool {
        if let Some(f) = self.pairs.get(&(a.kind(), b.kind())) {
            return f(a, b);
        }
        if let Some(f) = self.pairs.get(&(b.kind(), a.kind())) {
            return f(b, a);
        }
        let from_a = self.unary.get(&a.kind()).map(|f| f(a, b));
        let from_b = self.unary.get(&b.kind()).map(|f| f(b, a));
        match (from_a, from_b) {
            (None, None) => self.default,
            (x, y) if self.default => x.unwrap_or(true) && y.unwrap_or(true),
            (x, y) => x.unwrap_or(false) || y.unwrap_or(false),
        }
    }
}

/// The pair of relation tables the search consults.
#[derive(Debug, Clone)]
pub struct TransitionRelations {
    dependency: RelationTable,
    coenabled: RelationTable,
}

impl TransitionRelations {
    /// The relations for the full transition vocabulary.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            dependency: dependency_relation(),
            coenabled: coenabled_relation(),
        }
    }

    /// True iff reordering the pair may reach non-equivalent results.
    ///
    /// Symmetric, and reflexive on equal transitions (program order makes
    /// every same-runner pair dependent).
    #[must_use]
    pub fn dependent(&self, a: &Transition, b: &Transition) -> bool {
        a.executor == b.executor || self.dependency.query(a, b)
    }

    /// True iff the pair may be simultaneously enabled in some reachable
    /// state. Symmetric; same-runner pairs never are.
    #[must_use]
    pub fn coenabled(&self, a: &Transition, b: &Transition) -> bool {
        a.executor != b.executor && self.coenabled.query(a, b)
    }
}

/// How a transition acts on a mutex, if it does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MutexAction {
    Init,
    Lock,
    Unlock,
    Destroy,
}

fn mutex_action(t: &Transition) -> Option<(MutexAction, ObjectId)> {
    match t.op {
        Op::MutexInit { mutex } => Some((MutexAction::Init, mutex)),
        Op::MutexLock { mutex } => Some((MutexAction::Lock, mutex)),
        Op::MutexUnlock { mutex } => Some((MutexAction::Unlock, mutex)),
        Op::MutexDestroy { mutex } => Some((MutexAction::Destroy, mutex)),
        // A wait releases the mutex going to sleep and reacquires it on
        // the way back.
        Op::CondEnqueue { mutex, .. } => Some((MutexAction::Unlock, mutex)),
        Op::CondAwake { mutex, .. } => Some((MutexAction::Lock, mutex)),
        _ => None,
    }
}

fn cond_of(t: &Transition) -> Option<ObjectId> {
    match t.op {
        Op::CondInit { cond }
        | Op::CondEnqueue { cond, .. }
        | Op::CondAwake { cond, .. }
        | Op::CondSignal { cond }
        | Op::CondBroadcast { cond }
        | Op::CondDestroy { cond } => Some(cond),
        _ => None,
    }
}

fn same_cond(a: &Transition, b: &Transition) -> bool {
    matches!((cond_of(a), cond_of(b)), (Some(x), Some(y)) if x == y)
}

/// Operation kinds that act on a mutex or a condition variable.
const SYNC_KINDS: [OpKind; 10] = [
    OpKind::MutexInit,
    OpKind::MutexLock,
    OpKind::MutexUnlock,
    OpKind::MutexDestroy,
    OpKind::CondInit,
    OpKind::CondEnqueue,
    OpKind::CondAwake,
    OpKind::CondSignal,
    OpKind::CondBroadcast,
    OpKind::CondDestroy,
];

const SEM_KINDS: [OpKind; 3] = [OpKind::SemInit, OpKind::SemWait, OpKind::SemPost];

fn sync_pair_dependent(a: &Transition, b: &Transition) -> bool {
    if same_cond(a, b) {
        return true;
    }
    if let (Some((act_a, m_a)), Some((act_b, m_b))) = (mutex_action(a), mutex_action(b)) {
        if m_a == m_b {
            // Two inits commute, as do two unlocks; everything else on the
            // same mutex can change outcomes when swapped.
            let both = (act_a, act_b);
            return both != (MutexAction::Init, MutexAction::Init)
                && both != (MutexAction::Unlock, MutexAction::Unlock);
        }
    }
    false
}

fn sync_pair_coenabled(a: &Transition, b: &Transition) -> bool {
    // Only one waiter can hold the mutex at enqueue time.
    if same_cond(a, b)
        && a.kind() == OpKind::CondEnqueue
        && b.kind() == OpKind::CondEnqueue
    {
        return false;
    }
    if let (Some((act_a, m_a)), Some((act_b, m_b))) = (mutex_action(a), mutex_action(b)) {
        if m_a == m_b {
            // An unlock needs the mutex held by its executor; every other
            // action on the same mutex needs it free.
            return act_a != MutexAction::Unlock && act_b != MutexAction::Unlock;
        }
    }
    true
}

fn sem_of(t: &Transition) -> Option<ObjectId> {
    match t.op {
        Op::SemInit { sem, .. } | Op::SemWait { sem, .. } | Op::SemPost { sem } => Some(sem),
        _ => None,
    }
}

fn sem_pair_dependent(a: &Transition, b: &Transition) -> bool {
    match (sem_of(a), sem_of(b)) {
        (Some(x), Some(y)) if x == y => {}
        _ => return false,
    }
    match (&a.op, &b.op) {
        // Both decrements succeed regardless of order when two permits
        // were available; otherwise the order decides who blocks.
        (Op::SemWait { available: x, .. }, Op::SemWait { available: y, .. }) => *x < 2 || *y < 2,
        // Increments commute.
        (Op::SemPost { .. }, Op::SemPost { .. }) => false,
        (Op::SemInit { .. }, Op::SemInit { .. }) => false,
        _ => true,
    }
}

fn create_dependent(create: &Transition, other: &Transition) -> bool {
    // Creation happens-before everything the child executes.
    matches!(create.op, Op::ThreadCreate { child } if child == other.executor)
}

fn join_dependent(join: &Transition, other: &Transition) -> bool {
    matches!(join.op, Op::ThreadJoin { target }
        if target == other.executor && matches!(other.op, Op::ThreadExit))
}

fn create_coenabled(create: &Transition, other: &Transition) -> bool {
    // The child is not yet running while its creation is pending.
    !matches!(create.op, Op::ThreadCreate { child } if child == other.executor)
}

fn join_coenabled(join: &Transition, other: &Transition) -> bool {
    // A join is enabled only once the target is finished, at which point
    // the target has no transitions left.
    !matches!(join.op, Op::ThreadJoin { target } if target == other.executor)
}

/// The dependency relation of the transition vocabulary.
#[must_use]
pub fn dependency_relation() -> RelationTable {
    let mut table = RelationTable::with_default(false);
    for lhs in SYNC_KINDS {
        for rhs in SYNC_KINDS {
            table.register_pair(lhs, rhs, sync_pair_dependent);
        }
    }
    for lhs in SEM_KINDS {
        for rhs in SEM_KINDS {
            table.register_pair(lhs, rhs, sem_pair_dependent);
        }
    }
    table.register_unary(OpKind::ThreadCreate, create_dependent);
    table.register_unary(OpKind::ThreadJoin, join_dependent);
    table
}

/// The co-enabled relation of the transition vocabulary.
#[must_use]
pub fn coenabled_relation() -> RelationTable {
    let mut table = RelationTable::with_default(true);
    for lhs in SYNC_KINDS {
        for rhs in SYNC_KINDS {
            table.register_pair(lhs, rhs, sync_pair_coenabled);
        }
    }
    table.register_unary(OpKind::ThreadCreate, create_coenabled);
    table.register_unary(OpKind::ThreadJoin, join_coenabled);
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RunnerId;

    fn lock(r: u32, m: u32) -> Transition {
        Transition::new(
            RunnerId::new(r),
            Op::MutexLock {
                mutex: ObjectId::new(m),
            },
        )
    }

    fn unlock(r: u32, m: u32) -> Transition {
        Transition::new(
            RunnerId::new(r),
            Op::MutexUnlock {
                mutex: ObjectId::new(m),
            },
        )
    }

    #[test]
    fn locks_on_the_same_mutex_are_dependent_and_coenabled() {
        let rel = TransitionRelations::standard();
        let a = lock(1, 0);
        let b = lock(2, 0);
        assert!(rel.dependent(&a, &b));
        assert!(rel.coenabled(&a, &b));
    }

    #[test]
    fn locks_on_distinct_mutexes_are_independent() {
        let rel = TransitionRelations::standard();
        assert!(!rel.dependent(&lock(1, 0), &lock(2, 1)));
    }

    #[test]
    fn lock_and_unlock_are_dependent_but_not_coenabled() {
        let rel = TransitionRelations::standard();
        let a = lock(1, 0);
        let b = unlock(2, 0);
        assert!(rel.dependent(&a, &b));
        assert!(!rel.coenabled(&a, &b));
    }

    #[test]
    fn relations_are_symmetric() {
        let rel = TransitionRelations::standard();
        let cases = [
            (lock(1, 0), unlock(2, 0)),
            (lock(1, 0), lock(2, 0)),
            (
                Transition::new(RunnerId::new(1), Op::ThreadCreate { child: RunnerId::new(2) }),
                Transition::new(RunnerId::new(2), Op::ThreadStart),
            ),
            (
                Transition::new(RunnerId::new(1), Op::ThreadJoin { target: RunnerId::new(2) }),
                Transition::new(RunnerId::new(2), Op::ThreadExit),
            ),
            (
                Transition::new(
                    RunnerId::new(1),
                    Op::SemWait {
                        sem: ObjectId::new(0),
                        available: 1,
                    },
                ),
                Transition::new(RunnerId::new(2), Op::SemPost { sem: ObjectId::new(0) }),
            ),
            // Both sides carry single-sided entries: a create whose child
            // itself executes a join.
            (
                Transition::new(RunnerId::new(1), Op::ThreadCreate { child: RunnerId::new(2) }),
                Transition::new(RunnerId::new(2), Op::ThreadJoin { target: RunnerId::MAIN }),
            ),
        ];
        for (a, b) in &cases {
            assert_eq!(rel.dependent(a, b), rel.dependent(b, a), "{a} / {b}");
            assert_eq!(rel.coenabled(a, b), rel.coenabled(b, a), "{a} / {b}");
        }
    }

    #[test]
    fn dependent_is_reflexive_on_equal_transitions() {
        let rel = TransitionRelations::standard();
        let t = lock(1, 0);
        assert!(rel.dependent(&t, &t.clone()));
    }

    #[test]
    fn create_is_dependent_with_everything_the_child_runs() {
        let rel = TransitionRelations::standard();
        let create = Transition::new(RunnerId::MAIN, Op::ThreadCreate { child: RunnerId::new(1) });
        let child_step = lock(1, 0);
        let stranger_step = lock(2, 0);
        assert!(rel.dependent(&create, &child_step));
        assert!(!rel.dependent(&create, &stranger_step));
        assert!(!rel.coenabled(&create, &child_step));
        assert!(rel.coenabled(&create, &stranger_step));
    }

    #[test]
    fn join_depends_on_the_targets_exit_only() {
        let rel = TransitionRelations::standard();
        let join = Transition::new(RunnerId::MAIN, Op::ThreadJoin { target: RunnerId::new(1) });
        let exit = Transition::new(RunnerId::new(1), Op::ThreadExit);
        let other_exit = Transition::new(RunnerId::new(2), Op::ThreadExit);
        assert!(rel.dependent(&join, &exit));
        assert!(!rel.dependent(&join, &other_exit));
        assert!(!rel.coenabled(&join, &exit));
    }

    #[test]
    fn sem_waits_with_two_permits_available_are_independent() {
        let rel = TransitionRelations::standard();
        let wait = |r, avail| {
            Transition::new(
                RunnerId::new(r),
                Op::SemWait {
                    sem: ObjectId::new(0),
                    available: avail,
                },
            )
        };
        assert!(rel.dependent(&wait(1, 1), &wait(2, 1)));
        assert!(!rel.dependent(&wait(1, 2), &wait(2, 2)));
    }

    #[test]
    fn cond_ops_on_same_variable_are_dependent_cross_variable_independent() {
        let rel = TransitionRelations::standard();
        let signal = |r, c| {
            Transition::new(RunnerId::new(r), Op::CondSignal { cond: ObjectId::new(c) })
        };
        let enqueue = |r, c, m| {
            Transition::new(
                RunnerId::new(r),
                Op::CondEnqueue {
                    cond: ObjectId::new(c),
                    mutex: ObjectId::new(m),
                },
            )
        };
        assert!(rel.dependent(&signal(1, 5), &enqueue(2, 5, 0)));
        assert!(!rel.dependent(&signal(1, 5), &signal(2, 6)));
        assert!(!rel.coenabled(&enqueue(1, 5, 0), &enqueue(2, 5, 0)));
    }

    #[test]
    fn cond_wait_acts_on_its_mutex() {
        let rel = TransitionRelations::standard();
        let enqueue = Transition::new(
            RunnerId::new(1),
            Op::CondEnqueue {
                cond: ObjectId::new(5),
                mutex: ObjectId::new(0),
            },
        );
        let awake = Transition::new(
            RunnerId::new(1),
            Op::CondAwake {
                cond: ObjectId::new(5),
                mutex: ObjectId::new(0),
            },
        );
        // Enqueue releases mutex 0: dependent with a lock of it, and not
        // co-enabled with it (enqueue holds the mutex).
        assert!(rel.dependent(&enqueue, &lock(2, 0)));
        assert!(!rel.coenabled(&enqueue, &lock(2, 0)));
        // Awake reacquires mutex 0: races other lockers.
        assert!(rel.dependent(&awake, &lock(2, 0)));
        assert!(rel.coenabled(&awake, &lock(2, 0)));
    }
}
