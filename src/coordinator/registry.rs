//! The transition registry: runtime type id to decode callback.
//!
//! Each intercepted call arrives as a type-id word plus payload; the
//! registry maps the type id to a callback that resolves the payload's
//! remote addresses through the model-to-system map and produces a
//! transition bound to model ids. An unregistered type id is a
//! configuration bug and fatal.

use crate::coordinator::map::ModelToSystemMap;
use crate::model::object::{
    CondObject, MutexObject, SemaphoreObject, ThreadState, VisibleObject,
};
use crate::model::transition::{Op, Transition};
use crate::remote::mailbox::{type_ids, DecodeError, MailboxMessage, RuntimeTypeId};
use crate::types::{ObjectId, RunnerId};
use std::collections::HashMap;

/// Decode callback signature: interpret one mailbox request for the given
/// runner against the current map and state.
pub type DecodeFn =
    fn(RunnerId, &MailboxMessage, &mut ModelToSystemMap<'_>) -> Result<Transition, DecodeError>;

/// Mapping from runtime type id to decode callback.
#[derive(Debug, Default, Clone)]
pub struct TransitionRegistry {
    callbacks: HashMap<RuntimeTypeId, DecodeFn>,
}

impl TransitionRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for a type id, replacing any previous one.
    pub fn register(&mut self, type_id: RuntimeTypeId, callback: DecodeFn) {
        self.callbacks.insert(type_id, callback);
    }

    /// The callback for a type id, if registered.
    #[must_use]
    pub fn get(&self, type_id: RuntimeTypeId) -> Option<DecodeFn> {
        self.callbacks.get(&type_id).copied()
    }

    /// Number of registered type ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    /// True iff nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

/// The registry covering the full wire vocabulary.
#[must_use]
pub fn default_registry() -> TransitionRegistry {
    let mut registry = TransitionRegistry::new();
    registry.register(type_ids::MUTEX_INIT, decode_mutex_init);
    registry.register(type_ids::MUTEX_LOCK, decode_mutex_lock);
    registry.register(type_ids::MUTEX_UNLOCK, decode_mutex_unlock);
    registry.register(type_ids::MUTEX_DESTROY, decode_mutex_destroy);
    registry.register(type_ids::COND_INIT, decode_cond_init);
    registry.register(type_ids::COND_ENQUEUE, decode_cond_enqueue);
    registry.register(type_ids::COND_AWAKE, decode_cond_awake);
    registry.register(type_ids::COND_SIGNAL, decode_cond_signal);
    registry.register(type_ids::COND_BROADCAST, decode_cond_broadcast);
    registry.register(type_ids::COND_DESTROY, decode_cond_destroy);
    registry.register(type_ids::SEM_INIT, decode_sem_init);
    registry.register(type_ids::SEM_WAIT, decode_sem_wait);
    registry.register(type_ids::SEM_POST, decode_sem_post);
    registry.register(type_ids::THREAD_CREATE, decode_thread_create);
    registry.register(type_ids::THREAD_JOIN, decode_thread_join);
    registry.register(type_ids::THREAD_EXIT, decode_thread_exit);
    registry
}

/// Resolve the mutex at payload offset 0, creating it uninitialized on
/// first observation. A primitive first seen through the "wrong" call
/// (say, a lock before any init) is deliberately created uninitialized so
/// that the pending transition's status reports the usage error.
fn mutex_operand(
    msg: &MailboxMessage,
    map: &mut ModelToSystemMap<'_>,
    offset: usize,
) -> Result<ObjectId, DecodeError> {
    let addr = msg.read_addr(offset)?;
    Ok(map.observe_object(addr, VisibleObject::Mutex(MutexObject::uninitialized())))
}

fn cond_operand(
    msg: &MailboxMessage,
    map: &mut ModelToSystemMap<'_>,
) -> Result<ObjectId, DecodeError> {
    let addr = msg.read_addr(0)?;
    Ok(map.observe_object(addr, VisibleObject::Cond(CondObject::uninitialized())))
}

fn sem_operand(
    msg: &MailboxMessage,
    map: &mut ModelToSystemMap<'_>,
) -> Result<ObjectId, DecodeError> {
    let addr = msg.read_addr(0)?;
    Ok(map.observe_object(
        addr,
        VisibleObject::Semaphore(SemaphoreObject::uninitialized()),
    ))
}

fn decode_mutex_init(
    runner: RunnerId,
    msg: &MailboxMessage,
    map: &mut ModelToSystemMap<'_>,
) -> Result<Transition, DecodeError> {
    let mutex = mutex_operand(msg, map, 0)?;
    Ok(Transition::new(runner, Op::MutexInit { mutex }))
}

fn decode_mutex_lock(
    runner: RunnerId,
    msg: &MailboxMessage,
    map: &mut ModelToSystemMap<'_>,
) -> Result<Transition, DecodeError> {
    let mutex = mutex_operand(msg, map, 0)?;
    Ok(Transition::new(runner, Op::MutexLock { mutex }))
}

fn decode_mutex_unlock(
    runner: RunnerId,
    msg: &MailboxMessage,
    map: &mut ModelToSystemMap<'_>,
) -> Result<Transition, DecodeError> {
    let mutex = mutex_operand(msg, map, 0)?;
    Ok(Transition::new(runner, Op::MutexUnlock { mutex }))
}

fn decode_mutex_destroy(
    runner: RunnerId,
    msg: &MailboxMessage,
    map: &mut ModelToSystemMap<'_>,
) -> Result<Transition, DecodeError> {
    let mutex = mutex_operand(msg, map, 0)?;
    Ok(Transition::new(runner, Op::MutexDestroy { mutex }))
}

fn decode_cond_init(
    runner: RunnerId,
    msg: &MailboxMessage,
    map: &mut ModelToSystemMap<'_>,
) -> Result<Transition, DecodeError> {
    let cond = cond_operand(msg, map)?;
    Ok(Transition::new(runner, Op::CondInit { cond }))
}

fn decode_cond_enqueue(
    runner: RunnerId,
    msg: &MailboxMessage,
    map: &mut ModelToSystemMap<'_>,
) -> Result<Transition, DecodeError> {
    let cond = cond_operand(msg, map)?;
    let mutex = mutex_operand(msg, map, 8)?;
    Ok(Transition::new(runner, Op::CondEnqueue { cond, mutex }))
}

fn decode_cond_awake(
    runner: RunnerId,
    msg: &MailboxMessage,
    map: &mut ModelToSystemMap<'_>,
) -> Result<Transition, DecodeError> {
    let cond = cond_operand(msg, map)?;
    let mutex = mutex_operand(msg, map, 8)?;
    Ok(Transition::new(runner, Op::CondAwake { cond, mutex }))
}

fn decode_cond_signal(
    runner: RunnerId,
    msg: &MailboxMessage,
    map: &mut ModelToSystemMap<'_>,
) -> Result<Transition, DecodeError> {
    let cond = cond_operand(msg, map)?;
    Ok(Transition::new(runner, Op::CondSignal { cond }))
}

fn decode_cond_broadcast(
    runner: RunnerId,
    msg: &MailboxMessage,
    map: &mut ModelToSystemMap<'_>,
) -> Result<Transition, DecodeError> {
    let cond = cond_operand(msg, map)?;
    Ok(Transition::new(runner, Op::CondBroadcast { cond }))
}

fn decode_cond_destroy(
    runner: RunnerId,
    msg: &MailboxMessage,
    map: &mut ModelToSystemMap<'_>,
) -> Result<Transition, DecodeError> {
    let cond = cond_operand(msg, map)?;
    Ok(Transition::new(runner, Op::CondDestroy { cond }))
}

fn decode_sem_init(
    runner: RunnerId,
    msg: &MailboxMessage,
    map: &mut ModelToSystemMap<'_>,
) -> Result<Transition, DecodeError> {
    let sem = sem_operand(msg, map)?;
    let count = msg.read_u32(8)?;
    Ok(Transition::new(runner, Op::SemInit { sem, count }))
}

fn decode_sem_wait(
    runner: RunnerId,
    msg: &MailboxMessage,
    map: &mut ModelToSystemMap<'_>,
) -> Result<Transition, DecodeError> {
    let sem = sem_operand(msg, map)?;
    let available = map.state().semaphore(sem).count;
    Ok(Transition::new(runner, Op::SemWait { sem, available }))
}

fn decode_sem_post(
    runner: RunnerId,
    msg: &MailboxMessage,
    map: &mut ModelToSystemMap<'_>,
) -> Result<Transition, DecodeError> {
    let sem = sem_operand(msg, map)?;
    Ok(Transition::new(runner, Op::SemPost { sem }))
}

fn decode_thread_create(
    runner: RunnerId,
    msg: &MailboxMessage,
    map: &mut ModelToSystemMap<'_>,
) -> Result<Transition, DecodeError> {
    let addr = msg.read_addr(0)?;
    let child = map.observe_runner(addr, ThreadState::Embryo, Transition::thread_start);
    Ok(Transition::new(runner, Op::ThreadCreate { child }))
}

fn decode_thread_join(
    runner: RunnerId,
    msg: &MailboxMessage,
    map: &mut ModelToSystemMap<'_>,
) -> Result<Transition, DecodeError> {
    let addr = msg.read_addr(0)?;
    let target = map
        .runner_of(addr)
        .ok_or(DecodeError::UnknownRunner(addr))?;
    Ok(Transition::new(runner, Op::ThreadJoin { target }))
}

fn decode_thread_exit(
    runner: RunnerId,
    _msg: &MailboxMessage,
    _map: &mut ModelToSystemMap<'_>,
) -> Result<Transition, DecodeError> {
    Ok(Transition::new(runner, Op::ThreadExit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::map::AddressMap;
    use crate::model::state::ProgramState;
    use crate::types::RemoteAddr;

    #[test]
    fn default_registry_covers_the_wire_vocabulary() {
        let registry = default_registry();
        assert_eq!(registry.len(), 16);
        assert!(registry.get(type_ids::MUTEX_LOCK).is_some());
        assert!(registry.get(0).is_none());
    }

    #[test]
    fn lock_before_init_decodes_to_an_uninitialized_mutex() {
        let registry = default_registry();
        let mut addresses = AddressMap::new();
        let mut state = ProgramState::with_main_thread();
        let msg = MailboxMessage::with_addr(type_ids::MUTEX_LOCK, RemoteAddr::from_bits(0x10));

        let decode = registry.get(type_ids::MUTEX_LOCK).expect("registered");
        let mut map = ModelToSystemMap::new(&mut addresses, &mut state);
        let t = decode(RunnerId::MAIN, &msg, &mut map).expect("decodes");

        let Op::MutexLock { mutex } = t.op else {
            panic!("expected a mutex lock");
        };
        assert!(matches!(
            state.mutex(mutex).state,
            crate::model::object::MutexState::Uninitialized
        ));
    }

    #[test]
    fn same_address_resolves_to_the_same_object_across_decodes() {
        let registry = default_registry();
        let mut addresses = AddressMap::new();
        let mut state = ProgramState::with_main_thread();
        let addr = RemoteAddr::from_bits(0x20);

        let init = registry.get(type_ids::MUTEX_INIT).expect("registered");
        let lock = registry.get(type_ids::MUTEX_LOCK).expect("registered");

        let a = {
            let mut map = ModelToSystemMap::new(&mut addresses, &mut state);
            init(
                RunnerId::MAIN,
                &MailboxMessage::with_addr(type_ids::MUTEX_INIT, addr),
                &mut map,
            )
            .expect("decodes")
        };
        let b = {
            let mut map = ModelToSystemMap::new(&mut addresses, &mut state);
            lock(
                RunnerId::MAIN,
                &MailboxMessage::with_addr(type_ids::MUTEX_LOCK, addr),
                &mut map,
            )
            .expect("decodes")
        };

        let (Op::MutexInit { mutex: ma }, Op::MutexLock { mutex: mb }) = (a.op, b.op) else {
            panic!("unexpected decode results");
        };
        assert_eq!(ma, mb);
    }

    #[test]
    fn join_on_unknown_thread_is_a_decode_error() {
        let registry = default_registry();
        let mut addresses = AddressMap::new();
        let mut state = ProgramState::with_main_thread();
        let msg = MailboxMessage::with_addr(type_ids::THREAD_JOIN, RemoteAddr::from_bits(0x99));

        let decode = registry.get(type_ids::THREAD_JOIN).expect("registered");
        let mut map = ModelToSystemMap::new(&mut addresses, &mut state);
        assert_eq!(
            decode(RunnerId::MAIN, &msg, &mut map),
            Err(DecodeError::UnknownRunner(RemoteAddr::from_bits(0x99)))
        );
    }
}
