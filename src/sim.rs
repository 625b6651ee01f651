//! A scripted in-process target simulator.
//!
//! `SimProcessSource` implements [`ProcessSource`] over a set of
//! per-thread scripts, standing in for a real forked target the way a
//! deterministic lab environment stands in for a real one. Each simulated
//! process follows the interposition protocol exactly: a released runner
//! completes its previously announced call, advances to its next
//! interception point, and announces the next request through the real
//! wire encoding. No synchronization semantics live here; the model
//! decides what is enabled, so a released runner never actually blocks.
//!
//! Scripts address primitives by small symbolic keys; the simulator
//! translates them to fixed fake remote addresses, identical across
//! re-executions, which is exactly the stable-handle assumption the
//! coordinator's address map relies on.

use crate::remote::mailbox::{type_ids, MailboxMessage};
use crate::remote::process::{ProcessError, ProcessHandle, ProcessSource, SpawnError};
use crate::types::{RemoteAddr, RunnerId};
use std::collections::HashMap;
use std::io;
use std::sync::Arc;

/// One scripted synchronization call.
///
/// Primitive keys (`u32`) are per-kind namespaces: mutex 0 and semaphore 0
/// are distinct objects. `Spawn`/`Join` refer to scripts by index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimOp {
    /// `pthread_mutex_init`.
    MutexInit(u32),
    /// `pthread_mutex_lock`.
    MutexLock(u32),
    /// `pthread_mutex_unlock`.
    MutexUnlock(u32),
    /// `pthread_mutex_destroy`.
    MutexDestroy(u32),
    /// `pthread_cond_init`.
    CondInit(u32),
    /// `pthread_cond_wait` (expands to the enqueue and awake halves).
    CondWait {
        /// Condition-variable key.
        cond: u32,
        /// Associated mutex key.
        mutex: u32,
    },
    /// `pthread_cond_signal`.
    CondSignal(u32),
    /// `pthread_cond_broadcast`.
    CondBroadcast(u32),
    /// `pthread_cond_destroy`.
    CondDestroy(u32),
    /// `sem_init` with an initial count.
    SemInit(u32, u32),
    /// `sem_wait`.
    SemWait(u32),
    /// `sem_post`.
    SemPost(u32),
    /// `pthread_create` of the script with the given index.
    Spawn(usize),
    /// `pthread_join` on the thread running the given script.
    Join(usize),
}

/// One wire announcement a simulated runner will make.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SimEvent {
    Message(SimOp),
    CondEnqueue { cond: u32, mutex: u32 },
    CondAwake { cond: u32, mutex: u32 },
    Exit,
}

/// A multithreaded test program as per-thread scripts. Script 0 is the
/// main thread.
#[derive(Debug, Clone)]
pub struct SimProgram {
    events: Vec<Vec<SimEvent>>,
}

impl SimProgram {
    /// Build a program from per-thread scripts. Every script implicitly
    /// ends with a thread exit.
    #[must_use]
    pub fn new(scripts: Vec<Vec<SimOp>>) -> Self {
        let events = scripts
            .into_iter()
            .map(|script| {
                let mut events = Vec::with_capacity(script.len() + 1);
                for op in script {
                    match op {
                        SimOp::CondWait { cond, mutex } => {
                            events.push(SimEvent::CondEnqueue { cond, mutex });
                            events.push(SimEvent::CondAwake { cond, mutex });
                        }
                        other => events.push(SimEvent::Message(other)),
                    }
                }
                events.push(SimEvent::Exit);
                events
            })
            .collect();
        Self { events }
    }

    /// Number of scripts (threads the program can create, main included).
    #[must_use]
    pub fn script_count(&self) -> usize {
        self.events.len()
    }
}

fn mutex_addr(key: u32) -> RemoteAddr {
    RemoteAddr::from_bits(0x6000_0000 + u64::from(key) * 16)
}

fn cond_addr(key: u32) -> RemoteAddr {
    RemoteAddr::from_bits(0x7000_0000 + u64::from(key) * 16)
}

fn sem_addr(key: u32) -> RemoteAddr {
    RemoteAddr::from_bits(0x5000_0000 + u64::from(key) * 16)
}

fn thread_addr(runner_index: usize) -> RemoteAddr {
    RemoteAddr::from_bits(0xa000_0000 + runner_index as u64 * 0x100)
}

/// A [`ProcessSource`] producing simulated processes of one program.
#[derive(Debug, Clone)]
pub struct SimProcessSource {
    program: Arc<SimProgram>,
}

impl SimProcessSource {
    /// A source for the given program.
    #[must_use]
    pub fn new(program: SimProgram) -> Self {
        Self {
            program: Arc::new(program),
        }
    }
}

impl ProcessSource for SimProcessSource {
    fn force_new_process(&mut self) -> Result<Box<dyn ProcessHandle>, SpawnError> {
        if self.program.script_count() == 0 {
            return Err(SpawnError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "simulated program has no main script",
            )));
        }
        Ok(Box::new(SimProcessHandle {
            program: Arc::clone(&self.program),
            runner_script: vec![0],
            pc: vec![0],
            script_runner: HashMap::from([(0usize, 0usize)]),
        }))
    }
}

/// One live simulated process: per-runner program counters only.
#[derive(Debug)]
struct SimProcessHandle {
    program: Arc<SimProgram>,
    /// Which script each live runner executes, in creation order.
    runner_script: Vec<usize>,
    /// Per-runner index of the next announcement.
    pc: Vec<usize>,
    /// Script index to the runner most recently spawned from it.
    script_runner: HashMap<usize, usize>,
}

impl SimProcessHandle {
    fn encode(&mut self, event: SimEvent) -> Result<MailboxMessage, ProcessError> {
        let msg = match event {
            SimEvent::Message(op) => match op {
                SimOp::MutexInit(m) => {
                    MailboxMessage::with_addr(type_ids::MUTEX_INIT, mutex_addr(m))
                }
                SimOp::MutexLock(m) => {
                    MailboxMessage::with_addr(type_ids::MUTEX_LOCK, mutex_addr(m))
                }
                SimOp::MutexUnlock(m) => {
                    MailboxMessage::with_addr(type_ids::MUTEX_UNLOCK, mutex_addr(m))
                }
                SimOp::MutexDestroy(m) => {
                    MailboxMessage::with_addr(type_ids::MUTEX_DESTROY, mutex_addr(m))
                }
                SimOp::CondInit(c) => MailboxMessage::with_addr(type_ids::COND_INIT, cond_addr(c)),
                SimOp::CondSignal(c) => {
                    MailboxMessage::with_addr(type_ids::COND_SIGNAL, cond_addr(c))
                }
                SimOp::CondBroadcast(c) => {
                    MailboxMessage::with_addr(type_ids::COND_BROADCAST, cond_addr(c))
                }
                SimOp::CondDestroy(c) => {
                    MailboxMessage::with_addr(type_ids::COND_DESTROY, cond_addr(c))
                }
                SimOp::SemInit(s, count) => {
                    MailboxMessage::with_addr_count(type_ids::SEM_INIT, sem_addr(s), count)
                }
                SimOp::SemWait(s) => MailboxMessage::with_addr(type_ids::SEM_WAIT, sem_addr(s)),
                SimOp::SemPost(s) => MailboxMessage::with_addr(type_ids::SEM_POST, sem_addr(s)),
                SimOp::Spawn(script) => {
                    if script >= self.program.script_count() {
                        return Err(bad_script(script));
                    }
                    // pthread_create has run: the child exists, parked
                    // before its start transition.
                    let child = self.runner_script.len();
                    self.runner_script.push(script);
                    self.pc.push(0);
                    self.script_runner.insert(script, child);
                    MailboxMessage::with_addr(type_ids::THREAD_CREATE, thread_addr(child))
                }
                SimOp::Join(script) => {
                    let Some(&target) = self.script_runner.get(&script) else {
                        return Err(bad_script(script));
                    };
                    MailboxMessage::with_addr(type_ids::THREAD_JOIN, thread_addr(target))
                }
                SimOp::CondWait { .. } => unreachable!("expanded at program construction"),
            },
            SimEvent::CondEnqueue { cond, mutex } => MailboxMessage::with_addr_pair(
                type_ids::COND_ENQUEUE,
                cond_addr(cond),
                mutex_addr(mutex),
            ),
            SimEvent::CondAwake { cond, mutex } => MailboxMessage::with_addr_pair(
                type_ids::COND_AWAKE,
                cond_addr(cond),
                mutex_addr(mutex),
            ),
            SimEvent::Exit => MailboxMessage::empty(type_ids::THREAD_EXIT),
        };
        Ok(msg)
    }
}

fn bad_script(script: usize) -> ProcessError {
    ProcessError::Io(io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("script {script} is not available at this point"),
    ))
}

impl ProcessHandle for SimProcessHandle {
    fn execute_runner(&mut self, runner: RunnerId) -> Result<MailboxMessage, ProcessError> {
        let Some(&script) = self.runner_script.get(runner.index()) else {
            return Err(ProcessError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("runner {runner} was never created"),
            )));
        };
        let next = self.pc[runner.index()];
        if next >= self.program.events[script].len() {
            // The runner is completing its exit. Main exiting takes the
            // whole process with it; a dying worker posts "done" one last
            // time and the stale announcement is ignored.
            if runner.is_main() {
                return Err(ProcessError::DeadProcess);
            }
            return Ok(MailboxMessage::empty(type_ids::THREAD_EXIT));
        }
        self.pc[runner.index()] = next + 1;
        let event = self.program.events[script][next];
        self.encode(event)
    }
}
