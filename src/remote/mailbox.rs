#![allow(unsafe_code)]
//! The mailbox: wire format and shared region.
//!
//! This module uses unsafe code for POSIX shared memory (`shm_open`/`mmap`)
//! and process-shared semaphores (`sem_init`/`sem_post`/`sem_timedwait`).
//!
//! One mailbox slot exists per runner. Each slot is a fixed-size record:
//! a pair of semaphores forming a ping-pong (the coordinator posts "go",
//! the runner posts "done"), a type-id word, and a bounded opaque payload.
//! The coordinator never reads the payload until "done" has been observed,
//! and by construction at most one side writes the slot at a time. A
//! runner released to complete its thread exit posts "done" one final
//! time before terminating, so the coordinator's wait always returns
//! (except for the main thread, whose exit ends the process).
//!
//! Payloads are packed little-endian. Mutex operations carry one
//! remote-address-sized field (the `pthread_mutex_t*`); condition-variable
//! waits carry the variable's address and the associated mutex address;
//! `sem_init` carries the semaphore address and the initial count;
//! `pthread_create`/`pthread_join` carry the relevant `pthread_t` value.

use crate::types::{RemoteAddr, RunnerId};
use std::ffi::CString;
use std::io;
use std::time::Duration;

/// The registry key carried in the mailbox type-id word.
pub type RuntimeTypeId = u32;

/// Size of the opaque payload buffer, in bytes.
pub const PAYLOAD_SIZE: usize = 16;

/// Runtime type ids of the wire protocol.
///
/// `thread_start` never crosses the wire: the model seeds it for every
/// freshly observed runner.
pub mod type_ids {
    use super::RuntimeTypeId;

    /// `pthread_mutex_init`.
    pub const MUTEX_INIT: RuntimeTypeId = 1;
    /// `pthread_mutex_lock`.
    pub const MUTEX_LOCK: RuntimeTypeId = 2;
    /// `pthread_mutex_unlock`.
    pub const MUTEX_UNLOCK: RuntimeTypeId = 3;
    /// `pthread_mutex_destroy`.
    pub const MUTEX_DESTROY: RuntimeTypeId = 4;
    /// `pthread_cond_init`.
    pub const COND_INIT: RuntimeTypeId = 5;
    /// First half of `pthread_cond_wait` (enqueue, release mutex).
    pub const COND_ENQUEUE: RuntimeTypeId = 6;
    /// Second half of `pthread_cond_wait` (wake, reacquire mutex).
    pub const COND_AWAKE: RuntimeTypeId = 7;
    /// `pthread_cond_signal`.
    pub const COND_SIGNAL: RuntimeTypeId = 8;
    /// `pthread_cond_broadcast`.
    pub const COND_BROADCAST: RuntimeTypeId = 9;
    /// `pthread_cond_destroy`.
    pub const COND_DESTROY: RuntimeTypeId = 10;
    /// `sem_init`.
    pub const SEM_INIT: RuntimeTypeId = 11;
    /// `sem_wait`.
    pub const SEM_WAIT: RuntimeTypeId = 12;
    /// `sem_post`.
    pub const SEM_POST: RuntimeTypeId = 13;
    /// `pthread_create`.
    pub const THREAD_CREATE: RuntimeTypeId = 14;
    /// `pthread_join`.
    pub const THREAD_JOIN: RuntimeTypeId = 15;
    /// Thread exit.
    pub const THREAD_EXIT: RuntimeTypeId = 16;
}

/// A decoded-ready copy of one mailbox slot's request.
///
/// The region hands these out by value so the caller never holds a
/// reference into shared memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxMessage {
    /// Registry key identifying the announced operation.
    pub type_id: RuntimeTypeId,
    /// Operation-specific packed payload.
    pub payload: [u8; PAYLOAD_SIZE],
}

/// Failure to interpret a mailbox payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// An object-address field was zero.
    #[error("request with type id {type_id} carries a null object address")]
    NullAddress {
        /// The announced type id.
        type_id: RuntimeTypeId,
    },
    /// A payload field extends past the payload buffer.
    #[error("request with type id {type_id} needs {needed} payload bytes, buffer has {have}")]
    ShortPayload {
        /// The announced type id.
        type_id: RuntimeTypeId,
        /// Bytes the field layout requires.
        needed: usize,
        /// Bytes the buffer provides.
        have: usize,
    },
    /// A `pthread_join` named a `pthread_t` no `pthread_create` announced.
    #[error("no runner is known at remote address {0}")]
    UnknownRunner(RemoteAddr),
}

impl MailboxMessage {
    /// A message with an empty payload.
    #[must_use]
    pub const fn empty(type_id: RuntimeTypeId) -> Self {
        Self {
            type_id,
            payload: [0; PAYLOAD_SIZE],
        }
    }

    /// A message whose payload is a single remote address.
    #[must_use]
    pub fn with_addr(type_id: RuntimeTypeId, addr: RemoteAddr) -> Self {
        let mut msg = Self::empty(type_id);
        msg.payload[0..8].copy_from_slice(&addr.bits().to_le_bytes());
        msg
    }

    /// A message whose payload is two remote addresses.
    #[must_use]
    pub fn with_addr_pair(type_id: RuntimeTypeId, first: RemoteAddr, second: RemoteAddr) -> Self {
        let mut msg = Self::with_addr(type_id, first);
        msg.payload[8..16].copy_from_slice(&second.bits().to_le_bytes());
        msg
    }

    /// A message whose payload is a remote address and a count.
    #[must_use]
    pub fn with_addr_count(type_id: RuntimeTypeId, addr: RemoteAddr, count: u32) -> Self {
        let mut msg = Self::with_addr(type_id, addr);
        msg.payload[8..12].copy_from_slice(&count.to_le_bytes());
        msg
    }

    /// Read a remote address field at the given payload offset.
    ///
    /// # Errors
    ///
    /// `ShortPayload` if the field does not fit, `NullAddress` if it is
    /// zero (no live primitive has address zero).
    pub fn read_addr(&self, offset: usize) -> Result<RemoteAddr, DecodeError> {
        let bytes = self.field(offset, 8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        let addr = RemoteAddr::from_bits(u64::from_le_bytes(raw));
        if addr.is_null() {
            return Err(DecodeError::NullAddress {
                type_id: self.type_id,
            });
        }
        Ok(addr)
    }

    /// Read an unsigned 32-bit field at the given payload offset.
    ///
    /// # Errors
    ///
    /// `ShortPayload` if the field does not fit.
    pub fn read_u32(&self, offset: usize) -> Result<u32, DecodeError> {
        let bytes = self.field(offset, 4)?;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(bytes);
        Ok(u32::from_le_bytes(raw))
    }

    fn field(&self, offset: usize, len: usize) -> Result<&[u8], DecodeError> {
        let end = offset.checked_add(len).unwrap_or(usize::MAX);
        if end > PAYLOAD_SIZE {
            return Err(DecodeError::ShortPayload {
                type_id: self.type_id,
                needed: end,
                have: PAYLOAD_SIZE,
            });
        }
        Ok(&self.payload[offset..end])
    }
}

/// One mailbox slot as laid out in shared memory.
#[repr(C)]
struct RawMailbox {
    /// Posted by the coordinator to release the runner.
    go: libc::sem_t,
    /// Posted by the runner once the next request is in place.
    done: libc::sem_t,
    type_id: RuntimeTypeId,
    payload: [u8; PAYLOAD_SIZE],
}

/// The mmap'd shared region holding one mailbox slot per runner.
///
/// Created (and unlinked on drop) by the coordinator side; the in-target
/// library opens it by name from [`crate::remote::env::ENV_SHM_NAME`].
#[derive(Debug)]
pub struct MailboxRegion {
    base: *mut RawMailbox,
    slots: usize,
    name: CString,
}

impl MailboxRegion {
    /// Create and map a fresh region with the given number of slots.
    ///
    /// # Errors
    ///
    /// Any failure of `shm_open`, `ftruncate`, or `mmap`.
    pub fn create(name: &str, slots: usize) -> io::Result<Self> {
        let c_name = CString::new(name).map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
        let byte_len = slots
            .checked_mul(std::mem::size_of::<RawMailbox>())
            .ok_or_else(|| io::Error::from(io::ErrorKind::InvalidInput))?;

        let fd = unsafe {
            libc::shm_open(
                c_name.as_ptr(),
                libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
                0o600 as libc::mode_t,
            )
        };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        let result = unsafe { libc::ftruncate(fd, byte_len as libc::off_t) };
        if result < 0 {
            let err = io::Error::last_os_error();
            unsafe {
                libc::close(fd);
                libc::shm_unlink(c_name.as_ptr());
            }
            return Err(err);
        }

        let base = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                byte_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        unsafe { libc::close(fd) };
        if base == libc::MAP_FAILED {
            let err = io::Error::last_os_error();
            unsafe { libc::shm_unlink(c_name.as_ptr()) };
            return Err(err);
        }

        let region = Self {
            base: base.cast::<RawMailbox>(),
            slots,
            name: c_name,
        };

        for slot in 0..slots {
            let raw = region.slot(RunnerId::new(slot as u32));
            unsafe {
                libc::sem_init(std::ptr::addr_of_mut!((*raw).go), 1, 0);
                libc::sem_init(std::ptr::addr_of_mut!((*raw).done), 1, 0);
            }
        }

        Ok(region)
    }

    /// Number of runner slots in the region.
    #[must_use]
    pub fn slots(&self) -> usize {
        self.slots
    }

    /// The shared-memory object name, for the target's environment.
    #[must_use]
    pub fn name(&self) -> &str {
        // Constructed from a &str in `create`.
        self.name.to_str().unwrap_or("")
    }

    fn slot(&self, runner: RunnerId) -> *mut RawMailbox {
        debug_assert!(runner.index() < self.slots);
        unsafe { self.base.add(runner.index()) }
    }

    /// Release the runner to execute up to its next interception point.
    pub fn post_go(&self, runner: RunnerId) {
        unsafe {
            libc::sem_post(std::ptr::addr_of_mut!((*self.slot(runner)).go));
        }
    }

    /// Wait for the runner to post "done", then copy out its request.
    ///
    /// # Errors
    ///
    /// `io::ErrorKind::TimedOut` when the configured timeout elapses; any
    /// other semaphore failure is passed through.
    pub fn wait_done(
        &self,
        runner: RunnerId,
        timeout: Option<Duration>,
    ) -> io::Result<MailboxMessage> {
        let raw = self.slot(runner);
        let done = unsafe { std::ptr::addr_of_mut!((*raw).done) };

        loop {
            let rc = match timeout {
                None => unsafe { libc::sem_wait(done) },
                Some(limit) => {
                    let deadline = absolute_deadline(limit)?;
                    unsafe { libc::sem_timedwait(done, &deadline) }
                }
            };
            if rc == 0 {
                break;
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) => continue,
                Some(libc::ETIMEDOUT) => return Err(io::ErrorKind::TimedOut.into()),
                _ => return Err(err),
            }
        }

        let type_id = unsafe { std::ptr::addr_of!((*raw).type_id).read_volatile() };
        let payload = unsafe { std::ptr::addr_of!((*raw).payload).read_volatile() };
        Ok(MailboxMessage { type_id, payload })
    }
}

impl Drop for MailboxRegion {
    fn drop(&mut self) {
        let byte_len = self.slots * std::mem::size_of::<RawMailbox>();
        unsafe {
            libc::munmap(self.base.cast::<libc::c_void>(), byte_len);
            libc::shm_unlink(self.name.as_ptr());
        }
    }
}

fn absolute_deadline(timeout: Duration) -> io::Result<libc::timespec> {
    let mut now = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut now) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    let mut sec = now.tv_sec + timeout.as_secs() as libc::time_t;
    let mut nsec = now.tv_nsec + libc::c_long::from(timeout.subsec_nanos());
    if nsec >= 1_000_000_000 {
        sec += 1;
        nsec -= 1_000_000_000;
    }
    Ok(libc::timespec {
        tv_sec: sec,
        tv_nsec: nsec,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addr_fields_round_trip_little_endian() {
        let msg = MailboxMessage::with_addr_pair(
            type_ids::COND_ENQUEUE,
            RemoteAddr::from_bits(0x1122_3344_5566_7788),
            RemoteAddr::from_bits(0xaabb),
        );
        assert_eq!(msg.payload[0], 0x88);
        assert_eq!(
            msg.read_addr(0).expect("first addr"),
            RemoteAddr::from_bits(0x1122_3344_5566_7788)
        );
        assert_eq!(
            msg.read_addr(8).expect("second addr"),
            RemoteAddr::from_bits(0xaabb)
        );
    }

    #[test]
    fn null_address_is_rejected() {
        let msg = MailboxMessage::empty(type_ids::MUTEX_LOCK);
        assert_eq!(
            msg.read_addr(0),
            Err(DecodeError::NullAddress {
                type_id: type_ids::MUTEX_LOCK
            })
        );
    }

    #[test]
    fn out_of_bounds_field_is_a_shape_error() {
        let msg = MailboxMessage::empty(type_ids::SEM_INIT);
        assert!(matches!(
            msg.read_addr(12),
            Err(DecodeError::ShortPayload { .. })
        ));
    }

    #[test]
    fn sem_init_payload_carries_count() {
        let msg = MailboxMessage::with_addr_count(
            type_ids::SEM_INIT,
            RemoteAddr::from_bits(0x40),
            3,
        );
        assert_eq!(msg.read_u32(8).expect("count"), 3);
    }

    #[test]
    fn region_ping_pong_round_trips() {
        let name = format!("/mcmini-test-{}", std::process::id());
        let region = MailboxRegion::create(&name, 2).expect("create region");
        assert_eq!(region.slots(), 2);

        // Simulate the runner side: post done for slot 1, then observe it.
        let raw = region.slot(RunnerId::new(1));
        unsafe {
            std::ptr::addr_of_mut!((*raw).type_id).write_volatile(type_ids::MUTEX_INIT);
            let payload = MailboxMessage::with_addr(
                type_ids::MUTEX_INIT,
                RemoteAddr::from_bits(0x1000),
            )
            .payload;
            std::ptr::addr_of_mut!((*raw).payload).write_volatile(payload);
            libc::sem_post(std::ptr::addr_of_mut!((*raw).done));
        }

        let msg = region
            .wait_done(RunnerId::new(1), Some(Duration::from_secs(1)))
            .expect("done posted");
        assert_eq!(msg.type_id, type_ids::MUTEX_INIT);
        assert_eq!(msg.read_addr(0).expect("addr"), RemoteAddr::from_bits(0x1000));
    }

    #[test]
    fn wait_done_times_out_when_nothing_posts() {
        let name = format!("/mcmini-timeout-{}", std::process::id());
        let region = MailboxRegion::create(&name, 1).expect("create region");
        let err = region
            .wait_done(RunnerId::MAIN, Some(Duration::from_millis(50)))
            .expect_err("nothing posted");
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }
}
