//! The real-world side: mailboxes, processes, and their contracts.
//!
//! Everything the coordinator knows about the target lives here: the
//! shared-memory mailbox protocol ([`mailbox`]), the process source and
//! handle abstractions ([`process`]), the fork+exec source ([`fork`]),
//! and the environment contract with the in-target library ([`env`]).

pub mod env;
pub mod fork;
pub mod mailbox;
pub mod process;

pub use fork::ForkProcessSource;
pub use mailbox::{DecodeError, MailboxMessage, MailboxRegion, RuntimeTypeId, PAYLOAD_SIZE};
pub use process::{ProcessError, ProcessHandle, ProcessSource, SpawnError};
