//! shmbox - Cross-process shared memory segments and a polling mailbox

mod anon;
pub mod error;
pub mod mailbox;
pub mod manager;
pub mod name;
pub mod process;
pub mod protocol;
pub mod segment;

pub use error::{Error, Result};
pub use mailbox::{AcquireRelease, FlagAccess, MailboxArray, Volatile, MESSAGE_CAPACITY, SLOT_SIZE};
pub use manager::SegmentManager;
pub use name::SegmentName;
pub use protocol::{consume, produce, ProtocolConfig, RoundReport, SlotSequence, DEFAULT_MESSAGE};
pub use segment::SegmentHandle;
