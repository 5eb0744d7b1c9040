//! Error types for shmbox

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("segment size must be greater than zero")]
    ZeroSize,

    #[error("segment name already in use: {}", .0.display())]
    NameInUse(PathBuf),

    #[error("failed to create segment: {0}")]
    Creation(String),

    #[error("segment not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to attach segment: {0}")]
    Attach(String),

    #[error("segment already destroyed: {}", .0.display())]
    AlreadyDestroyed(PathBuf),

    #[error("segment can only be destroyed by the process that created it")]
    NotOwner,

    #[error("failed to destroy segment: {0}")]
    Destroy(String),

    #[error("invalid segment name: {0}")]
    InvalidName(String),

    #[error("message too long: {len} bytes exceeds slot capacity of {capacity}")]
    MessageTooLong { len: usize, capacity: usize },

    #[error("slot index {index} out of range for {count} slots")]
    SlotOutOfRange { index: usize, count: usize },

    #[error("segment too small: need {required} bytes, have {actual}")]
    SegmentTooSmall { required: usize, actual: usize },

    #[error("invalid protocol config: {0}")]
    InvalidConfig(String),

    #[error("process error: {0}")]
    Process(String),

    #[error("role process reported failure")]
    RoleFailed,

    #[error("role process terminated abnormally: {0}")]
    RoleAbnormalExit(String),

    #[error("message count mismatch: sent {sent}, received {received}")]
    CountMismatch { sent: usize, received: usize },
}

impl Error {
    /// True for the errors `create` reports when a segment cannot be made.
    pub fn is_creation_error(&self) -> bool {
        matches!(self, Error::ZeroSize | Error::NameInUse(_) | Error::Creation(_))
    }
}

#[cfg(unix)]
impl From<nix::Error> for Error {
    fn from(value: nix::Error) -> Self {
        Error::Process(value.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
