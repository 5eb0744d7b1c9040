//! Segment names

use crate::{Error, Result};
use std::fmt;
use std::path::{Path, PathBuf};

/// Filesystem path under which a named segment is registered.
///
/// Two processes that build a `SegmentName` from the same path reach the
/// same segment. Relative paths resolve against each process's working
/// directory, so independently launched processes should share one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SegmentName(PathBuf);

impl SegmentName {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(Error::InvalidName("name cannot be empty".to_string()));
        }
        if path.file_name().is_none() {
            return Err(Error::InvalidName(format!(
                "{} does not name a file",
                path.display()
            )));
        }
        Ok(Self(path))
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Whether a segment is currently registered under this name.
    pub fn is_registered(&self) -> bool {
        self.0.exists()
    }
}

impl fmt::Display for SegmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl AsRef<Path> for SegmentName {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}
