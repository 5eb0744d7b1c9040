//! Anonymous shared mappings
//!
//! On unix an anonymous segment is a `MAP_SHARED | MAP_ANONYMOUS` mapping:
//! it has no name anywhere and reaches other processes only by being
//! inherited across `fork`. Platforms without fork get a named OS mapping
//! whose generated id never leaves the creating process.
//!
//! Sharing an anonymous segment with another process is therefore unix-only.
//! Elsewhere, a segment meant for a spawned child must be created with a
//! [`SegmentName`](crate::SegmentName) and attached by that name.

use crate::Result;
use std::num::NonZeroUsize;

pub(crate) use imp::AnonymousMapping;

#[cfg(unix)]
mod imp {
    use super::*;
    use crate::Error;
    use nix::sys::mman::{mmap_anonymous, munmap, MapFlags, ProtFlags};
    use std::ffi::c_void;
    use std::mem::ManuallyDrop;
    use std::ptr::NonNull;

    pub(crate) struct AnonymousMapping {
        ptr: NonNull<c_void>,
        len: usize,
    }

    impl AnonymousMapping {
        pub fn new(len: NonZeroUsize) -> Result<Self> {
            let ptr = unsafe {
                mmap_anonymous(
                    None,
                    len,
                    ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                    MapFlags::MAP_SHARED,
                )
            }
            .map_err(|e| Error::Creation(e.to_string()))?;
            Ok(Self {
                ptr,
                len: len.get(),
            })
        }

        pub fn as_ptr(&self) -> *mut u8 {
            self.ptr.as_ptr() as *mut u8
        }

        pub fn unmap(self) -> Result<()> {
            let this = ManuallyDrop::new(self);
            unsafe { munmap(this.ptr, this.len) }.map_err(|e| Error::Destroy(e.to_string()))
        }
    }

    impl Drop for AnonymousMapping {
        fn drop(&mut self) {
            if let Err(e) = unsafe { munmap(self.ptr, self.len) } {
                log::warn!("failed to unmap anonymous segment: {}", e);
            }
        }
    }
}

#[cfg(not(unix))]
mod imp {
    use super::*;
    use crate::Error;
    use shared_memory::{Shmem, ShmemConf};

    pub(crate) struct AnonymousMapping {
        shmem: Shmem,
    }

    impl AnonymousMapping {
        pub fn new(len: NonZeroUsize) -> Result<Self> {
            // No flink: the generated os id stays private to this process.
            let shmem = ShmemConf::new()
                .size(len.get())
                .create()
                .map_err(|e| Error::Creation(e.to_string()))?;
            Ok(Self { shmem })
        }

        pub fn as_ptr(&self) -> *mut u8 {
            self.shmem.as_ptr()
        }

        pub fn unmap(self) -> Result<()> {
            drop(self.shmem);
            Ok(())
        }
    }
}
