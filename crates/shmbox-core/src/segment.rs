//! Shared memory segments

use crate::anon::AnonymousMapping;
use crate::name::SegmentName;
use crate::{Error, Result};
use shared_memory::{Shmem, ShmemConf, ShmemError};
use std::io::ErrorKind;
use std::num::NonZeroUsize;
use std::ptr::NonNull;

/// Bytes reserved in front of a named segment's span for its header
pub const HEADER_LEN: usize = 64;

const MAGIC: u32 = 0x5348_4258; // "SHBX"
const VERSION: u32 = 1;

/// Header stored at the start of every named mapping
#[repr(C)]
struct SegmentHeader {
    magic: u32,
    version: u32,
    /// Logical size requested at creation
    size: u64,
}

enum Mapping {
    Anonymous(AnonymousMapping),
    Named(Shmem),
}

/// A shared memory segment mapped into this process
///
/// The handle is consumed by [`SegmentHandle::destroy`] and
/// [`SegmentHandle::detach`], so a segment can be released at most once
/// through it. Dropping a handle releases it the same way `destroy` does
/// for owners and `detach` does for attachers, without reporting errors.
pub struct SegmentHandle {
    name: Option<SegmentName>,
    size: usize,
    base: NonNull<u8>,
    mapping: Mapping,
}

// Safety: the handle owns its mapping; the memory behind it is shared by
// address space mapping and not tied to the thread that created it.
unsafe impl Send for SegmentHandle {}

impl SegmentHandle {
    /// Map a new anonymous segment of `size` bytes
    pub(crate) fn create_anonymous(size: usize) -> Result<Self> {
        let len = NonZeroUsize::new(size).ok_or(Error::ZeroSize)?;
        let mapping = AnonymousMapping::new(len)?;
        let base = NonNull::new(mapping.as_ptr())
            .ok_or_else(|| Error::Creation("mapping returned a null address".to_string()))?;
        log::debug!("mapped anonymous segment: {} bytes at {:p}", size, base);

        Ok(Self {
            name: None,
            size,
            base,
            mapping: Mapping::Anonymous(mapping),
        })
    }

    /// Create a segment registered under `name`
    pub(crate) fn create_named(size: usize, name: &SegmentName) -> Result<Self> {
        if size == 0 {
            return Err(Error::ZeroSize);
        }
        let total = HEADER_LEN
            .checked_add(size)
            .ok_or_else(|| Error::Creation(format!("size {} overflows", size)))?;

        let shmem = ShmemConf::new()
            .size(total)
            .flink(name.as_path())
            .create()
            .map_err(|e| creation_error(e, name))?;

        unsafe {
            (shmem.as_ptr() as *mut SegmentHeader).write(SegmentHeader {
                magic: MAGIC,
                version: VERSION,
                size: size as u64,
            });
        }
        let base = Self::span_start(&shmem).ok_or_else(|| {
            Error::Creation("mapping returned a null address".to_string())
        })?;
        log::debug!(
            "mapped named segment {} (os id {}): {} bytes at {:p}",
            name,
            shmem.get_os_id(),
            size,
            base
        );

        Ok(Self {
            name: Some(name.clone()),
            size,
            base,
            mapping: Mapping::Named(shmem),
        })
    }

    /// Map an existing named segment
    pub(crate) fn attach_named(name: &SegmentName) -> Result<Self> {
        if !name.is_registered() {
            return Err(Error::NotFound(name.as_path().to_path_buf()));
        }

        let shmem = ShmemConf::new()
            .flink(name.as_path())
            .open()
            .map_err(|e| attach_error(e, name))?;

        if shmem.len() < HEADER_LEN {
            return Err(Error::Attach(format!(
                "{}: mapping of {} bytes is smaller than the segment header",
                name,
                shmem.len()
            )));
        }
        let header = unsafe { (shmem.as_ptr() as *const SegmentHeader).read() };
        if header.magic != MAGIC {
            return Err(Error::Attach(format!("{}: invalid magic number", name)));
        }
        if header.version != VERSION {
            return Err(Error::Attach(format!(
                "{}: version mismatch: expected {}, got {}",
                name, VERSION, header.version
            )));
        }
        let size = header.size as usize;
        if size == 0 || HEADER_LEN + size > shmem.len() {
            return Err(Error::Attach(format!(
                "{}: header size {} does not fit mapping of {} bytes",
                name,
                size,
                shmem.len()
            )));
        }

        let base = Self::span_start(&shmem)
            .ok_or_else(|| Error::Attach("mapping returned a null address".to_string()))?;
        log::debug!("attached named segment {}: {} bytes at {:p}", name, size, base);

        Ok(Self {
            name: Some(name.clone()),
            size,
            base,
            mapping: Mapping::Named(shmem),
        })
    }

    /// Remove the segment registered under `name` without holding its owning handle
    pub(crate) fn remove_named(name: &SegmentName) -> Result<()> {
        if !name.is_registered() {
            return Err(Error::NotFound(name.as_path().to_path_buf()));
        }

        match ShmemConf::new().flink(name.as_path()).open() {
            Ok(mut shmem) => {
                // Taking ownership makes the drop unlink the OS object.
                shmem.set_owner(true);
                drop(shmem);
            }
            Err(e) => {
                // Stale link whose mapping is already gone; only the link remains.
                log::debug!("removing stale link {}: {}", name, e);
            }
        }
        remove_link(name)
    }

    fn span_start(shmem: &Shmem) -> Option<NonNull<u8>> {
        NonNull::new(unsafe { shmem.as_ptr().add(HEADER_LEN) })
    }

    /// Logical size in bytes, exactly as requested at creation
    pub fn size(&self) -> usize {
        self.size
    }

    /// Start of the segment's span in this process's address space
    ///
    /// Each attaching process gets its own address for the same bytes.
    pub fn base_addr(&self) -> NonNull<u8> {
        self.base
    }

    /// Get a raw pointer to the shared memory
    pub fn as_ptr(&self) -> *const u8 {
        self.base.as_ptr()
    }

    /// Get a mutable raw pointer to the shared memory
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.base.as_ptr()
    }

    /// Get a slice view of the shared memory
    ///
    /// Another process may write the bytes while the slice is alive.
    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.as_ptr(), self.size) }
    }

    /// Get a mutable slice view of the shared memory
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.as_mut_ptr(), self.size) }
    }

    /// Name the segment is registered under, `None` for anonymous segments
    pub fn name(&self) -> Option<&SegmentName> {
        self.name.as_ref()
    }

    pub fn is_named(&self) -> bool {
        self.name.is_some()
    }

    /// Whether this handle is responsible for destroying the segment
    pub fn is_owner(&self) -> bool {
        match &self.mapping {
            Mapping::Anonymous(_) => true,
            Mapping::Named(shmem) => shmem.is_owner(),
        }
    }

    /// Unmap the segment and, for named segments, remove its name
    ///
    /// Only the creating handle may destroy a segment. An attached handle
    /// gets [`Error::NotOwner`] and is detached instead.
    pub fn destroy(self) -> Result<()> {
        let Self { name, mapping, .. } = self;
        match mapping {
            Mapping::Anonymous(mapping) => mapping.unmap(),
            Mapping::Named(shmem) => {
                if !shmem.is_owner() {
                    return Err(Error::NotOwner);
                }
                let name = name
                    .ok_or_else(|| Error::Destroy("named mapping without a name".to_string()))?;
                let registered = name.is_registered();
                // Owner drop unmaps, unlinks the OS object and removes the link.
                drop(shmem);
                if !registered {
                    return Err(Error::AlreadyDestroyed(name.as_path().to_path_buf()));
                }
                remove_link(&name)
            }
        }
    }

    /// Unmap the segment in this process, leaving a named segment registered
    pub fn detach(self) -> Result<()> {
        match self.mapping {
            Mapping::Anonymous(mapping) => mapping.unmap(),
            Mapping::Named(mut shmem) => {
                shmem.set_owner(false);
                drop(shmem);
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for SegmentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentHandle")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("base", &self.base)
            .field("owner", &self.is_owner())
            .finish()
    }
}

fn remove_link(name: &SegmentName) -> Result<()> {
    match std::fs::remove_file(name.as_path()) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Destroy(format!("{}: {}", name, e))),
    }
}

fn creation_error(e: ShmemError, name: &SegmentName) -> Error {
    match e {
        ShmemError::LinkExists | ShmemError::MappingIdExists => {
            Error::NameInUse(name.as_path().to_path_buf())
        }
        ShmemError::MapSizeZero => Error::ZeroSize,
        other => Error::Creation(format!("{}: {}", name, other)),
    }
}

fn attach_error(e: ShmemError, name: &SegmentName) -> Error {
    match e {
        ShmemError::LinkDoesNotExist => Error::NotFound(name.as_path().to_path_buf()),
        ShmemError::LinkOpenFailed(ref io) if io.kind() == ErrorKind::NotFound => {
            Error::NotFound(name.as_path().to_path_buf())
        }
        other => Error::Attach(format!("{}: {}", name, other)),
    }
}
