//! Segment lifecycle management

use crate::name::SegmentName;
use crate::segment::SegmentHandle;
use crate::Result;
use std::ptr::NonNull;

/// Creates, attaches and destroys shared memory segments
///
/// Anonymous and named segments take separate creation paths: an anonymous
/// segment is reachable only through inheritance (fork) or handle passing,
/// a named one through its filesystem name until it is destroyed.
#[derive(Debug, Default, Clone, Copy)]
pub struct SegmentManager;

impl SegmentManager {
    pub fn new() -> Self {
        Self
    }

    /// Create a segment, anonymous when `name` is `None`
    pub fn create(&self, size: usize, name: Option<&SegmentName>) -> Result<SegmentHandle> {
        match name {
            None => self.create_anonymous(size),
            Some(name) => self.create_named(size, name),
        }
    }

    /// Create a segment visible only to this process and its forked children
    pub fn create_anonymous(&self, size: usize) -> Result<SegmentHandle> {
        let handle = SegmentHandle::create_anonymous(size)?;
        log::info!("created anonymous segment of {} bytes", size);
        Ok(handle)
    }

    /// Create a segment any process can attach to by `name`
    pub fn create_named(&self, size: usize, name: &SegmentName) -> Result<SegmentHandle> {
        let handle = SegmentHandle::create_named(size, name)?;
        log::info!("created segment {} of {} bytes", name, size);
        Ok(handle)
    }

    /// Attach to a segment created by another process
    pub fn attach(&self, name: &SegmentName) -> Result<SegmentHandle> {
        let handle = SegmentHandle::attach_named(name)?;
        log::info!("attached segment {} of {} bytes", name, handle.size());
        Ok(handle)
    }

    /// Logical size of the segment
    pub fn size_get(&self, handle: &SegmentHandle) -> usize {
        handle.size()
    }

    /// Base address of the segment in this process
    pub fn base_address_get(&self, handle: &SegmentHandle) -> NonNull<u8> {
        handle.base_addr()
    }

    /// Destroy a segment through its owning handle
    pub fn destroy(&self, handle: SegmentHandle) -> Result<()> {
        let label = describe(&handle);
        handle.destroy()?;
        log::info!("destroyed {}", label);
        Ok(())
    }

    /// Unmap a segment in this process without removing it
    pub fn detach(&self, handle: SegmentHandle) -> Result<()> {
        let label = describe(&handle);
        handle.detach()?;
        log::debug!("detached {}", label);
        Ok(())
    }

    /// Remove a named segment left behind by another handle or process
    pub fn remove(&self, name: &SegmentName) -> Result<()> {
        SegmentHandle::remove_named(name)?;
        log::info!("removed segment {}", name);
        Ok(())
    }
}

fn describe(handle: &SegmentHandle) -> String {
    match handle.name() {
        Some(name) => format!("segment {}", name),
        None => "anonymous segment".to_string(),
    }
}
