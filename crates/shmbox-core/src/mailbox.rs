//! Mailbox slots laid out in a shared segment
//!
//! A [`MailboxArray`] interprets the start of a segment as a fixed number of
//! contiguous [`Slot`]s. Each slot holds a zero-padded message buffer and an
//! availability flag. The view takes no locks: the producer is the only role
//! that sets a slot and the consumer the only one that clears it, and the
//! caller is responsible for keeping it that way. How the flag is read and
//! written is chosen by a [`FlagAccess`] strategy.

use crate::segment::SegmentHandle;
use crate::{Error, Result};
use std::marker::PhantomData;
use std::ptr::{self, NonNull};
use std::sync::atomic::{compiler_fence, AtomicU8, Ordering};

/// Message capacity of one slot in bytes
pub const MESSAGE_CAPACITY: usize = 1024;

/// One mailbox slot as stored in shared memory
#[repr(C)]
pub struct Slot {
    message: [u8; MESSAGE_CAPACITY],
    available: u8,
}

/// Size of [`Slot`] in bytes
pub const SLOT_SIZE: usize = std::mem::size_of::<Slot>();

/// How a slot's availability flag is observed across processes
pub trait FlagAccess {
    /// # Safety
    ///
    /// `flag` must point to a live slot flag.
    unsafe fn load(flag: *const u8) -> bool;

    /// # Safety
    ///
    /// `flag` must point to a live slot flag.
    unsafe fn store(flag: *mut u8, value: bool);
}

/// Plain volatile flag access with no hardware synchronization
///
/// Compiler fences keep the message copy on the correct side of the flag
/// write within each process; visibility to the other process relies on
/// the mapping being ordinary coherent memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct Volatile;

impl FlagAccess for Volatile {
    unsafe fn load(flag: *const u8) -> bool {
        let value = ptr::read_volatile(flag);
        compiler_fence(Ordering::Acquire);
        value != 0
    }

    unsafe fn store(flag: *mut u8, value: bool) {
        compiler_fence(Ordering::Release);
        ptr::write_volatile(flag, value as u8);
    }
}

/// Atomic flag access with acquire/release ordering
#[derive(Debug, Clone, Copy, Default)]
pub struct AcquireRelease;

impl FlagAccess for AcquireRelease {
    unsafe fn load(flag: *const u8) -> bool {
        AtomicU8::from_ptr(flag as *mut u8).load(Ordering::Acquire) != 0
    }

    unsafe fn store(flag: *mut u8, value: bool) {
        AtomicU8::from_ptr(flag).store(value as u8, Ordering::Release);
    }
}

/// Fixed-length array of mailbox slots over a segment's memory
pub struct MailboxArray<'a, F: FlagAccess = Volatile> {
    slots: NonNull<Slot>,
    count: usize,
    _segment: PhantomData<&'a SegmentHandle>,
    _flags: PhantomData<F>,
}

impl<'a> MailboxArray<'a> {
    /// View the first `count` slots of `segment` with volatile flag access
    pub fn new(segment: &'a SegmentHandle, count: usize) -> Result<Self> {
        Self::with_flag_access(segment, count)
    }
}

impl<'a, F: FlagAccess> MailboxArray<'a, F> {
    /// View the first `count` slots of `segment` using flag strategy `F`
    pub fn with_flag_access(segment: &'a SegmentHandle, count: usize) -> Result<Self> {
        if count == 0 {
            return Err(Error::InvalidConfig(
                "mailbox needs at least one slot".to_string(),
            ));
        }
        let required = Self::required_size(count)?;
        if segment.size() < required {
            return Err(Error::SegmentTooSmall {
                required,
                actual: segment.size(),
            });
        }

        Ok(Self {
            slots: segment.base_addr().cast::<Slot>(),
            count,
            _segment: PhantomData,
            _flags: PhantomData,
        })
    }

    /// Bytes needed to hold `count` slots
    pub fn required_size(count: usize) -> Result<usize> {
        count.checked_mul(SLOT_SIZE).ok_or_else(|| {
            Error::InvalidConfig(format!("{} slots overflow the address space", count))
        })
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn slot(&self, index: usize) -> Result<*mut Slot> {
        if index >= self.count {
            return Err(Error::SlotOutOfRange {
                index,
                count: self.count,
            });
        }
        Ok(unsafe { self.slots.as_ptr().add(index) })
    }

    /// Store `message` in slot `index` and mark it available
    ///
    /// An unconsumed message in the slot is overwritten. A message longer
    /// than [`MESSAGE_CAPACITY`] is rejected and the slot left untouched.
    pub fn put(&self, index: usize, message: &str) -> Result<()> {
        let slot = self.slot(index)?;
        let bytes = message.as_bytes();
        if bytes.len() > MESSAGE_CAPACITY {
            return Err(Error::MessageTooLong {
                len: bytes.len(),
                capacity: MESSAGE_CAPACITY,
            });
        }

        unsafe {
            let flag = ptr::addr_of_mut!((*slot).available);
            if F::load(flag) {
                log::debug!("slot {} overwritten before it was taken", index);
            }
            let buf = ptr::addr_of_mut!((*slot).message) as *mut u8;
            ptr::copy_nonoverlapping(bytes.as_ptr(), buf, bytes.len());
            ptr::write_bytes(buf.add(bytes.len()), 0, MESSAGE_CAPACITY - bytes.len());
            F::store(flag, true);
        }
        Ok(())
    }

    /// Take the message in slot `index` if one is available
    ///
    /// A taken slot is zeroed and marked unavailable, so a second call
    /// without an intervening `put` returns `None`.
    pub fn try_take(&self, index: usize) -> Result<Option<String>> {
        let slot = self.slot(index)?;
        let mut local = [0u8; MESSAGE_CAPACITY];

        unsafe {
            let flag = ptr::addr_of_mut!((*slot).available);
            if !F::load(flag) {
                return Ok(None);
            }
            let buf = ptr::addr_of_mut!((*slot).message) as *mut u8;
            ptr::copy_nonoverlapping(buf, local.as_mut_ptr(), MESSAGE_CAPACITY);
            ptr::write_bytes(buf, 0, MESSAGE_CAPACITY);
            F::store(flag, false);
        }

        let end = local.iter().position(|&b| b == 0).unwrap_or(MESSAGE_CAPACITY);
        Ok(Some(String::from_utf8_lossy(&local[..end]).into_owned()))
    }

    /// Whether slot `index` holds an unconsumed message
    pub fn is_available(&self, index: usize) -> Result<bool> {
        let slot = self.slot(index)?;
        Ok(unsafe { F::load(ptr::addr_of!((*slot).available)) })
    }

    /// Zero every slot and mark it unavailable
    pub fn clear(&self) {
        for index in 0..self.count {
            unsafe {
                let slot = self.slots.as_ptr().add(index);
                let buf = ptr::addr_of_mut!((*slot).message) as *mut u8;
                ptr::write_bytes(buf, 0, MESSAGE_CAPACITY);
                F::store(ptr::addr_of_mut!((*slot).available), false);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SegmentManager;

    const N_BOXES: usize = 8;

    fn segment() -> SegmentHandle {
        SegmentManager::new()
            .create_anonymous(MailboxArray::<Volatile>::required_size(N_BOXES).unwrap())
            .unwrap()
    }

    #[test]
    fn test_slot_layout() {
        assert_eq!(SLOT_SIZE, MESSAGE_CAPACITY + 1);
    }

    #[test]
    fn test_put_then_take() {
        let seg = segment();
        let boxes = MailboxArray::new(&seg, N_BOXES).unwrap();

        assert!(!boxes.is_available(3).unwrap());
        boxes.put(3, "Sent from the Producer").unwrap();
        assert!(boxes.is_available(3).unwrap());
        assert_eq!(
            boxes.try_take(3).unwrap().as_deref(),
            Some("Sent from the Producer")
        );
        assert!(!boxes.is_available(3).unwrap());
    }

    #[test]
    fn test_take_is_idempotent() {
        let seg = segment();
        let boxes = MailboxArray::new(&seg, N_BOXES).unwrap();

        boxes.put(0, "once").unwrap();
        assert!(boxes.try_take(0).unwrap().is_some());
        assert_eq!(boxes.try_take(0).unwrap(), None);
        assert!(!boxes.is_available(0).unwrap());
        assert!(seg.as_slice()[..SLOT_SIZE].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_message_capacity_boundary() {
        let seg = segment();
        let boxes = MailboxArray::new(&seg, N_BOXES).unwrap();

        let exact = "x".repeat(MESSAGE_CAPACITY);
        boxes.put(1, &exact).unwrap();
        assert_eq!(boxes.try_take(1).unwrap(), Some(exact));

        boxes.put(2, "keep me").unwrap();
        let too_long = "y".repeat(MESSAGE_CAPACITY + 1);
        assert!(matches!(
            boxes.put(2, &too_long),
            Err(Error::MessageTooLong { len: 1025, capacity: 1024 })
        ));
        assert_eq!(boxes.try_take(2).unwrap().as_deref(), Some("keep me"));
    }

    #[test]
    fn test_shorter_message_clears_tail() {
        let seg = segment();
        let boxes = MailboxArray::new(&seg, N_BOXES).unwrap();

        boxes.put(4, "a much longer message").unwrap();
        boxes.put(4, "short").unwrap();
        assert_eq!(boxes.try_take(4).unwrap().as_deref(), Some("short"));
    }

    #[test]
    fn test_index_out_of_range() {
        let seg = segment();
        let boxes = MailboxArray::new(&seg, N_BOXES).unwrap();

        assert!(matches!(
            boxes.put(N_BOXES, "x"),
            Err(Error::SlotOutOfRange { index: 8, count: 8 })
        ));
        assert!(matches!(boxes.try_take(100), Err(Error::SlotOutOfRange { .. })));
    }

    #[test]
    fn test_segment_too_small() {
        let seg = SegmentManager::new().create_anonymous(SLOT_SIZE).unwrap();
        assert!(matches!(
            MailboxArray::new(&seg, 2),
            Err(Error::SegmentTooSmall { required, actual }) if required == 2 * SLOT_SIZE && actual == SLOT_SIZE
        ));
        assert!(matches!(MailboxArray::new(&seg, 0), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_slot_count_overflow_rejected() {
        let seg = segment();
        let huge = usize::MAX / SLOT_SIZE + 1;
        assert!(matches!(
            MailboxArray::<Volatile>::required_size(huge),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            MailboxArray::<Volatile>::with_flag_access(&seg, 17996823486545905),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            MailboxArray::new(&seg, N_BOXES + 1),
            Err(Error::SegmentTooSmall { .. })
        ));
    }

    #[test]
    fn test_clear() {
        let seg = segment();
        let boxes = MailboxArray::new(&seg, N_BOXES).unwrap();

        for i in 0..N_BOXES {
            boxes.put(i, "pending").unwrap();
        }
        boxes.clear();
        for i in 0..N_BOXES {
            assert_eq!(boxes.try_take(i).unwrap(), None);
        }
    }

    #[test]
    fn test_acquire_release_views_share_slots() {
        let seg = segment();
        let writer = MailboxArray::<AcquireRelease>::with_flag_access(&seg, N_BOXES).unwrap();
        let reader = MailboxArray::<AcquireRelease>::with_flag_access(&seg, N_BOXES).unwrap();

        writer.put(7, "atomic").unwrap();
        assert_eq!(reader.try_take(7).unwrap().as_deref(), Some("atomic"));
        assert!(!writer.is_available(7).unwrap());
    }

    #[test]
    fn test_views_over_attached_segment() {
        let dir = tempfile::TempDir::new().unwrap();
        let name = crate::SegmentName::new(dir.path().join("boxes.shm")).unwrap();
        let manager = SegmentManager::new();

        let owner = manager
            .create_named(MailboxArray::<Volatile>::required_size(N_BOXES).unwrap(), &name)
            .unwrap();
        let attached = manager.attach(&name).unwrap();
        assert_ne!(owner.base_addr(), attached.base_addr());

        let producer = MailboxArray::new(&owner, N_BOXES).unwrap();
        let consumer = MailboxArray::new(&attached, N_BOXES).unwrap();
        producer.put(5, "across mappings").unwrap();
        assert_eq!(
            consumer.try_take(5).unwrap().as_deref(),
            Some("across mappings")
        );
        assert!(!producer.is_available(5).unwrap());

        manager.detach(attached).unwrap();
        manager.destroy(owner).unwrap();
    }
}
