//! The fixed-capacity arena allocator.
//!
//! [`ArenaAllocator`] reserves its backing buffer exactly once at
//! construction and releases it exactly once on drop; every allocation in
//! between is carved out of that buffer by splitting records of an
//! address-ordered region ledger. The ledger lives outside the buffer in a
//! [`SlotList`], whose generation-tagged handles make any bookkeeping
//! mistake (a record used after it was merged away) a reported error
//! instead of silent aliasing.
//!
//! # Ledger invariants
//!
//! Between operations the ledger records tile the arena exactly: they are
//! ordered by ascending offset, each record starts where its predecessor
//! ends, and the whole sequence covers `0..capacity`. No two adjacent
//! records are both free; a deallocation restores that before returning.

use core::{alloc::Layout, fmt, marker::PhantomData, mem, ptr::NonNull};

use log::{debug, trace};
use slot_list::{HandleError, SlotList};
use snafu::{Location, Snafu, ensure};

use crate::region::{Region, RegionState};

/// Errors surfaced by [`ArenaAllocator`] operations.
///
/// Every failure leaves the arena untouched; there is no partial mutation
/// to observe or roll back.
#[derive(Debug, Snafu)]
#[snafu(module)]
pub enum ArenaError {
    /// No free region is large enough for the request.
    #[snafu(display("no free region can hold {requested} bytes"))]
    OutOfMemory {
        /// Requested size in bytes.
        requested: usize,
        #[snafu(implicit)]
        location: Location,
    },
    /// The pointer is not the base address of a live allocation.
    #[snafu(display("pointer {addr:#x} is not the base of a live allocation"))]
    InvalidPointer {
        /// Address of the rejected pointer.
        addr: usize,
        #[snafu(implicit)]
        location: Location,
    },
    /// The region ledger rejected a handle; arena bookkeeping is corrupt.
    #[snafu(context(false))]
    #[snafu(display("region ledger rejected a handle"))]
    Ledger {
        /// The underlying handle failure.
        source: HandleError,
        #[snafu(implicit)]
        location: Location,
    },
}

/// Scoped owner of the arena's backing buffer.
///
/// Acquired exactly once in [`ArenaAllocator::new`], released exactly once
/// here on drop, on every exit path.
struct RawBuf {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl RawBuf {
    fn reserve(capacity: usize, align: usize) -> Self {
        let layout = Layout::from_size_align(capacity, align)
            .expect("arena capacity overflows the address space");
        if layout.size() == 0 {
            return Self {
                ptr: NonNull::dangling(),
                layout,
            };
        }
        // SAFETY: `layout` has non-zero size.
        let ptr = unsafe { alloc::alloc::alloc(layout) };
        let Some(ptr) = NonNull::new(ptr) else {
            alloc::alloc::handle_alloc_error(layout);
        };
        Self { ptr, layout }
    }

    fn base(&self) -> NonNull<u8> {
        self.ptr
    }

    fn len(&self) -> usize {
        self.layout.size()
    }
}

impl Drop for RawBuf {
    fn drop(&mut self) {
        if self.layout.size() != 0 {
            // SAFETY: `ptr` was returned by `alloc` with this exact layout.
            unsafe { alloc::alloc::dealloc(self.ptr.as_ptr(), self.layout) };
        }
    }
}

/// A fixed-capacity arena allocator for blocks of `T`.
///
/// The arena owns one buffer of the capacity given to [`new`](Self::new),
/// aligned for `T`; the capacity never changes afterwards. Blocks are
/// placed by a first-fit scan over the region ledger and returned with
/// [`deallocate`](Self::deallocate), which eagerly coalesces free
/// neighbors so fragmentation does not accumulate across churn.
///
/// Dropping the arena releases the buffer; previously issued pointers must
/// not be dereferenced afterwards.
///
/// # Examples
///
/// ```
/// use arena_alloc::ArenaAllocator;
///
/// let mut arena = ArenaAllocator::<u64>::new(1024);
/// let ptr = arena.allocate(8).unwrap();
/// unsafe { ptr.write(42) };
/// arena.deallocate(ptr, 8).unwrap();
/// ```
pub struct ArenaAllocator<T> {
    buf: RawBuf,
    ledger: SlotList<Region>,
    used: usize,
    _marker: PhantomData<T>,
}

unsafe impl<T: Send> Send for ArenaAllocator<T> {}

impl<T> ArenaAllocator<T> {
    /// Creates an arena with `capacity` bytes of backing storage.
    ///
    /// The ledger starts as a single free record spanning the whole arena.
    /// A zero capacity is permitted; such an arena rejects every non-empty
    /// request with [`ArenaError::OutOfMemory`].
    ///
    /// # Panics
    ///
    /// Panics if `capacity` rounded up to the alignment of `T` overflows
    /// `isize::MAX`.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let buf = RawBuf::reserve(capacity, mem::align_of::<T>());
        let mut ledger = SlotList::new();
        ledger.push_back(Region {
            offset: 0,
            len: capacity,
            state: RegionState::Free,
        });
        debug!(
            "arena reserved: {capacity} bytes, align {}",
            mem::align_of::<T>()
        );
        Self {
            buf,
            ledger,
            used: 0,
            _marker: PhantomData,
        }
    }

    /// Allocates a block of `count` elements.
    ///
    /// The ledger is scanned from the lowest address and the first free
    /// region large enough wins, regardless of how tightly it fits. A
    /// request for zero bytes (zero `count`, or a zero-sized `T`) never
    /// touches the ledger and returns a dangling, well-aligned pointer;
    /// deallocating it is a no-op.
    ///
    /// The returned pointer is valid for reads and writes of `count`
    /// elements until it is passed to [`deallocate`](Self::deallocate) or
    /// the arena is dropped.
    ///
    /// # Errors
    ///
    /// [`ArenaError::OutOfMemory`] if no free region is large enough (a
    /// byte size overflowing `usize` can never be satisfied and fails the
    /// same way). The arena is left unchanged.
    pub fn allocate(&mut self, count: usize) -> Result<NonNull<T>, ArenaError> {
        let bytes = count
            .checked_mul(mem::size_of::<T>())
            .unwrap_or(usize::MAX);
        if bytes == 0 {
            return Ok(NonNull::dangling());
        }

        let found = self
            .ledger
            .handles()
            .find(|(_, region)| region.state.is_free() && region.len >= bytes)
            .map(|(handle, region)| (handle, *region));
        let Some((handle, region)) = found else {
            return arena_error::OutOfMemorySnafu { requested: bytes }.fail();
        };

        {
            let record = self.ledger.get_mut(handle)?;
            record.state = RegionState::Occupied;
            record.len = bytes;
        }
        if region.len > bytes {
            // keep the remainder as a free record right after the block
            self.ledger.insert_after(
                handle,
                Region {
                    offset: region.offset + bytes,
                    len: region.len - bytes,
                    state: RegionState::Free,
                },
            )?;
        }
        self.used += bytes;
        trace!("allocated {bytes} bytes at offset {}", region.offset);
        Ok(self.ptr_at(region.offset))
    }

    /// Returns the block at `ptr` to the arena.
    ///
    /// `ptr` must be the base of a live allocation and `count` the length
    /// it was allocated with. The freed region is merged with a free
    /// predecessor and a free successor, in that order, so no two adjacent
    /// free regions survive the call.
    ///
    /// # Errors
    ///
    /// [`ArenaError::InvalidPointer`] if `ptr` is not the base of a
    /// currently occupied region — double frees, pointers into the middle
    /// of a block, and pointers this arena never issued all land here. The
    /// arena is left unchanged.
    pub fn deallocate(&mut self, ptr: NonNull<T>, count: usize) -> Result<(), ArenaError> {
        let bytes = count
            .checked_mul(mem::size_of::<T>())
            .unwrap_or(usize::MAX);
        if bytes == 0 {
            return Ok(());
        }
        let offset = self.offset_of(ptr)?;

        // records are address-ordered, so the scan can stop early
        let found = self
            .ledger
            .handles()
            .take_while(|(_, region)| region.offset <= offset)
            .find(|(_, region)| region.state.is_occupied() && region.offset == offset)
            .map(|(handle, region)| (handle, *region));
        let Some((handle, region)) = found else {
            return arena_error::InvalidPointerSnafu {
                addr: ptr.addr().get(),
            }
            .fail();
        };
        debug_assert_eq!(region.len, bytes, "deallocation size does not match the block");

        self.ledger.get_mut(handle)?.state = RegionState::Free;
        self.used -= region.len;

        let mut current = handle;
        if let Some(prev) = self.ledger.prev(current)? {
            if self.ledger.get(prev)?.state.is_free() {
                let absorbed = self.ledger.remove(current)?;
                self.ledger.get_mut(prev)?.len += absorbed.len;
                current = prev;
            }
        }
        if let Some(next) = self.ledger.next(current)? {
            if self.ledger.get(next)?.state.is_free() {
                let absorbed = self.ledger.remove(next)?;
                self.ledger.get_mut(current)?.len += absorbed.len;
            }
        }
        trace!("freed {} bytes at offset {}", region.len, region.offset);
        Ok(())
    }

    /// Total capacity in bytes, fixed at construction.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes currently backing live allocations.
    #[must_use]
    pub fn used_bytes(&self) -> usize {
        self.used
    }

    /// Bytes currently free, summed over all free regions.
    #[must_use]
    pub fn available_bytes(&self) -> usize {
        self.capacity() - self.used
    }

    /// Length of the largest free region, i.e. the biggest single request
    /// that can currently succeed.
    #[must_use]
    pub fn largest_free(&self) -> usize {
        self.regions()
            .filter(|region| region.state.is_free())
            .map(|region| region.len)
            .max()
            .unwrap_or(0)
    }

    /// Iterates over the regions of the arena in address order.
    ///
    /// The snapshots yielded here are the observable ledger state: offsets
    /// are relative to the arena base, lengths are in bytes, and the
    /// records tile the full capacity without gaps.
    pub fn regions(&self) -> impl Iterator<Item = Region> + '_ {
        self.ledger.iter().copied()
    }

    fn ptr_at(&self, offset: usize) -> NonNull<T> {
        // SAFETY: `offset` lies inside the reserved buffer.
        unsafe { self.buf.base().add(offset) }.cast()
    }

    fn offset_of(&self, ptr: NonNull<T>) -> Result<usize, ArenaError> {
        let base = self.buf.base().addr().get();
        let addr = ptr.addr().get();
        ensure!(
            addr >= base && addr < base + self.buf.len(),
            arena_error::InvalidPointerSnafu { addr }
        );
        Ok(addr - base)
    }
}

impl<T> PartialEq for ArenaAllocator<T> {
    /// Two allocators are equal only when they are the same arena, i.e.
    /// they share one backing buffer.
    fn eq(&self, other: &Self) -> bool {
        self.buf.base() == other.buf.base()
    }
}

impl<T> Eq for ArenaAllocator<T> {}

impl<T> fmt::Debug for ArenaAllocator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArenaAllocator")
            .field("capacity", &self.capacity())
            .field("used", &self.used)
            .field("regions", &self.ledger)
            .finish()
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use alloc::{format, vec::Vec};

    use super::*;

    fn free(offset: usize, len: usize) -> Region {
        Region {
            offset,
            len,
            state: RegionState::Free,
        }
    }

    fn occupied(offset: usize, len: usize) -> Region {
        Region {
            offset,
            len,
            state: RegionState::Occupied,
        }
    }

    fn snapshot<T>(arena: &ArenaAllocator<T>) -> Vec<Region> {
        arena.regions().collect()
    }

    fn assert_invariants<T>(arena: &ArenaAllocator<T>) {
        let regions = snapshot(arena);
        let mut expected_offset = 0;
        for region in &regions {
            assert_eq!(region.offset, expected_offset, "regions must tile without gaps");
            expected_offset = region.end();
        }
        assert_eq!(expected_offset, arena.capacity(), "regions must cover the arena");
        for pair in regions.windows(2) {
            assert!(
                !(pair[0].state.is_free() && pair[1].state.is_free()),
                "adjacent free regions must have been coalesced"
            );
        }
    }

    #[test]
    fn test_new_arena_is_one_free_span() {
        let arena = ArenaAllocator::<u8>::new(128);
        assert_eq!(snapshot(&arena), [free(0, 128)]);
        assert_eq!(arena.capacity(), 128);
        assert_eq!(arena.used_bytes(), 0);
        assert_eq!(arena.available_bytes(), 128);
    }

    #[test]
    fn test_split_and_merge_scenario() {
        let mut arena = ArenaAllocator::<u8>::new(100);
        let a = arena.allocate(10).unwrap();
        let b = arena.allocate(20).unwrap();
        assert_eq!(unsafe { a.add(10) }, b);
        assert_eq!(
            snapshot(&arena),
            [occupied(0, 10), occupied(10, 20), free(30, 70)]
        );

        // no merge: the successor of the freed block is still occupied
        arena.deallocate(a, 10).unwrap();
        assert_eq!(
            snapshot(&arena),
            [free(0, 10), occupied(10, 20), free(30, 70)]
        );

        // freeing the middle block merges all three spans
        arena.deallocate(b, 20).unwrap();
        assert_eq!(snapshot(&arena), [free(0, 100)]);
    }

    #[test]
    fn test_exact_fit_flips_record_in_place() {
        let mut arena = ArenaAllocator::<u8>::new(32);
        let a = arena.allocate(32).unwrap();
        assert_eq!(snapshot(&arena), [occupied(0, 32)]);
        assert!(matches!(
            arena.allocate(1),
            Err(ArenaError::OutOfMemory { .. })
        ));

        arena.deallocate(a, 32).unwrap();
        assert_eq!(snapshot(&arena), [free(0, 32)]);

        // freed capacity is immediately reusable
        let b = arena.allocate(32).unwrap();
        assert_eq!(b, a);
    }

    #[test]
    fn test_first_fit_prefers_lowest_address() {
        let mut arena = ArenaAllocator::<u8>::new(64);
        let a = arena.allocate(16).unwrap();
        let _b = arena.allocate(16).unwrap();
        let c = arena.allocate(16).unwrap();
        let _d = arena.allocate(16).unwrap();

        arena.deallocate(a, 16).unwrap();
        arena.deallocate(c, 16).unwrap();

        // two 16-byte holes; the lower-address one must win even though
        // the higher one would fit exactly
        let e = arena.allocate(8).unwrap();
        assert_eq!(e, a);
        assert_eq!(
            snapshot(&arena),
            [
                occupied(0, 8),
                free(8, 8),
                occupied(16, 16),
                free(32, 16),
                occupied(48, 16),
            ]
        );

        let f = arena.allocate(16).unwrap();
        assert_eq!(f, c);
    }

    fn allocate_blocks(arena: &mut ArenaAllocator<u8>, count: usize, size: usize) -> Vec<NonNull<u8>> {
        let mut blocks = Vec::new();
        for _ in 0..count {
            blocks.push(arena.allocate(size).unwrap());
        }
        blocks
    }

    #[test]
    fn test_round_trip_in_order() {
        let mut arena = ArenaAllocator::<u8>::new(96);
        let blocks = allocate_blocks(&mut arena, 8, 12);
        for ptr in &blocks {
            arena.deallocate(*ptr, 12).unwrap();
            assert_invariants(&arena);
        }
        assert_eq!(snapshot(&arena), [free(0, 96)]);
    }

    #[test]
    fn test_round_trip_in_reverse() {
        let mut arena = ArenaAllocator::<u8>::new(96);
        let blocks = allocate_blocks(&mut arena, 8, 12);
        for ptr in blocks.iter().rev() {
            arena.deallocate(*ptr, 12).unwrap();
            assert_invariants(&arena);
        }
        assert_eq!(snapshot(&arena), [free(0, 96)]);
    }

    #[test]
    fn test_exhaustion_leaves_ledger_unchanged() {
        let mut arena = ArenaAllocator::<u8>::new(64);
        let a = arena.allocate(16).unwrap();
        let _b = arena.allocate(16).unwrap();
        arena.deallocate(a, 16).unwrap();

        // 48 bytes are free in total but the largest hole is 32
        let before = snapshot(&arena);
        assert!(matches!(
            arena.allocate(48),
            Err(ArenaError::OutOfMemory { .. })
        ));
        assert_eq!(snapshot(&arena), before);
        assert_eq!(arena.used_bytes(), 16);
        assert_eq!(arena.largest_free(), 32);
    }

    #[test]
    fn test_double_free_detected() {
        let mut arena = ArenaAllocator::<u8>::new(32);
        let a = arena.allocate(8).unwrap();
        arena.deallocate(a, 8).unwrap();
        assert!(matches!(
            arena.deallocate(a, 8),
            Err(ArenaError::InvalidPointer { .. })
        ));
        assert_eq!(snapshot(&arena), [free(0, 32)]);
    }

    #[test]
    fn test_interior_pointer_rejected() {
        let mut arena = ArenaAllocator::<u8>::new(32);
        let a = arena.allocate(8).unwrap();
        let interior = unsafe { a.add(1) };
        assert!(matches!(
            arena.deallocate(interior, 7),
            Err(ArenaError::InvalidPointer { .. })
        ));

        // the block is still live and can be freed normally
        arena.deallocate(a, 8).unwrap();
        assert_eq!(snapshot(&arena), [free(0, 32)]);
    }

    #[test]
    fn test_foreign_pointer_rejected() {
        let mut arena = ArenaAllocator::<u8>::new(32);
        let _a = arena.allocate(8).unwrap();
        let mut other = ArenaAllocator::<u8>::new(32);
        let b = other.allocate(8).unwrap();
        assert!(matches!(
            arena.deallocate(b, 8),
            Err(ArenaError::InvalidPointer { .. })
        ));
        other.deallocate(b, 8).unwrap();
    }

    #[test]
    fn test_ledger_invariants_across_mixed_traffic() {
        let mut arena = ArenaAllocator::<u8>::new(256);
        let mut live = Vec::new();
        for size in [32, 16, 48, 8, 64, 24] {
            live.push((arena.allocate(size).unwrap(), size));
            assert_invariants(&arena);
        }

        // free every other block first, then the rest
        for &(ptr, size) in live.iter().skip(1).step_by(2) {
            arena.deallocate(ptr, size).unwrap();
            assert_invariants(&arena);
        }
        for &(ptr, size) in live.iter().step_by(2) {
            arena.deallocate(ptr, size).unwrap();
            assert_invariants(&arena);
        }
        assert_eq!(snapshot(&arena), [free(0, 256)]);
    }

    #[test]
    fn test_zero_length_requests_bypass_ledger() {
        let mut arena = ArenaAllocator::<u64>::new(64);
        let z = arena.allocate(0).unwrap();
        assert_eq!(snapshot(&arena), [free(0, 64)]);
        arena.deallocate(z, 0).unwrap();
        assert_eq!(arena.used_bytes(), 0);
    }

    #[test]
    fn test_zero_sized_type_never_consumes_space() {
        let mut arena = ArenaAllocator::<()>::new(16);
        let a = arena.allocate(5).unwrap();
        assert_eq!(snapshot(&arena), [free(0, 16)]);
        arena.deallocate(a, 5).unwrap();
    }

    #[test]
    fn test_zero_capacity_arena() {
        let mut arena = ArenaAllocator::<u8>::new(0);
        assert_eq!(arena.capacity(), 0);
        assert!(matches!(
            arena.allocate(1),
            Err(ArenaError::OutOfMemory { .. })
        ));
        let z = arena.allocate(0).unwrap();
        arena.deallocate(z, 0).unwrap();
    }

    #[test]
    #[should_panic(expected = "arena capacity overflows the address space")]
    fn test_capacity_beyond_address_space_panics() {
        let _ = ArenaAllocator::<u64>::new(usize::MAX);
    }

    #[test]
    fn test_oversized_count_fails_cleanly() {
        let mut arena = ArenaAllocator::<u64>::new(64);
        assert!(matches!(
            arena.allocate(usize::MAX),
            Err(ArenaError::OutOfMemory { .. })
        ));
        assert_eq!(snapshot(&arena), [free(0, 64)]);
    }

    #[test]
    fn test_typed_blocks_are_aligned_and_writable() {
        let mut arena = ArenaAllocator::<u64>::new(64);
        let a = arena.allocate(2).unwrap();
        let b = arena.allocate(3).unwrap();
        assert_eq!(a.addr().get() % align_of::<u64>(), 0);
        assert_eq!(b.addr().get() % align_of::<u64>(), 0);

        unsafe {
            a.write(1);
            a.add(1).write(2);
            for i in 0..3 {
                b.add(i).write(100 + i as u64);
            }
            assert_eq!(a.read(), 1);
            assert_eq!(a.add(1).read(), 2);
            assert_eq!(b.add(2).read(), 102);
        }

        arena.deallocate(a, 2).unwrap();
        arena.deallocate(b, 3).unwrap();
        assert_eq!(snapshot(&arena), [free(0, 64)]);
    }

    #[test]
    fn test_byte_accounting() {
        let mut arena = ArenaAllocator::<u8>::new(128);
        assert_eq!(arena.largest_free(), 128);

        let a = arena.allocate(40).unwrap();
        let _b = arena.allocate(40).unwrap();
        assert_eq!(arena.used_bytes(), 80);
        assert_eq!(arena.available_bytes(), 48);
        assert_eq!(arena.largest_free(), 48);

        arena.deallocate(a, 40).unwrap();
        assert_eq!(arena.used_bytes(), 40);
        assert_eq!(arena.available_bytes(), 88);
        assert_eq!(arena.largest_free(), 48);
    }

    #[test]
    fn test_equality_is_arena_identity() {
        let arena = ArenaAllocator::<u8>::new(32);
        let other = ArenaAllocator::<u8>::new(32);
        let same = &arena;
        assert_eq!(&arena, same);
        assert_ne!(arena, other);
    }

    #[test]
    fn test_debug_renders_ledger() {
        let mut arena = ArenaAllocator::<u8>::new(8);
        let _a = arena.allocate(3).unwrap();
        let rendered = format!("{arena:?}");
        assert!(rendered.contains("capacity: 8"));
        assert!(rendered.contains("Occupied"));
    }
}
