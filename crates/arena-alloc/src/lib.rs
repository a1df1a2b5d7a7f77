//! Fixed-capacity memory arena with explicit region bookkeeping.
//!
//! This crate provides [`ArenaAllocator`], an allocator that owns one
//! contiguous byte buffer reserved at construction and hands out typed
//! blocks from it. The buffer is partitioned into a sequence of
//! non-overlapping regions, each tagged free or occupied, tracked in an
//! address-ordered ledger; the allocator never asks the system for more
//! memory after construction.
//!
//! # Algorithm
//!
//! - **Allocation**: first-fit scan of the region ledger from the lowest
//!   address; the first free region large enough wins. An exact fit flips
//!   the region to occupied in place, a larger one is split and the
//!   remainder kept as a free region right after the block.
//! - **Deallocation**: the block's region is flipped back to free and
//!   eagerly merged with free neighbors on both sides, so the ledger never
//!   keeps two adjacent free regions.
//!
//! # Usage Example
//!
//! ```rust
//! use arena_alloc::ArenaAllocator;
//!
//! let mut arena = ArenaAllocator::<u8>::new(100);
//!
//! let a = arena.allocate(10).unwrap();
//! let b = arena.allocate(20).unwrap();
//!
//! arena.deallocate(a, 10).unwrap();
//! arena.deallocate(b, 20).unwrap();
//!
//! // everything was returned, so the ledger is a single free span again
//! assert_eq!(arena.available_bytes(), 100);
//! assert_eq!(arena.regions().count(), 1);
//! ```
//!
//! # Failure Modes
//!
//! Allocation fails with [`ArenaError::OutOfMemory`] when no free region
//! is large enough, deallocation with [`ArenaError::InvalidPointer`] when
//! the pointer is not the base of a live block (double frees and foreign
//! pointers included). Both leave the arena untouched.
//!
//! # Performance Characteristics
//!
//! - **Allocation**: O(n) in the number of regions
//! - **Deallocation**: O(n) lookup, O(1) coalescing
//! - **Memory Overhead**: one ledger record per region, stored outside the
//!   arena buffer
//!
//! # Thread Safety
//!
//! An [`ArenaAllocator`] is `Send` but not `Sync`. It can be moved between
//! threads but requires external synchronization for concurrent access.

#![no_std]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

extern crate alloc;

pub mod arena;
pub mod region;

pub use self::{
    arena::{ArenaAllocator, ArenaError},
    region::{Region, RegionState},
};
