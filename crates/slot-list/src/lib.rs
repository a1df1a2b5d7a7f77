//! An ordered sequence container with stable position handles.
//!
//! `SlotList` is a doubly-linked list whose nodes live in a growable slot
//! arena instead of individually boxed heap cells. A position is identified
//! by a [`Handle`], a generation-tagged slot index that stays valid while
//! its record is alive no matter how the rest of the sequence is spliced
//! around it, and is detected as stale once the record is removed.
//!
//! # Features
//!
//! - **Stable handles**: insertion and removal elsewhere in the sequence
//!   never invalidate a handle
//! - **Checked access**: using a handle after its record was removed fails
//!   with [`HandleError::Stale`] instead of aliasing reused storage
//! - **O(1) splicing**: insert-before, insert-after, remove, and neighbor
//!   lookup given a handle
//! - **No-std support**: requires `alloc` for the slot storage
//!
//! # Examples
//!
//! ```
//! use slot_list::SlotList;
//!
//! let mut list = SlotList::new();
//! let first = list.push_back("lo");
//! let last = list.push_back("hi");
//!
//! list.insert_before(last, "mid").unwrap();
//! assert_eq!(list.iter().copied().collect::<Vec<_>>(), ["lo", "mid", "hi"]);
//!
//! list.remove(first).unwrap();
//! assert!(list.get(first).is_err()); // `first` is stale now
//! ```
//!
//! # Performance
//!
//! - Insert/remove at a known handle: O(1)
//! - Neighbor lookup (`next`/`prev`): O(1)
//! - Forward traversal: O(1) per element
//! - Memory: one slot per record; vacant slots are reused before the
//!   backing storage grows

#![cfg_attr(not(test), no_std)]

extern crate alloc;

use alloc::vec::Vec;
use core::{
    fmt, mem,
    sync::atomic::{AtomicU32, Ordering},
};

use snafu::{Location, Snafu, ensure};

/// Errors reported when a [`Handle`] fails to resolve.
#[derive(Debug, Snafu)]
#[snafu(module)]
pub enum HandleError {
    /// The referent record was erased from the list.
    #[snafu(display("stale handle: slot {index} generation {generation} was erased"))]
    Stale {
        /// Slot index the handle pointed at.
        index: u32,
        /// Generation the handle was minted with.
        generation: u32,
        #[snafu(implicit)]
        location: Location,
    },
    /// The handle was minted by a different [`SlotList`] instance.
    #[snafu(display("foreign handle: minted by list {minted_by}, used on list {used_on}"))]
    Foreign {
        /// Id of the list that minted the handle.
        minted_by: u32,
        /// Id of the list the handle was used on.
        used_on: u32,
        #[snafu(implicit)]
        location: Location,
    },
}

/// A stable reference to one position in a [`SlotList`].
///
/// Handles are minted by the inserting operations and stay valid until the
/// record they refer to is removed. Every list operation that takes a
/// handle re-validates it first, so a handle that outlived its record is
/// reported as [`HandleError::Stale`] rather than resolving to whatever
/// record reuses the slot later.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Handle {
    list: u32,
    index: u32,
    generation: u32,
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    state: SlotState<T>,
}

#[derive(Debug)]
enum SlotState<T> {
    Live {
        value: T,
        prev: Option<u32>,
        next: Option<u32>,
    },
    Vacant {
        next_free: Option<u32>,
    },
}

static NEXT_LIST_ID: AtomicU32 = AtomicU32::new(0);

/// An ordered sequence of records with stable position handles.
///
/// Records are kept in insertion order and linked both ways, so neighbor
/// lookup is O(1) in either direction. Storage is a slot arena: removing a
/// record vacates its slot onto an internal free list and bumps the slot's
/// generation, which is what lets stale handles be detected cheaply.
///
/// # Examples
///
/// ```
/// use slot_list::SlotList;
///
/// let mut list = SlotList::new();
/// let a = list.push_back(1);
/// let c = list.push_back(3);
/// let b = list.insert_before(c, 2).unwrap();
///
/// assert_eq!(*list.get(b).unwrap(), 2);
/// assert_eq!(list.next(a).unwrap(), Some(b));
/// assert_eq!(list.prev(c).unwrap(), Some(b));
/// ```
pub struct SlotList<T> {
    slots: Vec<Slot<T>>,
    head: Option<u32>,
    tail: Option<u32>,
    free: Option<u32>,
    len: usize,
    id: u32,
}

impl<T> SlotList<T> {
    /// Creates a new empty `SlotList`.
    ///
    /// # Examples
    ///
    /// ```
    /// use slot_list::SlotList;
    ///
    /// let list = SlotList::<u32>::new();
    /// assert!(list.is_empty());
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            head: None,
            tail: None,
            free: None,
            len: 0,
            id: NEXT_LIST_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Returns the number of records in the list.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the list contains no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Returns a handle to the first record, or `None` when empty.
    #[must_use]
    pub fn head(&self) -> Option<Handle> {
        self.head.map(|index| self.handle(index))
    }

    /// Returns a handle to the last record, or `None` when empty.
    #[must_use]
    pub fn tail(&self) -> Option<Handle> {
        self.tail.map(|index| self.handle(index))
    }

    /// Returns `true` if `handle` currently resolves to a live record.
    #[must_use]
    pub fn contains(&self, handle: Handle) -> bool {
        self.live(handle).is_ok()
    }

    /// Returns a shared reference to the record at `handle`.
    ///
    /// # Examples
    ///
    /// ```
    /// use slot_list::SlotList;
    ///
    /// let mut list = SlotList::new();
    /// let h = list.push_back(7);
    /// assert_eq!(*list.get(h).unwrap(), 7);
    /// ```
    pub fn get(&self, handle: Handle) -> Result<&T, HandleError> {
        self.live(handle).map(|(value, _, _)| value)
    }

    /// Returns a mutable reference to the record at `handle`.
    pub fn get_mut(&mut self, handle: Handle) -> Result<&mut T, HandleError> {
        ensure!(
            handle.list == self.id,
            handle_error::ForeignSnafu {
                minted_by: handle.list,
                used_on: self.id,
            }
        );
        if let Some(Slot {
            generation,
            state: SlotState::Live { value, .. },
        }) = self.slots.get_mut(handle.index as usize)
        {
            if *generation == handle.generation {
                return Ok(value);
            }
        }
        handle_error::StaleSnafu {
            index: handle.index,
            generation: handle.generation,
        }
        .fail()
    }

    /// Returns a handle to the record after `handle`, or `None` at the end
    /// of the sequence.
    pub fn next(&self, handle: Handle) -> Result<Option<Handle>, HandleError> {
        let (_, _, next) = self.live(handle)?;
        Ok(next.map(|index| self.handle(index)))
    }

    /// Returns a handle to the record before `handle`, or `None` at the
    /// start of the sequence.
    pub fn prev(&self, handle: Handle) -> Result<Option<Handle>, HandleError> {
        let (_, prev, _) = self.live(handle)?;
        Ok(prev.map(|index| self.handle(index)))
    }

    /// Appends a record at the end of the sequence.
    ///
    /// # Panics
    ///
    /// Panics if the list has exhausted the `u32` slot index space.
    ///
    /// # Examples
    ///
    /// ```
    /// use slot_list::SlotList;
    ///
    /// let mut list = SlotList::new();
    /// list.push_back("a");
    /// list.push_back("b");
    /// assert_eq!(list.len(), 2);
    /// ```
    pub fn push_back(&mut self, value: T) -> Handle {
        let tail = self.tail;
        let index = self.alloc_slot(value, tail, None);
        match tail {
            Some(tail) => self.set_next(tail, Some(index)),
            None => self.head = Some(index),
        }
        self.tail = Some(index);
        self.len += 1;
        self.handle(index)
    }

    /// Inserts a record immediately before `position`.
    ///
    /// Inserting before [`head`](Self::head) makes the new record the head.
    ///
    /// # Examples
    ///
    /// ```
    /// use slot_list::SlotList;
    ///
    /// let mut list = SlotList::new();
    /// let old_head = list.push_back(2);
    /// let new_head = list.insert_before(old_head, 1).unwrap();
    /// assert_eq!(list.head(), Some(new_head));
    /// ```
    pub fn insert_before(&mut self, position: Handle, value: T) -> Result<Handle, HandleError> {
        let (_, prev, _) = self.live(position)?;
        let index = self.alloc_slot(value, prev, Some(position.index));
        match prev {
            Some(prev) => self.set_next(prev, Some(index)),
            None => self.head = Some(index),
        }
        self.set_prev(position.index, Some(index));
        self.len += 1;
        Ok(self.handle(index))
    }

    /// Inserts a record immediately after `position`.
    ///
    /// Inserting after [`tail`](Self::tail) makes the new record the tail.
    pub fn insert_after(&mut self, position: Handle, value: T) -> Result<Handle, HandleError> {
        let (_, _, next) = self.live(position)?;
        let index = self.alloc_slot(value, Some(position.index), next);
        match next {
            Some(next) => self.set_prev(next, Some(index)),
            None => self.tail = Some(index),
        }
        self.set_next(position.index, Some(index));
        self.len += 1;
        Ok(self.handle(index))
    }

    /// Removes the record at `position` and returns its value.
    ///
    /// The slot's generation is bumped, so `position` (and every copy of
    /// it) is stale from now on, even after the slot is reused.
    ///
    /// # Examples
    ///
    /// ```
    /// use slot_list::SlotList;
    ///
    /// let mut list = SlotList::new();
    /// let h = list.push_back(9);
    /// assert_eq!(list.remove(h).unwrap(), 9);
    /// assert!(list.remove(h).is_err());
    /// ```
    pub fn remove(&mut self, position: Handle) -> Result<T, HandleError> {
        let (_, prev, next) = self.live(position)?;
        match prev {
            Some(prev) => self.set_next(prev, next),
            None => self.head = next,
        }
        match next {
            Some(next) => self.set_prev(next, prev),
            None => self.tail = prev,
        }
        let free = self.free;
        let slot = &mut self.slots[position.index as usize];
        slot.generation = slot.generation.wrapping_add(1);
        let state = mem::replace(&mut slot.state, SlotState::Vacant { next_free: free });
        self.free = Some(position.index);
        self.len -= 1;
        let SlotState::Live { value, .. } = state else {
            unreachable!("resolved handle pointed at a vacant slot");
        };
        Ok(value)
    }

    /// Returns a forward iterator over the record values.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            current: self.head,
            remaining: self.len,
        }
    }

    /// Returns a forward iterator over `(handle, value)` pairs.
    pub fn handles(&self) -> Handles<'_, T> {
        Handles {
            list: self,
            current: self.head,
            remaining: self.len,
        }
    }

    fn handle(&self, index: u32) -> Handle {
        Handle {
            list: self.id,
            index,
            generation: self.slots[index as usize].generation,
        }
    }

    fn live(&self, handle: Handle) -> Result<(&T, Option<u32>, Option<u32>), HandleError> {
        ensure!(
            handle.list == self.id,
            handle_error::ForeignSnafu {
                minted_by: handle.list,
                used_on: self.id,
            }
        );
        if let Some(Slot {
            generation,
            state: SlotState::Live { value, prev, next },
        }) = self.slots.get(handle.index as usize)
        {
            if *generation == handle.generation {
                return Ok((value, *prev, *next));
            }
        }
        handle_error::StaleSnafu {
            index: handle.index,
            generation: handle.generation,
        }
        .fail()
    }

    /// Claims a slot for a new live record, reusing a vacant one if any.
    #[expect(clippy::cast_possible_truncation)]
    fn alloc_slot(&mut self, value: T, prev: Option<u32>, next: Option<u32>) -> u32 {
        let state = SlotState::Live { value, prev, next };
        match self.free {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                let SlotState::Vacant { next_free } = slot.state else {
                    unreachable!("free list references a live slot");
                };
                self.free = next_free;
                slot.state = state;
                index
            }
            None => {
                assert!(
                    self.slots.len() < u32::MAX as usize,
                    "slot index space exhausted"
                );
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    state,
                });
                index
            }
        }
    }

    fn set_next(&mut self, index: u32, new_next: Option<u32>) {
        let SlotState::Live { next, .. } = &mut self.slots[index as usize].state else {
            unreachable!("relinking a vacant slot");
        };
        *next = new_next;
    }

    fn set_prev(&mut self, index: u32, new_prev: Option<u32>) {
        let SlotState::Live { prev, .. } = &mut self.slots[index as usize].state else {
            unreachable!("relinking a vacant slot");
        };
        *prev = new_prev;
    }
}

impl<T> Default for SlotList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for SlotList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T> Extend<T> for SlotList<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.push_back(value);
        }
    }
}

impl<T> FromIterator<T> for SlotList<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut list = Self::new();
        list.extend(iter);
        list
    }
}

impl<'a, T> IntoIterator for &'a SlotList<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A forward iterator over the values of a [`SlotList`].
///
/// This struct is created by the [`iter`](SlotList::iter) method.
pub struct Iter<'a, T> {
    list: &'a SlotList<T>,
    current: Option<u32>,
    remaining: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.current?;
        let SlotState::Live { value, next, .. } = &self.list.slots[index as usize].state else {
            unreachable!("list links lead to a vacant slot");
        };
        self.current = *next;
        self.remaining -= 1;
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}

/// A forward iterator over `(handle, value)` pairs of a [`SlotList`].
///
/// This struct is created by the [`handles`](SlotList::handles) method.
pub struct Handles<'a, T> {
    list: &'a SlotList<T>,
    current: Option<u32>,
    remaining: usize,
}

impl<'a, T> Iterator for Handles<'a, T> {
    type Item = (Handle, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.current?;
        let handle = self.list.handle(index);
        let SlotState::Live { value, next, .. } = &self.list.slots[index as usize].state else {
            unreachable!("list links lead to a vacant slot");
        };
        self.current = *next;
        self.remaining -= 1;
        Some((handle, value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> ExactSizeIterator for Handles<'_, T> {}
