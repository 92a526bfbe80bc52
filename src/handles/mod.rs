//! Handle indirection - opaque handles standing in for object references
//!
//! Design: Slot table with a free list:
//! 1. `open` stores an owned reference and returns its slot as a handle
//! 2. `resolve` borrows the reference behind a handle (O(1) index)
//! 3. `close` releases the reference and recycles the slot
//!
//! A handle packs the slot index with the slot's reuse counter, which is
//! bumped on every close. A handle kept past its close therefore never
//! resolves to whatever later occupies the same slot.
//!
//! Each slot also records the debug generation it was opened in, which is
//! what the leak detector inspects.

mod leak;


pub use leak::{HandleLeakError, LeakDetector, LeakDetectorError};

use crate::fatal::abort_on_violation;
use crate::object::PyObject;
use std::fmt;

const HANDLE_REUSE_BITS: u32 = 16;
const HANDLE_INDEX_BITS: u32 = isize::BITS - 1 - HANDLE_REUSE_BITS;
const HANDLE_INDEX_MASK: usize = (1usize << HANDLE_INDEX_BITS) - 1;
const HANDLE_REUSE_MASK: usize = (1usize << HANDLE_REUSE_BITS) - 1;

/// Opaque handle; `Handle::NULL` is the "no value" sentinel
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(isize);

impl Handle {
    pub const NULL: Handle = Handle(0);

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn from_raw(raw: isize) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> isize {
        self.0
    }

    /// Reuse counters start at 1, so no live handle equals NULL
    #[inline]
    fn encode(index: usize, reuse: u16) -> Self {
        debug_assert!(index <= HANDLE_INDEX_MASK);
        Self((((reuse as usize) << HANDLE_INDEX_BITS) | index) as isize)
    }

    /// Slot index and reuse counter; `None` for NULL and malformed values
    #[inline]
    fn decode(self) -> Option<(usize, u16)> {
        if self.0 <= 0 {
            return None;
        }
        let bits = self.0 as usize;
        let reuse = ((bits >> HANDLE_INDEX_BITS) & HANDLE_REUSE_MASK) as u16;
        if reuse == 0 {
            return None;
        }
        Some((bits & HANDLE_INDEX_MASK, reuse))
    }
}

fn next_reuse(reuse: u16) -> u16 {
    match reuse.wrapping_add(1) {
        0 => 1,
        next => next,
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self::NULL
    }
}

struct Slot {
    object: Option<PyObject>,
    reuse: u16,
    generation: u64,
}

/// Open handle reported by debug queries
#[derive(Clone)]
pub struct DebugHandle {
    pub handle: Handle,
    pub generation: u64,
    pub object: PyObject,
}

impl fmt::Debug for DebugHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<DebugHandle 0x{:x} for {:?}>",
            self.handle.raw(),
            self.object
        )
    }
}

/// Handle table owned by one context
pub struct HandleTable {
    slots: Vec<Slot>,
    free: Vec<usize>,
    generation: u64,
    open: usize,
}

impl HandleTable {
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            generation: 0,
            open: 0,
        }
    }

    /// Take ownership of `object` and hand out a fresh handle for it
    pub fn open(&mut self, object: PyObject) -> Handle {
        let generation = self.generation;
        self.open += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index];
            slot.object = Some(object);
            slot.generation = generation;
            return Handle::encode(index, slot.reuse);
        }

        let index = self.slots.len();
        if index > HANDLE_INDEX_MASK {
            abort_on_violation("handle table exhausted");
        }
        self.slots.push(Slot {
            object: Some(object),
            reuse: 1,
            generation,
        });
        Handle::encode(index, 1)
    }

    /// Borrow the reference behind `handle`
    ///
    /// `None` for NULL, closed, or never-issued handles, including a closed
    /// handle whose slot has since been reused.
    #[inline]
    pub fn resolve(&self, handle: Handle) -> Option<&PyObject> {
        let (index, reuse) = handle.decode()?;
        let slot = self.slots.get(index)?;
        if slot.reuse != reuse {
            return None;
        }
        slot.object.as_ref()
    }

    /// Release `handle`, returning the reference it owned
    ///
    /// `None` when `handle` is not open; the table is left untouched.
    pub fn close(&mut self, handle: Handle) -> Option<PyObject> {
        let (index, reuse) = handle.decode()?;
        let slot = self.slots.get_mut(index)?;
        if slot.reuse != reuse {
            return None;
        }
        let object = slot.object.take()?;
        slot.reuse = next_reuse(slot.reuse);
        self.free.push(index);
        self.open -= 1;
        Some(object)
    }

    /// Second handle for the same object
    pub fn dup(&mut self, handle: Handle) -> Option<Handle> {
        let object = self.resolve(handle)?.clone();
        Some(self.open(object))
    }

    /// Number of open handles
    #[inline]
    pub fn len(&self) -> usize {
        self.open
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.open == 0
    }

    #[inline]
    pub fn current_generation(&self) -> u64 {
        self.generation
    }

    /// Start a new debug generation and return its number
    pub fn new_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Handles opened in `generation` or later that are still open
    pub fn open_handles(&self, generation: u64) -> Vec<DebugHandle> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.generation >= generation)
            .filter_map(|(index, slot)| {
                slot.object.as_ref().map(|object| DebugHandle {
                    handle: Handle::encode(index, slot.reuse),
                    generation: slot.generation,
                    object: object.clone(),
                })
            })
            .collect()
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}
