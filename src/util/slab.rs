//! Generational slab for scheduled task actions.
//!
//! The scheduler parks each pending action in a slot and hands out a
//! [`SlabKey`]. Removing a slot bumps its generation, so a stale key held by
//! a cancel handle can never reach an action that later reuses the slot.
//!
//! # Design
//!
//! - Slots live in a `Vec`; vacant slots are threaded into a free list
//! - Each slot carries a generation counter that increments on removal
//! - No unsafe code; stale keys simply miss

use core::fmt;

/// Key into a [`Slab`], valid until the slot is removed.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlabKey {
    index: usize,
    generation: u64,
}

impl SlabKey {
    /// Returns the slot index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.index
    }

    /// Returns the slot generation this key was issued for.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u64 {
        self.generation
    }
}

impl fmt::Debug for SlabKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SlabKey({}:{})", self.index, self.generation)
    }
}

enum Slot<T> {
    Occupied { value: T, generation: u64 },
    Vacant { next_free: Option<usize>, generation: u64 },
}

/// Storage with stable, generation-checked keys.
pub struct Slab<T> {
    slots: Vec<Slot<T>>,
    free_head: Option<usize>,
    len: usize,
}

impl<T> Default for Slab<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Slab<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slab")
            .field("len", &self.len)
            .field("slots", &self.slots.len())
            .finish()
    }
}

impl<T> Slab<T> {
    /// Creates an empty slab.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_head: None,
            len: 0,
        }
    }

    /// Returns the number of occupied slots.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no slot is occupied.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Stores `value` and returns its key, reusing a vacant slot if any.
    pub fn insert(&mut self, value: T) -> SlabKey {
        self.len += 1;
        if let Some(index) = self.free_head {
            if let Slot::Vacant {
                next_free,
                generation,
            } = self.slots[index]
            {
                self.free_head = next_free;
                self.slots[index] = Slot::Occupied { value, generation };
                return SlabKey { index, generation };
            }
        }
        let index = self.slots.len();
        self.slots.push(Slot::Occupied {
            value,
            generation: 0,
        });
        SlabKey {
            index,
            generation: 0,
        }
    }

    /// Removes and returns the value behind `key`.
    ///
    /// Returns `None` if the slot is vacant or was reused since `key` was
    /// issued.
    pub fn remove(&mut self, key: SlabKey) -> Option<T> {
        let slot = self.slots.get_mut(key.index)?;
        match slot {
            Slot::Occupied { generation, .. } if *generation == key.generation => {
                let vacant = Slot::Vacant {
                    next_free: self.free_head,
                    generation: generation.wrapping_add(1),
                };
                let Slot::Occupied { value, .. } = core::mem::replace(slot, vacant) else {
                    return None;
                };
                self.free_head = Some(key.index);
                self.len -= 1;
                Some(value)
            }
            _ => None,
        }
    }

    /// Returns true if `key` still refers to an occupied slot.
    #[must_use]
    pub fn contains(&self, key: SlabKey) -> bool {
        matches!(
            self.slots.get(key.index),
            Some(Slot::Occupied { generation, .. }) if *generation == key.generation
        )
    }

    /// Vacates every slot, invalidating all outstanding keys.
    pub fn clear(&mut self) {
        let mut free_head = None;
        for (index, slot) in self.slots.iter_mut().enumerate().rev() {
            let generation = match slot {
                Slot::Occupied { generation, .. } => generation.wrapping_add(1),
                Slot::Vacant { generation, .. } => *generation,
            };
            *slot = Slot::Vacant {
                next_free: free_head,
                generation,
            };
            free_head = Some(index);
        }
        self.free_head = free_head;
        self.len = 0;
    }
}
