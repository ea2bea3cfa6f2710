//! Amortized O(1) first-in-first-out queue.
//!
//! The queue keeps two stacks: `inbound` receives pushes, `outbound` serves
//! pops. When `outbound` runs dry the whole `inbound` stack is reversed into
//! it. Every element crosses from one stack to the other exactly once, so a
//! sequence of `n` operations costs O(n) overall.
//!
//! Both stacks are plain owned vectors, so dropping a long queue never
//! recurses node by node.

use core::fmt;
use core::iter::FusedIterator;

/// A FIFO queue built from an inbound and an outbound stack.
#[derive(Clone)]
pub struct FifoQueue<T> {
    /// Most recently pushed element last.
    inbound: Vec<T>,
    /// Next element to pop last.
    outbound: Vec<T>,
}

impl<T> Default for FifoQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FifoQueue<T> {
    /// Creates an empty queue.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inbound: Vec::new(),
            outbound: Vec::new(),
        }
    }

    /// Creates an empty queue that can take `capacity` pushes before
    /// reallocating.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inbound: Vec::with_capacity(capacity),
            outbound: Vec::new(),
        }
    }

    /// Returns the number of queued elements.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.inbound.len() + self.outbound.len()
    }

    /// Returns true if no elements are queued.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inbound.is_empty() && self.outbound.is_empty()
    }

    /// Appends an element at the back.
    #[inline]
    pub fn enqueue(&mut self, value: T) {
        self.inbound.push(value);
    }

    /// Removes the element at the front.
    pub fn dequeue(&mut self) -> Option<T> {
        if self.outbound.is_empty() {
            self.outbound.extend(self.inbound.drain(..).rev());
        }
        self.outbound.pop()
    }

    /// Returns the element at the front without removing it.
    #[must_use]
    pub fn peek(&self) -> Option<&T> {
        self.outbound.last().or_else(|| self.inbound.first())
    }

    /// Removes every element.
    pub fn clear(&mut self) {
        self.inbound.clear();
        self.outbound.clear();
    }

    /// Iterates front to back without consuming anything.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            outbound: self.outbound.iter().rev(),
            inbound: self.inbound.iter(),
        }
    }

    /// Dequeues elements lazily, front to back.
    ///
    /// Elements not yet pulled when the iterator is dropped stay queued.
    pub fn drain(&mut self) -> Drain<'_, T> {
        Drain { queue: self }
    }
}

impl<T: fmt::Debug> fmt::Debug for FifoQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T> Extend<T> for FifoQueue<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.inbound.extend(iter);
    }
}

impl<T> FromIterator<T> for FifoQueue<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            inbound: iter.into_iter().collect(),
            outbound: Vec::new(),
        }
    }
}

impl<T> IntoIterator for FifoQueue<T> {
    type Item = T;
    type IntoIter = IntoIter<T>;

    fn into_iter(self) -> IntoIter<T> {
        IntoIter { queue: self }
    }
}

impl<'a, T> IntoIterator for &'a FifoQueue<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}

/// Borrowing front-to-back iterator, see [`FifoQueue::iter`].
#[derive(Debug, Clone)]
pub struct Iter<'a, T> {
    outbound: core::iter::Rev<core::slice::Iter<'a, T>>,
    inbound: core::slice::Iter<'a, T>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        self.outbound.next().or_else(|| self.inbound.next())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.outbound.len() + self.inbound.len();
        (len, Some(len))
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}
impl<T> FusedIterator for Iter<'_, T> {}

/// Destructive, single-pass iterator, see [`FifoQueue::drain`].
#[derive(Debug)]
pub struct Drain<'a, T> {
    queue: &'a mut FifoQueue<T>,
}

impl<T> Iterator for Drain<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.queue.dequeue()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.queue.len();
        (len, Some(len))
    }
}

impl<T> ExactSizeIterator for Drain<'_, T> {}
impl<T> FusedIterator for Drain<'_, T> {}

/// Consuming iterator returned by `FifoQueue::into_iter`.
#[derive(Debug)]
pub struct IntoIter<T> {
    queue: FifoQueue<T>,
}

impl<T> Iterator for IntoIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.queue.dequeue()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.queue.len();
        (len, Some(len))
    }
}

impl<T> ExactSizeIterator for IntoIter<T> {}
impl<T> FusedIterator for IntoIter<T> {}
