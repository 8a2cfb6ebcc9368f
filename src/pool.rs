//! [`Pool`] implementation.
//!
//! Slots live in chunks that double in size and are allocated on first use.
//! A chunk never moves once allocated, so slots can be filled through `&self`
//! while other threads read their neighbours.

use std::{
    array::from_fn,
    iter::FusedIterator,
    ops::Index,
    sync::{
        atomic::{AtomicUsize, Ordering},
        OnceLock,
    },
};

use parking_lot::Mutex;

use crate::{ElementId, TreeError};

const FIRST_CHUNK_BITS: u32 = 5;
const FIRST_CHUNK: usize = 1 << FIRST_CHUNK_BITS;
const CHUNKS: usize = 28;

/// Slots available to [`ElementId`]s, `u32::MAX` itself is never handed out.
pub(crate) const MAX_SLOTS: usize = u32::MAX as usize;

type Chunk<T> = Box<[OnceLock<T>]>;

/// Chunk and offset of slot `index`.
fn locate(index: usize) -> (usize, usize) {
    let biased = index + FIRST_CHUNK;
    let chunk = (usize::BITS - 1 - biased.leading_zeros() - FIRST_CHUNK_BITS) as usize;
    (chunk, biased - (FIRST_CHUNK << chunk))
}

/// First slot index of `chunk`.
fn chunk_start(chunk: usize) -> usize {
    (FIRST_CHUNK << chunk) - FIRST_CHUNK
}

fn new_chunk<T>(chunk: usize) -> Chunk<T> {
    (0..FIRST_CHUNK << chunk).map(|_| OnceLock::new()).collect()
}

/// Slot storage handing out dense [`ElementId`]s.
///
/// Slots freed by [`remove`](Pool::remove) are kept as garbage and handed out
/// again by the next insertion.
pub(crate) struct Pool<T> {
    chunks: [OnceLock<Chunk<T>>; CHUNKS],
    /// Slots handed out so far, free ones included.
    reserved: AtomicUsize,
    len: AtomicUsize,
    garbage: Mutex<Vec<usize>>,
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Pool {
            chunks: from_fn(|_| OnceLock::new()),
            reserved: AtomicUsize::new(0),
            len: AtomicUsize::new(0),
            garbage: Mutex::new(Vec::new()),
        }
    }
}

impl<T> Index<ElementId> for Pool<T> {
    type Output = T;

    fn index(&self, index: ElementId) -> &Self::Output {
        match self.get(index) {
            Some(item) => item,
            None => panic!("Indexing garbaged element: {index}"),
        }
    }
}

impl<T> Pool<T> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        let pool = Pool::default();
        for (chunk, slots) in pool.chunks.iter().enumerate() {
            if chunk_start(chunk) >= capacity.min(MAX_SLOTS) {
                break;
            }
            slots.get_or_init(|| new_chunk(chunk));
        }
        pool
    }

    /// Stores `item`. Safe to call from several threads at once.
    pub(crate) fn insert(&self, item: T) -> Result<ElementId, TreeError> {
        let recycled = self.garbage.lock().pop();
        let index = match recycled {
            Some(index) => index,
            None => self
                .reserved
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                    (n < MAX_SLOTS).then_some(n + 1)
                })
                .map_err(|n| {
                    TreeError::CapacityExceeded(format!("all {n} element slots are taken"))
                })?,
        };
        let element = ElementId::try_from(index)?;

        let (chunk, offset) = locate(index);
        let slots = self.chunks[chunk].get_or_init(|| new_chunk(chunk));
        if slots[offset].set(item).is_err() {
            unreachable!("slot of {element} handed out twice");
        }
        self.len.fetch_add(1, Ordering::Release);
        Ok(element)
    }

    pub(crate) fn remove(&mut self, element: ElementId) -> Option<T> {
        let index = usize::from(element);
        let (chunk, offset) = locate(index);
        let item = self
            .chunks
            .get_mut(chunk)?
            .get_mut()?
            .get_mut(offset)?
            .take()?;
        self.garbage.get_mut().push(index);
        *self.len.get_mut() -= 1;
        Some(item)
    }

    pub(crate) fn clear(&mut self) {
        for slots in self.chunks.iter_mut() {
            slots.take();
        }
        *self.reserved.get_mut() = 0;
        *self.len.get_mut() = 0;
        self.garbage.get_mut().clear();
    }

    /// Drops trailing free slots and the chunks left without any slot.
    pub(crate) fn shrink(&mut self) {
        let mut reserved = *self.reserved.get_mut();
        while reserved > 0 && self.is_garbage(ElementId(reserved as u32 - 1)) {
            reserved -= 1;
        }
        *self.reserved.get_mut() = reserved;

        for (chunk, slots) in self.chunks.iter_mut().enumerate() {
            if chunk_start(chunk) >= reserved {
                slots.take();
            }
        }

        let garbage = self.garbage.get_mut();
        garbage.retain(|&index| index < reserved);
        garbage.shrink_to_fit();
    }

    /// Number of stored items. Free slots are not counted.
    pub(crate) fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    pub(crate) fn garbage_len(&self) -> usize {
        self.garbage.lock().len()
    }

    pub(crate) fn get(&self, element: ElementId) -> Option<&T> {
        let (chunk, offset) = locate(usize::from(element));
        self.chunks.get(chunk)?.get()?.get(offset)?.get()
    }

    pub(crate) fn is_garbage(&self, element: ElementId) -> bool {
        self.get(element).is_none()
    }

    /// Stored items with their ids, in id order.
    pub(crate) fn iter_elements(&self) -> PoolElementIterator<'_, T> {
        PoolElementIterator {
            pool: self,
            next: 0,
            end: self.reserved.load(Ordering::Acquire),
        }
    }
}

/// Iterator over the filled slots of a [`Pool`].
pub(crate) struct PoolElementIterator<'pool, T> {
    pool: &'pool Pool<T>,
    next: usize,
    end: usize,
}

impl<'pool, T> Iterator for PoolElementIterator<'pool, T> {
    type Item = (ElementId, &'pool T);

    fn next(&mut self) -> Option<Self::Item> {
        while self.next < self.end {
            let element = ElementId::try_from(self.next).ok()?;
            self.next += 1;
            if let Some(item) = self.pool.get(element) {
                return Some((element, item));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.end - self.next))
    }
}

impl<T> FusedIterator for PoolElementIterator<'_, T> {}
