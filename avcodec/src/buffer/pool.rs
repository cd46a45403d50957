// SPDX-FileCopyrightText: 2025 2025 Contributors to the AVCodec buffer manager project.
// SPDX-License-Identifier: Apache-2.0

//! Buffer accounting for a single port.
//!
//! Every buffer a pool knows about sits in exactly one of three queues:
//! free, in flight to the codec, or filled and awaiting pull. The queue sizes
//! always add up to the allocated count, and that count is fixed between
//! [`BufferPool::allocate`] / [`BufferPool::attach_external`] and
//! [`BufferPool::free`].

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use tracing::{debug, error, trace};

use super::{
    descriptor::{BufferId, BufferInfo, CodecBuffer, Owner},
    memory::BufferAllocator,
    registry::BufferRegistry,
};
use crate::{Error, Result};

/// Where a pool's buffers come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferMode {
    /// The pool allocates memory through its [`BufferAllocator`].
    #[default]
    Internal,
    /// The caller supplies buffers (for example compositor surfaces).
    External,
}

/// Snapshot of the queue sizes of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolCounts {
    pub allocated: usize,
    pub free: usize,
    pub in_flight: usize,
    pub filled: usize,
}

impl PoolCounts {
    /// `free + in_flight + filled == allocated`.
    pub fn is_conserved(&self) -> bool {
        self.free + self.in_flight + self.filled == self.allocated
    }
}

#[derive(Debug)]
struct Slot {
    buffer: CodecBuffer,
    owner: Owner,
    info: BufferInfo,
}

/// Free / in-flight / filled buffer accounting.
///
/// The pool is not synchronized; [`crate::BufferManager`] guards it with the
/// port mutex.
pub struct BufferPool {
    allocator: Arc<dyn BufferAllocator>,
    registry: Arc<BufferRegistry>,
    mode: BufferMode,
    slots: HashMap<BufferId, Slot>,
    free: VecDeque<BufferId>,
    in_flight: VecDeque<BufferId>,
    filled: VecDeque<BufferId>,
}

impl BufferPool {
    pub fn new(allocator: Arc<dyn BufferAllocator>, registry: Arc<BufferRegistry>) -> Self {
        Self {
            allocator,
            registry,
            mode: BufferMode::Internal,
            slots: HashMap::new(),
            free: VecDeque::new(),
            in_flight: VecDeque::new(),
            filled: VecDeque::new(),
        }
    }

    pub fn mode(&self) -> BufferMode {
        self.mode
    }

    pub fn allocated(&self) -> usize {
        self.slots.len()
    }

    pub fn counts(&self) -> PoolCounts {
        PoolCounts {
            allocated: self.slots.len(),
            free: self.free.len(),
            in_flight: self.in_flight.len(),
            filled: self.filled.len(),
        }
    }

    pub fn owner(&self, id: BufferId) -> Option<Owner> {
        self.slots.get(&id).map(|slot| slot.owner)
    }

    /// Every buffer of the pool, free ones first.
    pub fn buffers(&self) -> Vec<CodecBuffer> {
        self.free
            .iter()
            .chain(&self.in_flight)
            .chain(&self.filled)
            .filter_map(|id| self.slots.get(id))
            .map(|slot| slot.buffer.clone())
            .collect()
    }

    /// Ids of the free buffers, in the order they became free.
    pub fn free_ids(&self) -> Vec<BufferId> {
        self.free.iter().copied().collect()
    }

    /// Allocates `count` buffers of `size` bytes.
    ///
    /// Either every buffer is allocated or none is: on failure the buffers
    /// obtained so far are returned to the allocator.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidMode`] if the pool holds external buffers
    /// - [`Error::IllegalState`] if the pool already holds buffers
    /// - [`Error::ResourceExhausted`] if the allocator runs out of memory
    pub fn allocate(&mut self, count: usize, size: usize) -> Result<Vec<CodecBuffer>> {
        if self.mode == BufferMode::External {
            return Err(Error::InvalidMode(
                "pool holds external buffers; detach them first".to_string(),
            ));
        }
        if !self.slots.is_empty() {
            return Err(Error::IllegalState(format!(
                "pool already holds {} buffers",
                self.slots.len()
            )));
        }
        if count == 0 {
            return Err(Error::IllegalArgument(
                "buffer count must be positive".to_string(),
            ));
        }

        let mut buffers = Vec::with_capacity(count);
        for _ in 0..count {
            match self.allocator.allocate(size) {
                Ok(memory) => buffers.push(CodecBuffer::new(memory)),
                Err(err) => {
                    for buffer in &buffers {
                        self.allocator.release(buffer.memory());
                    }
                    return Err(err);
                }
            }
        }
        for buffer in &buffers {
            if let Err(err) = self.insert(buffer.clone()) {
                for buffer in &buffers {
                    self.remove(buffer.id());
                    self.allocator.release(buffer.memory());
                }
                return Err(err);
            }
        }
        debug!("Allocated {} buffers of {} bytes", count, size);
        Ok(buffers)
    }

    /// Wraps caller-supplied buffers without allocating. The pool enters
    /// [`BufferMode::External`] until [`BufferPool::free`].
    ///
    /// # Errors
    ///
    /// - [`Error::IllegalState`] if the pool already holds buffers
    /// - [`Error::IllegalArgument`] for an empty list or duplicate buffers
    pub fn attach_external(&mut self, buffers: Vec<CodecBuffer>) -> Result<()> {
        if !self.slots.is_empty() {
            return Err(Error::IllegalState(format!(
                "pool already holds {} buffers",
                self.slots.len()
            )));
        }
        if buffers.is_empty() {
            return Err(Error::IllegalArgument(
                "no external buffers supplied".to_string(),
            ));
        }
        let mut registered = Vec::with_capacity(buffers.len());
        for buffer in buffers {
            if let Err(err) = self.insert(buffer.clone()) {
                for id in registered {
                    self.remove(id);
                }
                return Err(err);
            }
            registered.push(buffer.id());
        }
        self.mode = BufferMode::External;
        debug!("Attached {} external buffers", self.slots.len());
        Ok(())
    }

    fn insert(&mut self, buffer: CodecBuffer) -> Result<()> {
        let id = self.registry.register(&buffer)?;
        buffer.set_flushed(false);
        self.slots.insert(
            id,
            Slot {
                buffer,
                owner: Owner::Free,
                info: BufferInfo::default(),
            },
        );
        self.free.push_back(id);
        Ok(())
    }

    fn remove(&mut self, id: BufferId) {
        self.registry.unregister(id);
        self.slots.remove(&id);
        self.free.retain(|free| *free != id);
    }

    fn slot(&self, id: BufferId) -> Result<&Slot> {
        self.slots
            .get(&id)
            .ok_or_else(|| {
                Error::IllegalArgument(format!("buffer {id} does not belong to this pool"))
            })
    }

    fn set_owner(&mut self, id: BufferId, owner: Owner) {
        if let Some(slot) = self.slots.get_mut(&id) {
            slot.owner = owner;
        }
    }

    /// Moves a free buffer in flight.
    ///
    /// # Errors
    ///
    /// - [`Error::IllegalArgument`] if `id` is not part of the pool
    /// - [`Error::Busy`] if the buffer is in flight or awaiting pull
    pub fn acquire(&mut self, id: BufferId) -> Result<CodecBuffer> {
        let slot = self.slot(id)?;
        if slot.owner != Owner::Free {
            return Err(Error::Busy(format!("buffer {id} is {}", slot.owner)));
        }
        let buffer = slot.buffer.clone();
        self.free.retain(|free| *free != id);
        self.in_flight.push_back(id);
        self.set_owner(id, Owner::InFlight);
        buffer.set_flushed(false);
        trace!("Buffer {} acquired", id);
        debug_assert!(self.counts().is_conserved());
        Ok(buffer)
    }

    /// Returns an in-flight buffer to the free queue.
    ///
    /// # Errors
    ///
    /// - [`Error::DoubleRelease`] if the buffer is already free; accounting is unchanged
    /// - [`Error::Busy`] if the buffer is awaiting pull
    pub fn release(&mut self, id: BufferId) -> Result<()> {
        let owner = self.slot(id)?.owner;
        match owner {
            Owner::Free => Err(Error::DoubleRelease(id)),
            Owner::Filled => Err(Error::Busy(format!("buffer {id} is awaiting pull"))),
            Owner::InFlight => {
                self.in_flight.retain(|in_flight| *in_flight != id);
                self.free.push_back(id);
                self.set_owner(id, Owner::Free);
                trace!("Buffer {} released", id);
                debug_assert!(self.counts().is_conserved());
                Ok(())
            }
        }
    }

    /// Records the codec's completion of an in-flight buffer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalState`] if the buffer is not in flight.
    pub fn mark_filled(&mut self, id: BufferId, info: BufferInfo) -> Result<()> {
        let owner = self.slot(id)?.owner;
        if owner != Owner::InFlight {
            return Err(Error::IllegalState(format!(
                "buffer {id} completed while {owner}"
            )));
        }
        self.in_flight.retain(|in_flight| *in_flight != id);
        self.filled.push_back(id);
        if let Some(slot) = self.slots.get_mut(&id) {
            slot.owner = Owner::Filled;
            slot.info = info;
        }
        debug_assert!(self.counts().is_conserved());
        Ok(())
    }

    /// Pops the oldest filled buffer and returns it to the free queue.
    pub fn take_filled(&mut self) -> Option<(CodecBuffer, BufferInfo)> {
        let id = self.filled.pop_front()?;
        self.free.push_back(id);
        self.set_owner(id, Owner::Free);
        debug_assert!(self.counts().is_conserved());
        self.slots
            .get(&id)
            .map(|slot| (slot.buffer.clone(), slot.info))
    }

    /// Returns every in-flight and filled buffer to the free queue without
    /// normal completion and marks them flushed.
    pub fn flush(&mut self) -> Vec<BufferId> {
        let reclaimed: Vec<BufferId> = self
            .in_flight
            .drain(..)
            .chain(self.filled.drain(..))
            .collect();
        for id in &reclaimed {
            if let Some(slot) = self.slots.get_mut(id) {
                slot.owner = Owner::Free;
                slot.info = BufferInfo::default();
                slot.buffer.set_flushed(true);
            }
            self.free.push_back(*id);
        }
        if !reclaimed.is_empty() {
            debug!("Flushed {} buffers", reclaimed.len());
        }
        debug_assert!(self.counts().is_conserved());
        reclaimed
    }

    /// Releases every buffer. Internally allocated memory goes back to the
    /// allocator and the pool returns to [`BufferMode::Internal`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] unless every buffer is free; nothing is released then.
    pub fn free(&mut self) -> Result<Vec<CodecBuffer>> {
        let counts = self.counts();
        if counts.free != counts.allocated {
            return Err(Error::Busy(format!(
                "{} buffers in flight and {} awaiting pull",
                counts.in_flight, counts.filled
            )));
        }
        let mut released = Vec::with_capacity(self.slots.len());
        for id in self.free.drain(..) {
            self.registry.unregister(id);
            if let Some(slot) = self.slots.remove(&id) {
                if self.mode == BufferMode::Internal {
                    self.allocator.release(slot.buffer.memory());
                }
                released.push(slot.buffer);
            }
        }
        if !self.slots.is_empty() {
            error!("{} buffers were not in any queue", self.slots.len());
            self.slots.clear();
        }
        self.mode = BufferMode::Internal;
        debug!("Freed {} buffers", released.len());
        Ok(released)
    }
}

impl Drop for BufferPool {
    /// Returns internally allocated memory still held by the pool.
    fn drop(&mut self) {
        for slot in self.slots.values() {
            self.registry.unregister(slot.buffer.id());
            if self.mode == BufferMode::Internal {
                self.allocator.release(slot.buffer.memory());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufferMemory, SharedMemory, SharedMemoryAllocator};

    fn pool() -> (BufferPool, Arc<SharedMemoryAllocator>, Arc<BufferRegistry>) {
        let allocator = Arc::new(SharedMemoryAllocator::new());
        let registry = Arc::new(BufferRegistry::new());
        (
            BufferPool::new(allocator.clone(), registry.clone()),
            allocator,
            registry,
        )
    }

    #[test]
    fn counts_are_conserved_through_a_cycle() {
        let (mut pool, allocator, registry) = pool();
        let buffers = pool.allocate(3, 64).unwrap();
        let ids: Vec<_> = buffers.iter().map(CodecBuffer::id).collect();
        assert_eq!(registry.len(), 3);

        pool.acquire(ids[0]).unwrap();
        pool.acquire(ids[1]).unwrap();
        pool.mark_filled(ids[1], BufferInfo::default()).unwrap();
        assert_eq!(
            pool.counts(),
            PoolCounts {
                allocated: 3,
                free: 1,
                in_flight: 1,
                filled: 1
            }
        );
        assert!(matches!(pool.free(), Err(Error::Busy(_))));

        let (pulled, _) = pool.take_filled().unwrap();
        assert_eq!(pulled.id(), ids[1]);
        pool.release(ids[0]).unwrap();
        assert!(pool.counts().is_conserved());

        pool.free().unwrap();
        assert_eq!(pool.allocated(), 0);
        assert_eq!(allocator.allocated_buffers(), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn double_release_leaves_accounting_intact() {
        let (mut pool, _, _) = pool();
        let id = pool.allocate(1, 16).unwrap()[0].id();
        let before = pool.counts();
        assert!(matches!(pool.release(id), Err(Error::DoubleRelease(d)) if d == id));
        assert_eq!(pool.counts(), before);
        assert!(matches!(
            pool.acquire(BufferId::new()),
            Err(Error::IllegalArgument(_))
        ));
    }

    #[test]
    fn external_buffers_block_allocation() {
        let (mut pool, allocator, _) = pool();
        let external = vec![
            CodecBuffer::new(BufferMemory::Shared(SharedMemory::new(32))),
            CodecBuffer::new(BufferMemory::Dma { fd: 7, len: 32 }),
        ];
        pool.attach_external(external).unwrap();
        assert_eq!(pool.mode(), BufferMode::External);
        assert!(matches!(pool.allocate(1, 32), Err(Error::InvalidMode(_))));
        assert_eq!(allocator.allocated_buffers(), 0);

        let released = pool.free().unwrap();
        assert_eq!(released.len(), 2);
        assert_eq!(pool.mode(), BufferMode::Internal);
        assert!(pool.allocate(1, 32).is_ok());
    }

    #[test]
    fn failed_allocation_commits_nothing() {
        let allocator = Arc::new(SharedMemoryAllocator::new().with_max_buffers(2));
        let registry = Arc::new(BufferRegistry::new());
        let mut pool = BufferPool::new(allocator.clone(), registry.clone());
        assert!(matches!(
            pool.allocate(3, 8),
            Err(Error::ResourceExhausted(_))
        ));
        assert_eq!(pool.allocated(), 0);
        assert_eq!(allocator.allocated_buffers(), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn flush_reclaims_in_flight_and_filled() {
        let (mut pool, _, _) = pool();
        let buffers = pool.allocate(4, 8).unwrap();
        for buffer in &buffers[..3] {
            pool.acquire(buffer.id()).unwrap();
        }
        pool.mark_filled(buffers[2].id(), BufferInfo::default()).unwrap();

        let reclaimed = pool.flush();
        assert_eq!(reclaimed.len(), 3);
        assert_eq!(pool.counts().free, 4);
        assert!(buffers[0].is_flushed());
        assert!(!buffers[3].is_flushed());
        pool.acquire(buffers[0].id()).unwrap();
        assert!(!buffers[0].is_flushed());
    }
}
