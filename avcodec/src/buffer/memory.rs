// SPDX-FileCopyrightText: 2025 2025 Contributors to the AVCodec buffer manager project.
// SPDX-License-Identifier: Apache-2.0

//! Memory backing a codec buffer and the allocators that provide it.

use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tracing::{debug, warn};

use crate::{Error, Result};

/// A buffer owned by a compositor or display service.
///
/// Surfaces are supplied by the caller through external buffer mode; the
/// pool never allocates them.
pub trait SurfaceBuffer: Send + Sync + fmt::Debug {
    fn width(&self) -> i32;
    fn height(&self) -> i32;
    fn stride(&self) -> i32;
    /// Pixel format, as a value from the video format table.
    fn format(&self) -> i32;
    /// Size of the mapped surface in bytes.
    fn size(&self) -> usize;
}

/// Process-local shared memory region.
///
/// Clones share the same bytes.
#[derive(Clone, Default)]
pub struct SharedMemory {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedMemory {
    /// Creates a zero-filled region of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self {
            bytes: Arc::new(Mutex::new(vec![0; size])),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.bytes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies `data` into the region at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalArgument`] if the write would run past the end.
    pub fn write(&self, offset: usize, data: &[u8]) -> Result<()> {
        let mut bytes = self.lock();
        let end = offset
            .checked_add(data.len())
            .filter(|end| *end <= bytes.len())
            .ok_or_else(|| {
                Error::IllegalArgument(format!(
                    "write of {} bytes at offset {} exceeds capacity {}",
                    data.len(),
                    offset,
                    bytes.len()
                ))
            })?;
        bytes[offset..end].copy_from_slice(data);
        Ok(())
    }

    /// Copies `len` bytes starting at `offset` out of the region.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalArgument`] if the range runs past the end.
    pub fn read(&self, offset: usize, len: usize) -> Result<Vec<u8>> {
        let bytes = self.lock();
        let end = offset
            .checked_add(len)
            .filter(|end| *end <= bytes.len())
            .ok_or_else(|| {
                Error::IllegalArgument(format!(
                    "read of {} bytes at offset {} exceeds capacity {}",
                    len,
                    offset,
                    bytes.len()
                ))
            })?;
        Ok(bytes[offset..end].to_vec())
    }

    /// Runs `f` with exclusive access to the whole region.
    pub fn with_bytes<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        f(&mut self.lock())
    }
}

impl fmt::Debug for SharedMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedMemory")
            .field("len", &self.len())
            .finish()
    }
}

/// What backs a [`crate::CodecBuffer`].
#[derive(Clone, Debug)]
pub enum BufferMemory {
    Shared(SharedMemory),
    Surface(Arc<dyn SurfaceBuffer>),
    /// A DMA buffer file descriptor. The descriptor is owned by the caller.
    Dma { fd: i32, len: usize },
}

impl BufferMemory {
    /// Capacity in bytes.
    pub fn capacity(&self) -> usize {
        match self {
            BufferMemory::Shared(memory) => memory.len(),
            BufferMemory::Surface(surface) => surface.size(),
            BufferMemory::Dma { len, .. } => *len,
        }
    }

    pub fn as_shared(&self) -> Option<&SharedMemory> {
        match self {
            BufferMemory::Shared(memory) => Some(memory),
            _ => None,
        }
    }

    pub fn surface(&self) -> Option<&Arc<dyn SurfaceBuffer>> {
        match self {
            BufferMemory::Surface(surface) => Some(surface),
            _ => None,
        }
    }
}

/// Provides memory for internally allocated buffers.
pub trait BufferAllocator: Send + Sync {
    /// Allocates `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceExhausted`] if the platform cannot provide the memory.
    fn allocate(&self, size: usize) -> Result<BufferMemory>;

    /// Returns memory obtained from [`BufferAllocator::allocate`].
    fn release(&self, memory: &BufferMemory) {
        let _ = memory;
    }
}

#[derive(Debug, Default)]
struct Usage {
    buffers: usize,
    bytes: usize,
}

/// Allocates [`SharedMemory`] regions, optionally bounded by a buffer count
/// and a total byte budget.
///
/// # Examples
///
/// ```
/// use avcodec::{BufferAllocator, SharedMemoryAllocator};
///
/// let allocator = SharedMemoryAllocator::new().with_max_buffers(1);
/// let memory = allocator.allocate(4096).unwrap();
/// assert_eq!(memory.capacity(), 4096);
/// assert!(allocator.allocate(4096).is_err());
/// allocator.release(&memory);
/// assert!(allocator.allocate(4096).is_ok());
/// ```
#[derive(Debug, Default)]
pub struct SharedMemoryAllocator {
    max_buffers: Option<usize>,
    max_bytes: Option<usize>,
    usage: Mutex<Usage>,
}

impl SharedMemoryAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_buffers(mut self, max_buffers: usize) -> Self {
        self.max_buffers = Some(max_buffers);
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    fn usage(&self) -> MutexGuard<'_, Usage> {
        self.usage.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of regions currently handed out.
    pub fn allocated_buffers(&self) -> usize {
        self.usage().buffers
    }

    pub fn allocated_bytes(&self) -> usize {
        self.usage().bytes
    }
}

impl BufferAllocator for SharedMemoryAllocator {
    fn allocate(&self, size: usize) -> Result<BufferMemory> {
        if size == 0 {
            return Err(Error::IllegalArgument(
                "cannot allocate an empty buffer".to_string(),
            ));
        }
        let mut usage = self.usage();
        if self
            .max_buffers
            .is_some_and(|max| usage.buffers >= max)
        {
            warn!("Shared memory buffer limit of {} reached", usage.buffers);
            return Err(Error::ResourceExhausted(format!(
                "buffer limit of {} reached",
                usage.buffers
            )));
        }
        let bytes = usage.bytes.saturating_add(size);
        if self.max_bytes.is_some_and(|max| bytes > max) {
            warn!(
                "Shared memory budget exceeded: {} bytes in use, {} requested",
                usage.bytes, size
            );
            return Err(Error::ResourceExhausted(format!(
                "allocating {size} bytes exceeds the shared memory budget"
            )));
        }
        usage.buffers += 1;
        usage.bytes = bytes;
        debug!("Allocated {} bytes of shared memory", size);
        Ok(BufferMemory::Shared(SharedMemory::new(size)))
    }

    fn release(&self, memory: &BufferMemory) {
        if let BufferMemory::Shared(shared) = memory {
            let mut usage = self.usage();
            usage.buffers = usage.buffers.saturating_sub(1);
            usage.bytes = usage.bytes.saturating_sub(shared.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_memory_is_bounds_checked() {
        let memory = SharedMemory::new(8);
        memory.write(4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(memory.read(4, 4).unwrap(), vec![1, 2, 3, 4]);
        assert!(memory.write(6, &[0; 4]).is_err());
        assert!(memory.read(usize::MAX, 2).is_err());
        let clone = memory.clone();
        clone.with_bytes(|bytes| bytes[0] = 9);
        assert_eq!(memory.read(0, 1).unwrap(), vec![9]);
    }

    #[test]
    fn byte_budget_is_enforced() {
        let allocator = SharedMemoryAllocator::new().with_max_bytes(100);
        let first = allocator.allocate(60).unwrap();
        assert!(matches!(
            allocator.allocate(60),
            Err(Error::ResourceExhausted(_))
        ));
        allocator.release(&first);
        assert_eq!(allocator.allocated_bytes(), 0);
        assert!(allocator.allocate(100).is_ok());
    }
}
