// SPDX-FileCopyrightText: 2025 2025 Contributors to the AVCodec buffer manager project.
// SPDX-License-Identifier: Apache-2.0

//! Buffer handles and per-transfer metadata.

use std::{
    fmt,
    ops::{BitOr, BitOrAssign},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::memory::{BufferMemory, SurfaceBuffer};
use crate::{Error, Result};

/// Unique identifier of a buffer within a process.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(Uuid);

impl BufferId {
    /// Generates a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for BufferId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Per-buffer stream flags.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct BufferFlags(u32);

impl BufferFlags {
    pub const NONE: BufferFlags = BufferFlags(0);
    /// Last buffer of the stream.
    pub const EOS: BufferFlags = BufferFlags(1 << 0);
    /// Buffer starts with a key frame.
    pub const SYNC_FRAME: BufferFlags = BufferFlags(1 << 1);
    pub const PARTIAL_FRAME: BufferFlags = BufferFlags(1 << 2);
    /// Buffer carries codec-specific data (parameter sets), not media.
    pub const CODEC_DATA: BufferFlags = BufferFlags(1 << 3);

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, other: BufferFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl BitOr for BufferFlags {
    type Output = BufferFlags;

    fn bitor(self, rhs: BufferFlags) -> BufferFlags {
        BufferFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for BufferFlags {
    fn bitor_assign(&mut self, rhs: BufferFlags) {
        self.0 |= rhs.0;
    }
}

/// Metadata travelling with a buffer on each push and completion.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BufferInfo {
    /// Presentation timestamp in microseconds.
    pub pts: i64,
    /// Start of valid data.
    pub offset: usize,
    /// Number of valid bytes from `offset`.
    pub length: usize,
    pub flags: BufferFlags,
}

impl BufferInfo {
    pub fn new(pts: i64, offset: usize, length: usize, flags: BufferFlags) -> Self {
        Self {
            pts,
            offset,
            length,
            flags,
        }
    }

    /// An empty end-of-stream marker.
    pub fn eos(pts: i64) -> Self {
        Self::new(pts, 0, 0, BufferFlags::EOS)
    }

    pub fn is_eos(&self) -> bool {
        self.flags.contains(BufferFlags::EOS)
    }
}

/// Which pool queue currently holds a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Owner {
    /// Free, available to push.
    Free,
    /// Handed to the codec.
    InFlight,
    /// Completed by the codec, awaiting pull.
    Filled,
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Owner::Free => "free",
            Owner::InFlight => "in-flight",
            Owner::Filled => "filled",
        })
    }
}

/// Handle to a codec buffer, independent of its backing memory.
///
/// Clones refer to the same buffer: they share the memory and the flushed flag.
///
/// # Examples
///
/// ```
/// use avcodec::{BufferMemory, CodecBuffer, SharedMemory};
///
/// # fn main() -> Result<(), avcodec::Error> {
/// let buffer = CodecBuffer::new(BufferMemory::Shared(SharedMemory::new(1024)));
/// buffer.write(0, b"frame")?;
/// assert_eq!(buffer.read(0, 5)?, b"frame");
/// assert!(buffer.surface().is_none());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct CodecBuffer {
    id: BufferId,
    memory: BufferMemory,
    flushed: Arc<AtomicBool>,
}

impl CodecBuffer {
    /// Wraps `memory` under a freshly generated id.
    pub fn new(memory: BufferMemory) -> Self {
        Self {
            id: BufferId::new(),
            memory,
            flushed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Wraps a caller-owned surface.
    pub fn from_surface(surface: Arc<dyn SurfaceBuffer>) -> Self {
        Self::new(BufferMemory::Surface(surface))
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn memory(&self) -> &BufferMemory {
        &self.memory
    }

    pub fn capacity(&self) -> usize {
        self.memory.capacity()
    }

    /// The compositor surface, if this buffer is surface backed.
    pub fn surface(&self) -> Option<&Arc<dyn SurfaceBuffer>> {
        self.memory.surface()
    }

    /// `true` if the buffer was last reclaimed by a flush rather than
    /// completed by the codec.
    pub fn is_flushed(&self) -> bool {
        self.flushed.load(Ordering::Acquire)
    }

    pub(crate) fn set_flushed(&self, flushed: bool) {
        self.flushed.store(flushed, Ordering::Release);
    }

    /// Writes into shared memory backing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalArgument`] for surface or DMA backed buffers,
    /// or if the write exceeds the capacity.
    pub fn write(&self, offset: usize, data: &[u8]) -> Result<()> {
        self.shared()?.write(offset, data)
    }

    /// Reads from shared memory backing.
    ///
    /// # Errors
    ///
    /// Same as [`CodecBuffer::write`].
    pub fn read(&self, offset: usize, len: usize) -> Result<Vec<u8>> {
        self.shared()?.read(offset, len)
    }

    fn shared(&self) -> Result<&super::SharedMemory> {
        self.memory.as_shared().ok_or_else(|| {
            Error::IllegalArgument(format!("buffer {} is not CPU accessible", self.id))
        })
    }
}
