// SPDX-FileCopyrightText: 2025 2025 Contributors to the AVCodec buffer manager project.
// SPDX-License-Identifier: Apache-2.0

//! Codec buffers and the per-port buffer pool.
//!
//! # Key Types
//!
//! - [`CodecBuffer`]: Cloneable handle to a buffer, whatever memory backs it
//! - [`BufferMemory`]: Shared memory, compositor surface or DMA backing
//! - [`BufferAllocator`]: Source of internally allocated memory
//! - [`BufferRegistry`]: Id to buffer map with explicit liveness checks
//! - [`BufferPool`]: Free / in-flight / filled accounting for one port

pub mod descriptor;
pub mod memory;
pub mod pool;
pub mod registry;

pub use descriptor::{BufferFlags, BufferId, BufferInfo, CodecBuffer, Owner};
pub use memory::{BufferAllocator, BufferMemory, SharedMemory, SharedMemoryAllocator, SurfaceBuffer};
pub use pool::{BufferMode, BufferPool, PoolCounts};
pub use registry::BufferRegistry;
