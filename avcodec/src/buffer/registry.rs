// SPDX-FileCopyrightText: 2025 2025 Contributors to the AVCodec buffer manager project.
// SPDX-License-Identifier: Apache-2.0

//! Id-keyed buffer registry.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use tracing::trace;

use super::descriptor::{BufferId, CodecBuffer};
use crate::{Error, Result};

/// Maps [`BufferId`]s to the buffers a session currently knows about.
///
/// A buffer is alive from the moment a pool registers it until the pool
/// frees it. Lookups of ids that were never registered, or were already
/// unregistered, fail explicitly.
#[derive(Debug, Default)]
pub struct BufferRegistry {
    entries: Mutex<HashMap<BufferId, CodecBuffer>>,
}

impl BufferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<BufferId, CodecBuffer>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `buffer`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalArgument`] if a buffer with the same id is already alive.
    pub fn register(&self, buffer: &CodecBuffer) -> Result<BufferId> {
        let mut entries = self.entries();
        let id = buffer.id();
        if entries.contains_key(&id) {
            return Err(Error::IllegalArgument(format!(
                "buffer {id} is already registered"
            )));
        }
        entries.insert(id, buffer.clone());
        trace!("Registered buffer {}", id);
        Ok(id)
    }

    /// Removes `id`, returning the buffer if it was alive.
    pub fn unregister(&self, id: BufferId) -> Option<CodecBuffer> {
        let removed = self.entries().remove(&id);
        if removed.is_some() {
            trace!("Unregistered buffer {}", id);
        }
        removed
    }

    pub fn is_alive(&self, id: BufferId) -> bool {
        self.entries().contains_key(&id)
    }

    /// Looks up a live buffer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalArgument`] if `id` is not alive.
    pub fn get(&self, id: BufferId) -> Result<CodecBuffer> {
        self.entries()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::IllegalArgument(format!("unknown buffer {id}")))
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufferMemory, SharedMemory};

    #[test]
    fn liveness_follows_registration() {
        let registry = BufferRegistry::new();
        let buffer = CodecBuffer::new(BufferMemory::Shared(SharedMemory::new(4)));
        let id = registry.register(&buffer).unwrap();
        assert!(registry.is_alive(id));
        assert!(registry.register(&buffer).is_err());
        assert_eq!(registry.get(id).unwrap().id(), id);
        assert!(registry.unregister(id).is_some());
        assert!(!registry.is_alive(id));
        assert!(registry.get(id).is_err());
        assert!(registry.unregister(id).is_none());
    }
}
