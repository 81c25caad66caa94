// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Stand-in for memory the normal world shares with the secure world

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use litebox_common_optee::{TeeParam, TeeResult};

/// Buffers a normal-world client has shared, addressed by an opaque buffer reference.
///
/// Memory reference parameters carry such a reference in their `buffer` field. Every buffer has
/// a fixed capacity, chosen by the client when it shares it.
pub struct NormalWorldMemory {
    buffers: Mutex<HashMap<u64, Vec<u8>>>,
    next_ref: AtomicU64,
}

impl Default for NormalWorldMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl NormalWorldMemory {
    pub fn new() -> Self {
        NormalWorldMemory {
            buffers: Mutex::new(HashMap::new()),
            // Non-zero so that a buffer reference is never mistaken for an absent one
            next_ref: AtomicU64::new(0x1000),
        }
    }

    /// Share a buffer of `capacity` bytes starting out with `data`.
    pub fn share(&self, data: &[u8], capacity: usize) -> u64 {
        let mut buffer = data.to_vec();
        buffer.resize(capacity.max(data.len()), 0);
        let buffer_ref = self.next_ref.fetch_add(0x1000, Ordering::Relaxed);
        self.buffers.lock().unwrap().insert(buffer_ref, buffer);
        buffer_ref
    }

    /// Stop sharing a buffer, handing its contents back.
    pub fn unshare(&self, buffer_ref: u64) -> Option<Vec<u8>> {
        self.buffers.lock().unwrap().remove(&buffer_ref)
    }

    /// The first `len` bytes of a buffer.
    pub fn read(&self, buffer_ref: u64, len: u64) -> Result<Vec<u8>, TeeResult> {
        let buffers = self.buffers.lock().unwrap();
        let buffer = buffers.get(&buffer_ref).ok_or(TeeResult::BadParameters)?;
        let len = usize::try_from(len).map_err(|_| TeeResult::BadParameters)?;
        buffer
            .get(..len)
            .map(<[u8]>::to_vec)
            .ok_or(TeeResult::BadParameters)
    }

    /// Overwrite the start of a buffer with `data`. Fails with `ShortBuffer` if it does not fit.
    pub fn write(&self, buffer_ref: u64, data: &[u8]) -> Result<(), TeeResult> {
        let mut buffers = self.buffers.lock().unwrap();
        let buffer = buffers
            .get_mut(&buffer_ref)
            .ok_or(TeeResult::BadParameters)?;
        let dst = buffer.get_mut(..data.len()).ok_or(TeeResult::ShortBuffer)?;
        dst.copy_from_slice(data);
        Ok(())
    }

    /// A copy of the whole buffer.
    pub fn contents(&self, buffer_ref: u64) -> Option<Vec<u8>> {
        self.buffers.lock().unwrap().get(&buffer_ref).cloned()
    }

    /// The bytes a memory reference parameter refers to.
    pub fn read_memref(&self, param: &TeeParam) -> Result<Vec<u8>, TeeResult> {
        let (buffer, size) = param.memref().ok_or(TeeResult::BadParameters)?;
        self.read(buffer, size)
    }
}
