// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Preallocated per-request scratch storage

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::ops::{Deref, DerefMut};

use litebox_common_optee::{TeeIdentity, TeeParamSet, TeeResult};
use spin::mutex::SpinMutex;

/// Working copies a request needs while it is being served.
#[derive(Debug, Default)]
pub struct Scratch {
    pub params: TeeParamSet,
    pub identity: TeeIdentity,
}

/// A fixed number of [`Scratch`] areas shared by all in-flight requests.
///
/// All areas are allocated up front, so running out of them is how memory exhaustion shows up
/// at this layer.
pub struct ScratchPool {
    free: SpinMutex<Vec<Box<Scratch>>>,
}

impl ScratchPool {
    pub fn new(slots: usize) -> Self {
        let free = (0..slots).map(|_| Box::<Scratch>::default()).collect();
        ScratchPool {
            free: SpinMutex::new(free),
        }
    }

    /// Take a scratch area, or fail with `OutOfMemory` if all of them are in use.
    pub fn acquire(&self) -> Result<ScratchGuard<'_>, TeeResult> {
        let scratch = self.free.lock().pop().ok_or(TeeResult::OutOfMemory)?;
        Ok(ScratchGuard {
            pool: self,
            scratch: Some(scratch),
        })
    }

    /// Number of scratch areas not currently held by a request.
    pub fn available(&self) -> usize {
        self.free.lock().len()
    }
}

/// A scratch area on loan from a [`ScratchPool`].
///
/// Dropping the guard wipes the area and gives it back, whichever way the request ends.
pub struct ScratchGuard<'a> {
    pool: &'a ScratchPool,
    // Only `None` while being dropped
    scratch: Option<Box<Scratch>>,
}

impl Deref for ScratchGuard<'_> {
    type Target = Scratch;

    fn deref(&self) -> &Scratch {
        self.scratch.as_deref().unwrap()
    }
}

impl DerefMut for ScratchGuard<'_> {
    fn deref_mut(&mut self) -> &mut Scratch {
        self.scratch.as_deref_mut().unwrap()
    }
}

impl Drop for ScratchGuard<'_> {
    fn drop(&mut self) {
        if let Some(mut scratch) = self.scratch.take() {
            *scratch = Scratch::default();
            self.pool.free.lock().push(scratch);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use litebox_common_optee::{TeeLogin, TeeUuid};

    #[test]
    fn exhaustion_is_out_of_memory() {
        let pool = ScratchPool::new(2);
        let first = pool.acquire().unwrap();
        let second = pool.acquire().unwrap();
        assert_eq!(pool.available(), 0);
        assert!(matches!(pool.acquire(), Err(TeeResult::OutOfMemory)));

        drop(first);
        assert_eq!(pool.available(), 1);
        let _third = pool.acquire().unwrap();
        drop(second);
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn released_scratch_is_wiped() {
        let pool = ScratchPool::new(1);
        {
            let mut scratch = pool.acquire().unwrap();
            scratch.identity.login = TeeLogin::User;
            scratch.identity.uuid = TeeUuid::new(1, 2, 3, [4; 8]);
        }
        let scratch = pool.acquire().unwrap();
        assert_eq!(scratch.identity.login, TeeLogin::Public);
        assert!(scratch.identity.uuid.is_nil());
        assert_eq!(scratch.params, TeeParamSet::default());
    }
}
