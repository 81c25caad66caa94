// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! The registry of sessions opened from the normal world

use alloc::vec::Vec;
use core::num::{NonZeroU32, NonZeroU64};

use litebox_common_optee::SessionHandle;
use spin::mutex::SpinMutex;

/// Generational-indexing-based registry of open sessions.
///
/// The registry belongs to the TA manager. The dispatch layer only passes a reference to it
/// back into the manager's operations and never walks it on its own.
///
/// A [`SessionHandle`] names a slot together with the generation the slot had when the session
/// was inserted. Removing a session bumps the generation of its slot, so the handle of a closed
/// session never resolves again, not even after the slot has been refilled by a later session.
/// Handles are decoded with bounds checks, thus any 64-bit word coming from the normal world can
/// be looked up safely.
pub struct SessionRegistry<S> {
    inner: SpinMutex<Slots<S>>,
}

struct Slots<S> {
    storage: Vec<Slot<S>>,
    capacity: usize,
    next_free_slot: usize,
    len: usize,
}

enum Slot<S> {
    Filled { generation: NonZeroU32, data: S },
    Unfilled { generation: NonZeroU32 },
}

/// Slot index (low 32 bits) and generation (high 32 bits) of a handle.
fn encode(idx: usize, generation: NonZeroU32) -> SessionHandle {
    let idx = u64::try_from(idx).unwrap();
    let raw = (u64::from(generation.get()) << 32) | idx;
    // The generation is non-zero, and so is `raw`.
    SessionHandle::new(NonZeroU64::new(raw).unwrap())
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "the two halves of the handle are split apart on purpose"
)]
fn decode(handle: SessionHandle) -> (usize, u32) {
    let raw = handle.as_raw();
    let idx = raw as u32;
    let generation = (raw >> 32) as u32;
    (idx as usize, generation)
}

impl<S> Slots<S> {
    fn get(&self, handle: SessionHandle) -> Option<&S> {
        let (idx, generation) = decode(handle);
        match self.storage.get(idx)? {
            Slot::Filled {
                generation: current,
                data,
            } if current.get() == generation => Some(data),
            // Either never filled, already removed, or refilled in a later generation
            _ => None,
        }
    }

    fn get_mut(&mut self, handle: SessionHandle) -> Option<&mut S> {
        let (idx, generation) = decode(handle);
        match self.storage.get_mut(idx)? {
            Slot::Filled {
                generation: current,
                data,
            } if current.get() == generation => Some(data),
            _ => None,
        }
    }

    /// Find a reusable slot, or make a new one if we are still below capacity.
    fn claim_slot(&mut self) -> Option<(usize, NonZeroU32)> {
        let existing = self.storage.len();
        for _ in 0..existing {
            let idx = self.next_free_slot;
            self.next_free_slot = (self.next_free_slot + 1) % existing;
            match self.storage[idx] {
                Slot::Filled { .. } => {}
                // Has used up all of the possible generations; is a tombstone
                Slot::Unfilled { generation } if generation == NonZeroU32::MAX => {}
                Slot::Unfilled { generation } => return Some((idx, generation)),
            }
        }
        if existing < self.capacity {
            let generation = NonZeroU32::MIN;
            self.storage.push(Slot::Unfilled { generation });
            Some((existing, generation))
        } else {
            None
        }
    }
}

impl<S> SessionRegistry<S> {
    /// Create an empty registry holding at most `capacity` sessions.
    ///
    /// Slot indexes live in the low half of a handle, so `capacity` is capped at `u32::MAX`.
    pub fn new(capacity: usize) -> Self {
        let max_slots = usize::try_from(u32::MAX).unwrap_or(usize::MAX);
        SessionRegistry {
            inner: SpinMutex::new(Slots {
                storage: Vec::new(),
                capacity: capacity.min(max_slots),
                next_free_slot: 0,
                len: 0,
            }),
        }
    }

    /// Insert `session`, returning the handle to refer to it. If the registry is full, the
    /// session is handed back.
    pub fn insert(&self, session: S) -> Result<SessionHandle, S> {
        let mut slots = self.inner.lock();
        if slots.len >= slots.capacity {
            return Err(session);
        }
        let Some((idx, generation)) = slots.claim_slot() else {
            return Err(session);
        };
        // The generation stays the same on insertion; it is only bumped upon removal.
        slots.storage[idx] = Slot::Filled {
            generation,
            data: session,
        };
        slots.len += 1;
        Ok(encode(idx, generation))
    }

    /// Remove the session behind `handle`, returning it if `handle` is a current member.
    pub fn remove(&self, handle: SessionHandle) -> Option<S> {
        let mut slots = self.inner.lock();
        slots.get(handle)?;
        let (idx, _) = decode(handle);
        let Slot::Filled { generation, data } = core::mem::replace(
            &mut slots.storage[idx],
            Slot::Unfilled {
                generation: NonZeroU32::MAX,
            },
        ) else {
            // We just confirmed that the slot is filled with the right generation.
            unreachable!()
        };
        // A filled slot was never a tombstone, thus this addition cannot overflow.
        slots.storage[idx] = Slot::Unfilled {
            generation: generation.checked_add(1).unwrap(),
        };
        slots.len -= 1;
        Some(data)
    }

    /// Whether `handle` refers to a session that is currently open.
    pub fn contains(&self, handle: SessionHandle) -> bool {
        self.inner.lock().get(handle).is_some()
    }

    /// Run `f` on the session behind `handle`, if it is a current member.
    ///
    /// The registry stays locked while `f` runs, so `f` must not call back into the registry.
    pub fn with_session<R>(&self, handle: SessionHandle, f: impl FnOnce(&S) -> R) -> Option<R> {
        self.inner.lock().get(handle).map(f)
    }

    /// Mutable counterpart of [`Self::with_session`].
    pub fn with_session_mut<R>(
        &self,
        handle: SessionHandle,
        f: impl FnOnce(&mut S) -> R,
    ) -> Option<R> {
        self.inner.lock().get_mut(handle).map(f)
    }

    /// Number of open sessions.
    pub fn len(&self) -> usize {
        self.inner.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }
}

#[cfg(test)]
mod tests {
    use super::SessionRegistry;
    use litebox_common_optee::SessionHandle;

    #[test]
    fn insert_and_remove() {
        let registry = SessionRegistry::new(4);
        let a = registry.insert("a").unwrap();
        let b = registry.insert("b").unwrap();
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.with_session(a, |s| *s), Some("a"));

        assert_eq!(registry.remove(a), Some("a"));
        assert_eq!(registry.remove(a), None);
        assert!(!registry.contains(a));
        assert!(registry.contains(b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn stale_handle_does_not_alias_reused_slot() {
        let registry = SessionRegistry::new(1);
        let old = registry.insert(1u32).unwrap();
        assert_eq!(registry.remove(old), Some(1));

        let new = registry.insert(2u32).unwrap();
        assert_ne!(old, new);
        assert_eq!(old.as_raw() & 0xffff_ffff, new.as_raw() & 0xffff_ffff);
        assert!(!registry.contains(old));
        assert_eq!(registry.with_session_mut(old, |s| *s = 100), None);
        assert_eq!(registry.with_session(new, |s| *s), Some(2));
    }

    #[test]
    fn full_registry_refuses_insert() {
        let registry = SessionRegistry::new(2);
        assert!(registry.insert(()).is_ok());
        let second = registry.insert(()).unwrap();
        assert_eq!(registry.insert(()), Err(()));
        registry.remove(second).unwrap();
        assert!(registry.insert(()).is_ok());
        assert_eq!(registry.len(), registry.capacity());
    }

    #[test]
    fn capacity_fits_in_handle_index() {
        let registry = SessionRegistry::<()>::new(usize::MAX);
        assert!(u32::try_from(registry.capacity()).is_ok());
        assert_eq!(SessionRegistry::<()>::new(3).capacity(), 3);
    }

    #[test]
    fn forged_handles_never_resolve() {
        let registry = SessionRegistry::new(8);
        let real = registry.insert(7u8).unwrap();
        for raw in [
            1,
            u64::MAX,
            0xffff_ffff,
            0x1_0000_0000 | 5,
            real.as_raw() + (1 << 32),
            real.as_raw() + 1,
        ] {
            let forged = SessionHandle::from_raw(raw).unwrap();
            assert!(!registry.contains(forged), "{raw:#x} resolved");
            assert!(registry.remove(forged).is_none());
        }
        assert!(registry.contains(real));
    }
}
