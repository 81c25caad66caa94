// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Knobs of the dispatch layer

use thiserror::Error;

/// Configuration of a [`Dispatcher`](crate::Dispatcher).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Number of scratch areas preallocated for in-flight requests. Requests arriving while all
    /// of them are in use fail with `OutOfMemory`.
    pub scratch_slots: usize,
    /// Whether an open of a non-resident TA falls back to fetching its image from the normal
    /// world.
    pub lazy_load: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        DispatchConfig {
            scratch_slots: 8,
            lazy_load: true,
        }
    }
}

impl DispatchConfig {
    pub fn validate(&self) -> Result<(), DispatchConfigError> {
        if self.scratch_slots == 0 {
            return Err(DispatchConfigError::NoScratchSlots);
        }
        Ok(())
    }
}

/// Possible errors from [`DispatchConfig::validate`]
#[non_exhaustive]
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DispatchConfigError {
    #[error("at least one scratch slot is needed to serve requests")]
    NoScratchSlots,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let config = DispatchConfig::default();
        assert!(config.lazy_load);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn zero_scratch_slots_rejected() {
        let config = DispatchConfig {
            scratch_slots: 0,
            ..DispatchConfig::default()
        };
        assert_eq!(config.validate(), Err(DispatchConfigError::NoScratchSlots));
    }
}
