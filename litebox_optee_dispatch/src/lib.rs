// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! The secure-world dispatch layer for OP-TEE-style session requests
//!
//! Requests to open and close sessions, invoke commands, and cancel them arrive from the
//! untrusted normal world. This crate validates the caller's identity and the session handles it
//! presents, marshals the four-slot parameter block in and out, and forwards the requests to a
//! [`TaManager`]. When a TA is not resident, its image is fetched through a [`TaLoader`].

#![no_std]

extern crate alloc;

mod config;
mod dispatch;
pub mod identity;
pub mod manager;
pub mod params;
mod scratch;
mod session;

pub use config::{DispatchConfig, DispatchConfigError};
pub use dispatch::Dispatcher;
pub use manager::{LoadedTa, NwUserMap, TaImage, TaLoader, TaManager};
pub use session::SessionRegistry;

#[cfg(test)]
mod mock;
