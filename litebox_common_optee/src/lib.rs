// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Common elements to enable OP-TEE-like functionalities
//!
//! These are the types that cross the boundary between the normal world (the untrusted caller)
//! and the secure-world dispatch layer: result codes and their origins, client identities, the
//! fixed four-slot parameter block, and the per-command request/response messages.

#![no_std]

use core::num::NonZeroU64;
use num_enum::TryFromPrimitive;

pub mod msg;
pub mod params;

pub use msg::*;
pub use params::*;

/// `TEE_UUID` from `optee_os/lib/libutee/include/tee_api_types.h`. It uniquely identifies
/// TAs, cryptographic keys, and more.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct TeeUuid {
    time_low: u32,
    time_mid: u16,
    time_hi_and_version: u16,
    clock_seq_and_node: [u8; 8],
}

impl TeeUuid {
    /// The all-zero UUID. Anonymous and kernel clients are reported with it.
    pub const NIL: TeeUuid = TeeUuid {
        time_low: 0,
        time_mid: 0,
        time_hi_and_version: 0,
        clock_seq_and_node: [0; 8],
    };

    pub const fn new(
        time_low: u32,
        time_mid: u16,
        time_hi_and_version: u16,
        clock_seq_and_node: [u8; 8],
    ) -> Self {
        TeeUuid {
            time_low,
            time_mid,
            time_hi_and_version,
            clock_seq_and_node,
        }
    }

    /// Build a UUID from its RFC 4122 (big-endian) byte representation.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        let mut clock_seq_and_node = [0u8; 8];
        clock_seq_and_node.copy_from_slice(&bytes[8..]);
        TeeUuid {
            time_low: u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            time_mid: u16::from_be_bytes([bytes[4], bytes[5]]),
            time_hi_and_version: u16::from_be_bytes([bytes[6], bytes[7]]),
            clock_seq_and_node,
        }
    }

    /// RFC 4122 (big-endian) byte representation of this UUID.
    pub fn to_bytes(&self) -> [u8; 16] {
        let mut bytes = [0u8; 16];
        bytes[..4].copy_from_slice(&self.time_low.to_be_bytes());
        bytes[4..6].copy_from_slice(&self.time_mid.to_be_bytes());
        bytes[6..8].copy_from_slice(&self.time_hi_and_version.to_be_bytes());
        bytes[8..].copy_from_slice(&self.clock_seq_and_node);
        bytes
    }

    pub fn is_nil(&self) -> bool {
        *self == Self::NIL
    }
}

impl core::fmt::Debug for TeeUuid {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let node = &self.clock_seq_and_node;
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            self.time_low,
            self.time_mid,
            self.time_hi_and_version,
            node[0],
            node[1],
            node[2],
            node[3],
            node[4],
            node[5],
            node[6],
            node[7],
        )
    }
}

const TEE_LOGIN_PUBLIC: u32 = 0x0000_0000;
const TEE_LOGIN_USER: u32 = 0x0000_0001;
const TEE_LOGIN_GROUP: u32 = 0x0000_0002;
const TEE_LOGIN_APPLICATION: u32 = 0x0000_0004;
const TEE_LOGIN_APPLICATION_USER: u32 = 0x0000_0005;
const TEE_LOGIN_APPLICATION_GROUP: u32 = 0x0000_0006;
const TEE_LOGIN_KERNEL: u32 = 0xa000_0000;
const TEE_LOGIN_TRUSTED_APP: u32 = 0xf000_0000;

/// Login classes from `optee_os/lib/libutee/include/tee_api_defines.h`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
pub enum TeeLogin {
    #[default]
    Public = TEE_LOGIN_PUBLIC,
    User = TEE_LOGIN_USER,
    Group = TEE_LOGIN_GROUP,
    Application = TEE_LOGIN_APPLICATION,
    ApplicationUser = TEE_LOGIN_APPLICATION_USER,
    ApplicationGroup = TEE_LOGIN_APPLICATION_GROUP,
    Kernel = TEE_LOGIN_KERNEL,
    TrustedApp = TEE_LOGIN_TRUSTED_APP,
}

/// Client identity as asserted by the normal world. The login word is kept raw since
/// nothing about it has been checked yet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(C)]
pub struct TeeClientId {
    pub login: u32,
    pub uuid: TeeUuid,
}

/// `TEE_Identity` from `optee_os/lib/libutee/include/tee_api_types.h`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(C)]
pub struct TeeIdentity {
    pub login: TeeLogin,
    pub uuid: TeeUuid,
}

const TEE_ORIGIN_API: u32 = 0;
const TEE_ORIGIN_COMMS: u32 = 1;
const TEE_ORIGIN_TEE: u32 = 2;
const TEE_ORIGIN_TRUSTED_APP: u32 = 3;

/// Origin code constants from `optee_os/lib/libutee/include/tee_api_defines.h`
///
/// Results produced by the secure-world core (the dispatch layer and the TA manager) are
/// attributed to `Tee`, results produced by a TA to `TrustedApp`, and failures of the
/// normal-world RPC used to fetch a TA image to `Comms`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
pub enum TeeOrigin {
    Api = TEE_ORIGIN_API,
    Comms = TEE_ORIGIN_COMMS,
    Tee = TEE_ORIGIN_TEE,
    TrustedApp = TEE_ORIGIN_TRUSTED_APP,
}

impl From<TeeOrigin> for u32 {
    fn from(origin: TeeOrigin) -> Self {
        origin as u32
    }
}

/// Timeout handed to the TA manager, in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TeeTimeout {
    Infinite,
    Millis(u32),
}

/// Opaque session handle given to the normal world on a successful open.
///
/// The value means nothing to the normal world. The secure world resolves it through its
/// session registry on every use, so a forged or stale handle is never trusted as-is. Zero is
/// never a valid handle, which lets `Option<SessionHandle>` share the wire representation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct SessionHandle(NonZeroU64);

impl SessionHandle {
    pub const fn new(raw: NonZeroU64) -> Self {
        SessionHandle(raw)
    }

    /// Interpret a caller-supplied session word. Returns `None` for zero.
    pub const fn from_raw(raw: u64) -> Option<Self> {
        match NonZeroU64::new(raw) {
            Some(raw) => Some(SessionHandle(raw)),
            None => None,
        }
    }

    pub const fn as_raw(self) -> u64 {
        self.0.get()
    }
}

/// Command ID to be passed to a TA. Each TA can provide an arbitrary number of commands.
/// Clients in the normal world should be aware of the provided commands in advance
/// (e.g., through header files).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(C)]
pub struct CommandId(pub u32);

const TEE_SUCCESS: u32 = 0x0000_0000;
const TEE_ERROR_CORRUPT_OBJECT: u32 = 0xf010_0001;
const TEE_ERROR_CORRUPT_OBJECT_2: u32 = 0xf010_0002;
const TEE_ERROR_STORAGE_NOT_AVAILABLE: u32 = 0xf010_0003;
const TEE_ERROR_STORAGE_NOT_AVAILABLE_2: u32 = 0xf010_0004;
const TEE_ERROR_CIPHERTEXT_INVALID: u32 = 0xf010_0006;
const TEE_ERROR_GENERIC: u32 = 0xffff_0000;
const TEE_ERROR_ACCESS_DENIED: u32 = 0xffff_0001;
const TEE_ERROR_CANCEL: u32 = 0xffff_0002;
const TEE_ERROR_ACCESS_CONFLICT: u32 = 0xffff_0003;
const TEE_ERROR_EXCESS_DATA: u32 = 0xffff_0004;
const TEE_ERROR_BAD_FORMAT: u32 = 0xffff_0005;
const TEE_ERROR_BAD_PARAMETERS: u32 = 0xffff_0006;
const TEE_ERROR_BAD_STATE: u32 = 0xffff_0007;
const TEE_ERROR_ITEM_NOT_FOUND: u32 = 0xffff_0008;
const TEE_ERROR_NOT_IMPLEMENTED: u32 = 0xffff_0009;
const TEE_ERROR_NOT_SUPPORTED: u32 = 0xffff_000a;
const TEE_ERROR_NO_DATA: u32 = 0xffff_000b;
const TEE_ERROR_OUT_OF_MEMORY: u32 = 0xffff_000c;
const TEE_ERROR_BUSY: u32 = 0xffff_000d;
const TEE_ERROR_COMMUNICATION: u32 = 0xffff_000e;
const TEE_ERROR_SECURITY: u32 = 0xffff_000f;
const TEE_ERROR_SHORT_BUFFER: u32 = 0xffff_0010;
const TEE_ERROR_EXTERNAL_CANCEL: u32 = 0xffff_0011;
const TEE_ERROR_OVERFLOW: u32 = 0xffff_300f;
const TEE_ERROR_TARGET_DEAD: u32 = 0xffff_3024;
const TEE_ERROR_STORAGE_NO_SPACE: u32 = 0xffff_3041;
const TEE_ERROR_MAC_INVALID: u32 = 0xffff_3071;
const TEE_ERROR_SIGNATURE_INVALID: u32 = 0xffff_3072;
const TEE_ERROR_TIME_NOT_SET: u32 = 0xffff_5000;
const TEE_ERROR_TIME_NEEDS_RESET: u32 = 0xffff_5001;

/// `TEE_Result` (API error codes) from `optee_os/lib/libutee/include/tee_api_defines.h`
#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
pub enum TeeResult {
    Success = TEE_SUCCESS,
    CorruptObject = TEE_ERROR_CORRUPT_OBJECT,
    CorruptObject2 = TEE_ERROR_CORRUPT_OBJECT_2,
    StorageNotAvailable = TEE_ERROR_STORAGE_NOT_AVAILABLE,
    StorageNotAvailable2 = TEE_ERROR_STORAGE_NOT_AVAILABLE_2,
    CiphertextInvalid = TEE_ERROR_CIPHERTEXT_INVALID,
    GenericError = TEE_ERROR_GENERIC,
    AccessDenied = TEE_ERROR_ACCESS_DENIED,
    Cancel = TEE_ERROR_CANCEL,
    AccessConflict = TEE_ERROR_ACCESS_CONFLICT,
    ExcessData = TEE_ERROR_EXCESS_DATA,
    BadFormat = TEE_ERROR_BAD_FORMAT,
    BadParameters = TEE_ERROR_BAD_PARAMETERS,
    BadState = TEE_ERROR_BAD_STATE,
    ItemNotFound = TEE_ERROR_ITEM_NOT_FOUND,
    NotImplemented = TEE_ERROR_NOT_IMPLEMENTED,
    NotSupported = TEE_ERROR_NOT_SUPPORTED,
    NoData = TEE_ERROR_NO_DATA,
    OutOfMemory = TEE_ERROR_OUT_OF_MEMORY,
    Busy = TEE_ERROR_BUSY,
    CommunicationError = TEE_ERROR_COMMUNICATION,
    SecurityError = TEE_ERROR_SECURITY,
    ShortBuffer = TEE_ERROR_SHORT_BUFFER,
    ExternalCancel = TEE_ERROR_EXTERNAL_CANCEL,
    Overflow = TEE_ERROR_OVERFLOW,
    TargetDead = TEE_ERROR_TARGET_DEAD,
    StorageNoSpace = TEE_ERROR_STORAGE_NO_SPACE,
    MacInvalid = TEE_ERROR_MAC_INVALID,
    SignatureInvalid = TEE_ERROR_SIGNATURE_INVALID,
    TimeNotSet = TEE_ERROR_TIME_NOT_SET,
    TimeNeedsReset = TEE_ERROR_TIME_NEEDS_RESET,
}

impl From<TeeResult> for u32 {
    fn from(res: TeeResult) -> Self {
        res as u32
    }
}

impl TeeResult {
    /// Collapse a `Result` into the single code reported on the wire.
    pub fn from_result(res: Result<(), TeeResult>) -> Self {
        match res {
            Ok(()) => TeeResult::Success,
            Err(e) => e,
        }
    }
}

#[cfg(test)]
mod tests;
