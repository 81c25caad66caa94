// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! The fixed four-slot parameter block of OP-TEE/GlobalPlatform requests

use num_enum::TryFromPrimitive;

use crate::TeeResult;

/// Number of parameter slots in every request. This is part of the protocol with the normal
/// world, not an implementation limit.
pub const TEE_NUM_PARAMS: usize = 4;

const TEE_PARAM_TYPE_NONE: u8 = 0;
const TEE_PARAM_TYPE_VALUE_INPUT: u8 = 1;
const TEE_PARAM_TYPE_VALUE_OUTPUT: u8 = 2;
const TEE_PARAM_TYPE_VALUE_INOUT: u8 = 3;
const TEE_PARAM_TYPE_MEMREF_INPUT: u8 = 5;
const TEE_PARAM_TYPE_MEMREF_OUTPUT: u8 = 6;
const TEE_PARAM_TYPE_MEMREF_INOUT: u8 = 7;

/// Parameter types from `optee_os/lib/libutee/include/tee_api_defines.h`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum TeeParamType {
    #[default]
    None = TEE_PARAM_TYPE_NONE,
    ValueInput = TEE_PARAM_TYPE_VALUE_INPUT,
    ValueOutput = TEE_PARAM_TYPE_VALUE_OUTPUT,
    ValueInout = TEE_PARAM_TYPE_VALUE_INOUT,
    MemrefInput = TEE_PARAM_TYPE_MEMREF_INPUT,
    MemrefOutput = TEE_PARAM_TYPE_MEMREF_OUTPUT,
    MemrefInout = TEE_PARAM_TYPE_MEMREF_INOUT,
}

impl TeeParamType {
    /// Whether results may be written back into a slot of this type.
    pub fn is_output(self) -> bool {
        matches!(
            self,
            TeeParamType::ValueOutput
                | TeeParamType::ValueInout
                | TeeParamType::MemrefOutput
                | TeeParamType::MemrefInout
        )
    }

    pub fn is_value(self) -> bool {
        matches!(
            self,
            TeeParamType::ValueInput | TeeParamType::ValueOutput | TeeParamType::ValueInout
        )
    }

    pub fn is_memref(self) -> bool {
        matches!(
            self,
            TeeParamType::MemrefInput | TeeParamType::MemrefOutput | TeeParamType::MemrefInout
        )
    }
}

/// The packed parameter type word (`TEE_PARAM_TYPES`). Slot `n` occupies bits `4n..4n + 4`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(transparent)]
pub struct TeeParamTypes(pub u32);

impl TeeParamTypes {
    pub fn new(types: [TeeParamType; TEE_NUM_PARAMS]) -> Self {
        let word = types
            .iter()
            .enumerate()
            .fold(0u32, |acc, (n, t)| acc | (u32::from(*t as u8) << (n * 4)));
        TeeParamTypes(word)
    }

    fn nibble(self, index: usize) -> u8 {
        // Masked to four bits, so the truncation is lossless.
        ((self.0 >> (index * 4)) & 0xf) as u8
    }

    /// Type of slot `index`, rejecting reserved type tags.
    pub fn try_get(self, index: usize) -> Result<TeeParamType, TeeResult> {
        if index >= TEE_NUM_PARAMS {
            return Err(TeeResult::BadParameters);
        }
        TeeParamType::try_from(self.nibble(index)).map_err(|_| TeeResult::BadParameters)
    }
}

/// One wire parameter slot. Value parameters use `a` and `b`; memory references carry the
/// normal-world buffer reference in `a` and its size in `b`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(C)]
pub struct TeeParamRaw {
    pub a: u64,
    pub b: u64,
}

bitflags::bitflags! {
    /// Per-slot memory attributes supplied alongside memory references. Unknown bits are
    /// kept so that attributes are passed on exactly as received.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct TeeParamAttr: u32 {
        const MEM_NONSECURE = 0x1;
        const MEM_CACHED = 0x2;
        const MEM_SHARED = 0x4;

        const _ = !0;
    }
}

/// One parameter slot as seen inside the secure world. The variant is fixed when the request
/// is marshaled in and is never changed afterwards.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TeeParam {
    #[default]
    None,
    ValueInput {
        a: u64,
        b: u64,
    },
    ValueOutput {
        a: u64,
        b: u64,
    },
    ValueInout {
        a: u64,
        b: u64,
    },
    MemrefInput {
        buffer: u64,
        size: u64,
    },
    MemrefOutput {
        buffer: u64,
        size: u64,
    },
    MemrefInout {
        buffer: u64,
        size: u64,
    },
}

impl TeeParam {
    pub fn from_raw(typ: TeeParamType, raw: TeeParamRaw) -> Self {
        let TeeParamRaw { a, b } = raw;
        match typ {
            TeeParamType::None => TeeParam::None,
            TeeParamType::ValueInput => TeeParam::ValueInput { a, b },
            TeeParamType::ValueOutput => TeeParam::ValueOutput { a, b },
            TeeParamType::ValueInout => TeeParam::ValueInout { a, b },
            TeeParamType::MemrefInput => TeeParam::MemrefInput { buffer: a, size: b },
            TeeParamType::MemrefOutput => TeeParam::MemrefOutput { buffer: a, size: b },
            TeeParamType::MemrefInout => TeeParam::MemrefInout { buffer: a, size: b },
        }
    }

    pub fn param_type(&self) -> TeeParamType {
        match self {
            TeeParam::None => TeeParamType::None,
            TeeParam::ValueInput { .. } => TeeParamType::ValueInput,
            TeeParam::ValueOutput { .. } => TeeParamType::ValueOutput,
            TeeParam::ValueInout { .. } => TeeParamType::ValueInout,
            TeeParam::MemrefInput { .. } => TeeParamType::MemrefInput,
            TeeParam::MemrefOutput { .. } => TeeParamType::MemrefOutput,
            TeeParam::MemrefInout { .. } => TeeParamType::MemrefInout,
        }
    }

    /// `(a, b)` of a value parameter.
    pub fn values(&self) -> Option<(u64, u64)> {
        match *self {
            TeeParam::ValueInput { a, b }
            | TeeParam::ValueOutput { a, b }
            | TeeParam::ValueInout { a, b } => Some((a, b)),
            _ => None,
        }
    }

    /// `(buffer, size)` of a memory reference parameter.
    pub fn memref(&self) -> Option<(u64, u64)> {
        match *self {
            TeeParam::MemrefInput { buffer, size }
            | TeeParam::MemrefOutput { buffer, size }
            | TeeParam::MemrefInout { buffer, size } => Some((buffer, size)),
            _ => None,
        }
    }
}

/// The four parameter slots of a request together with their attributes.
///
/// Slots can only be modified through [`Self::set_value`] and [`Self::set_memref_size`], which
/// refuse to touch anything but output and in-out slots, so a slot's type can never change
/// once the set has been built.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TeeParamSet {
    params: [TeeParam; TEE_NUM_PARAMS],
    attrs: [TeeParamAttr; TEE_NUM_PARAMS],
}

impl TeeParamSet {
    pub fn new(params: [TeeParam; TEE_NUM_PARAMS], attrs: [TeeParamAttr; TEE_NUM_PARAMS]) -> Self {
        TeeParamSet { params, attrs }
    }

    pub fn types(&self) -> TeeParamTypes {
        let mut types = [TeeParamType::None; TEE_NUM_PARAMS];
        for (typ, param) in types.iter_mut().zip(&self.params) {
            *typ = param.param_type();
        }
        TeeParamTypes::new(types)
    }

    pub fn get(&self, index: usize) -> Option<&TeeParam> {
        self.params.get(index)
    }

    pub fn attr(&self, index: usize) -> Option<TeeParamAttr> {
        self.attrs.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TeeParam> {
        self.params.iter()
    }

    /// Overwrite both values of an output or in-out value slot.
    pub fn set_value(&mut self, index: usize, value_a: u64, value_b: u64) -> Result<(), TeeResult> {
        match self.params.get_mut(index) {
            Some(TeeParam::ValueOutput { a, b } | TeeParam::ValueInout { a, b }) => {
                *a = value_a;
                *b = value_b;
                Ok(())
            }
            _ => Err(TeeResult::BadParameters),
        }
    }

    /// Overwrite the size of an output or in-out memory reference slot.
    pub fn set_memref_size(&mut self, index: usize, new_size: u64) -> Result<(), TeeResult> {
        match self.params.get_mut(index) {
            Some(TeeParam::MemrefOutput { size, .. } | TeeParam::MemrefInout { size, .. }) => {
                *size = new_size;
                Ok(())
            }
            _ => Err(TeeResult::BadParameters),
        }
    }
}
