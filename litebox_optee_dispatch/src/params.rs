// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Marshaling of the four-slot parameter block between the wire and the secure world

use litebox_common_optee::{
    TEE_NUM_PARAMS, TeeParam, TeeParamAttr, TeeParamRaw, TeeParamSet, TeeParamTypes, TeeResult,
};

/// Build the secure-world parameter set of a request.
///
/// Every slot gets its type from `types` exactly once. A reserved type tag in any slot fails the
/// whole request with `BadParameters`. Attributes are carried over verbatim.
pub fn marshal_in(
    types: TeeParamTypes,
    raw: &[TeeParamRaw; TEE_NUM_PARAMS],
    attrs: &[TeeParamAttr; TEE_NUM_PARAMS],
) -> Result<TeeParamSet, TeeResult> {
    let mut params = [TeeParam::None; TEE_NUM_PARAMS];
    for (i, (param, raw)) in params.iter_mut().zip(raw).enumerate() {
        *param = TeeParam::from_raw(types.try_get(i)?, *raw);
    }
    Ok(TeeParamSet::new(params, *attrs))
}

/// Copy results back into the wire slots of a response.
///
/// Output and in-out value slots get both values. Output and in-out memory references only
/// get their size, since the buffer reference itself belongs to the caller. Input and unused
/// slots are left alone.
pub fn update_out_params(params: &TeeParamSet, out: &mut [TeeParamRaw; TEE_NUM_PARAMS]) {
    for (param, raw) in params.iter().zip(out.iter_mut()) {
        match *param {
            TeeParam::ValueOutput { a, b } | TeeParam::ValueInout { a, b } => {
                raw.a = a;
                raw.b = b;
            }
            TeeParam::MemrefOutput { size, .. } | TeeParam::MemrefInout { size, .. } => {
                raw.b = size;
            }
            TeeParam::None
            | TeeParam::ValueInput { .. }
            | TeeParam::MemrefInput { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use litebox_common_optee::TeeParamType;

    fn raw(a: u64, b: u64) -> TeeParamRaw {
        TeeParamRaw { a, b }
    }

    #[test]
    fn marshal_in_assigns_types_and_attrs() {
        let types = TeeParamTypes::new([
            TeeParamType::ValueInput,
            TeeParamType::MemrefInout,
            TeeParamType::None,
            TeeParamType::ValueOutput,
        ]);
        let attrs = [
            TeeParamAttr::empty(),
            TeeParamAttr::MEM_NONSECURE | TeeParamAttr::MEM_SHARED,
            TeeParamAttr::from_bits_retain(0x100),
            TeeParamAttr::empty(),
        ];
        let set = marshal_in(
            types,
            &[raw(1, 2), raw(0x4000, 64), raw(5, 6), raw(7, 8)],
            &attrs,
        )
        .unwrap();

        assert_eq!(set.types(), types);
        assert_eq!(set.get(0), Some(&TeeParam::ValueInput { a: 1, b: 2 }));
        assert_eq!(
            set.get(1),
            Some(&TeeParam::MemrefInout {
                buffer: 0x4000,
                size: 64
            })
        );
        assert_eq!(set.get(2), Some(&TeeParam::None));
        assert_eq!(set.attr(1), Some(attrs[1]));
        assert_eq!(set.attr(2).map(|a| a.bits()), Some(0x100));
    }

    #[test]
    fn marshal_in_rejects_reserved_tags() {
        let slots = [TeeParamRaw::default(); TEE_NUM_PARAMS];
        let attrs = [TeeParamAttr::empty(); TEE_NUM_PARAMS];
        assert_eq!(
            marshal_in(TeeParamTypes(0x4000), &slots, &attrs),
            Err(TeeResult::BadParameters)
        );
        assert_eq!(
            marshal_in(TeeParamTypes(0x0009), &slots, &attrs),
            Err(TeeResult::BadParameters)
        );
        // Bits above the four slots are not looked at
        assert!(marshal_in(TeeParamTypes(0xffff_0000), &slots, &attrs).is_ok());
    }

    #[test]
    fn update_out_params_touches_only_output_slots() {
        let mut set = marshal_in(
            TeeParamTypes::new([
                TeeParamType::ValueInout,
                TeeParamType::MemrefOutput,
                TeeParamType::ValueInput,
                TeeParamType::None,
            ]),
            &[raw(1, 1), raw(0x8000, 100), raw(3, 3), raw(4, 4)],
            &[TeeParamAttr::empty(); TEE_NUM_PARAMS],
        )
        .unwrap();
        set.set_value(0, 10, 20).unwrap();
        set.set_memref_size(1, 42).unwrap();

        let mut out = [raw(0xa, 0xa), raw(0xb, 0xb), raw(0xc, 0xc), raw(0xd, 0xd)];
        update_out_params(&set, &mut out);
        assert_eq!(out, [raw(10, 20), raw(0xb, 42), raw(0xc, 0xc), raw(0xd, 0xd)]);
    }
}
