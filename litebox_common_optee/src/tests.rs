// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

extern crate std;

use std::format;

use super::*;

const SAMPLE_UUID: [u8; 16] = [
    0x8a, 0xaa, 0xf2, 0x00, 0x24, 0x50, 0x11, 0xe4, 0xab, 0xe2, 0x00, 0x02, 0xa5, 0xd5, 0xc5, 0x1b,
];

#[test]
fn test_uuid_byte_layout() {
    let uuid = TeeUuid::from_bytes(SAMPLE_UUID);
    assert_eq!(
        uuid,
        TeeUuid::new(
            0x8aaa_f200,
            0x2450,
            0x11e4,
            [0xab, 0xe2, 0x00, 0x02, 0xa5, 0xd5, 0xc5, 0x1b]
        )
    );
    assert_eq!(uuid.to_bytes(), SAMPLE_UUID);
    assert_eq!(format!("{uuid:?}"), "8aaaf200-2450-11e4-abe2-0002a5d5c51b");
    assert!(!uuid.is_nil());
    assert!(TeeUuid::default().is_nil());
}

#[test]
fn test_login_words() {
    assert_eq!(TeeLogin::try_from(0).unwrap(), TeeLogin::Public);
    assert_eq!(TeeLogin::try_from(6).unwrap(), TeeLogin::ApplicationGroup);
    assert_eq!(TeeLogin::try_from(0xa000_0000).unwrap(), TeeLogin::Kernel);
    assert!(TeeLogin::try_from(3).is_err());
    assert!(TeeLogin::try_from(0x8000_0000).is_err());
}

#[test]
fn test_result_codes() {
    assert_eq!(u32::from(TeeResult::Success), 0);
    assert_eq!(u32::from(TeeResult::BadParameters), 0xffff_0006);
    assert_eq!(u32::from(TeeResult::ItemNotFound), 0xffff_0008);
    assert_eq!(u32::from(TeeResult::OutOfMemory), 0xffff_000c);
    assert_eq!(TeeResult::try_from(0xffff_000f).unwrap(), TeeResult::SecurityError);
    assert_eq!(TeeResult::from_result(Ok(())), TeeResult::Success);
    assert_eq!(
        TeeResult::from_result(Err(TeeResult::Busy)),
        TeeResult::Busy
    );
    assert_eq!(u32::from(TeeOrigin::TrustedApp), 3);
}

#[test]
fn test_session_handle_zero_is_none() {
    assert!(SessionHandle::from_raw(0).is_none());
    let handle = SessionHandle::from_raw(0x1_0000_0002).unwrap();
    assert_eq!(handle.as_raw(), 0x1_0000_0002);
    assert_eq!(
        core::mem::size_of::<Option<SessionHandle>>(),
        core::mem::size_of::<u64>()
    );
}

#[test]
fn test_param_types_packing() {
    let types = TeeParamTypes::new([
        TeeParamType::ValueInput,
        TeeParamType::MemrefOutput,
        TeeParamType::None,
        TeeParamType::MemrefInout,
    ]);
    assert_eq!(types.0, 0x7061);
    assert_eq!(types.try_get(0), Ok(TeeParamType::ValueInput));
    assert_eq!(types.try_get(1), Ok(TeeParamType::MemrefOutput));
    assert_eq!(types.try_get(2), Ok(TeeParamType::None));
    assert_eq!(types.try_get(3), Ok(TeeParamType::MemrefInout));
    assert_eq!(types.try_get(4), Err(TeeResult::BadParameters));
}

#[test]
fn test_reserved_param_type_tags() {
    // 0x4 and 0x8..=0xf are not parameter types
    let types = TeeParamTypes(0xf084);
    assert_eq!(types.try_get(0), Err(TeeResult::BadParameters));
    assert_eq!(types.try_get(1), Err(TeeResult::BadParameters));
    assert_eq!(types.try_get(2), Ok(TeeParamType::None));
    assert_eq!(types.try_get(3), Err(TeeResult::BadParameters));
    assert_eq!(types.try_get(4), Err(TeeResult::BadParameters));
}

#[test]
fn test_param_set_only_writes_output_slots() {
    let mut set = TeeParamSet::new(
        [
            TeeParam::ValueInput { a: 1, b: 2 },
            TeeParam::ValueInout { a: 3, b: 4 },
            TeeParam::MemrefInput {
                buffer: 0x1000,
                size: 16,
            },
            TeeParam::MemrefOutput {
                buffer: 0x2000,
                size: 32,
            },
        ],
        [TeeParamAttr::empty(); TEE_NUM_PARAMS],
    );

    assert_eq!(set.set_value(0, 9, 9), Err(TeeResult::BadParameters));
    assert_eq!(set.set_value(1, 30, 40), Ok(()));
    assert_eq!(set.set_memref_size(2, 1), Err(TeeResult::BadParameters));
    assert_eq!(set.set_memref_size(3, 8), Ok(()));
    assert_eq!(set.set_value(3, 0, 0), Err(TeeResult::BadParameters));
    assert_eq!(set.set_value(7, 0, 0), Err(TeeResult::BadParameters));

    assert_eq!(set.get(0).and_then(TeeParam::values), Some((1, 2)));
    assert_eq!(set.get(1).and_then(TeeParam::values), Some((30, 40)));
    assert_eq!(set.get(2).and_then(TeeParam::memref), Some((0x1000, 16)));
    assert_eq!(set.get(3).and_then(TeeParam::memref), Some((0x2000, 8)));
    assert_eq!(
        set.types(),
        TeeParamTypes::new([
            TeeParamType::ValueInput,
            TeeParamType::ValueInout,
            TeeParamType::MemrefInput,
            TeeParamType::MemrefOutput,
        ])
    );
}

#[test]
fn test_param_attr_keeps_unknown_bits() {
    let attr = TeeParamAttr::from_bits_retain(0x8000_0003);
    assert!(attr.contains(TeeParamAttr::MEM_NONSECURE | TeeParamAttr::MEM_CACHED));
    assert_eq!(attr.bits(), 0x8000_0003);
}

#[test]
fn test_message_command_words() {
    assert_eq!(
        OpteeMessageCommand::try_from_u32(1),
        Ok(OpteeMessageCommand::InvokeCommand)
    );
    assert_eq!(
        OpteeMessageCommand::try_from_u32(3),
        Ok(OpteeMessageCommand::Cancel)
    );
    assert_eq!(
        OpteeMessageCommand::try_from_u32(4),
        Err(TeeResult::BadParameters)
    );
}

#[test]
fn test_msg_arg_decodes_by_command_word() {
    let mut arg = OpteeMsgArg::new(1);
    arg.session = 0x1_0000_0000;
    arg.func = 9;
    let Ok(DispatchRequest::InvokeCommand(req)) = arg.request() else {
        panic!("not decoded as an invoke");
    };
    assert_eq!(req.session, 0x1_0000_0000);
    assert_eq!(req.cmd, CommandId(9));

    arg.cmd = 2;
    assert!(matches!(
        arg.request(),
        Ok(DispatchRequest::CloseSession(CloseSessionIn {
            session: 0x1_0000_0000
        }))
    ));
    for word in [4, 5, 0x8000_0000, u32::MAX] {
        arg.cmd = word;
        assert!(matches!(arg.request(), Err(TeeResult::BadParameters)));
    }
}

#[test]
fn test_msg_arg_takes_response() {
    let mut arg = OpteeMsgArg::new(0);
    arg.params[1] = TeeParamRaw { a: 1, b: 2 };
    let session = SessionHandle::from_raw(0x2_0000_0001);
    let mut params = arg.params;
    params[1].b = 7;
    arg.set_response(&DispatchResponse::OpenSession(OpenSessionOut {
        session,
        params,
        msg: TeeMsgResult::new(TeeResult::Success, TeeOrigin::Tee),
    }));
    assert_eq!(arg.session, 0x2_0000_0001);
    assert_eq!(arg.params[1], TeeParamRaw { a: 1, b: 7 });

    arg.set_response(&DispatchResponse::CloseSession(TeeResult::BadParameters));
    assert_eq!(
        arg.msg,
        TeeMsgResult::new(TeeResult::BadParameters, TeeOrigin::Tee)
    );
}
