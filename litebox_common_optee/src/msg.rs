// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Request and response messages of the session dispatch entry points

use num_enum::TryFromPrimitive;

use crate::{
    CommandId, SessionHandle, TEE_NUM_PARAMS, TeeClientId, TeeOrigin, TeeParamAttr, TeeParamRaw,
    TeeParamTypes, TeeResult, TeeUuid,
};

const OPTEE_MSG_CMD_OPEN_SESSION: u32 = 0;
const OPTEE_MSG_CMD_INVOKE_COMMAND: u32 = 1;
const OPTEE_MSG_CMD_CLOSE_SESSION: u32 = 2;
const OPTEE_MSG_CMD_CANCEL: u32 = 3;

/// Session-related message commands from `optee_os/core/include/optee_msg.h`
#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
pub enum OpteeMessageCommand {
    OpenSession = OPTEE_MSG_CMD_OPEN_SESSION,
    InvokeCommand = OPTEE_MSG_CMD_INVOKE_COMMAND,
    CloseSession = OPTEE_MSG_CMD_CLOSE_SESSION,
    Cancel = OPTEE_MSG_CMD_CANCEL,
}

impl OpteeMessageCommand {
    pub fn try_from_u32(value: u32) -> Result<Self, TeeResult> {
        Self::try_from(value).map_err(|_| TeeResult::BadParameters)
    }
}

/// Result of a dispatch call together with the layer it is attributed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct TeeMsgResult {
    pub res: TeeResult,
    pub origin: TeeOrigin,
}

impl TeeMsgResult {
    pub const fn new(res: TeeResult, origin: TeeOrigin) -> Self {
        TeeMsgResult { res, origin }
    }

    pub fn from_result(res: Result<(), TeeResult>, origin: TeeOrigin) -> Self {
        TeeMsgResult {
            res: TeeResult::from_result(res),
            origin,
        }
    }

    pub fn is_success(&self) -> bool {
        self.res == TeeResult::Success
    }
}

/// Normal-world reference to a TA image that the caller supplied along with an open request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(transparent)]
pub struct TaImageRef(pub u64);

/// Input of an open-session request.
#[derive(Clone, Copy, Debug)]
pub struct OpenSessionIn {
    /// UUID of the TA to open a session with
    pub uuid: TeeUuid,
    /// Optional TA image the caller already placed in shared memory
    pub ta: Option<TaImageRef>,
    /// Identity the caller claims to have
    pub client_id: TeeClientId,
    pub param_types: TeeParamTypes,
    pub params: [TeeParamRaw; TEE_NUM_PARAMS],
    pub param_attrs: [TeeParamAttr; TEE_NUM_PARAMS],
}

/// Output of an open-session request.
#[derive(Clone, Copy, Debug)]
pub struct OpenSessionOut {
    /// The new session; `None` unless the open succeeded
    pub session: Option<SessionHandle>,
    pub params: [TeeParamRaw; TEE_NUM_PARAMS],
    pub msg: TeeMsgResult,
}

/// Input of a close-session request. The session word is whatever the caller sent.
#[derive(Clone, Copy, Debug)]
pub struct CloseSessionIn {
    pub session: u64,
}

/// Input of an invoke-command request.
#[derive(Clone, Copy, Debug)]
pub struct InvokeCommandIn {
    pub session: u64,
    pub cmd: CommandId,
    pub param_types: TeeParamTypes,
    pub params: [TeeParamRaw; TEE_NUM_PARAMS],
    pub param_attrs: [TeeParamAttr; TEE_NUM_PARAMS],
}

/// Output of an invoke-command request.
#[derive(Clone, Copy, Debug)]
pub struct InvokeCommandOut {
    pub params: [TeeParamRaw; TEE_NUM_PARAMS],
    pub msg: TeeMsgResult,
}

/// Input of a cancel request.
#[derive(Clone, Copy, Debug)]
pub struct CancelCommandIn {
    pub session: u64,
}

/// Output of a cancel request.
#[derive(Clone, Copy, Debug)]
pub struct CancelCommandOut {
    pub msg: TeeMsgResult,
}

/// A session-related request from the normal world.
#[derive(Clone, Copy, Debug)]
pub enum DispatchRequest {
    OpenSession(OpenSessionIn),
    InvokeCommand(InvokeCommandIn),
    CloseSession(CloseSessionIn),
    Cancel(CancelCommandIn),
}

impl DispatchRequest {
    pub fn command(&self) -> OpteeMessageCommand {
        match self {
            DispatchRequest::OpenSession(_) => OpteeMessageCommand::OpenSession,
            DispatchRequest::InvokeCommand(_) => OpteeMessageCommand::InvokeCommand,
            DispatchRequest::CloseSession(_) => OpteeMessageCommand::CloseSession,
            DispatchRequest::Cancel(_) => OpteeMessageCommand::Cancel,
        }
    }
}

/// Response to a [`DispatchRequest`] of the same kind.
#[derive(Clone, Copy, Debug)]
pub enum DispatchResponse {
    OpenSession(OpenSessionOut),
    InvokeCommand(InvokeCommandOut),
    CloseSession(TeeResult),
    Cancel(CancelCommandOut),
}

impl DispatchResponse {
    /// The result code of the response, whatever its kind.
    pub fn result(&self) -> TeeResult {
        match self {
            DispatchResponse::OpenSession(out) => out.msg.res,
            DispatchResponse::InvokeCommand(out) => out.msg.res,
            DispatchResponse::CloseSession(res) => *res,
            DispatchResponse::Cancel(out) => out.msg.res,
        }
    }
}

/// A request as the normal world lays it out in shared memory (`struct optee_msg_arg`).
///
/// Only the fields the requested command uses are looked at. The dispatcher answers in place
/// by filling in `msg`, `params` and, for opens, `session`.
#[derive(Clone, Copy, Debug)]
pub struct OpteeMsgArg {
    /// Raw [`OpteeMessageCommand`] word
    pub cmd: u32,
    /// Command ID for invokes
    pub func: u32,
    pub session: u64,
    pub uuid: TeeUuid,
    pub ta: Option<TaImageRef>,
    pub client_id: TeeClientId,
    pub param_types: TeeParamTypes,
    pub params: [TeeParamRaw; TEE_NUM_PARAMS],
    pub param_attrs: [TeeParamAttr; TEE_NUM_PARAMS],
    pub msg: TeeMsgResult,
}

impl OpteeMsgArg {
    /// An argument block for command word `cmd` with everything else zeroed.
    pub fn new(cmd: u32) -> Self {
        OpteeMsgArg {
            cmd,
            func: 0,
            session: 0,
            uuid: TeeUuid::NIL,
            ta: None,
            client_id: TeeClientId::default(),
            param_types: TeeParamTypes::default(),
            params: [TeeParamRaw::default(); TEE_NUM_PARAMS],
            param_attrs: [TeeParamAttr::empty(); TEE_NUM_PARAMS],
            msg: TeeMsgResult::new(TeeResult::Success, TeeOrigin::Tee),
        }
    }

    /// Decode the request. Unknown command words are refused with `BadParameters`.
    pub fn request(&self) -> Result<DispatchRequest, TeeResult> {
        let req = match OpteeMessageCommand::try_from_u32(self.cmd)? {
            OpteeMessageCommand::OpenSession => DispatchRequest::OpenSession(OpenSessionIn {
                uuid: self.uuid,
                ta: self.ta,
                client_id: self.client_id,
                param_types: self.param_types,
                params: self.params,
                param_attrs: self.param_attrs,
            }),
            OpteeMessageCommand::InvokeCommand => DispatchRequest::InvokeCommand(InvokeCommandIn {
                session: self.session,
                cmd: CommandId(self.func),
                param_types: self.param_types,
                params: self.params,
                param_attrs: self.param_attrs,
            }),
            OpteeMessageCommand::CloseSession => DispatchRequest::CloseSession(CloseSessionIn {
                session: self.session,
            }),
            OpteeMessageCommand::Cancel => DispatchRequest::Cancel(CancelCommandIn {
                session: self.session,
            }),
        };
        Ok(req)
    }

    /// Write `response` back into the argument block.
    pub fn set_response(&mut self, response: &DispatchResponse) {
        match response {
            DispatchResponse::OpenSession(out) => {
                self.session = out.session.map_or(0, SessionHandle::as_raw);
                self.params = out.params;
                self.msg = out.msg;
            }
            DispatchResponse::InvokeCommand(out) => {
                self.params = out.params;
                self.msg = out.msg;
            }
            DispatchResponse::CloseSession(res) => {
                self.msg = TeeMsgResult::new(*res, TeeOrigin::Tee);
            }
            DispatchResponse::Cancel(out) => self.msg = out.msg,
        }
    }
}
