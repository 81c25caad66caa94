// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! JSON-formatted command sequences
//!
//! There is no normal-world client driving the dispatcher here. Instead, a JSON file lists the
//! requests to send, in order, each with the result it is expected to produce.

use anyhow::{Context as _, Result, anyhow, bail};
use hashbrown::HashMap;
use litebox_common_optee::{
    OpteeMessageCommand, OpteeMsgArg, TEE_NUM_PARAMS, TeeClientId, TeeLogin, TeeMsgResult,
    TeeParamAttr, TeeParamRaw, TeeParamType, TeeParamTypes, TeeResult, TeeUuid,
};
use litebox_optee_dispatch::{Dispatcher, TaLoader, TaManager};
use serde::Deserialize;
use tracing::info;

use crate::shm::NormalWorldMemory;

/// One request of a command sequence.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TaCommand {
    OpenSession {
        /// Name the rest of the sequence refers to the session by
        #[serde(default)]
        session: Option<String>,
        uuid: String,
        #[serde(default)]
        login: LoginArg,
        #[serde(default)]
        client_uuid: Option<String>,
        #[serde(default)]
        args: Vec<TaCommandParamsBase64>,
        #[serde(default)]
        expect: ExpectedResult,
    },
    InvokeCommand {
        #[serde(default)]
        session: Option<String>,
        /// Raw handle word to use instead of a named session (e.g., to try a forged one)
        #[serde(default)]
        raw_session: Option<u64>,
        #[serde(default)]
        cmd_id: u32,
        #[serde(default)]
        args: Vec<TaCommandParamsBase64>,
        #[serde(default)]
        expect: ExpectedResult,
    },
    Cancel {
        #[serde(default)]
        session: Option<String>,
        /// Raw handle word to use instead of a named session (e.g., to try a forged one)
        #[serde(default)]
        raw_session: Option<u64>,
        #[serde(default)]
        expect: ExpectedResult,
    },
    CloseSession {
        #[serde(default)]
        session: Option<String>,
        /// Raw handle word to use instead of a named session (e.g., to try a forged one)
        #[serde(default)]
        raw_session: Option<u64>,
        #[serde(default)]
        expect: ExpectedResult,
    },
    /// A request with an arbitrary command word and nothing else filled in
    RawMessage {
        cmd: u32,
        #[serde(default)]
        raw_session: Option<u64>,
        #[serde(default)]
        expect: ExpectedResult,
    },
}

#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginArg {
    #[default]
    Public,
    User,
    Group,
    Application,
    ApplicationUser,
    ApplicationGroup,
    Kernel,
    TrustedApp,
}

impl From<LoginArg> for u32 {
    fn from(login: LoginArg) -> Self {
        let login = match login {
            LoginArg::Public => TeeLogin::Public,
            LoginArg::User => TeeLogin::User,
            LoginArg::Group => TeeLogin::Group,
            LoginArg::Application => TeeLogin::Application,
            LoginArg::ApplicationUser => TeeLogin::ApplicationUser,
            LoginArg::ApplicationGroup => TeeLogin::ApplicationGroup,
            LoginArg::Kernel => TeeLogin::Kernel,
            LoginArg::TrustedApp => TeeLogin::TrustedApp,
        };
        login as u32
    }
}

/// Results a request can be expected to produce.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedResult {
    #[default]
    Success,
    AccessDenied,
    BadFormat,
    BadParameters,
    Cancel,
    CommunicationError,
    ItemNotFound,
    NotSupported,
    OutOfMemory,
    Overflow,
    SecurityError,
    ShortBuffer,
}

impl From<ExpectedResult> for TeeResult {
    fn from(expected: ExpectedResult) -> Self {
        match expected {
            ExpectedResult::Success => TeeResult::Success,
            ExpectedResult::AccessDenied => TeeResult::AccessDenied,
            ExpectedResult::BadFormat => TeeResult::BadFormat,
            ExpectedResult::BadParameters => TeeResult::BadParameters,
            ExpectedResult::Cancel => TeeResult::Cancel,
            ExpectedResult::CommunicationError => TeeResult::CommunicationError,
            ExpectedResult::ItemNotFound => TeeResult::ItemNotFound,
            ExpectedResult::NotSupported => TeeResult::NotSupported,
            ExpectedResult::OutOfMemory => TeeResult::OutOfMemory,
            ExpectedResult::Overflow => TeeResult::Overflow,
            ExpectedResult::SecurityError => TeeResult::SecurityError,
            ExpectedResult::ShortBuffer => TeeResult::ShortBuffer,
        }
    }
}

/// An argument of a request. Memory reference contents are base64 encoded to enable
/// JSON-formatted input files.
///
/// Output arguments may carry what they are expected to hold once the request is done.
#[derive(Debug, Deserialize)]
#[serde(tag = "param_type", rename_all = "snake_case")]
pub enum TaCommandParamsBase64 {
    ValueInput {
        value_a: u64,
        value_b: u64,
    },
    ValueOutput {
        #[serde(default)]
        expect: Option<[u64; 2]>,
    },
    ValueInout {
        value_a: u64,
        value_b: u64,
        #[serde(default)]
        expect: Option<[u64; 2]>,
    },
    MemrefInput {
        data_base64: String,
    },
    MemrefOutput {
        buffer_size: u64,
        #[serde(default)]
        expect_base64: Option<String>,
    },
    MemrefInout {
        data_base64: String,
        buffer_size: u64,
        #[serde(default)]
        expect_base64: Option<String>,
    },
}

impl TaCommandParamsBase64 {
    fn param_type(&self) -> TeeParamType {
        match self {
            TaCommandParamsBase64::ValueInput { .. } => TeeParamType::ValueInput,
            TaCommandParamsBase64::ValueOutput { .. } => TeeParamType::ValueOutput,
            TaCommandParamsBase64::ValueInout { .. } => TeeParamType::ValueInout,
            TaCommandParamsBase64::MemrefInput { .. } => TeeParamType::MemrefInput,
            TaCommandParamsBase64::MemrefOutput { .. } => TeeParamType::MemrefOutput,
            TaCommandParamsBase64::MemrefInout { .. } => TeeParamType::MemrefInout,
        }
    }

    /// The wire slot for this argument, sharing memory reference contents with the secure world.
    fn share(&self, shm: &NormalWorldMemory) -> Result<TeeParamRaw> {
        Ok(match self {
            TaCommandParamsBase64::ValueInput { value_a, value_b }
            | TaCommandParamsBase64::ValueInout {
                value_a, value_b, ..
            } => TeeParamRaw {
                a: *value_a,
                b: *value_b,
            },
            TaCommandParamsBase64::ValueOutput { .. } => TeeParamRaw::default(),
            TaCommandParamsBase64::MemrefInput { data_base64 } => {
                let data = decode_base64(data_base64)?;
                TeeParamRaw {
                    a: shm.share(&data, data.len()),
                    b: data.len() as u64,
                }
            }
            TaCommandParamsBase64::MemrefOutput { buffer_size, .. } => TeeParamRaw {
                a: shm.share(&[], usize::try_from(*buffer_size)?),
                b: *buffer_size,
            },
            TaCommandParamsBase64::MemrefInout {
                data_base64,
                buffer_size,
                ..
            } => {
                let data = decode_base64(data_base64)?;
                let buffer_size = usize::try_from(*buffer_size)?;
                if buffer_size < data.len() {
                    bail!("buffer size is smaller than input data size");
                }
                TeeParamRaw {
                    a: shm.share(&data, buffer_size),
                    b: data.len() as u64,
                }
            }
        })
    }

    /// Compare what the secure world reported in `raw` against the expectation, if any.
    fn check_output(&self, index: usize, raw: &TeeParamRaw, shm: &NormalWorldMemory) -> Result<()> {
        match self {
            TaCommandParamsBase64::ValueOutput { expect }
            | TaCommandParamsBase64::ValueInout { expect, .. } => {
                info!("output (index: {}): {:#x} {:#x}", index, raw.a, raw.b);
                if let Some(expected) = expect
                    && *expected != [raw.a, raw.b]
                {
                    bail!("output {index} is [{}, {}], expected {expected:?}", raw.a, raw.b);
                }
            }
            TaCommandParamsBase64::MemrefOutput { expect_base64, .. }
            | TaCommandParamsBase64::MemrefInout { expect_base64, .. } => {
                let data = shm.read(raw.a, raw.b).unwrap_or_default();
                if data.len() < 16 {
                    info!("output (index: {}): {:#x} {:?}", index, raw.a, data);
                } else {
                    info!(
                        "output (index: {}): {:#x} {:?}... (total {} bytes)",
                        index,
                        raw.a,
                        &data[..16],
                        data.len()
                    );
                }
                if let Some(expected) = expect_base64 {
                    let expected = decode_base64(expected)?;
                    if expected != data {
                        bail!("output {index} is {data:?}, expected {expected:?}");
                    }
                }
            }
            TaCommandParamsBase64::ValueInput { .. } | TaCommandParamsBase64::MemrefInput { .. } => {}
        }
        Ok(())
    }
}

fn decode_base64(data_base64: &str) -> Result<Vec<u8>> {
    base64::engine::Engine::decode(&base64::engine::general_purpose::STANDARD, data_base64)
        .context("failed to decode base64 data")
}

pub fn parse_uuid(s: &str) -> Result<TeeUuid> {
    let uuid = uuid::Uuid::parse_str(s).with_context(|| format!("invalid UUID {s:?}"))?;
    Ok(TeeUuid::from_bytes(uuid.into_bytes()))
}

/// Parse a JSON-formatted command sequence.
pub fn parse_commands(json: &str) -> Result<Vec<TaCommand>> {
    serde_json::from_str(json).context("malformed command sequence")
}

/// Wire form of the arguments of a request.
struct SharedArgs {
    param_types: TeeParamTypes,
    params: [TeeParamRaw; TEE_NUM_PARAMS],
}

impl SharedArgs {
    fn fill(&self, arg: &mut OpteeMsgArg) {
        arg.param_types = self.param_types;
        arg.params = self.params;
        arg.param_attrs = [TeeParamAttr::MEM_NONSECURE; TEE_NUM_PARAMS];
    }
}

/// Feeds a command sequence into a dispatcher, the way a normal-world client would.
pub struct CommandRunner<'d, 'a, M: TaManager, L: TaLoader<Image = M::Image>> {
    dispatcher: &'d Dispatcher<'a, M, L>,
    shm: &'d NormalWorldMemory,
    sessions: HashMap<String, u64>,
}

impl<'d, 'a, M: TaManager, L: TaLoader<Image = M::Image>> CommandRunner<'d, 'a, M, L> {
    pub fn new(dispatcher: &'d Dispatcher<'a, M, L>, shm: &'d NormalWorldMemory) -> Self {
        CommandRunner {
            dispatcher,
            shm,
            sessions: HashMap::new(),
        }
    }

    /// Run every command in order, stopping at the first one that does not do what it was
    /// expected to.
    pub fn run_all(&mut self, commands: &[TaCommand]) -> Result<()> {
        for (step, command) in commands.iter().enumerate() {
            self.run(command)
                .with_context(|| format!("command #{step} ({command:?})"))?;
        }
        Ok(())
    }

    /// Run one command.
    pub fn run(&mut self, command: &TaCommand) -> Result<()> {
        match command {
            TaCommand::OpenSession {
                session,
                uuid,
                login,
                client_uuid,
                args,
                expect,
            } => {
                let shared = self.share_args(args)?;
                let mut arg = OpteeMsgArg::new(OpteeMessageCommand::OpenSession as u32);
                arg.uuid = parse_uuid(uuid)?;
                arg.client_id = TeeClientId {
                    login: u32::from(*login),
                    uuid: client_uuid
                        .as_deref()
                        .map(parse_uuid)
                        .transpose()?
                        .unwrap_or_default(),
                };
                shared.fill(&mut arg);
                self.send(&mut arg, *expect)?;
                if let Some(name) = session
                    && arg.session != 0
                {
                    self.sessions.insert(name.clone(), arg.session);
                }
                if arg.msg.is_success() {
                    self.check_outputs(args, &arg.params)?;
                }
                self.unshare(args, &shared.params);
            }
            TaCommand::InvokeCommand {
                session,
                raw_session,
                cmd_id,
                args,
                expect,
            } => {
                let shared = self.share_args(args)?;
                let mut arg = OpteeMsgArg::new(OpteeMessageCommand::InvokeCommand as u32);
                arg.session = self.session_word(session.as_deref(), *raw_session)?;
                arg.func = *cmd_id;
                shared.fill(&mut arg);
                self.send(&mut arg, *expect)?;
                self.check_outputs(args, &arg.params)?;
                self.unshare(args, &shared.params);
            }
            TaCommand::Cancel {
                session,
                raw_session,
                expect,
            } => {
                let mut arg = OpteeMsgArg::new(OpteeMessageCommand::Cancel as u32);
                arg.session = self.session_word(session.as_deref(), *raw_session)?;
                self.send(&mut arg, *expect)?;
            }
            TaCommand::CloseSession {
                session,
                raw_session,
                expect,
            } => {
                let mut arg = OpteeMsgArg::new(OpteeMessageCommand::CloseSession as u32);
                arg.session = self.session_word(session.as_deref(), *raw_session)?;
                self.send(&mut arg, *expect)?;
            }
            TaCommand::RawMessage {
                cmd,
                raw_session,
                expect,
            } => {
                let mut arg = OpteeMsgArg::new(*cmd);
                arg.session = raw_session.unwrap_or_default();
                self.send(&mut arg, *expect)?;
            }
        }
        Ok(())
    }

    fn send(&self, arg: &mut OpteeMsgArg, expect: ExpectedResult) -> Result<()> {
        self.dispatcher.handle_msg_arg(arg);
        let TeeMsgResult { res, origin } = arg.msg;
        info!(
            cmd = arg.cmd,
            result = format_args!("{:#x}", u32::from(res)),
            ?origin,
            "request done"
        );
        let expected = TeeResult::from(expect);
        if res != expected {
            bail!("got {res:?} (origin {origin:?}), expected {expected:?}");
        }
        Ok(())
    }

    /// The handle word to send: that of a session opened earlier in the sequence, or a raw one.
    fn session_word(&self, session: Option<&str>, raw_session: Option<u64>) -> Result<u64> {
        match (session, raw_session) {
            (Some(name), None) => self
                .sessions
                .get(name)
                .copied()
                .ok_or_else(|| anyhow!("no session named {name:?} was opened")),
            (None, Some(raw)) => Ok(raw),
            _ => bail!("exactly one of `session` and `raw_session` must be given"),
        }
    }

    fn share_args(&self, args: &[TaCommandParamsBase64]) -> Result<SharedArgs> {
        if args.len() > TEE_NUM_PARAMS {
            bail!("a request has at most {TEE_NUM_PARAMS} arguments");
        }
        let mut types = [TeeParamType::None; TEE_NUM_PARAMS];
        let mut params = [TeeParamRaw::default(); TEE_NUM_PARAMS];
        for ((typ, param), arg) in types.iter_mut().zip(params.iter_mut()).zip(args) {
            *typ = arg.param_type();
            *param = arg.share(self.shm)?;
        }
        Ok(SharedArgs {
            param_types: TeeParamTypes::new(types),
            params,
        })
    }

    fn check_outputs(
        &self,
        args: &[TaCommandParamsBase64],
        out: &[TeeParamRaw; TEE_NUM_PARAMS],
    ) -> Result<()> {
        for (index, (arg, raw)) in args.iter().zip(out).enumerate() {
            arg.check_output(index, raw, self.shm)?;
        }
        Ok(())
    }

    fn unshare(&self, args: &[TaCommandParamsBase64], params: &[TeeParamRaw; TEE_NUM_PARAMS]) {
        for (arg, raw) in args.iter().zip(params) {
            if arg.param_type().is_memref() {
                self.shm.unshare(raw.a);
            }
        }
    }

    /// Handles of the sessions opened so far, by name.
    pub fn sessions(&self) -> &HashMap<String, u64> {
        &self.sessions
    }
}
