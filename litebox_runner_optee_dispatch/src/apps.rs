// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Built-in trusted apps that TA images can name

use litebox_common_optee::{CommandId, TeeIdentity, TeeParam, TeeParamSet, TeeResult};

use crate::shm::NormalWorldMemory;

/// What a trusted app gets to see while running a command.
pub struct InvokeEnv<'a> {
    pub shm: &'a NormalWorldMemory,
    /// Whether the client asked for the running command to be cancelled
    pub cancel_requested: bool,
}

/// A trusted app instance. One instance serves exactly one session.
pub trait TrustedApp: Send {
    fn open_session(
        &mut self,
        identity: &TeeIdentity,
        params: &mut TeeParamSet,
    ) -> Result<(), TeeResult>;

    fn invoke_command(
        &mut self,
        env: &InvokeEnv<'_>,
        cmd: CommandId,
        params: &mut TeeParamSet,
    ) -> Result<(), TeeResult>;

    fn close_session(&mut self) {}
}

/// Create a fresh instance of the app called `name`.
pub fn instantiate(name: &str) -> Option<Box<dyn TrustedApp>> {
    match name {
        "echo" => Some(Box::new(EchoApp::default())),
        "counter" => Some(Box::new(CounterApp::default())),
        _ => None,
    }
}

fn expect_value_input(params: &TeeParamSet, index: usize) -> Result<(u64, u64), TeeResult> {
    match params.get(index) {
        Some(TeeParam::ValueInput { a, b } | TeeParam::ValueInout { a, b }) => Ok((*a, *b)),
        _ => Err(TeeResult::BadParameters),
    }
}

/// Commands of the `echo` app
pub mod echo {
    /// Copy memref input 0 into memref output 1
    pub const CMD_ECHO: u32 = 0;
    /// Value output 1 gets the sum of value input 0
    pub const CMD_ADD: u32 = 1;
    /// Value output 0 gets the login class of the client
    pub const CMD_WHOAMI: u32 = 2;
}

#[derive(Default)]
struct EchoApp {
    client: TeeIdentity,
}

impl TrustedApp for EchoApp {
    fn open_session(
        &mut self,
        identity: &TeeIdentity,
        _params: &mut TeeParamSet,
    ) -> Result<(), TeeResult> {
        self.client = *identity;
        Ok(())
    }

    fn invoke_command(
        &mut self,
        env: &InvokeEnv<'_>,
        cmd: CommandId,
        params: &mut TeeParamSet,
    ) -> Result<(), TeeResult> {
        match cmd.0 {
            echo::CMD_ECHO => {
                let Some(input @ TeeParam::MemrefInput { .. }) = params.get(0).copied() else {
                    return Err(TeeResult::BadParameters);
                };
                let Some(&TeeParam::MemrefOutput { buffer, size }) = params.get(1) else {
                    return Err(TeeResult::BadParameters);
                };
                let data = env.shm.read_memref(&input)?;
                let needed = data.len() as u64;
                params.set_memref_size(1, needed)?;
                if needed > size {
                    return Err(TeeResult::ShortBuffer);
                }
                env.shm.write(buffer, &data)
            }
            echo::CMD_ADD => {
                let (a, b) = expect_value_input(params, 0)?;
                params.set_value(1, a.wrapping_add(b), 0)
            }
            echo::CMD_WHOAMI => params.set_value(0, u64::from(self.client.login as u32), 0),
            _ => Err(TeeResult::NotSupported),
        }
    }
}

/// Commands of the `counter` app
pub mod counter {
    /// Add value input 0 to the counter; value output 1 gets the new count
    pub const CMD_INCREMENT: u32 = 0;
    /// Value output 0 gets the count
    pub const CMD_GET: u32 = 1;
    /// Wait for more work, which ends early if the client cancels
    pub const CMD_WAIT: u32 = 2;
}

#[derive(Default)]
struct CounterApp {
    count: u64,
}

impl TrustedApp for CounterApp {
    /// An optional value input 0 sets the initial count.
    fn open_session(
        &mut self,
        _identity: &TeeIdentity,
        params: &mut TeeParamSet,
    ) -> Result<(), TeeResult> {
        if let Ok((start, _)) = expect_value_input(params, 0) {
            self.count = start;
        }
        Ok(())
    }

    fn invoke_command(
        &mut self,
        env: &InvokeEnv<'_>,
        cmd: CommandId,
        params: &mut TeeParamSet,
    ) -> Result<(), TeeResult> {
        match cmd.0 {
            counter::CMD_INCREMENT => {
                let (step, _) = expect_value_input(params, 0)?;
                let count = self.count.checked_add(step).ok_or(TeeResult::Overflow)?;
                params.set_value(1, count, 0)?;
                self.count = count;
                Ok(())
            }
            counter::CMD_GET => params.set_value(0, self.count, 0),
            counter::CMD_WAIT if env.cancel_requested => Err(TeeResult::Cancel),
            counter::CMD_WAIT => Ok(()),
            _ => Err(TeeResult::NotSupported),
        }
    }
}
