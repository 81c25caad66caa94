// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Crate-local test-only mock TA manager and loader.

// Pull in `std` for the test-only world, so that we have a nicer/easier time writing tests
extern crate std;

use core::cell::Cell;
use std::sync::Mutex;
use std::vec::Vec;

use litebox_common_optee::{
    CommandId, SessionHandle, TaImageRef, TeeIdentity, TeeOrigin, TeeParamSet, TeeResult,
    TeeTimeout, TeeUuid,
};

use crate::{LoadedTa, NwUserMap, SessionRegistry, TaImage, TaLoader, TaManager};

/// Every call the dispatcher made into a mock collaborator, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Call {
    Open {
        uuid: Option<TeeUuid>,
        ta: MockTa,
        identity: TeeIdentity,
        timeout: TeeTimeout,
    },
    Close(SessionHandle),
    Verify(SessionHandle),
    Invoke {
        session: SessionHandle,
        cmd: CommandId,
        timeout: TeeTimeout,
    },
    Cancel(SessionHandle),
    Attach(SessionHandle, NwUserMap),
    Load(TeeUuid),
}

/// What an open was asked to use, with the image flattened for comparison.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum MockTa {
    Requested(Option<TaImageRef>),
    Loaded(MockImage),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct MockImage {
    pub(crate) uuid: TeeUuid,
}

#[derive(Debug)]
pub(crate) struct MockSession {
    pub(crate) uuid: TeeUuid,
    pub(crate) identity: TeeIdentity,
    pub(crate) nw_user_map: Option<NwUserMap>,
    pub(crate) cancelled: bool,
}

/// A TA manager whose TAs answer every command by writing `(cmd, invocation count)` into
/// their first output value slot.
pub(crate) struct MockTaManager {
    pub(crate) calls: Mutex<Vec<Call>>,
    resident: Vec<TeeUuid>,
    /// Failure reported by opens of resident TAs
    pub(crate) open_failure: Cell<Option<(TeeResult, TeeOrigin)>>,
    /// Failure reported by opens with a freshly loaded image
    pub(crate) loaded_open_failure: Cell<Option<(TeeResult, TeeOrigin)>>,
    /// Failure reported by the TA on invoke
    pub(crate) invoke_failure: Cell<Option<TeeResult>>,
    pub(crate) attach_failure: Cell<Option<TeeResult>>,
}

impl MockTaManager {
    pub(crate) fn new(resident: &[TeeUuid]) -> Self {
        MockTaManager {
            calls: Mutex::new(Vec::new()),
            resident: resident.to_vec(),
            open_failure: Cell::new(None),
            loaded_open_failure: Cell::new(None),
            invoke_failure: Cell::new(None),
            attach_failure: Cell::new(None),
        }
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn count_invokes(&self) -> u64 {
        let calls = self.calls.lock().unwrap();
        calls
            .iter()
            .filter(|c| matches!(c, Call::Invoke { .. }))
            .count() as u64
    }
}

impl TaManager for MockTaManager {
    type Session = MockSession;
    type Image = MockImage;

    fn open_session(
        &self,
        origin: &mut TeeOrigin,
        registry: &SessionRegistry<MockSession>,
        uuid: Option<&TeeUuid>,
        ta: TaImage<MockImage>,
        identity: &TeeIdentity,
        timeout: TeeTimeout,
        params: &mut TeeParamSet,
    ) -> Result<SessionHandle, TeeResult> {
        let ta = match ta {
            TaImage::Requested(r) => MockTa::Requested(r),
            TaImage::Loaded(image) => MockTa::Loaded(image),
        };
        self.record(Call::Open {
            uuid: uuid.copied(),
            ta,
            identity: *identity,
            timeout,
        });
        let target = match (uuid, ta) {
            (_, MockTa::Loaded(image)) => {
                if let Some((res, failed_at)) = self.loaded_open_failure.get() {
                    *origin = failed_at;
                    return Err(res);
                }
                image.uuid
            }
            (Some(uuid), _) if self.resident.contains(uuid) => {
                if let Some((res, failed_at)) = self.open_failure.get() {
                    *origin = failed_at;
                    return Err(res);
                }
                *uuid
            }
            _ => return Err(TeeResult::ItemNotFound),
        };
        // Greet the client through the first writable value slot, if any
        let _ = params.set_value(0, 0x0be7, 0);
        registry
            .insert(MockSession {
                uuid: target,
                identity: *identity,
                nw_user_map: None,
                cancelled: false,
            })
            .map_err(|_| TeeResult::OutOfMemory)
    }

    fn close_session(
        &self,
        session: SessionHandle,
        registry: &SessionRegistry<MockSession>,
    ) -> Result<(), TeeResult> {
        self.record(Call::Close(session));
        registry
            .remove(session)
            .map(|_| ())
            .ok_or(TeeResult::BadParameters)
    }

    fn verify_session(
        &self,
        session: SessionHandle,
        registry: &SessionRegistry<MockSession>,
    ) -> Result<(), TeeResult> {
        self.record(Call::Verify(session));
        if registry.contains(session) {
            Ok(())
        } else {
            Err(TeeResult::BadParameters)
        }
    }

    fn invoke_command(
        &self,
        origin: &mut TeeOrigin,
        registry: &SessionRegistry<MockSession>,
        session: SessionHandle,
        timeout: TeeTimeout,
        cmd: CommandId,
        params: &mut TeeParamSet,
    ) -> Result<(), TeeResult> {
        let count = self.count_invokes() + 1;
        self.record(Call::Invoke {
            session,
            cmd,
            timeout,
        });
        if !registry.contains(session) {
            return Err(TeeResult::BadParameters);
        }
        *origin = TeeOrigin::TrustedApp;
        let slot = params
            .iter()
            .position(|p| p.param_type().is_output() && p.param_type().is_value());
        if let Some(slot) = slot {
            params.set_value(slot, u64::from(cmd.0), count)?;
        }
        match self.invoke_failure.get() {
            Some(res) => Err(res),
            None => Ok(()),
        }
    }

    fn cancel_command(
        &self,
        origin: &mut TeeOrigin,
        registry: &SessionRegistry<MockSession>,
        session: SessionHandle,
    ) -> Result<(), TeeResult> {
        self.record(Call::Cancel(session));
        registry
            .with_session_mut(session, |s| s.cancelled = true)
            .ok_or(TeeResult::BadParameters)?;
        *origin = TeeOrigin::TrustedApp;
        Ok(())
    }

    fn attach_nw_user_map(
        &self,
        registry: &SessionRegistry<MockSession>,
        session: SessionHandle,
        map: NwUserMap,
    ) -> Result<(), TeeResult> {
        self.record(Call::Attach(session, map));
        if let Some(res) = self.attach_failure.get() {
            return Err(res);
        }
        registry
            .with_session_mut(session, |s| s.nw_user_map = Some(map))
            .ok_or(TeeResult::BadParameters)
    }
}

pub(crate) const MOCK_NW_USER_MAP: NwUserMap = NwUserMap {
    paddr: 0x8000_0000,
    uaddr: 0x40_0000,
    size: 0x2000,
};

/// A TA loader serving images out of a fixed list, recording every request in the
/// manager's call log.
pub(crate) struct MockTaLoader<'a> {
    manager: &'a MockTaManager,
    available: Vec<TeeUuid>,
}

impl<'a> MockTaLoader<'a> {
    pub(crate) fn new(manager: &'a MockTaManager, available: &[TeeUuid]) -> Self {
        MockTaLoader {
            manager,
            available: available.to_vec(),
        }
    }
}

impl TaLoader for MockTaLoader<'_> {
    type Image = MockImage;

    fn load_from_normal_world(
        &self,
        uuid: &TeeUuid,
        origin: &mut TeeOrigin,
    ) -> Result<LoadedTa<MockImage>, TeeResult> {
        self.manager.record(Call::Load(*uuid));
        if !self.available.contains(uuid) {
            *origin = TeeOrigin::Comms;
            return Err(TeeResult::ItemNotFound);
        }
        Ok(LoadedTa {
            image: MockImage { uuid: *uuid },
            nw_user_map: MOCK_NW_USER_MAP,
        })
    }
}
