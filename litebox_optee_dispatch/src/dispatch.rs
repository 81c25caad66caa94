// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! The session dispatch entry points

use litebox_common_optee::{
    CancelCommandIn, CancelCommandOut, CloseSessionIn, DispatchRequest, DispatchResponse,
    InvokeCommandIn, InvokeCommandOut, OpenSessionIn, OpenSessionOut, OpteeMsgArg, SessionHandle,
    TEE_NUM_PARAMS, TeeIdentity, TeeMsgResult, TeeOrigin, TeeParamRaw, TeeParamSet, TeeResult,
    TeeTimeout, TeeUuid,
};

use crate::identity::sanitize_client_identity;
use crate::manager::{LoadedTa, TaImage, TaLoader, TaManager};
use crate::params::{marshal_in, update_out_params};
use crate::scratch::{Scratch, ScratchPool};
use crate::{DispatchConfig, DispatchConfigError, SessionRegistry};

/// Entry point for session-related requests from the normal world.
///
/// The dispatcher validates and marshals each request and hands it to the TA manager. It does
/// not keep any session state of its own: every handle the normal world presents is checked
/// against the manager's registry before anything is done with it.
pub struct Dispatcher<'a, M: TaManager, L: TaLoader<Image = M::Image>> {
    manager: &'a M,
    loader: &'a L,
    registry: &'a SessionRegistry<M::Session>,
    pub(crate) scratch: ScratchPool,
    config: DispatchConfig,
}

impl<'a, M: TaManager, L: TaLoader<Image = M::Image>> Dispatcher<'a, M, L> {
    pub fn new(
        manager: &'a M,
        loader: &'a L,
        registry: &'a SessionRegistry<M::Session>,
        config: DispatchConfig,
    ) -> Result<Self, DispatchConfigError> {
        config.validate()?;
        Ok(Dispatcher {
            manager,
            loader,
            registry,
            scratch: ScratchPool::new(config.scratch_slots),
            config,
        })
    }

    /// Number of requests that can still be served concurrently before hitting `OutOfMemory`.
    pub fn available_scratch(&self) -> usize {
        self.scratch.available()
    }

    /// Open a session with the TA named in `req`.
    ///
    /// If the TA is not resident, its image is fetched from the normal world once and the open
    /// is retried with it. The returned parameters echo the request, with output slots updated
    /// only if the session was opened.
    pub fn open_session(&self, req: &OpenSessionIn) -> OpenSessionOut {
        let mut out = OpenSessionOut {
            session: None,
            params: req.params,
            msg: TeeMsgResult::new(TeeResult::Success, TeeOrigin::Tee),
        };
        let mut origin = TeeOrigin::Tee;
        match self.try_open_session(req, &mut origin, &mut out.params) {
            Ok(session) => out.session = Some(session),
            Err(res) => {
                tracing::debug!(
                    "open session failed: {:#x} (origin {:?})",
                    u32::from(res),
                    origin
                );
                out.msg.res = res;
            }
        }
        out.msg.origin = origin;
        out
    }

    fn try_open_session(
        &self,
        req: &OpenSessionIn,
        origin: &mut TeeOrigin,
        echo: &mut [TeeParamRaw; TEE_NUM_PARAMS],
    ) -> Result<SessionHandle, TeeResult> {
        let mut scratch = self.scratch.acquire()?;
        let Scratch { params, identity } = &mut *scratch;
        *identity = sanitize_client_identity(&req.client_id)?;
        *params = marshal_in(req.param_types, &req.params, &req.param_attrs)?;

        let opened = self.manager.open_session(
            origin,
            self.registry,
            Some(&req.uuid),
            TaImage::Requested(req.ta),
            identity,
            TeeTimeout::Infinite,
            params,
        );
        let session = match opened {
            // Only a TA the core could not find is fetched; a TA reporting "not found" itself
            // has been found already.
            Err(TeeResult::ItemNotFound) if *origin == TeeOrigin::Tee && self.config.lazy_load => {
                self.open_loaded_session(&req.uuid, origin, identity, params)?
            }
            opened => opened?,
        };
        update_out_params(params, echo);
        Ok(session)
    }

    fn open_loaded_session(
        &self,
        uuid: &TeeUuid,
        origin: &mut TeeOrigin,
        identity: &TeeIdentity,
        params: &mut TeeParamSet,
    ) -> Result<SessionHandle, TeeResult> {
        tracing::trace!("TA {:?} is not resident, loading it from the normal world", uuid);
        let LoadedTa { image, nw_user_map } = self.loader.load_from_normal_world(uuid, origin)?;

        *origin = TeeOrigin::Tee;
        let session = self.manager.open_session(
            origin,
            self.registry,
            None,
            TaImage::Loaded(image),
            identity,
            TeeTimeout::Infinite,
            params,
        )?;

        if let Err(res) = self
            .manager
            .attach_nw_user_map(self.registry, session, nw_user_map)
        {
            *origin = TeeOrigin::Tee;
            // The session is useless without its mapping. It was opened a moment ago, so a
            // failure to close it has nothing more to tell the caller than `res`.
            let _ = self.manager.close_session(session, self.registry);
            return Err(res);
        }
        Ok(session)
    }

    /// Close the session named by `req`. The manager's result is returned as-is.
    pub fn close_session(&self, req: &CloseSessionIn) -> Result<(), TeeResult> {
        let session = SessionHandle::from_raw(req.session).ok_or(TeeResult::BadParameters)?;
        self.manager.close_session(session, self.registry)
    }

    /// Invoke a command of the TA behind the session named by `req`.
    ///
    /// Output slots are written back whenever the command was handed to the TA, even if it
    /// failed.
    pub fn invoke_command(&self, req: &InvokeCommandIn) -> InvokeCommandOut {
        let mut out = InvokeCommandOut {
            params: req.params,
            msg: TeeMsgResult::new(TeeResult::Success, TeeOrigin::Tee),
        };
        let mut origin = TeeOrigin::Tee;
        let res = self.try_invoke_command(req, &mut origin, &mut out.params);
        out.msg = TeeMsgResult::from_result(res, origin);
        out
    }

    fn try_invoke_command(
        &self,
        req: &InvokeCommandIn,
        origin: &mut TeeOrigin,
        echo: &mut [TeeParamRaw; TEE_NUM_PARAMS],
    ) -> Result<(), TeeResult> {
        let session = self.verify_session(req.session)?;
        let mut params = marshal_in(req.param_types, &req.params, &req.param_attrs)?;
        let res = self.manager.invoke_command(
            origin,
            self.registry,
            session,
            TeeTimeout::Infinite,
            req.cmd,
            &mut params,
        );
        update_out_params(&params, echo);
        res
    }

    /// Ask the TA behind the session named by `req` to cancel what it is doing.
    pub fn cancel_command(&self, req: &CancelCommandIn) -> CancelCommandOut {
        let mut origin = TeeOrigin::Tee;
        let res = self.verify_session(req.session).and_then(|session| {
            self.manager
                .cancel_command(&mut origin, self.registry, session)
        });
        CancelCommandOut {
            msg: TeeMsgResult::from_result(res, origin),
        }
    }

    /// Resolve a caller-supplied session word to a session that is currently open.
    fn verify_session(&self, raw: u64) -> Result<SessionHandle, TeeResult> {
        let session = SessionHandle::from_raw(raw).ok_or(TeeResult::BadParameters)?;
        self.manager.verify_session(session, self.registry)?;
        Ok(session)
    }

    /// Route a request to the matching entry point.
    pub fn handle_message(&self, req: &DispatchRequest) -> DispatchResponse {
        match req {
            DispatchRequest::OpenSession(req) => {
                DispatchResponse::OpenSession(self.open_session(req))
            }
            DispatchRequest::InvokeCommand(req) => {
                DispatchResponse::InvokeCommand(self.invoke_command(req))
            }
            DispatchRequest::CloseSession(req) => {
                DispatchResponse::CloseSession(TeeResult::from_result(self.close_session(req)))
            }
            DispatchRequest::Cancel(req) => DispatchResponse::Cancel(self.cancel_command(req)),
        }
    }

    /// Serve a request laid out the way the normal world sends it, answering in place.
    pub fn handle_msg_arg(&self, arg: &mut OpteeMsgArg) {
        match arg.request() {
            Ok(req) => {
                let response = self.handle_message(&req);
                tracing::debug!(
                    command = ?req.command(),
                    result = ?response.result(),
                    "message handled"
                );
                arg.set_response(&response);
            }
            Err(res) => {
                tracing::debug!("unknown message command {:#x}", arg.cmd);
                arg.msg = TeeMsgResult::new(res, TeeOrigin::Tee);
            }
        }
    }
}
