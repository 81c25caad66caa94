// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Interfaces to the collaborators the dispatch layer relies on
//!
//! The TA manager owns the lifecycle of TAs and sessions along with the [`SessionRegistry`]
//! they live in. The TA loader fetches TA images from the normal world on demand. Neither is
//! implemented by this crate.

use litebox_common_optee::{
    CommandId, SessionHandle, TaImageRef, TeeIdentity, TeeOrigin, TeeParamSet, TeeResult,
    TeeTimeout, TeeUuid,
};

use crate::SessionRegistry;

/// The TA image an open request should use.
#[derive(Debug)]
pub enum TaImage<I> {
    /// Whatever the request came with (possibly nothing); the manager looks the TA up by UUID.
    Requested(Option<TaImageRef>),
    /// An image the loader just fetched and verified.
    Loaded(I),
}

/// Where the pages of a TA image loaded from the normal world are mapped into the TA's address
/// space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NwUserMap {
    pub paddr: u64,
    pub uaddr: usize,
    pub size: usize,
}

/// Result of a successful [`TaLoader::load_from_normal_world`].
#[derive(Debug)]
pub struct LoadedTa<I> {
    pub image: I,
    pub nw_user_map: NwUserMap,
}

/// The TA lifecycle manager.
///
/// Every operation that produces a result also reports which layer the result is attributed to
/// through `origin`. The dispatch layer sets `origin` to [`TeeOrigin::Tee`] before each call, so
/// implementations only need to touch it when something else (e.g., the TA) produced the result.
pub trait TaManager {
    /// Per-session state stored in the registry
    type Session;
    /// TA images as produced by the matching [`TaLoader`]
    type Image;

    /// Open a session.
    ///
    /// `uuid` is `None` when `ta` is a freshly loaded image, in which case the image alone
    /// identifies the TA. A TA that is neither resident nor given by `ta` is reported as
    /// `ItemNotFound` with origin `Tee`.
    #[expect(
        clippy::too_many_arguments,
        reason = "mirrors the open-session primitive of the TA manager"
    )]
    fn open_session(
        &self,
        origin: &mut TeeOrigin,
        registry: &SessionRegistry<Self::Session>,
        uuid: Option<&TeeUuid>,
        ta: TaImage<Self::Image>,
        identity: &TeeIdentity,
        timeout: TeeTimeout,
        params: &mut TeeParamSet,
    ) -> Result<SessionHandle, TeeResult>;

    /// Close `session` after checking that it is a member of `registry`.
    fn close_session(
        &self,
        session: SessionHandle,
        registry: &SessionRegistry<Self::Session>,
    ) -> Result<(), TeeResult>;

    /// Check that `session` refers to a session that is currently open.
    fn verify_session(
        &self,
        session: SessionHandle,
        registry: &SessionRegistry<Self::Session>,
    ) -> Result<(), TeeResult> {
        if registry.contains(session) {
            Ok(())
        } else {
            Err(TeeResult::BadParameters)
        }
    }

    fn invoke_command(
        &self,
        origin: &mut TeeOrigin,
        registry: &SessionRegistry<Self::Session>,
        session: SessionHandle,
        timeout: TeeTimeout,
        cmd: CommandId,
        params: &mut TeeParamSet,
    ) -> Result<(), TeeResult>;

    /// Request cancellation of whatever `session` is running. This is advisory; the TA may
    /// ignore it.
    fn cancel_command(
        &self,
        origin: &mut TeeOrigin,
        registry: &SessionRegistry<Self::Session>,
        session: SessionHandle,
    ) -> Result<(), TeeResult>;

    /// Record the normal-world mapping of a loaded image in the TA context of `session`.
    fn attach_nw_user_map(
        &self,
        registry: &SessionRegistry<Self::Session>,
        session: SessionHandle,
        map: NwUserMap,
    ) -> Result<(), TeeResult>;
}

/// Fetches TA images from the normal world.
pub trait TaLoader {
    type Image;

    /// Fetch and verify the image of TA `uuid`. Failures of the normal-world round trip are
    /// reported with origin `Comms`; images failing verification with origin `Tee`.
    fn load_from_normal_world(
        &self,
        uuid: &TeeUuid,
        origin: &mut TeeOrigin,
    ) -> Result<LoadedTa<Self::Image>, TeeResult>;
}
