// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! An in-process TA manager running the built-in trusted apps

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use hashbrown::HashMap;
use hashbrown::hash_map::Entry;
use litebox_common_optee::{
    CommandId, SessionHandle, TeeIdentity, TeeOrigin, TeeParamSet, TeeResult, TeeTimeout, TeeUuid,
};
use litebox_optee_dispatch::{NwUserMap, SessionRegistry, TaImage, TaManager};
use tracing::{debug, info, warn};

use crate::apps::{self, InvokeEnv, TrustedApp};
use crate::shm::NormalWorldMemory;
use crate::ta_image::TaImageFile;

/// State of one open session.
pub struct TaSession {
    pub uuid: TeeUuid,
    pub identity: TeeIdentity,
    app: Box<dyn TrustedApp>,
    cancel_requested: bool,
    pub nw_user_map: Option<NwUserMap>,
}

/// TA manager keeping TAs resident once they have been loaded.
///
/// Once a TA is resident, the app it runs is fixed: images supplied later for the same UUID are
/// ignored.
///
/// Commands run synchronously on the calling thread while the session registry is locked, so
/// there is never more than one command in flight. A cancel request therefore waits for the
/// running command to finish, and the flag it sets is seen by the next command of the session.
pub struct UserTaManager<'a> {
    shm: &'a NormalWorldMemory,
    resident: Mutex<HashMap<TeeUuid, String>>,
    // App instances with an open session that has not been closed yet
    instances: AtomicUsize,
}

impl<'a> UserTaManager<'a> {
    pub fn new(shm: &'a NormalWorldMemory) -> Self {
        UserTaManager {
            shm,
            resident: Mutex::new(HashMap::new()),
            instances: AtomicUsize::new(0),
        }
    }

    /// Make a TA resident, so that sessions can be opened without loading it. Returns the app
    /// the TA runs, which is that of the first image installed for its UUID.
    pub fn install(&self, image: &TaImageFile) -> String {
        match self.resident.lock().unwrap().entry(image.uuid) {
            Entry::Occupied(entry) => {
                if *entry.get() != image.app {
                    warn!(uuid = ?image.uuid, app = %image.app, "ignoring image of a resident TA");
                }
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                info!(uuid = ?image.uuid, app = %image.app, "TA is now resident");
                entry.insert(image.app.clone()).clone()
            }
        }
    }

    pub fn is_resident(&self, uuid: &TeeUuid) -> bool {
        self.resident.lock().unwrap().contains_key(uuid)
    }

    /// Number of app instances whose session has been opened but not closed.
    pub fn live_instances(&self) -> usize {
        self.instances.load(Ordering::Relaxed)
    }

    fn close_instance(&self, app: &mut dyn TrustedApp) {
        app.close_session();
        self.instances.fetch_sub(1, Ordering::Relaxed);
    }

    fn resident_app(&self, uuid: &TeeUuid) -> Option<String> {
        self.resident.lock().unwrap().get(uuid).cloned()
    }

    /// Which app to run for an open request, making newly supplied images resident.
    fn resolve(
        &self,
        uuid: Option<&TeeUuid>,
        ta: TaImage<TaImageFile>,
    ) -> Result<(TeeUuid, String), TeeResult> {
        if let Some(uuid) = uuid
            && let Some(app) = self.resident_app(uuid)
        {
            return Ok((*uuid, app));
        }
        let image = match ta {
            TaImage::Loaded(image) => image,
            TaImage::Requested(Some(image_ref)) => {
                let bytes = self
                    .shm
                    .contents(image_ref.0)
                    .ok_or(TeeResult::BadParameters)?;
                let image = TaImageFile::parse(&bytes).map_err(|e| e.tee_result())?;
                if uuid.is_some_and(|uuid| *uuid != image.uuid) {
                    return Err(TeeResult::SecurityError);
                }
                image
            }
            TaImage::Requested(None) => {
                return match uuid {
                    Some(_) => Err(TeeResult::ItemNotFound),
                    None => Err(TeeResult::BadParameters),
                };
            }
        };
        let app = self.install(&image);
        Ok((image.uuid, app))
    }
}

impl TaManager for UserTaManager<'_> {
    type Session = TaSession;
    type Image = TaImageFile;

    fn open_session(
        &self,
        origin: &mut TeeOrigin,
        registry: &SessionRegistry<TaSession>,
        uuid: Option<&TeeUuid>,
        ta: TaImage<TaImageFile>,
        identity: &TeeIdentity,
        _timeout: TeeTimeout,
        params: &mut TeeParamSet,
    ) -> Result<SessionHandle, TeeResult> {
        let (uuid, app_name) = self.resolve(uuid, ta)?;
        let mut app = apps::instantiate(&app_name).ok_or(TeeResult::NotSupported)?;

        *origin = TeeOrigin::TrustedApp;
        app.open_session(identity, params)?;
        *origin = TeeOrigin::Tee;
        self.instances.fetch_add(1, Ordering::Relaxed);

        let session = TaSession {
            uuid,
            identity: *identity,
            app,
            cancel_requested: false,
            nw_user_map: None,
        };
        let handle = registry.insert(session).map_err(|mut refused| {
            self.close_instance(refused.app.as_mut());
            TeeResult::OutOfMemory
        })?;
        debug!(session = handle.as_raw(), ?uuid, app = %app_name, "session opened");
        Ok(handle)
    }

    fn close_session(
        &self,
        session: SessionHandle,
        registry: &SessionRegistry<TaSession>,
    ) -> Result<(), TeeResult> {
        let mut closed = registry.remove(session).ok_or(TeeResult::BadParameters)?;
        self.close_instance(closed.app.as_mut());
        debug!(session = session.as_raw(), uuid = ?closed.uuid, "session closed");
        Ok(())
    }

    fn invoke_command(
        &self,
        origin: &mut TeeOrigin,
        registry: &SessionRegistry<TaSession>,
        session: SessionHandle,
        _timeout: TeeTimeout,
        cmd: CommandId,
        params: &mut TeeParamSet,
    ) -> Result<(), TeeResult> {
        let res = registry
            .with_session_mut(session, |s| {
                let env = InvokeEnv {
                    shm: self.shm,
                    cancel_requested: core::mem::take(&mut s.cancel_requested),
                };
                s.app.invoke_command(&env, cmd, params)
            })
            .ok_or(TeeResult::BadParameters)?;
        *origin = TeeOrigin::TrustedApp;
        res
    }

    fn cancel_command(
        &self,
        _origin: &mut TeeOrigin,
        registry: &SessionRegistry<TaSession>,
        session: SessionHandle,
    ) -> Result<(), TeeResult> {
        registry
            .with_session_mut(session, |s| s.cancel_requested = true)
            .ok_or(TeeResult::BadParameters)
    }

    fn attach_nw_user_map(
        &self,
        registry: &SessionRegistry<TaSession>,
        session: SessionHandle,
        map: NwUserMap,
    ) -> Result<(), TeeResult> {
        registry
            .with_session_mut(session, |s| s.nw_user_map = Some(map))
            .ok_or(TeeResult::BadParameters)
    }
}
