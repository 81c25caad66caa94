// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! TA loader serving images out of a directory, which plays the role of the normal-world
//! TA store

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use litebox_common_optee::{TeeOrigin, TeeResult, TeeUuid};
use litebox_optee_dispatch::{LoadedTa, NwUserMap, TaLoader};
use tracing::{info, warn};

use crate::ta_image::TaImageFile;

const PAGE_SIZE: u64 = 0x1000;
/// Where loaded TAs get mapped in TA address spaces
const TA_USER_BASE: usize = 0x4000_0000;

/// Loads `<dir>/<uuid>.ta`.
pub struct FsTaLoader {
    dir: PathBuf,
    // Physical address the next loaded image is placed at
    next_paddr: AtomicU64,
}

impl FsTaLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FsTaLoader {
            dir: dir.into(),
            next_paddr: AtomicU64::new(0x8000_0000),
        }
    }

    pub fn image_path(&self, uuid: &TeeUuid) -> PathBuf {
        self.dir.join(format!("{uuid:?}.ta"))
    }
}

impl TaLoader for FsTaLoader {
    type Image = TaImageFile;

    fn load_from_normal_world(
        &self,
        uuid: &TeeUuid,
        origin: &mut TeeOrigin,
    ) -> Result<LoadedTa<TaImageFile>, TeeResult> {
        let path = self.image_path(uuid);
        let bytes = std::fs::read(&path).map_err(|err| {
            *origin = TeeOrigin::Comms;
            warn!(path = %path.display(), %err, "cannot fetch TA image");
            match err.kind() {
                std::io::ErrorKind::NotFound => TeeResult::ItemNotFound,
                _ => TeeResult::CommunicationError,
            }
        })?;

        *origin = TeeOrigin::Tee;
        let image = TaImageFile::parse(&bytes).map_err(|err| {
            warn!(path = %path.display(), %err, "rejecting TA image");
            err.tee_result()
        })?;
        if image.uuid != *uuid {
            warn!(path = %path.display(), found = ?image.uuid, "TA image is for another TA");
            return Err(TeeResult::SecurityError);
        }

        let size = (bytes.len() as u64).next_multiple_of(PAGE_SIZE);
        let paddr = self.next_paddr.fetch_add(size, Ordering::Relaxed);
        let nw_user_map = NwUserMap {
            paddr,
            uaddr: TA_USER_BASE,
            size: usize::try_from(size).map_err(|_| TeeResult::OutOfMemory)?,
        };
        info!(?uuid, app = %image.app, paddr, "loaded TA from the normal world");
        Ok(LoadedTa { image, nw_user_map })
    }
}
