// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! The on-disk format of TA images
//!
//! ```text
//! offset  size  field
//!      0     4  magic, "LBTA"
//!      4     2  format version (little endian)
//!      6     2  length of the app name (little endian)
//!      8    16  TA UUID (RFC 4122 byte order)
//!     24    32  SHA-256 over every other byte of the image
//!     56     n  app name (UTF-8)
//! ```
//!
//! The app name selects which built-in trusted app the image runs.

use litebox_common_optee::{TeeResult, TeeUuid};
use sha2::{Digest, Sha256};
use thiserror::Error;

const TA_IMAGE_MAGIC: [u8; 4] = *b"LBTA";
const TA_IMAGE_VERSION: u16 = 1;
const DIGEST_OFFSET: usize = 24;
const DIGEST_LEN: usize = 32;
const HEADER_LEN: usize = DIGEST_OFFSET + DIGEST_LEN;

/// A parsed and verified TA image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaImageFile {
    pub uuid: TeeUuid,
    pub app: String,
}

/// Possible errors from [`TaImageFile::parse`]
#[non_exhaustive]
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TaImageError {
    #[error("image is truncated")]
    Truncated,
    #[error("not a TA image")]
    BadMagic,
    #[error("unsupported image format version {0}")]
    UnsupportedVersion(u16),
    #[error("app name is not valid UTF-8")]
    BadAppName,
    #[error("image digest does not match its contents")]
    DigestMismatch,
}

impl TaImageError {
    /// The result an open request fails with when it runs into this error.
    pub fn tee_result(&self) -> TeeResult {
        match self {
            TaImageError::DigestMismatch => TeeResult::SecurityError,
            TaImageError::Truncated
            | TaImageError::BadMagic
            | TaImageError::UnsupportedVersion(_)
            | TaImageError::BadAppName => TeeResult::BadFormat,
        }
    }
}

fn digest(image: &[u8]) -> [u8; DIGEST_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(&image[..DIGEST_OFFSET]);
    hasher.update(&image[HEADER_LEN..]);
    hasher.finalize().into()
}

impl TaImageFile {
    pub fn new(uuid: TeeUuid, app: &str) -> Self {
        TaImageFile {
            uuid,
            app: app.to_string(),
        }
    }

    /// Serialize into a signed image.
    ///
    /// # Panics
    ///
    /// Panics if the app name is longer than `u16::MAX` bytes.
    pub fn build(&self) -> Vec<u8> {
        let name_len = u16::try_from(self.app.len()).unwrap();
        let mut image = Vec::with_capacity(HEADER_LEN + self.app.len());
        image.extend_from_slice(&TA_IMAGE_MAGIC);
        image.extend_from_slice(&TA_IMAGE_VERSION.to_le_bytes());
        image.extend_from_slice(&name_len.to_le_bytes());
        image.extend_from_slice(&self.uuid.to_bytes());
        image.extend_from_slice(&[0; DIGEST_LEN]);
        image.extend_from_slice(self.app.as_bytes());
        let digest = digest(&image);
        image[DIGEST_OFFSET..HEADER_LEN].copy_from_slice(&digest);
        image
    }

    /// Parse an image and verify its digest.
    pub fn parse(image: &[u8]) -> Result<Self, TaImageError> {
        if image.len() < HEADER_LEN {
            return Err(TaImageError::Truncated);
        }
        if image[..4] != TA_IMAGE_MAGIC {
            return Err(TaImageError::BadMagic);
        }
        let version = u16::from_le_bytes([image[4], image[5]]);
        if version != TA_IMAGE_VERSION {
            return Err(TaImageError::UnsupportedVersion(version));
        }
        let name_len = usize::from(u16::from_le_bytes([image[6], image[7]]));
        if image.len() != HEADER_LEN + name_len {
            return Err(TaImageError::Truncated);
        }
        if digest(image) != image[DIGEST_OFFSET..HEADER_LEN] {
            return Err(TaImageError::DigestMismatch);
        }
        let mut uuid = [0u8; 16];
        uuid.copy_from_slice(&image[8..DIGEST_OFFSET]);
        let app = core::str::from_utf8(&image[HEADER_LEN..]).map_err(|_| TaImageError::BadAppName)?;
        Ok(TaImageFile {
            uuid: TeeUuid::from_bytes(uuid),
            app: app.to_string(),
        })
    }
}
