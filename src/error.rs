//! Crate-wide error type.
//!
//! Decode-level problems ([`InputError::DecodeMalformed`]) are recovered inside
//! the decoders: the offending record is skipped and capture carries on.
//! Everything else is handed back to the caller as an explicit `Err`.

use crate::device::DeviceCategory;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by discovery, capture and the query layer.
#[derive(Debug, Error)]
pub enum InputError {
    /// The hardware was removed or its OS handle became invalid.
    ///
    /// Non-fatal: the device turns inactive and its reads stop blocking.
    #[error("device gone: {0}")]
    DeviceGone(String),

    /// A category query found nothing connected.
    #[error("no {0} found")]
    NoSuchDevice(DeviceCategory),

    /// A raw record did not fit the expected shape or is not in the code table.
    #[error("malformed record: {0}")]
    DecodeMalformed(String),

    /// The platform refused access to an input source.
    ///
    /// On Linux the user usually needs to be in the `input` group; on macOS the
    /// process needs the Input Monitoring permission.
    #[error("permission denied opening {}: the current user cannot read input events", path.display())]
    PermissionDenied { path: PathBuf },

    /// The device cannot do what was asked, e.g. vibrate a keyboard.
    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl InputError {
    /// `true` for errors that mean "this source will not produce anything more".
    pub fn is_gone(&self) -> bool {
        matches!(self, InputError::DeviceGone(_))
    }

    /// Map an open(2) failure on `path`, singling out permission problems.
    pub(crate) fn from_open(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            InputError::PermissionDenied { path: path.into() }
        } else {
            InputError::Io(err)
        }
    }
}

pub type Result<T, E = InputError> = std::result::Result<T, E>;
