//! Error types for the iCEpick USB driver

use thiserror::Error;

/// Result type for iCEpick USB operations
pub type Result<T> = std::result::Result<T, IcepickError>;

/// Errors that can occur when talking to an iCEpick over USB
#[derive(Debug, Error)]
pub enum IcepickError {
    /// No matching device
    #[error("iCEpick not found (VID:1D50 PID:{0:04X})")]
    DeviceNotFound(u16),

    /// Several devices match and none was selected
    #[error("Multiple iCEpick devices found ({0}), specify serial number or index")]
    MultipleDevicesFound(usize),

    /// Failed to open device
    #[error("Failed to open iCEpick: {0}")]
    OpenFailed(String),

    /// Failed to claim interface
    #[error("Failed to claim interface: {0}")]
    ClaimFailed(String),

    /// USB transfer failed
    #[error("USB transfer failed: {0}")]
    TransferFailed(String),

    /// Device answered with something unexpected
    #[error("Invalid response from iCEpick: {0}")]
    InvalidResponse(String),

    /// Parameter parsing error
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Core library error
    #[error("Core error: {0}")]
    Core(#[from] icepick_core::Error),
}

impl From<nusb::Error> for IcepickError {
    fn from(e: nusb::Error) -> Self {
        IcepickError::TransferFailed(e.to_string())
    }
}

impl From<nusb::transfer::TransferError> for IcepickError {
    fn from(e: nusb::transfer::TransferError) -> Self {
        IcepickError::TransferFailed(e.to_string())
    }
}

impl From<IcepickError> for icepick_core::Error {
    fn from(e: IcepickError) -> Self {
        match e {
            IcepickError::Core(inner) => inner,
            other => icepick_core::Error::Probe(other.to_string()),
        }
    }
}
