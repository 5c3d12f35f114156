// SPDX-License-Identifier: MPL-2.0

//! Error types for the sensor bridge

use crate::ffi::{self, Hresult};
use std::fmt;

/// Result type alias using SensorError
pub type SensorResult<T> = Result<T, SensorError>;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Errors surfaced by the sensor contract layer
///
/// The native library offers no richer classification than a sentinel handle
/// and an HRESULT, so neither does this type. Nothing here is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// Opening the default sensor returned the invalid sentinel
    SensorUnavailable,
    /// A native call returned a failure status
    OperationFailed {
        /// Native entry point that failed
        operation: &'static str,
        /// Status returned by the native library
        hr: Hresult,
    },
}

impl SensorError {
    pub fn failed(operation: &'static str, hr: Hresult) -> Self {
        SensorError::OperationFailed { operation, hr }
    }

    /// Native status carried by this error, if any
    pub fn hresult(&self) -> Option<Hresult> {
        match self {
            SensorError::SensorUnavailable => None,
            SensorError::OperationFailed { hr, .. } => Some(*hr),
        }
    }

    /// True when the native library reported that no new frame is available yet
    pub fn is_pending(&self) -> bool {
        self.hresult() == Some(ffi::E_PENDING)
    }
}

/// Map a native status to a result, keeping the operation name for diagnostics
pub(crate) fn check(operation: &'static str, hr: Hresult) -> SensorResult<()> {
    if ffi::succeeded(hr) {
        Ok(())
    } else {
        Err(SensorError::failed(operation, hr))
    }
}

/// Symbolic name of a well-known HRESULT
pub fn hresult_name(hr: Hresult) -> Option<&'static str> {
    match hr {
        ffi::S_OK => Some("S_OK"),
        ffi::S_FALSE => Some("S_FALSE"),
        ffi::E_NOTIMPL => Some("E_NOTIMPL"),
        ffi::E_NOINTERFACE => Some("E_NOINTERFACE"),
        ffi::E_POINTER => Some("E_POINTER"),
        ffi::E_FAIL => Some("E_FAIL"),
        ffi::E_PENDING => Some("E_PENDING"),
        ffi::E_OUTOFMEMORY => Some("E_OUTOFMEMORY"),
        ffi::E_INVALIDARG => Some("E_INVALIDARG"),
        _ => None,
    }
}

/// Display adapter printing an HRESULT as `NAME (0xXXXXXXXX)`
pub struct DisplayHresult(pub Hresult);

impl fmt::Display for DisplayHresult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match hresult_name(self.0) {
            Some(name) => write!(f, "{} (0x{:08X})", name, self.0 as u32),
            None => write!(f, "0x{:08X}", self.0 as u32),
        }
    }
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorError::SensorUnavailable => write!(f, "No sensor available"),
            SensorError::OperationFailed { operation, hr } => {
                write!(f, "{} failed: {}", operation, DisplayHresult(*hr))
            }
        }
    }
}

impl std::error::Error for SensorError {}

/// Application error type for the configuration and command-line layers
#[derive(Debug)]
pub enum AppError {
    /// Sensor contract errors
    Sensor(SensorError),
    /// Configuration errors
    Config(String),
    /// Filesystem errors
    Io(std::io::Error),
    /// Generic error with message
    Other(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Sensor(e) => write!(f, "Sensor error: {}", e),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Io(e) => write!(f, "I/O error: {}", e),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Sensor(e) => Some(e),
            AppError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SensorError> for AppError {
    fn from(err: SensorError) -> Self {
        AppError::Sensor(err)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}
