// src/error.rs
//
// Structured error types for orbflux.
// Follows the same shape as io/error.rs's IoError: typed variants with
// device context, consistent Display formatting, and classification of
// raw std::io::Error into the right bucket.

use std::fmt;

/// Structured orbflux error with device/operation context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OrbError {
    /// Invalid flag combination or out-of-range configuration value.
    Config { details: String },

    /// Connection failure (TCP connect, serial open, USB claim).
    Connection { device: String, details: String },

    /// Operation timed out.
    Timeout { device: String, operation: String },

    /// Protocol-level error (malformed frame, invalid response).
    Protocol { device: String, details: String },

    /// Device not found (USB enumeration, serial port not present).
    DeviceNotFound { device: String },

    /// Device is busy or locked by another process.
    DeviceBusy { device: String },

    /// File source failed to open (exit code -4).
    FileOpen { path: String, details: String },

    /// Serial port setup failed, e.g. an unsupported baud/line configuration
    /// rejected at open time (exit code -3). Distinct from a device simply
    /// being absent, which is retried as `Connection`.
    SerialSetup { device: String, details: String },

    /// Read error during streaming.
    Read { device: String, details: String },

    /// Generic error for cases that don't fit other variants.
    Other { device: Option<String>, details: String },
}

impl OrbError {
    pub fn config(details: impl Into<String>) -> Self {
        Self::Config { details: details.into() }
    }

    pub fn connection(device: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Connection { device: device.into(), details: details.into() }
    }

    pub fn timeout(device: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Timeout { device: device.into(), operation: operation.into() }
    }

    pub fn protocol(device: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Protocol { device: device.into(), details: details.into() }
    }

    pub fn not_found(device: impl Into<String>) -> Self {
        Self::DeviceNotFound { device: device.into() }
    }

    pub fn busy(device: impl Into<String>) -> Self {
        Self::DeviceBusy { device: device.into() }
    }

    pub fn read(device: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Read { device: device.into(), details: details.into() }
    }

    pub fn other(device: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Other { device: Some(device.into()), details: details.into() }
    }

    pub fn other_no_device(details: impl Into<String>) -> Self {
        Self::Other { device: None, details: details.into() }
    }

    pub fn file_open(path: impl Into<String>, details: impl Into<String>) -> Self {
        Self::FileOpen { path: path.into(), details: details.into() }
    }

    pub fn serial_setup(device: impl Into<String>, details: impl Into<String>) -> Self {
        Self::SerialSetup { device: device.into(), details: details.into() }
    }

    /// Exit code for this error when it causes process termination
    /// (-1 option error, -3 serial setup error, -4 file open error).
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::SerialSetup { .. } => -3,
            Self::FileOpen { .. } => -4,
            _ => -1,
        }
    }

    /// Classify a raw std::io::Error into the right OrbError bucket.
    pub fn from_io_error(device: impl Into<String>, operation: &str, err: std::io::Error) -> Self {
        let device = device.into();
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                Self::Timeout { device, operation: operation.to_string() }
            }
            std::io::ErrorKind::NotFound => Self::DeviceNotFound { device },
            std::io::ErrorKind::PermissionDenied
            | std::io::ErrorKind::AddrInUse
            | std::io::ErrorKind::AlreadyExists => Self::DeviceBusy { device },
            std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::NotConnected => {
                Self::Connection { device, details: err.to_string() }
            }
            _ => Self::Other { device: Some(device), details: format!("{operation}: {err}") },
        }
    }
}

impl fmt::Display for OrbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { details } => write!(f, "configuration error: {details}"),
            Self::Connection { device, details } => {
                write!(f, "[{device}] connection failed: {details}")
            }
            Self::Timeout { device, operation } => write!(f, "[{device}] {operation} timed out"),
            Self::Protocol { device, details } => {
                write!(f, "[{device}] protocol error: {details}")
            }
            Self::DeviceNotFound { device } => write!(f, "[{device}] device not found"),
            Self::DeviceBusy { device } => write!(f, "[{device}] device is busy"),
            Self::FileOpen { path, details } => write!(f, "[{path}] failed to open file: {details}"),
            Self::SerialSetup { device, details } => {
                write!(f, "[{device}] serial setup failed: {details}")
            }
            Self::Read { device, details } => write!(f, "[{device}] read error: {details}"),
            Self::Other { device: Some(d), details } => write!(f, "[{d}] {details}"),
            Self::Other { device: None, details } => write!(f, "{details}"),
        }
    }
}

impl std::error::Error for OrbError {}

impl From<OrbError> for String {
    fn from(err: OrbError) -> String {
        err.to_string()
    }
}
