//! Error types for the serial data source.
//!
//! Three layers of failure are kept apart:
//!
//! - [`DeviceError`]: what the device layer reports (port in use, unsupported
//!   parameters, listener already registered, I/O).
//! - [`ConfigureError`]: what a link configurator reports.
//! - [`StartError`]: the single "cannot start" failure returned by
//!   [`SerialDataSource::start`](crate::SerialDataSource::start). Its messages
//!   are fixed strings that existing callers match on.
//!
//! Failures while reading after the source is running never surface as an
//! error value; they reach the subscriber as [`READ_ERROR_MESSAGE`].

use std::fmt;

/// Message delivered to the subscriber when the input channel cannot be read.
pub const READ_ERROR_MESSAGE: &str = "Cannot read from input stream.";

/// Result type alias for device layer operations.
pub type Result<T> = std::result::Result<T, DeviceError>;

/// Errors reported by the device layer.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// The port is held by another owner.
    #[error("Port in use: {port}")]
    PortInUse { port: String },

    /// The device rejected an operation.
    #[error("Unsupported operation: {operation}")]
    Unsupported { operation: String },

    /// A data listener is already registered with the device.
    #[error("Too many listeners registered on {port}")]
    TooManyListeners { port: String },

    /// Device is not connected or has been closed.
    #[error("Device disconnected: {device}")]
    Disconnected { device: String },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeviceError {
    /// Create a new port in use error.
    pub fn port_in_use(port: impl Into<String>) -> Self {
        Self::PortInUse { port: port.into() }
    }

    /// Create a new unsupported operation error.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Create a new too many listeners error.
    pub fn too_many_listeners(port: impl Into<String>) -> Self {
        Self::TooManyListeners { port: port.into() }
    }

    /// Create a new disconnected error.
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }
}

/// Failure reported by a link configurator.
#[derive(Debug, thiserror::Error)]
#[error("Configuration failed: {message}")]
pub struct ConfigureError {
    message: String,
    #[source]
    source: Option<std::io::Error>,
}

impl ConfigureError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Configuration failed because the channels could not be used.
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self {
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Why a serial data source could not start.
///
/// The `Display` text of every variant is part of the public contract and
/// never includes the wrapped cause; use [`std::error::Error::source`] to get
/// at the device layer's own error.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StartError {
    #[error("You must subscribe before you start.")]
    NoSubscriber,

    #[error("Serial port does not exist.")]
    PortNotFound,

    #[error("Serial port already in use.")]
    PortAlreadyOwned,

    #[error("Serial port already in use.")]
    PortInUse(#[source] DeviceError),

    #[error("Given port is not a serial port.")]
    NotASerialPort { kind: String },

    #[error("Serial port operation not supported.")]
    UnsupportedOperation(#[source] DeviceError),

    #[error("Cannot open input stream.")]
    CannotOpenInputStream(#[source] DeviceError),

    #[error("Cannot open output stream.")]
    CannotOpenOutputStream(#[source] DeviceError),

    #[error("Cannot listen to serial port.")]
    CannotListen(#[source] DeviceError),

    #[error("Cannot configure serial connection.")]
    CannotConfigure(#[source] ConfigureError),

    /// `start()` was called on a source that already left `NotStarted`.
    #[error("Serial connection already started.")]
    AlreadyStarted,
}

impl StartError {
    /// The failure reason without any wrapped cause.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::NoSubscriber => FailureKind::NoSubscriber,
            Self::PortNotFound => FailureKind::PortNotFound,
            Self::PortAlreadyOwned => FailureKind::PortAlreadyOwned,
            Self::PortInUse(_) => FailureKind::PortInUse,
            Self::NotASerialPort { .. } => FailureKind::NotASerialPort,
            Self::UnsupportedOperation(_) => FailureKind::UnsupportedOperation,
            Self::CannotOpenInputStream(_) => FailureKind::CannotOpenInputStream,
            Self::CannotOpenOutputStream(_) => FailureKind::CannotOpenOutputStream,
            Self::CannotListen(_) => FailureKind::CannotListen,
            Self::CannotConfigure(_) => FailureKind::CannotConfigure,
            Self::AlreadyStarted => FailureKind::AlreadyStarted,
        }
    }
}

/// Reason a start attempt failed, as recorded in
/// [`ConnectionState::Failed`](crate::ConnectionState::Failed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    NoSubscriber,
    PortNotFound,
    PortAlreadyOwned,
    PortInUse,
    NotASerialPort,
    UnsupportedOperation,
    CannotOpenInputStream,
    CannotOpenOutputStream,
    CannotListen,
    CannotConfigure,
    AlreadyStarted,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
