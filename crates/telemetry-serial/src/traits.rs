//! Collaborator trait definitions.
//!
//! These traits are the seams between the serial data source and everything
//! it drives: the device layer (resolver, identifier, device, channels), the
//! link configurator, the decoder and the subscriber. The source only ever
//! talks to them through these traits, which is what lets the mock device
//! layer stand in for real hardware.
//!
//! The device layer is synchronous. Notifications arrive on a thread owned by
//! the device layer, so every trait the source keeps across that boundary is
//! `Send` (and `Sync` where it is shared).

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use telemetry_core::{LinkParams, PortName};

use crate::error::{ConfigureError, Result, StartError};

/// Turns a port name into an identifier for that port.
pub trait DeviceResolver: Send + Sync {
    /// Look up the port. Returns `None` if no such port exists.
    fn resolve(&self, name: &PortName) -> Option<Box<dyn PortIdentifier>>;
}

/// A resolved port that has not been opened yet.
pub trait PortIdentifier: Send {
    /// Port name as the device layer knows it.
    fn name(&self) -> &str;

    /// Whether some owner already holds this port.
    fn is_currently_owned(&self) -> bool;

    /// Open the port for `owner`, waiting at most `timeout` for exclusive
    /// access.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::PortInUse`](crate::DeviceError::PortInUse) if the port cannot be acquired.
    fn open(&self, owner: &str, timeout: Duration) -> Result<CommPort>;
}

/// Whatever an opened port turned out to be.
pub enum CommPort {
    /// A serial-capable device.
    Serial(Box<dyn SerialDevice>),

    /// Some other kind of communication port (parallel, raw, ...).
    Other { kind: String },
}

impl std::fmt::Debug for CommPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Serial(_) => f.write_str("CommPort::Serial"),
            Self::Other { kind } => write!(f, "CommPort::Other({kind})"),
        }
    }
}

/// An opened serial device, held exclusively by its owner.
pub trait SerialDevice: Send {
    /// Apply line parameters.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Unsupported`](crate::DeviceError::Unsupported) if the device rejects them.
    fn set_link_params(&mut self, params: LinkParams) -> Result<()>;

    /// Open the input byte channel.
    fn input_stream(&mut self) -> Result<Box<dyn ByteSource>>;

    /// Open the output byte channel.
    fn output_stream(&mut self) -> Result<Box<dyn Write + Send>>;

    /// Register the recipient of "data available" notifications.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::TooManyListeners`](crate::DeviceError::TooManyListeners) if a listener is already
    /// registered.
    fn add_event_listener(&mut self, listener: Arc<dyn DataListener>) -> Result<()>;

    /// Turn "data available" notifications on or off.
    fn notify_on_data_available(&mut self, enable: bool);

    /// Drop the registered listener, if any.
    fn remove_event_listener(&mut self);

    /// Release the device. Calling it more than once has no further effect.
    fn close(&mut self);
}

/// Input side of a serial device, read one byte at a time.
pub trait ByteSource: Send {
    /// Number of bytes that can be read without blocking.
    fn bytes_available(&mut self) -> io::Result<usize>;

    /// Read one byte. `Ok(None)` means end of data.
    fn read_byte(&mut self) -> io::Result<Option<u8>>;
}

/// Recipient of "data available" notifications from the device layer.
///
/// Called on the device layer's notification thread.
pub trait DataListener: Send + Sync {
    fn data_available(&self);
}

/// Protocol-level setup performed over freshly opened channels.
pub trait Configurator: Send {
    fn configure(
        &mut self,
        input: &mut dyn ByteSource,
        output: &mut dyn Write,
    ) -> std::result::Result<(), ConfigureError>;
}

/// Incremental decoder turning raw telemetry bytes into readings.
///
/// Each call receives the bytes that arrived since the previous call; any
/// partial record is the decoder's to keep until more bytes arrive.
pub trait Decoder: Send {
    type Reading: Send;

    fn push_data(&mut self, data: &[u8]) -> Self::Reading;
}

/// Single downstream consumer of a data source.
pub trait Subscriber<R>: Send + Sync {
    /// A decoded reading.
    fn receive_data(&self, reading: R);

    /// An error notice raised outside the caller's control flow.
    fn receive_error(&self, message: &str);
}

/// Consumer-facing contract shared by live telemetry sources.
pub trait LiveDataSource {
    type Reading;

    /// Register the subscriber, replacing any previous one.
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<Self::Reading>>);

    /// Forget the current subscriber.
    fn unsubscribe(&self);

    /// Connect and begin delivering readings.
    fn start(&self) -> std::result::Result<(), StartError>;

    /// Stop delivering readings and release the underlying device.
    fn stop(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comm_port_debug() {
        let port = CommPort::Other {
            kind: "parallel".to_string(),
        };
        assert_eq!(format!("{port:?}"), "CommPort::Other(parallel)");
    }
}
