//! Serial telemetry data source.
//!
//! This crate connects to a telemetry device over a serial port, configures
//! the link through a pluggable [`Configurator`], and turns every burst of
//! incoming bytes into a reading through a pluggable [`Decoder`]. Readings and
//! read failures are pushed to a single [`Subscriber`].
//!
//! # Layers
//!
//! - [`traits`]: the device layer seams (resolver, identifier, device, byte
//!   channel, listener) and the collaborator traits.
//! - [`source`]: [`SerialDataSource`], the orchestrator.
//! - [`mock`]: in-memory device layer and collaborators for tests and demos.
//! - `native`: real ports through the `serialport` crate (feature
//!   `hardware-serial`).
//! - [`channel`]: [`ChannelSubscriber`], which bridges notices into async
//!   code over a Tokio channel.

pub mod channel;
pub mod error;
pub mod mock;
#[cfg(feature = "hardware-serial")]
pub mod native;
pub mod source;
pub mod state;
pub mod traits;

pub use channel::{ChannelSubscriber, SourceEvent, SourceEvents};
pub use error::{
    ConfigureError, DeviceError, FailureKind, READ_ERROR_MESSAGE, Result, StartError,
};
pub use source::SerialDataSource;
pub use state::ConnectionState;
pub use traits::{
    ByteSource, CommPort, Configurator, DataListener, Decoder, DeviceResolver, LiveDataSource,
    PortIdentifier, SerialDevice, Subscriber,
};
