//! Mock device layer for testing and development.
//!
//! This module provides an in-memory serial port and mock collaborators that
//! can be controlled programmatically without requiring physical hardware.

pub mod collaborators;
pub mod port;

// Re-export commonly used types
pub use collaborators::{
    ConfigureCall, MockConfigurator, MockConfiguratorHandle, MockDecoder, MockDecoderHandle,
    RecordingSubscriber,
};
pub use port::{
    MockInput, MockOutput, MockPort, MockPortHandle, MockResolver, MockSerialDevice, OpenCall,
};
