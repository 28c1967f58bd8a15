//! Shared fixtures for serial data source integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use telemetry_core::PortName;
use telemetry_serial::SerialDataSource;
use telemetry_serial::mock::{
    MockConfigurator, MockConfiguratorHandle, MockDecoder, MockDecoderHandle, MockPort,
    MockPortHandle, MockResolver, RecordingSubscriber,
};

/// Port name every fixture registers its mock port under.
pub const PORT: &str = "/dev/sample_port";

/// A source wired to a mock port, with every handle needed to script and
/// inspect it.
pub struct Rig {
    pub source: SerialDataSource<MockDecoder>,
    pub port: MockPortHandle,
    pub configurator: MockConfiguratorHandle,
    pub decoder: MockDecoderHandle,
    pub subscriber: Arc<RecordingSubscriber>,
}

impl Rig {
    /// Source with a resolvable port and a registered subscriber.
    pub fn new() -> Self {
        Self::build(true, true)
    }

    /// Source whose port name resolves to nothing.
    pub fn without_port() -> Self {
        Self::build(false, true)
    }

    /// Source with no subscriber registered.
    pub fn without_subscriber() -> Self {
        Self::build(true, false)
    }

    fn build(with_port: bool, with_subscriber: bool) -> Self {
        let (port, port_handle) = MockPort::with_name(PORT);
        let (configurator, configurator_handle) = MockConfigurator::new();
        let (decoder, decoder_handle) = MockDecoder::new();

        let resolver = if with_port {
            MockResolver::new().with_port(PORT, port)
        } else {
            MockResolver::new()
        };

        let source = SerialDataSource::new(
            PortName::new(PORT).unwrap(),
            resolver,
            configurator,
            decoder,
        );

        let subscriber = Arc::new(RecordingSubscriber::new());
        if with_subscriber {
            source.subscribe(subscriber.clone());
        }

        Self {
            source,
            port: port_handle,
            configurator: configurator_handle,
            decoder: decoder_handle,
            subscriber,
        }
    }

    /// Start the source, panicking if it fails.
    pub fn started() -> Self {
        let rig = Self::new();
        rig.source.start().unwrap();
        rig
    }
}
