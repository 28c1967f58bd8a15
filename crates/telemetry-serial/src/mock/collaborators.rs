//! Mock configurator, decoder and subscriber.
//!
//! Each mock records what it was asked to do. The configurator and decoder
//! come with a handle, in the same way as [`MockPort`](super::MockPort), so a
//! test can keep inspecting them after moving them into a data source.

use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::channel::SourceEvent;
use crate::error::ConfigureError;
use crate::traits::{ByteSource, Configurator, Decoder, Subscriber};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One recorded call to [`Configurator::configure`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigureCall {
    /// Bytes the input channel reported as available during the call.
    pub input_available: usize,
}

#[derive(Debug, Default)]
struct ConfiguratorState {
    calls: Vec<ConfigureCall>,
    handshake: Vec<u8>,
    failure: Option<String>,
}

/// Configurator that writes a scripted handshake and records its calls.
#[derive(Debug)]
pub struct MockConfigurator {
    state: Arc<Mutex<ConfiguratorState>>,
}

impl MockConfigurator {
    pub fn new() -> (Self, MockConfiguratorHandle) {
        let state = Arc::new(Mutex::new(ConfiguratorState::default()));
        (
            Self {
                state: state.clone(),
            },
            MockConfiguratorHandle { state },
        )
    }
}

impl Configurator for MockConfigurator {
    fn configure(
        &mut self,
        input: &mut dyn ByteSource,
        output: &mut dyn Write,
    ) -> Result<(), ConfigureError> {
        let mut state = lock(&self.state);

        let input_available = input
            .bytes_available()
            .map_err(|e| ConfigureError::io("input channel", e))?;
        state.calls.push(ConfigureCall { input_available });

        if let Some(message) = &state.failure {
            return Err(ConfigureError::new(message.clone()));
        }

        if !state.handshake.is_empty() {
            output
                .write_all(&state.handshake)
                .map_err(|e| ConfigureError::io("handshake write", e))?;
        }
        Ok(())
    }
}

/// Handle for scripting and inspecting a [`MockConfigurator`].
#[derive(Debug, Clone)]
pub struct MockConfiguratorHandle {
    state: Arc<Mutex<ConfiguratorState>>,
}

impl MockConfiguratorHandle {
    /// Bytes written to the output channel on every configure call.
    pub fn set_handshake(&self, bytes: &[u8]) {
        lock(&self.state).handshake = bytes.to_vec();
    }

    /// Make every configure call fail with `message`.
    pub fn fail_with(&self, message: impl Into<String>) {
        lock(&self.state).failure = Some(message.into());
    }

    pub fn calls(&self) -> Vec<ConfigureCall> {
        lock(&self.state).calls.clone()
    }
}

#[derive(Debug, Default)]
struct DecoderState {
    calls: Vec<Vec<u8>>,
    scripted: Option<Vec<u8>>,
}

/// Decoder whose reading is the raw bytes it was given, or a scripted value.
#[derive(Debug)]
pub struct MockDecoder {
    state: Arc<Mutex<DecoderState>>,
}

impl MockDecoder {
    pub fn new() -> (Self, MockDecoderHandle) {
        let state = Arc::new(Mutex::new(DecoderState::default()));
        (
            Self {
                state: state.clone(),
            },
            MockDecoderHandle { state },
        )
    }
}

impl Decoder for MockDecoder {
    type Reading = Vec<u8>;

    fn push_data(&mut self, data: &[u8]) -> Vec<u8> {
        let mut state = lock(&self.state);
        state.calls.push(data.to_vec());
        state.scripted.clone().unwrap_or_else(|| data.to_vec())
    }
}

/// Handle for scripting and inspecting a [`MockDecoder`].
#[derive(Debug, Clone)]
pub struct MockDecoderHandle {
    state: Arc<Mutex<DecoderState>>,
}

impl MockDecoderHandle {
    /// Return `reading` from every call instead of echoing the input.
    pub fn respond_with(&self, reading: Vec<u8>) {
        lock(&self.state).scripted = Some(reading);
    }

    /// Buffers passed to `push_data`, one entry per call.
    pub fn calls(&self) -> Vec<Vec<u8>> {
        lock(&self.state).calls.clone()
    }
}

/// Subscriber that records everything it receives.
///
/// # Examples
///
/// ```
/// use telemetry_serial::mock::RecordingSubscriber;
/// use telemetry_serial::traits::Subscriber;
///
/// let subscriber = RecordingSubscriber::new();
/// subscriber.receive_data(vec![1]);
/// subscriber.receive_error("oops");
///
/// assert_eq!(subscriber.data(), vec![vec![1]]);
/// assert_eq!(subscriber.errors(), vec!["oops".to_string()]);
/// assert_eq!(subscriber.events().len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct RecordingSubscriber {
    events: Mutex<Vec<SourceEvent<Vec<u8>>>>,
}

impl RecordingSubscriber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every notice received, in order.
    pub fn events(&self) -> Vec<SourceEvent<Vec<u8>>> {
        lock(&self.events).clone()
    }

    pub fn data(&self) -> Vec<Vec<u8>> {
        lock(&self.events)
            .iter()
            .filter_map(|event| match event {
                SourceEvent::Data(reading) => Some(reading.clone()),
                SourceEvent::Error(_) => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        lock(&self.events)
            .iter()
            .filter_map(|event| match event {
                SourceEvent::Error(message) => Some(message.clone()),
                SourceEvent::Data(_) => None,
            })
            .collect()
    }
}

impl Subscriber<Vec<u8>> for RecordingSubscriber {
    fn receive_data(&self, reading: Vec<u8>) {
        lock(&self.events).push(SourceEvent::Data(reading));
    }

    fn receive_error(&self, message: &str) {
        lock(&self.events).push(SourceEvent::Error(message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;

    struct QueueSource(VecDeque<u8>);

    impl ByteSource for QueueSource {
        fn bytes_available(&mut self) -> io::Result<usize> {
            Ok(self.0.len())
        }

        fn read_byte(&mut self) -> io::Result<Option<u8>> {
            Ok(self.0.pop_front())
        }
    }

    #[test]
    fn test_configurator_writes_handshake() {
        let (mut configurator, handle) = MockConfigurator::new();
        handle.set_handshake(b"+++");

        let mut input = QueueSource(VecDeque::from(vec![1, 2]));
        let mut output = Vec::new();
        configurator.configure(&mut input, &mut output).unwrap();

        assert_eq!(output, b"+++".to_vec());
        assert_eq!(handle.calls(), vec![ConfigureCall { input_available: 2 }]);
    }

    #[test]
    fn test_configurator_failure() {
        let (mut configurator, handle) = MockConfigurator::new();
        handle.fail_with("no answer");

        let mut input = QueueSource(VecDeque::new());
        let mut output = Vec::new();
        let error = configurator
            .configure(&mut input, &mut output)
            .unwrap_err();

        assert_eq!(error.message(), "no answer");
        assert!(output.is_empty());
        assert_eq!(handle.calls().len(), 1);
    }

    #[test]
    fn test_decoder_echoes_then_scripted() {
        let (mut decoder, handle) = MockDecoder::new();

        assert_eq!(decoder.push_data(&[1, 2]), vec![1, 2]);
        handle.respond_with(vec![42]);
        assert_eq!(decoder.push_data(&[3]), vec![42]);
        assert_eq!(handle.calls(), vec![vec![1, 2], vec![3]]);
    }
}
