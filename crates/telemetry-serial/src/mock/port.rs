//! Mock serial port for testing and development.
//!
//! A [`MockPort`] plays every device-layer role at once: it is the identifier
//! a [`MockResolver`] hands out, it opens into a serial device, and that
//! device hands out in-memory byte channels. All of them share one state
//! that a [`MockPortHandle`] can script and inspect.

use std::collections::{HashMap, VecDeque};
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use telemetry_core::{LinkParams, PortName};

use crate::error::{DeviceError, Result};
use crate::traits::{
    ByteSource, CommPort, DataListener, DeviceResolver, PortIdentifier, SerialDevice,
};

/// What opening the port produces.
#[derive(Debug, Clone, PartialEq, Eq)]
enum OpenBehavior {
    Serial,
    NotSerial(String),
    InUse,
}

/// One recorded call to [`PortIdentifier::open`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenCall {
    pub owner: String,
    pub timeout: Duration,
}

struct PortState {
    // Scripted behaviour
    owned: bool,
    open_behavior: OpenBehavior,
    reject_link_params: bool,
    fail_input_stream: bool,
    fail_output_stream: bool,
    listener_slot_taken: bool,
    fail_reads: bool,
    fail_writes: bool,

    // Recorded calls
    open_calls: Vec<OpenCall>,
    link_params: Vec<LinkParams>,
    listener_registrations: usize,
    notify_calls: Vec<bool>,
    read_calls: usize,
    close_calls: usize,

    // Live device state
    is_open: bool,
    listener: Option<Arc<dyn DataListener>>,
    notify_enabled: bool,
    input: VecDeque<Option<u8>>,
    written: Vec<u8>,
}

impl Default for PortState {
    fn default() -> Self {
        Self {
            owned: false,
            open_behavior: OpenBehavior::Serial,
            reject_link_params: false,
            fail_input_stream: false,
            fail_output_stream: false,
            listener_slot_taken: false,
            fail_reads: false,
            fail_writes: false,
            open_calls: Vec::new(),
            link_params: Vec::new(),
            listener_registrations: 0,
            notify_calls: Vec::new(),
            read_calls: 0,
            close_calls: 0,
            is_open: false,
            listener: None,
            notify_enabled: false,
            input: VecDeque::new(),
            written: Vec::new(),
        }
    }
}

type SharedState = Arc<Mutex<PortState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, PortState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock port identifier.
///
/// # Examples
///
/// ```
/// use telemetry_serial::mock::MockPort;
/// use telemetry_serial::traits::PortIdentifier;
///
/// let (port, handle) = MockPort::with_name("/dev/ttyUSB1");
/// handle.set_owned(true);
///
/// assert_eq!(port.name(), "/dev/ttyUSB1");
/// assert!(port.is_currently_owned());
/// ```
#[derive(Clone)]
pub struct MockPort {
    name: Arc<str>,
    state: SharedState,
}

impl MockPort {
    /// Create a new mock port with the default name.
    ///
    /// Returns the port and a handle that scripts and inspects it.
    pub fn new() -> (Self, MockPortHandle) {
        Self::with_name("/dev/mock_serial")
    }

    /// Create a new mock port with a custom name.
    pub fn with_name(name: impl Into<String>) -> (Self, MockPortHandle) {
        let name: Arc<str> = name.into().into();
        let state = Arc::new(Mutex::new(PortState::default()));

        let port = Self {
            name: name.clone(),
            state: state.clone(),
        };
        (port, MockPortHandle { name, state })
    }
}

impl std::fmt::Debug for MockPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockPort")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl PortIdentifier for MockPort {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_currently_owned(&self) -> bool {
        lock(&self.state).owned
    }

    fn open(&self, owner: &str, timeout: Duration) -> Result<CommPort> {
        let mut state = lock(&self.state);
        state.open_calls.push(OpenCall {
            owner: owner.to_string(),
            timeout,
        });

        match state.open_behavior.clone() {
            OpenBehavior::InUse => Err(DeviceError::port_in_use(&*self.name)),
            OpenBehavior::NotSerial(kind) => Ok(CommPort::Other { kind }),
            OpenBehavior::Serial => {
                state.is_open = true;
                state.owned = true;
                Ok(CommPort::Serial(Box::new(MockSerialDevice {
                    name: self.name.clone(),
                    state: self.state.clone(),
                })))
            }
        }
    }
}

/// Serial device produced by opening a [`MockPort`].
pub struct MockSerialDevice {
    name: Arc<str>,
    state: SharedState,
}

impl SerialDevice for MockSerialDevice {
    fn set_link_params(&mut self, params: LinkParams) -> Result<()> {
        let mut state = lock(&self.state);
        state.link_params.push(params);

        if state.reject_link_params {
            return Err(DeviceError::unsupported(format!("link parameters {params}")));
        }
        Ok(())
    }

    fn input_stream(&mut self) -> Result<Box<dyn ByteSource>> {
        if lock(&self.state).fail_input_stream {
            return Err(io::Error::other("input stream unavailable").into());
        }
        Ok(Box::new(MockInput {
            state: self.state.clone(),
        }))
    }

    fn output_stream(&mut self) -> Result<Box<dyn Write + Send>> {
        if lock(&self.state).fail_output_stream {
            return Err(io::Error::other("output stream unavailable").into());
        }
        Ok(Box::new(MockOutput {
            state: self.state.clone(),
        }))
    }

    fn add_event_listener(&mut self, listener: Arc<dyn DataListener>) -> Result<()> {
        let mut state = lock(&self.state);
        if state.listener_slot_taken || state.listener.is_some() {
            return Err(DeviceError::too_many_listeners(&*self.name));
        }

        state.listener_registrations += 1;
        state.listener = Some(listener);
        Ok(())
    }

    fn notify_on_data_available(&mut self, enable: bool) {
        let mut state = lock(&self.state);
        state.notify_calls.push(enable);
        state.notify_enabled = enable;
    }

    fn remove_event_listener(&mut self) {
        lock(&self.state).listener = None;
    }

    fn close(&mut self) {
        let mut state = lock(&self.state);
        state.close_calls += 1;
        state.is_open = false;
        state.owned = false;
    }
}

/// In-memory input channel fed through [`MockPortHandle::push_bytes`].
pub struct MockInput {
    state: SharedState,
}

impl ByteSource for MockInput {
    fn bytes_available(&mut self) -> io::Result<usize> {
        Ok(lock(&self.state).input.len())
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut state = lock(&self.state);
        state.read_calls += 1;

        if state.fail_reads {
            return Err(io::Error::other("read failed"));
        }
        Ok(state.input.pop_front().flatten())
    }
}

/// In-memory output channel; bytes are readable through
/// [`MockPortHandle::written`].
pub struct MockOutput {
    state: SharedState,
}

impl Write for MockOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = lock(&self.state);
        if state.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "write failed"));
        }
        state.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Handle for scripting and inspecting a mock port.
///
/// Clones share the same port.
///
/// # Examples
///
/// ```
/// use telemetry_serial::mock::MockPort;
///
/// let (_port, handle) = MockPort::new();
/// handle.push_bytes(b"42.5\n");
/// handle.push_end_of_data();
///
/// assert_eq!(handle.pending_input(), 6);
/// assert!(!handle.fire_data_available()); // nobody is listening yet
/// ```
#[derive(Clone)]
pub struct MockPortHandle {
    name: Arc<str>,
    state: SharedState,
}

impl std::fmt::Debug for MockPortHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockPortHandle")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl MockPortHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    // ------------------------------------------------------------------
    // Scripting
    // ------------------------------------------------------------------

    /// Mark the port as held (or not) by another owner.
    pub fn set_owned(&self, owned: bool) {
        lock(&self.state).owned = owned;
    }

    /// Make `open` fail as if another process grabbed the port.
    pub fn open_in_use(&self) {
        lock(&self.state).open_behavior = OpenBehavior::InUse;
    }

    /// Make `open` yield a port that is not a serial device.
    pub fn open_as_non_serial(&self, kind: impl Into<String>) {
        lock(&self.state).open_behavior = OpenBehavior::NotSerial(kind.into());
    }

    /// Make the device reject link parameters.
    pub fn reject_link_params(&self) {
        lock(&self.state).reject_link_params = true;
    }

    /// Make opening the input channel fail.
    pub fn fail_input_stream(&self) {
        lock(&self.state).fail_input_stream = true;
    }

    /// Make opening the output channel fail.
    pub fn fail_output_stream(&self) {
        lock(&self.state).fail_output_stream = true;
    }

    /// Pretend some other listener is already registered.
    pub fn occupy_listener_slot(&self) {
        lock(&self.state).listener_slot_taken = true;
    }

    /// Make every read on the input channel fail (or succeed again).
    pub fn fail_reads(&self, fail: bool) {
        lock(&self.state).fail_reads = fail;
    }

    /// Make every write on the output channel fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        lock(&self.state).fail_writes = fail;
    }

    // ------------------------------------------------------------------
    // Input and events
    // ------------------------------------------------------------------

    /// Queue bytes on the input channel.
    pub fn push_bytes(&self, bytes: &[u8]) {
        lock(&self.state)
            .input
            .extend(bytes.iter().copied().map(Some));
    }

    /// Queue an end-of-data marker; reading it yields `None`.
    pub fn push_end_of_data(&self) {
        lock(&self.state).input.push_back(None);
    }

    /// Deliver a "data available" notification to the registered listener.
    ///
    /// Returns `false` if no listener is registered or notifications are
    /// disabled. The listener runs on the calling thread.
    pub fn fire_data_available(&self) -> bool {
        let listener = {
            let state = lock(&self.state);
            if !state.notify_enabled {
                return false;
            }
            state.listener.clone()
        };

        match listener {
            Some(listener) => {
                listener.data_available();
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub fn open_calls(&self) -> Vec<OpenCall> {
        lock(&self.state).open_calls.clone()
    }

    pub fn link_params(&self) -> Vec<LinkParams> {
        lock(&self.state).link_params.clone()
    }

    pub fn listener_registrations(&self) -> usize {
        lock(&self.state).listener_registrations
    }

    pub fn has_listener(&self) -> bool {
        lock(&self.state).listener.is_some()
    }

    pub fn notifications_enabled(&self) -> bool {
        lock(&self.state).notify_enabled
    }

    /// Every value passed to `notify_on_data_available`, in order.
    pub fn notify_calls(&self) -> Vec<bool> {
        lock(&self.state).notify_calls.clone()
    }

    pub fn read_calls(&self) -> usize {
        lock(&self.state).read_calls
    }

    pub fn pending_input(&self) -> usize {
        lock(&self.state).input.len()
    }

    /// Everything written to the output channel so far.
    pub fn written(&self) -> Vec<u8> {
        lock(&self.state).written.clone()
    }

    pub fn close_calls(&self) -> usize {
        lock(&self.state).close_calls
    }

    pub fn is_open(&self) -> bool {
        lock(&self.state).is_open
    }

    pub fn is_owned(&self) -> bool {
        lock(&self.state).owned
    }
}

/// Resolver over a fixed set of mock ports.
///
/// # Examples
///
/// ```
/// use telemetry_core::PortName;
/// use telemetry_serial::mock::{MockPort, MockResolver};
/// use telemetry_serial::traits::DeviceResolver;
///
/// let (port, _handle) = MockPort::new();
/// let resolver = MockResolver::new().with_port("COM3", port);
///
/// assert!(resolver.resolve(&PortName::new("COM3").unwrap()).is_some());
/// assert!(resolver.resolve(&PortName::new("COM4").unwrap()).is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockResolver {
    ports: HashMap<String, MockPort>,
}

impl MockResolver {
    /// Create a resolver that knows no ports.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `port` resolvable under `name`.
    pub fn with_port(mut self, name: impl Into<String>, port: MockPort) -> Self {
        self.ports.insert(name.into(), port);
        self
    }
}

impl DeviceResolver for MockResolver {
    fn resolve(&self, name: &PortName) -> Option<Box<dyn PortIdentifier>> {
        self.ports
            .get(name.as_str())
            .map(|port| Box::new(port.clone()) as Box<dyn PortIdentifier>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_serial(port: &MockPort) -> Box<dyn SerialDevice> {
        match port.open("test", Duration::from_millis(10)).unwrap() {
            CommPort::Serial(device) => device,
            other => panic!("expected serial port, got {other:?}"),
        }
    }

    struct CountingListener(Mutex<usize>);

    impl DataListener for CountingListener {
        fn data_available(&self) {
            *self.0.lock().unwrap() += 1;
        }
    }

    #[test]
    fn test_open_records_owner_and_timeout() {
        let (port, handle) = MockPort::new();
        let _device = open_serial(&port);

        assert_eq!(
            handle.open_calls(),
            vec![OpenCall {
                owner: "test".to_string(),
                timeout: Duration::from_millis(10),
            }]
        );
        assert!(handle.is_open());
        assert!(handle.is_owned());
    }

    #[test]
    fn test_open_in_use() {
        let (port, handle) = MockPort::new();
        handle.open_in_use();

        let result = port.open("test", Duration::from_millis(10));
        assert!(matches!(result, Err(DeviceError::PortInUse { .. })));
        assert!(!handle.is_open());
    }

    #[test]
    fn test_open_as_non_serial() {
        let (port, handle) = MockPort::new();
        handle.open_as_non_serial("parallel");

        let result = port.open("test", Duration::from_millis(10)).unwrap();
        assert!(matches!(result, CommPort::Other { kind } if kind == "parallel"));
    }

    #[test]
    fn test_input_reads_queued_bytes_then_end_of_data() {
        let (port, handle) = MockPort::new();
        let mut device = open_serial(&port);
        let mut input = device.input_stream().unwrap();

        handle.push_bytes(&[1, 2]);
        handle.push_end_of_data();

        assert_eq!(input.bytes_available().unwrap(), 3);
        assert_eq!(input.read_byte().unwrap(), Some(1));
        assert_eq!(input.read_byte().unwrap(), Some(2));
        assert_eq!(input.read_byte().unwrap(), None);
        assert_eq!(input.bytes_available().unwrap(), 0);
        assert_eq!(handle.read_calls(), 3);
    }

    #[test]
    fn test_failing_reads() {
        let (port, handle) = MockPort::new();
        let mut device = open_serial(&port);
        let mut input = device.input_stream().unwrap();

        handle.push_bytes(&[1]);
        handle.fail_reads(true);
        assert!(input.read_byte().is_err());
        assert_eq!(handle.pending_input(), 1);
    }

    #[test]
    fn test_output_records_writes() {
        let (port, handle) = MockPort::new();
        let mut device = open_serial(&port);
        let mut output = device.output_stream().unwrap();

        output.write_all(b"AT\r").unwrap();
        assert_eq!(handle.written(), b"AT\r".to_vec());

        handle.fail_writes(true);
        assert!(output.write_all(b"x").is_err());
    }

    #[test]
    fn test_second_listener_is_rejected() {
        let (port, handle) = MockPort::new();
        let mut device = open_serial(&port);

        device
            .add_event_listener(Arc::new(CountingListener(Mutex::new(0))))
            .unwrap();
        let second = device.add_event_listener(Arc::new(CountingListener(Mutex::new(0))));

        assert!(matches!(second, Err(DeviceError::TooManyListeners { .. })));
        assert_eq!(handle.listener_registrations(), 1);
    }

    #[test]
    fn test_fire_requires_notifications_enabled() {
        let (port, handle) = MockPort::new();
        let mut device = open_serial(&port);
        let listener = Arc::new(CountingListener(Mutex::new(0)));
        device.add_event_listener(listener.clone()).unwrap();

        assert!(!handle.fire_data_available());

        device.notify_on_data_available(true);
        assert!(handle.fire_data_available());
        assert!(handle.fire_data_available());
        assert_eq!(*listener.0.lock().unwrap(), 2);

        device.notify_on_data_available(false);
        assert!(!handle.fire_data_available());
        assert_eq!(handle.notify_calls(), vec![true, false]);
    }

    #[test]
    fn test_close_releases_ownership() {
        let (port, handle) = MockPort::new();
        let mut device = open_serial(&port);

        device.close();

        assert_eq!(handle.close_calls(), 1);
        assert!(!handle.is_open());
        assert!(!port.is_currently_owned());
    }

    #[test]
    fn test_set_link_params_rejected() {
        let (port, handle) = MockPort::new();
        let mut device = open_serial(&port);
        handle.reject_link_params();

        let result = device.set_link_params(LinkParams::TELEMETRY);
        assert!(matches!(result, Err(DeviceError::Unsupported { .. })));
        assert_eq!(handle.link_params(), vec![LinkParams::TELEMETRY]);
    }
}
