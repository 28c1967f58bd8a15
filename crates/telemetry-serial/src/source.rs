//! Serial data source.
//!
//! [`SerialDataSource`] owns one serial connection from the moment it is
//! started until it is stopped or dropped. It drives the device layer through
//! a fixed sequence, and the first step that fails aborts the whole start:
//!
//! ```text
//! subscriber? ─► resolve ─► open (3000 ms) ─► link params ─► input ─► output
//!                                                                      │
//!        Configured ◄── configurator ◄── listen + notify on data ◄─────┘
//! ```
//!
//! Once running, the device layer calls back on its own notification thread.
//! Each callback drains every byte currently available, hands the whole burst
//! to the decoder in one call, and delivers exactly one notice to the
//! subscriber: the decoded reading, or [`READ_ERROR_MESSAGE`] if reading
//! failed. Callbacks that arrive before the configurator has finished are
//! skipped; their bytes stay buffered for the next callback.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use telemetry_core::PortName;
//! use telemetry_serial::mock::{
//!     MockConfigurator, MockDecoder, MockPort, MockResolver, RecordingSubscriber,
//! };
//! use telemetry_serial::{ConnectionState, SerialDataSource};
//!
//! let (port, handle) = MockPort::new();
//! let resolver = MockResolver::new().with_port("/dev/ttyUSB0", port);
//! let (configurator, _) = MockConfigurator::new();
//! let (decoder, _) = MockDecoder::new();
//!
//! let source = SerialDataSource::new(
//!     PortName::new("/dev/ttyUSB0").unwrap(),
//!     resolver,
//!     configurator,
//!     decoder,
//! );
//!
//! let subscriber = Arc::new(RecordingSubscriber::new());
//! source.subscribe(subscriber.clone());
//! source.start().unwrap();
//! assert_eq!(source.state(), ConnectionState::Configured);
//!
//! handle.push_bytes(&[1, 2, 3]);
//! handle.fire_data_available();
//! assert_eq!(subscriber.data(), vec![vec![1, 2, 3]]);
//! ```

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use telemetry_core::{LinkParams, PortName, SourceConfig};
use tracing::{debug, error, info, trace, warn};

use crate::error::{READ_ERROR_MESSAGE, StartError};
use crate::state::ConnectionState;
use crate::traits::{
    ByteSource, CommPort, Configurator, DataListener, Decoder, DeviceResolver, LiveDataSource,
    SerialDevice, Subscriber,
};

type SubscriberSlot<R> = Mutex<Option<Arc<dyn Subscriber<R>>>>;

/// Telemetry source reading from a single serial device.
///
/// All methods take `&self`; the source is `Send + Sync` and can be shared
/// with the thread that watches for shutdown.
pub struct SerialDataSource<D>
where
    D: Decoder + 'static,
{
    port_name: PortName,
    config: SourceConfig,
    resolver: Box<dyn DeviceResolver>,
    configurator: Mutex<Box<dyn Configurator>>,

    /// Open device, present from a successful start until stop.
    device: Mutex<Option<Box<dyn SerialDevice>>>,

    /// Output channel, held for as long as the device is open.
    output: Mutex<Option<Box<dyn Write + Send>>>,

    state: Mutex<ConnectionState>,

    /// State reachable from the device layer's notification thread.
    shared: Arc<Shared<D>>,
}

/// The part of the source the device layer calls into.
struct Shared<D>
where
    D: Decoder + 'static,
{
    port_name: PortName,
    subscriber: SubscriberSlot<D::Reading>,
    decoder: Mutex<D>,
    input: Mutex<Option<Box<dyn ByteSource>>>,

    /// Set while the start sequence owns the channels; notifications that
    /// arrive meanwhile are skipped.
    configuring: AtomicBool,
}

impl<D> SerialDataSource<D>
where
    D: Decoder + 'static,
{
    /// Create a source for `port_name` with the default configuration
    /// (3000 ms open timeout, 9600 baud 8N2).
    pub fn new(
        port_name: PortName,
        resolver: impl DeviceResolver + 'static,
        configurator: impl Configurator + 'static,
        decoder: D,
    ) -> Self {
        Self::with_config(
            port_name,
            SourceConfig::default(),
            resolver,
            configurator,
            decoder,
        )
    }

    /// Create a source with an explicit configuration.
    pub fn with_config(
        port_name: PortName,
        config: SourceConfig,
        resolver: impl DeviceResolver + 'static,
        configurator: impl Configurator + 'static,
        decoder: D,
    ) -> Self {
        debug!(port = %port_name, link = %config.link, "Creating serial data source");
        if !config.uses_telemetry_link() {
            warn!(
                port = %port_name,
                link = %config.link,
                expected = %LinkParams::TELEMETRY,
                "Link parameters differ from the telemetry radio format"
            );
        }

        Self {
            port_name: port_name.clone(),
            config,
            resolver: Box::new(resolver),
            configurator: Mutex::new(Box::new(configurator)),
            device: Mutex::new(None),
            output: Mutex::new(None),
            state: Mutex::new(ConnectionState::NotStarted),
            shared: Arc::new(Shared {
                port_name,
                subscriber: Mutex::new(None),
                decoder: Mutex::new(decoder),
                input: Mutex::new(None),
                configuring: AtomicBool::new(false),
            }),
        }
    }

    pub fn port_name(&self) -> &PortName {
        &self.port_name
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *lock(&self.state)
    }

    /// Whether the source completed its start sequence and has not stopped.
    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    /// Register the subscriber, replacing any previous one.
    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber<D::Reading>>) {
        *lock(&self.shared.subscriber) = Some(subscriber);
    }

    /// Forget the current subscriber.
    pub fn unsubscribe(&self) {
        lock(&self.shared.subscriber).take();
    }

    /// Connect to the device and start delivering readings.
    ///
    /// A source starts at most once. Every failure is final: the source is
    /// left in [`ConnectionState::Failed`] and anything acquired along the
    /// way is released. The one exception is a missing subscriber, which is
    /// checked before anything is touched and leaves the source untouched.
    ///
    /// # Errors
    ///
    /// Returns the [`StartError`] of the first step that failed.
    pub fn start(&self) -> Result<(), StartError> {
        {
            let mut state = lock(&self.state);
            if *state != ConnectionState::NotStarted {
                if state.is_terminal() {
                    warn!(port = %self.port_name, state = %*state, "Start requested on a finished source");
                } else {
                    warn!(port = %self.port_name, state = %*state, "Start requested twice");
                }
                return Err(StartError::AlreadyStarted);
            }
            if lock(&self.shared.subscriber).is_none() {
                error!(port = %self.port_name, "Start requested without a subscriber");
                return Err(StartError::NoSubscriber);
            }
            *state = ConnectionState::Resolving;
        }

        info!(port = %self.port_name, link = %self.config.link, "Starting serial data source");

        match self.connect() {
            Ok(()) => {
                self.transition(ConnectionState::Configured);
                info!(port = %self.port_name, "Serial connection configured");
                Ok(())
            }
            Err(e) => {
                error!(port = %self.port_name, reason = %e.kind(), error = %e, "Cannot start serial data source");
                self.transition(ConnectionState::Failed(e.kind()));
                Err(e)
            }
        }
    }

    /// Stop listening and release the device and its channels.
    ///
    /// Does nothing unless the source is running.
    pub fn stop(&self) {
        let Some(mut device) = lock(&self.device).take() else {
            debug!(port = %self.port_name, "Stop requested with no open device");
            return;
        };

        info!(port = %self.port_name, "Stopping serial data source");
        self.release(device.as_mut());
        self.transition(ConnectionState::Stopped);
    }

    /// Drain, decode and dispatch whatever the device has buffered.
    ///
    /// This is what the device layer's notification ends up calling; it is
    /// public so a caller can also poll the source by hand.
    pub fn on_data_available(&self) {
        self.shared.on_data_available();
    }

    fn connect(&self) -> Result<(), StartError> {
        debug!(port = %self.port_name, "Resolving serial port");
        let identifier = self
            .resolver
            .resolve(&self.port_name)
            .ok_or(StartError::PortNotFound)?;

        if identifier.is_currently_owned() {
            return Err(StartError::PortAlreadyOwned);
        }

        self.transition(ConnectionState::Opening);
        debug!(
            port = identifier.name(),
            owner = %self.config.owner_tag,
            timeout_ms = self.config.open_timeout_ms,
            "Opening serial port"
        );

        let mut device = match identifier
            .open(&self.config.owner_tag, self.config.open_timeout())
            .map_err(StartError::PortInUse)?
        {
            CommPort::Serial(device) => device,
            CommPort::Other { kind } => return Err(StartError::NotASerialPort { kind }),
        };

        if let Err(e) = self.bring_up(device.as_mut()) {
            self.release(device.as_mut());
            self.shared.configuring.store(false, Ordering::SeqCst);
            return Err(e);
        }

        *lock(&self.device) = Some(device);
        Ok(())
    }

    /// Everything between opening the device and handing it to the
    /// configurator. On error the caller releases the device and clears the
    /// `configuring` flag.
    fn bring_up(&self, device: &mut dyn SerialDevice) -> Result<(), StartError> {
        device
            .set_link_params(self.config.link)
            .map_err(StartError::UnsupportedOperation)?;

        let mut input = device
            .input_stream()
            .map_err(StartError::CannotOpenInputStream)?;
        let mut output = device
            .output_stream()
            .map_err(StartError::CannotOpenOutputStream)?;
        self.transition(ConnectionState::StreamsOpen);

        // Notifications can fire as soon as they are enabled, possibly on
        // this very thread. Until the configurator is done they are skipped
        // and the channels stay local, so no lock is held across the calls
        // below.
        self.shared.configuring.store(true, Ordering::SeqCst);

        let listener: Arc<dyn DataListener> = self.shared.clone();
        device
            .add_event_listener(listener)
            .map_err(StartError::CannotListen)?;
        device.notify_on_data_available(true);
        self.transition(ConnectionState::Listening);

        debug!(port = %self.port_name, "Configuring serial connection");
        lock(&self.configurator)
            .configure(input.as_mut(), output.as_mut())
            .map_err(StartError::CannotConfigure)?;

        *lock(&self.shared.input) = Some(input);
        *lock(&self.output) = Some(output);
        self.shared.configuring.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn release(&self, device: &mut dyn SerialDevice) {
        device.notify_on_data_available(false);
        device.remove_event_listener();
        device.close();

        lock(&self.shared.input).take();
        if let Some(mut output) = lock(&self.output).take()
            && let Err(e) = output.flush()
        {
            debug!(port = %self.port_name, error = %e, "Output channel flush failed on release");
        }
    }

    fn transition(&self, next: ConnectionState) {
        let mut state = lock(&self.state);
        debug_assert!(
            state.can_transition_to(&next),
            "invalid connection state transition {} -> {}",
            *state,
            next
        );
        trace!(port = %self.port_name, from = %*state, to = %next, "Connection state change");
        *state = next;
    }
}

impl<D> Drop for SerialDataSource<D>
where
    D: Decoder + 'static,
{
    fn drop(&mut self) {
        self.stop();
    }
}

impl<D> LiveDataSource for SerialDataSource<D>
where
    D: Decoder + 'static,
{
    type Reading = D::Reading;

    fn subscribe(&self, subscriber: Arc<dyn Subscriber<Self::Reading>>) {
        SerialDataSource::subscribe(self, subscriber);
    }

    fn unsubscribe(&self) {
        SerialDataSource::unsubscribe(self);
    }

    fn start(&self) -> Result<(), StartError> {
        SerialDataSource::start(self)
    }

    fn stop(&self) {
        SerialDataSource::stop(self);
    }
}

impl<D> Shared<D>
where
    D: Decoder + 'static,
{
    fn on_data_available(&self) {
        if self.configuring.load(Ordering::SeqCst) {
            debug!(port = %self.port_name, "Notification during start skipped");
            return;
        }

        let drained = self.drain();

        match drained {
            Ok(buffer) => {
                trace!(port = %self.port_name, bytes = buffer.len(), "Drained input channel");
                let reading = lock(&self.decoder).push_data(&buffer);

                match self.current_subscriber() {
                    Some(subscriber) => subscriber.receive_data(reading),
                    None => warn!(port = %self.port_name, "Reading dropped: no subscriber"),
                }
            }
            Err(e) => {
                warn!(port = %self.port_name, error = %e, "Cannot read from input stream");

                match self.current_subscriber() {
                    Some(subscriber) => subscriber.receive_error(READ_ERROR_MESSAGE),
                    None => warn!(port = %self.port_name, "Read error dropped: no subscriber"),
                }
            }
        }
    }

    /// Read every byte currently available, one at a time.
    fn drain(&self) -> io::Result<Vec<u8>> {
        let mut slot = lock(&self.input);
        let input = slot.as_mut().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, "input channel is not open")
        })?;

        let mut buffer = Vec::new();
        while input.bytes_available()? > 0 {
            match input.read_byte()? {
                Some(byte) => buffer.push(byte),
                None => break,
            }
        }
        Ok(buffer)
    }

    /// Clone the subscriber out of its slot so no lock is held while it runs.
    fn current_subscriber(&self) -> Option<Arc<dyn Subscriber<D::Reading>>> {
        lock(&self.subscriber).clone()
    }
}

impl<D> DataListener for Shared<D>
where
    D: Decoder + 'static,
{
    fn data_available(&self) {
        self.on_data_available();
    }
}

/// Lock a mutex, recovering the data if a subscriber panicked while it was held.
fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
