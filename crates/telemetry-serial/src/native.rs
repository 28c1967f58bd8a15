//! Device layer backed by the `serialport` crate.
//!
//! `serialport` has no event callbacks, so [`NativeSerialDevice`] runs one
//! notification thread per device that polls `bytes_to_read()` and calls the
//! registered listener whenever bytes are waiting.
//!
//! Port ownership is tracked per process: a port opened through
//! [`NativeIdentifier::open`] is recorded with its owner tag until the device
//! is closed or dropped, and [`NativeIdentifier::is_currently_owned`] reports
//! it. The operating system's exclusive open still guards against other
//! processes.
//!
//! # Examples
//!
//! ```no_run
//! use telemetry_core::PortName;
//! use telemetry_serial::native::NativeResolver;
//! use telemetry_serial::traits::DeviceResolver;
//!
//! let resolver = NativeResolver::new();
//! for port in NativeResolver::available_ports() {
//!     println!("{port}");
//! }
//! let identifier = resolver.resolve(&PortName::new("/dev/ttyUSB0").unwrap());
//! ```

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serialport::SerialPort;
use telemetry_core::constants::DEFAULT_POLL_INTERVAL_MS;
use telemetry_core::{DataBits, LinkParams, Parity, PortName, StopBits};
use tracing::{debug, info, trace, warn};

use crate::error::{DeviceError, Result};
use crate::traits::{
    ByteSource, CommPort, DataListener, DeviceResolver, PortIdentifier, SerialDevice,
};

/// Port name → owner tag, for every port this process holds.
static OWNERS: LazyLock<Mutex<HashMap<String, String>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn owners() -> MutexGuard<'static, HashMap<String, String>> {
    lock(&OWNERS)
}

/// Resolver for the serial ports of this machine.
#[derive(Debug, Clone)]
pub struct NativeResolver {
    poll_interval: Duration,
}

impl Default for NativeResolver {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

impl NativeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// How often opened devices check for incoming bytes.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Names of the serial ports the operating system reports.
    ///
    /// Enumeration failures are logged and yield an empty list.
    pub fn available_ports() -> Vec<String> {
        match serialport::available_ports() {
            Ok(ports) => ports.into_iter().map(|info| info.port_name).collect(),
            Err(e) => {
                warn!(error = %e, "Serial port enumeration failed");
                Vec::new()
            }
        }
    }
}

impl DeviceResolver for NativeResolver {
    fn resolve(&self, name: &PortName) -> Option<Box<dyn PortIdentifier>> {
        let name = name.as_str();

        // Pseudo terminals and some USB adapters are not enumerated but can
        // still be opened by path.
        let known = Self::available_ports().iter().any(|port| port == name)
            || Path::new(name).exists();
        if !known {
            debug!(port = name, "Serial port not found");
            return None;
        }

        Some(Box::new(NativeIdentifier {
            name: name.to_string(),
            poll_interval: self.poll_interval,
        }))
    }
}

/// A serial port of this machine that has not been opened yet.
#[derive(Debug, Clone)]
pub struct NativeIdentifier {
    name: String,
    poll_interval: Duration,
}

impl PortIdentifier for NativeIdentifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_currently_owned(&self) -> bool {
        owners().contains_key(&self.name)
    }

    fn open(&self, owner: &str, timeout: Duration) -> Result<CommPort> {
        let deadline = Instant::now() + timeout;

        // The operating system refuses a second exclusive open right away;
        // keep trying until the other owner lets go or time runs out.
        let port = loop {
            match serialport::new(&self.name, LinkParams::TELEMETRY.baud_rate)
                .timeout(self.poll_interval)
                .open()
            {
                Ok(port) => break port,
                Err(e) if !is_busy(&e) => {
                    warn!(port = %self.name, error = %e, "Cannot open serial port");
                    return Err(io::Error::from(e).into());
                }
                Err(e) if Instant::now() >= deadline => {
                    warn!(port = %self.name, error = %e, "Cannot acquire serial port");
                    return Err(DeviceError::port_in_use(&self.name));
                }
                Err(e) => {
                    trace!(port = %self.name, error = %e, "Serial port busy, retrying");
                    thread::sleep(self.poll_interval);
                }
            }
        };

        {
            let mut owners = owners();
            if let Some(current) = owners.get(&self.name) {
                warn!(port = %self.name, owner = %current, "Serial port claimed concurrently");
                return Err(DeviceError::port_in_use(&self.name));
            }
            owners.insert(self.name.clone(), owner.to_string());
        }

        info!(port = %self.name, owner, "Serial port opened");
        Ok(CommPort::Serial(Box::new(NativeSerialDevice {
            name: self.name.clone(),
            port,
            poll_interval: self.poll_interval,
            notifier: Arc::new(Notifier::default()),
            poll_thread: None,
            closed: false,
        })))
    }
}

/// State shared between a device and its notification thread.
#[derive(Default)]
struct Notifier {
    enabled: AtomicBool,
    shutdown: AtomicBool,
    listener: Mutex<Option<Arc<dyn DataListener>>>,
}

/// An opened serial port of this machine.
pub struct NativeSerialDevice {
    name: String,
    port: Box<dyn SerialPort>,
    poll_interval: Duration,
    notifier: Arc<Notifier>,
    poll_thread: Option<JoinHandle<()>>,
    closed: bool,
}

impl NativeSerialDevice {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(DeviceError::disconnected(&self.name));
        }
        Ok(())
    }

    fn spawn_poll_thread(&mut self) -> Result<()> {
        let probe = self.port.try_clone().map_err(io::Error::from)?;
        let notifier = self.notifier.clone();
        let poll_interval = self.poll_interval;
        let name = self.name.clone();

        let handle = thread::Builder::new()
            .name(format!("serial-notify:{}", self.name))
            .spawn(move || poll_loop(&name, probe.as_ref(), &notifier, poll_interval))?;

        self.poll_thread = Some(handle);
        Ok(())
    }

    fn stop_poll_thread(&mut self) {
        self.notifier.enabled.store(false, Ordering::SeqCst);
        self.notifier.shutdown.store(true, Ordering::SeqCst);

        if let Some(handle) = self.poll_thread.take() {
            // Closing from inside a notification must not join itself.
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                warn!(port = %self.name, "Notification thread panicked");
            }
        }
    }
}

fn poll_loop(name: &str, probe: &dyn SerialPort, notifier: &Notifier, poll_interval: Duration) {
    debug!(port = name, "Notification thread started");

    while !notifier.shutdown.load(Ordering::SeqCst) {
        if notifier.enabled.load(Ordering::SeqCst) {
            let listener = lock(&notifier.listener).clone();

            if let Some(listener) = listener {
                match probe.bytes_to_read() {
                    Ok(0) => {}
                    Ok(pending) => {
                        trace!(port = name, pending, "Data available");
                        listener.data_available();
                    }
                    Err(e) => {
                        // Let the listener run into the error on its own read
                        // so it reaches the subscriber, then stop polling.
                        warn!(port = name, error = %e, "Serial port stopped responding");
                        listener.data_available();
                        break;
                    }
                }
            }
        }
        thread::sleep(poll_interval);
    }

    debug!(port = name, "Notification thread stopped");
}

impl SerialDevice for NativeSerialDevice {
    fn set_link_params(&mut self, params: LinkParams) -> Result<()> {
        let unsupported = |e: serialport::Error| {
            DeviceError::unsupported(format!("{params} on {}: {e}", self.name))
        };

        self.port.set_baud_rate(params.baud_rate).map_err(unsupported)?;
        self.port
            .set_data_bits(data_bits(params.data_bits))
            .map_err(unsupported)?;
        self.port
            .set_stop_bits(stop_bits(params.stop_bits))
            .map_err(unsupported)?;
        self.port
            .set_parity(parity(params.parity))
            .map_err(unsupported)?;

        debug!(port = %self.name, link = %params, "Link parameters applied");
        Ok(())
    }

    fn input_stream(&mut self) -> Result<Box<dyn ByteSource>> {
        self.ensure_open()?;
        let port = self.port.try_clone().map_err(io::Error::from)?;
        Ok(Box::new(NativeInput { port }))
    }

    fn output_stream(&mut self) -> Result<Box<dyn Write + Send>> {
        self.ensure_open()?;
        let port = self.port.try_clone().map_err(io::Error::from)?;
        Ok(Box::new(port))
    }

    fn add_event_listener(&mut self, listener: Arc<dyn DataListener>) -> Result<()> {
        self.ensure_open()?;
        {
            let mut slot = lock(&self.notifier.listener);
            if slot.is_some() {
                return Err(DeviceError::too_many_listeners(&self.name));
            }
            *slot = Some(listener);
        }

        if self.poll_thread.is_none()
            && let Err(e) = self.spawn_poll_thread()
        {
            lock(&self.notifier.listener).take();
            return Err(e);
        }
        Ok(())
    }

    fn notify_on_data_available(&mut self, enable: bool) {
        self.notifier.enabled.store(enable, Ordering::SeqCst);
    }

    fn remove_event_listener(&mut self) {
        lock(&self.notifier.listener).take();
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        self.stop_poll_thread();
        lock(&self.notifier.listener).take();
        owners().remove(&self.name);

        info!(port = %self.name, "Serial port closed");
    }
}

impl Drop for NativeSerialDevice {
    fn drop(&mut self) {
        self.close();
    }
}

/// Input channel over a cloned port handle.
struct NativeInput {
    port: Box<dyn SerialPort>,
}

impl ByteSource for NativeInput {
    fn bytes_available(&mut self) -> io::Result<usize> {
        Ok(self.port.bytes_to_read()? as usize)
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut byte = [0u8; 1];
        loop {
            match self.port.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => return Ok(None),
                Err(e) => return Err(e),
            }
        }
    }
}

/// Whether an open failure can clear up once another owner lets go.
///
/// On POSIX `EBUSY` surfaces as `ErrorKind::Unknown`.
fn is_busy(error: &serialport::Error) -> bool {
    use serialport::ErrorKind;

    matches!(
        error.kind(),
        ErrorKind::Unknown
            | ErrorKind::Io(
                io::ErrorKind::ResourceBusy
                    | io::ErrorKind::WouldBlock
                    | io::ErrorKind::Interrupted
                    | io::ErrorKind::TimedOut
            )
    )
}

fn data_bits(bits: DataBits) -> serialport::DataBits {
    match bits {
        DataBits::Five => serialport::DataBits::Five,
        DataBits::Six => serialport::DataBits::Six,
        DataBits::Seven => serialport::DataBits::Seven,
        DataBits::Eight => serialport::DataBits::Eight,
    }
}

fn stop_bits(bits: StopBits) -> serialport::StopBits {
    match bits {
        StopBits::One => serialport::StopBits::One,
        StopBits::Two => serialport::StopBits::Two,
    }
}

fn parity(parity: Parity) -> serialport::Parity {
    match parity {
        Parity::None => serialport::Parity::None,
        Parity::Odd => serialport::Parity::Odd,
        Parity::Even => serialport::Parity::Even,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_link_params_map_to_serialport() {
        let link = LinkParams::TELEMETRY;
        assert_eq!(data_bits(link.data_bits), serialport::DataBits::Eight);
        assert_eq!(stop_bits(link.stop_bits), serialport::StopBits::Two);
        assert_eq!(parity(link.parity), serialport::Parity::None);
    }

    #[test]
    fn test_resolve_unknown_port() {
        let resolver = NativeResolver::new();
        let name = PortName::new("/definitely/not/a/serial/port").unwrap();
        assert!(resolver.resolve(&name).is_none());
    }

    #[test]
    fn test_ownership_registry() {
        let identifier = NativeIdentifier {
            name: "/test/registry-port".to_string(),
            poll_interval: Duration::from_millis(1),
        };
        assert!(!identifier.is_currently_owned());

        owners().insert(identifier.name.clone(), "test".to_string());
        assert!(identifier.is_currently_owned());

        owners().remove(&identifier.name);
        assert!(!identifier.is_currently_owned());
    }

    #[test]
    fn test_open_missing_port_fails_without_waiting() {
        let identifier = NativeIdentifier {
            name: "/definitely/not/a/serial/port".to_string(),
            poll_interval: Duration::from_millis(1),
        };

        let started = Instant::now();
        let result = identifier.open("test", Duration::from_secs(30));

        assert!(matches!(result, Err(DeviceError::Io(_))));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!identifier.is_currently_owned());
    }

    #[rstest]
    #[case(serialport::ErrorKind::Unknown, true)]
    #[case(serialport::ErrorKind::Io(io::ErrorKind::ResourceBusy), true)]
    #[case(serialport::ErrorKind::Io(io::ErrorKind::WouldBlock), true)]
    #[case(serialport::ErrorKind::Io(io::ErrorKind::PermissionDenied), false)]
    #[case(serialport::ErrorKind::Io(io::ErrorKind::NotFound), false)]
    #[case(serialport::ErrorKind::NoDevice, false)]
    #[case(serialport::ErrorKind::InvalidInput, false)]
    fn test_only_busy_errors_are_retried(
        #[case] kind: serialport::ErrorKind,
        #[case] expected: bool,
    ) {
        assert_eq!(is_busy(&serialport::Error::new(kind, "open failed")), expected);
    }
}
