use crate::{
    Result,
    constants::{
        DEFAULT_OPEN_TIMEOUT_MS, DEFAULT_OWNER_TAG, TELEMETRY_BAUD_RATE, TELEMETRY_DATA_BITS,
        TELEMETRY_PARITY, TELEMETRY_STOP_BITS,
    },
    error::Error,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Name of a serial device as the operating system knows it
/// (e.g. `/dev/ttyUSB0`, `COM3`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PortName(String);

impl PortName {
    /// Create a new port name.
    ///
    /// Surrounding whitespace is trimmed; the name is otherwise kept verbatim.
    ///
    /// # Errors
    /// Returns `Error::InvalidPortName` if the name is empty after trimming.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidPortName(name));
        }
        Ok(PortName(trimmed.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PortName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for PortName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        PortName::new(s)
    }
}

impl TryFrom<String> for PortName {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        PortName::new(value)
    }
}

impl From<PortName> for String {
    fn from(name: PortName) -> Self {
        name.0
    }
}

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

impl DataBits {
    #[must_use]
    pub fn as_u8(self) -> u8 {
        match self {
            DataBits::Five => 5,
            DataBits::Six => 6,
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        }
    }
}

impl TryFrom<u8> for DataBits {
    type Error = Error;

    fn try_from(bits: u8) -> Result<Self> {
        match bits {
            5 => Ok(DataBits::Five),
            6 => Ok(DataBits::Six),
            7 => Ok(DataBits::Seven),
            8 => Ok(DataBits::Eight),
            other => Err(Error::InvalidDataBits(other)),
        }
    }
}

impl From<DataBits> for u8 {
    fn from(bits: DataBits) -> Self {
        bits.as_u8()
    }
}

/// Number of stop bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum StopBits {
    One,
    Two,
}

impl StopBits {
    #[must_use]
    pub fn as_u8(self) -> u8 {
        match self {
            StopBits::One => 1,
            StopBits::Two => 2,
        }
    }
}

impl TryFrom<u8> for StopBits {
    type Error = Error;

    fn try_from(bits: u8) -> Result<Self> {
        match bits {
            1 => Ok(StopBits::One),
            2 => Ok(StopBits::Two),
            other => Err(Error::InvalidStopBits(other)),
        }
    }
}

impl From<StopBits> for u8 {
    fn from(bits: StopBits) -> Self {
        bits.as_u8()
    }
}

/// Parity checking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Odd,
    Even,
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let parity = match self {
            Parity::None => "none",
            Parity::Odd => "odd",
            Parity::Even => "even",
        };
        f.write_str(parity)
    }
}

impl std::str::FromStr for Parity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "n" => Ok(Parity::None),
            "odd" | "o" => Ok(Parity::Odd),
            "even" | "e" => Ok(Parity::Even),
            _ => Err(Error::InvalidParity(s.to_string())),
        }
    }
}

/// Serial line parameters applied to a freshly opened port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkParams {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
}

impl LinkParams {
    /// Parameters of the car's telemetry radio: 9600 baud, 8N2.
    pub const TELEMETRY: LinkParams = LinkParams {
        baud_rate: TELEMETRY_BAUD_RATE,
        data_bits: TELEMETRY_DATA_BITS,
        stop_bits: TELEMETRY_STOP_BITS,
        parity: TELEMETRY_PARITY,
    };
}

impl Default for LinkParams {
    fn default() -> Self {
        Self::TELEMETRY
    }
}

impl fmt::Display for LinkParams {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let parity = match self.parity {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
        };
        write!(
            f,
            "{} baud {}{}{}",
            self.baud_rate,
            self.data_bits.as_u8(),
            parity,
            self.stop_bits.as_u8()
        )
    }
}

/// Settings used by a serial data source when it connects.
///
/// # Examples
///
/// ```
/// use telemetry_core::{LinkParams, SourceConfig};
///
/// let config = SourceConfig::default();
/// assert_eq!(config.open_timeout_ms, 3000);
/// assert_eq!(config.link, LinkParams::TELEMETRY);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Tag recorded as the port owner while the source holds the device.
    pub owner_tag: String,

    /// Bounded wait for exclusive access when opening the port.
    pub open_timeout_ms: u64,

    /// Line parameters applied right after opening.
    pub link: LinkParams,
}

impl SourceConfig {
    #[must_use]
    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    /// Whether the link is the radio's fixed 9600 8N2 format.
    ///
    /// Other parameters are accepted for bench setups and other radios,
    /// but the car's transmitter only talks [`LinkParams::TELEMETRY`].
    #[must_use]
    pub fn uses_telemetry_link(&self) -> bool {
        self.link == LinkParams::TELEMETRY
    }

    /// Check the configuration for values the device layer cannot honour.
    ///
    /// # Errors
    /// Returns `Error::Config` for an empty owner tag, a zero open timeout or
    /// a zero baud rate.
    pub fn validate(&self) -> Result<()> {
        if self.owner_tag.trim().is_empty() {
            return Err(Error::Config("owner_tag must not be empty".to_string()));
        }
        if self.open_timeout_ms == 0 {
            return Err(Error::Config(
                "open_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.link.baud_rate == 0 {
            return Err(Error::Config(
                "link.baud_rate must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            owner_tag: DEFAULT_OWNER_TAG.to_string(),
            open_timeout_ms: DEFAULT_OPEN_TIMEOUT_MS,
            link: LinkParams::TELEMETRY,
        }
    }
}
