//! Link-level constants for the telemetry serial connection.
//!
//! The telemetry radio on the car talks a fixed serial format. These values
//! are what the receiving side has always used; changing any of them breaks
//! the link with the transmitter.
//!
//! ```text
//! 9600 baud, 8 data bits, no parity, 2 stop bits (8N2)
//! ```
//!
//! # Usage
//!
//! ```
//! use telemetry_core::constants::*;
//! use std::time::Duration;
//!
//! assert_eq!(TELEMETRY_BAUD_RATE, 9600);
//! let timeout = Duration::from_millis(DEFAULT_OPEN_TIMEOUT_MS);
//! assert_eq!(timeout.as_secs(), 3);
//! ```

use crate::types::{DataBits, Parity, StopBits};

// ============================================================================
// Link Parameters
// ============================================================================

/// Baud rate of the telemetry link in bits per second.
pub const TELEMETRY_BAUD_RATE: u32 = 9600;

/// Data bits per character on the telemetry link.
pub const TELEMETRY_DATA_BITS: DataBits = DataBits::Eight;

/// Stop bits per character on the telemetry link.
pub const TELEMETRY_STOP_BITS: StopBits = StopBits::Two;

/// Parity of the telemetry link.
pub const TELEMETRY_PARITY: Parity = Parity::None;

// ============================================================================
// Timeouts
// ============================================================================

/// How long to wait for exclusive access when opening the port (milliseconds).
///
/// The device layer gives up after this long if another owner holds the port
/// and reports the port as in use.
pub const DEFAULT_OPEN_TIMEOUT_MS: u64 = 3000;

/// Interval between availability checks in the native notification thread
/// (milliseconds).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10;

// ============================================================================
// Ownership
// ============================================================================

/// Owner tag recorded against a port while this process holds it.
pub const DEFAULT_OWNER_TAG: &str = "telemetry_serial::SerialDataSource";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_constants_describe_8n2_at_9600() {
        assert_eq!(TELEMETRY_BAUD_RATE, 9600);
        assert_eq!(TELEMETRY_DATA_BITS.as_u8(), 8);
        assert_eq!(TELEMETRY_STOP_BITS.as_u8(), 2);
        assert_eq!(TELEMETRY_PARITY, Parity::None);
    }

    #[test]
    fn test_open_timeout_is_bounded() {
        assert_eq!(DEFAULT_OPEN_TIMEOUT_MS, 3000);
        assert!(DEFAULT_POLL_INTERVAL_MS < DEFAULT_OPEN_TIMEOUT_MS);
    }

    #[test]
    fn test_owner_tag_is_not_empty() {
        assert!(!DEFAULT_OWNER_TAG.is_empty());
    }
}
