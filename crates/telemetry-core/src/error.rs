use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Port errors
    #[error("Invalid port name: {0}")]
    InvalidPortName(String),

    // Link parameter errors
    #[error("Invalid data bits: {0} (expected 5-8)")]
    InvalidDataBits(u8),

    #[error("Invalid stop bits: {0} (expected 1 or 2)")]
    InvalidStopBits(u8),

    #[error("Invalid parity: {0}")]
    InvalidParity(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing configuration key: {0}")]
    MissingConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;
