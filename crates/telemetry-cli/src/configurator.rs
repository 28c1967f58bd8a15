use std::io::Write;

use telemetry_serial::{ByteSource, ConfigureError, Configurator};
use tracing::debug;

/// Configurator for devices that start streaming as soon as the port opens.
///
/// Sends nothing; it only checks that both channels are usable.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughConfigurator;

impl Configurator for PassthroughConfigurator {
    fn configure(
        &mut self,
        input: &mut dyn ByteSource,
        output: &mut dyn Write,
    ) -> Result<(), ConfigureError> {
        let available = input
            .bytes_available()
            .map_err(|e| ConfigureError::io("input channel unusable", e))?;
        output
            .flush()
            .map_err(|e| ConfigureError::io("output channel unusable", e))?;

        debug!(available, "Link needs no configuration");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    struct Input(io::Result<usize>);

    impl ByteSource for Input {
        fn bytes_available(&mut self) -> io::Result<usize> {
            match &self.0 {
                Ok(n) => Ok(*n),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            }
        }

        fn read_byte(&mut self) -> io::Result<Option<u8>> {
            Ok(None)
        }
    }

    #[test]
    fn test_passthrough_writes_nothing() {
        let mut output = Vec::new();
        PassthroughConfigurator
            .configure(&mut Input(Ok(3)), &mut output)
            .unwrap();

        assert!(output.is_empty());
    }

    #[test]
    fn test_passthrough_reports_broken_input() {
        let mut output = Vec::new();
        let error = PassthroughConfigurator
            .configure(&mut Input(Err(io::Error::other("gone"))), &mut output)
            .unwrap_err();

        assert_eq!(error.message(), "input channel unusable");
    }
}
