//! Line-oriented decoder for text telemetry.

use telemetry_serial::Decoder;
use tracing::warn;

/// Longest line kept in the buffer before it is emitted without a newline.
pub const DEFAULT_MAX_LINE_LEN: usize = 4096;

/// Splits incoming bytes into newline-terminated text lines.
///
/// A line may arrive across several bursts; the unfinished tail is kept
/// until its newline shows up. `\r\n` endings are accepted and blank lines
/// are skipped. Invalid UTF-8 is replaced rather than rejected.
#[derive(Debug)]
pub struct LineDecoder {
    pending: Vec<u8>,
    max_line_len: usize,
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_LEN)
    }
}

impl LineDecoder {
    pub fn new(max_line_len: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_line_len: max_line_len.max(1),
        }
    }

    /// Bytes received after the last complete line.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    fn emit(line: &[u8], lines: &mut Vec<String>) {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if !line.is_empty() {
            lines.push(String::from_utf8_lossy(line).into_owned());
        }
    }
}

impl Decoder for LineDecoder {
    type Reading = Vec<String>;

    fn push_data(&mut self, data: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();

        for &byte in data {
            if byte == b'\n' {
                Self::emit(&self.pending, &mut lines);
                self.pending.clear();
                continue;
            }

            self.pending.push(byte);
            if self.pending.len() >= self.max_line_len {
                warn!(len = self.pending.len(), "Line too long, emitting without newline");
                Self::emit(&self.pending, &mut lines);
                self.pending.clear();
            }
        }

        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(b"speed=42\n", vec!["speed=42"])]
    #[case(b"a\nb\n", vec!["a", "b"])]
    #[case(b"rpm=9000\r\n", vec!["rpm=9000"])]
    #[case(b"\n\r\n", vec![])]
    #[case(b"", vec![])]
    #[case(b"no newline", vec![])]
    fn test_single_burst(#[case] data: &[u8], #[case] expected: Vec<&str>) {
        let mut decoder = LineDecoder::default();
        assert_eq!(decoder.push_data(data), expected);
    }

    #[test]
    fn test_line_split_across_bursts() {
        let mut decoder = LineDecoder::default();

        assert!(decoder.push_data(b"temp=").is_empty());
        assert_eq!(decoder.pending(), b"temp=");
        assert_eq!(decoder.push_data(b"88.5\nfuel"), vec!["temp=88.5"]);
        assert_eq!(decoder.push_data(b"=12\n"), vec!["fuel=12"]);
        assert!(decoder.pending().is_empty());
    }

    #[test]
    fn test_crlf_split_across_bursts() {
        let mut decoder = LineDecoder::default();

        assert!(decoder.push_data(b"gear=3\r").is_empty());
        assert_eq!(decoder.push_data(b"\n"), vec!["gear=3"]);
    }

    #[test]
    fn test_overlong_line_is_emitted() {
        let mut decoder = LineDecoder::new(4);

        assert_eq!(decoder.push_data(b"abcdef\n"), vec!["abcd", "ef"]);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut decoder = LineDecoder::default();

        assert_eq!(decoder.push_data(&[b'x', 0xFF, b'\n']), vec!["x\u{FFFD}"]);
    }
}
