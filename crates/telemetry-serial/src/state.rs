//! Connection state of a serial data source.
//!
//! # States
//!
//! - `NotStarted`: constructed, `start()` not yet attempted
//! - `Resolving`: looking the port name up
//! - `Opening`: acquiring the port, applying parameters, opening channels
//! - `StreamsOpen`: both byte channels are open
//! - `Listening`: registered for "data available" notifications
//! - `Configured`: link configurator succeeded, readings are flowing
//! - `Failed(kind)`: a start step failed; terminal
//! - `Stopped`: device released by `stop()`; terminal
//!
//! # Valid Transitions
//!
//! - NotStarted → Resolving → Opening → StreamsOpen → Listening → Configured
//! - Resolving | Opening | StreamsOpen | Listening → Failed
//! - Configured → Stopped
//!
//! There is no way back: a source that failed or stopped is not reused.
//!
//! # Examples
//!
//! ```
//! use telemetry_serial::ConnectionState;
//!
//! let state = ConnectionState::NotStarted;
//! assert!(state.can_transition_to(&ConnectionState::Resolving));
//! assert!(!state.can_transition_to(&ConnectionState::Configured));
//! ```

use std::fmt;

use crate::error::FailureKind;

/// Where a serial data source is in its connect sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    NotStarted,
    Resolving,
    Opening,
    StreamsOpen,
    Listening,
    Configured,
    Failed(FailureKind),
    Stopped,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::NotStarted => write!(f, "NotStarted"),
            ConnectionState::Resolving => write!(f, "Resolving"),
            ConnectionState::Opening => write!(f, "Opening"),
            ConnectionState::StreamsOpen => write!(f, "StreamsOpen"),
            ConnectionState::Listening => write!(f, "Listening"),
            ConnectionState::Configured => write!(f, "Configured"),
            ConnectionState::Failed(kind) => write!(f, "Failed({kind})"),
            ConnectionState::Stopped => write!(f, "Stopped"),
        }
    }
}

impl ConnectionState {
    /// Check if a transition to `target` is allowed from this state.
    pub fn can_transition_to(&self, target: &ConnectionState) -> bool {
        use ConnectionState::*;

        matches!(
            (self, target),
            (NotStarted, Resolving)
                | (Resolving, Opening)
                | (Opening, StreamsOpen)
                | (StreamsOpen, Listening)
                | (Listening, Configured)
                | (Resolving | Opening | StreamsOpen | Listening, Failed(_))
                | (Configured, Stopped)
        )
    }

    /// A source in a terminal state never changes state again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Failed(_) | ConnectionState::Stopped)
    }

    /// Whether the connect sequence completed.
    pub fn is_running(&self) -> bool {
        matches!(self, ConnectionState::Configured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const ALL: [ConnectionState; 8] = [
        ConnectionState::NotStarted,
        ConnectionState::Resolving,
        ConnectionState::Opening,
        ConnectionState::StreamsOpen,
        ConnectionState::Listening,
        ConnectionState::Configured,
        ConnectionState::Failed(FailureKind::PortNotFound),
        ConnectionState::Stopped,
    ];

    #[test]
    fn test_happy_path_is_forward_only() {
        let path = [
            ConnectionState::NotStarted,
            ConnectionState::Resolving,
            ConnectionState::Opening,
            ConnectionState::StreamsOpen,
            ConnectionState::Listening,
            ConnectionState::Configured,
        ];

        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(&pair[1]), "{} -> {}", pair[0], pair[1]);
            assert!(!pair[1].can_transition_to(&pair[0]), "{} -> {}", pair[1], pair[0]);
        }
    }

    #[rstest]
    #[case(ConnectionState::Resolving, true)]
    #[case(ConnectionState::Opening, true)]
    #[case(ConnectionState::StreamsOpen, true)]
    #[case(ConnectionState::Listening, true)]
    #[case(ConnectionState::NotStarted, false)]
    #[case(ConnectionState::Configured, false)]
    #[case(ConnectionState::Stopped, false)]
    fn test_failure_allowed_only_mid_sequence(
        #[case] from: ConnectionState,
        #[case] allowed: bool,
    ) {
        let failed = ConnectionState::Failed(FailureKind::CannotListen);
        assert_eq!(from.can_transition_to(&failed), allowed);
    }

    #[test]
    fn test_terminal_states_have_no_exit() {
        for terminal in ALL.iter().filter(|s| s.is_terminal()) {
            for target in &ALL {
                assert!(!terminal.can_transition_to(target), "{terminal} -> {target}");
            }
        }
    }

    #[test]
    fn test_only_configured_can_stop() {
        for state in &ALL {
            let expected = *state == ConnectionState::Configured;
            assert_eq!(state.can_transition_to(&ConnectionState::Stopped), expected);
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(ConnectionState::default().to_string(), "NotStarted");
        assert_eq!(
            ConnectionState::Failed(FailureKind::PortInUse).to_string(),
            "Failed(PortInUse)"
        );
    }
}
