/*!
Handshake state management for TLS sessions.

This module defines the handshake states, the transport ownership flags and
the state machine that validates transitions between them.
*/

use std::fmt;

/// Handshake progress of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HandshakeState {
    /// No engine context yet
    Uninitialized,
    /// Engine context created, handshake not finished
    Handshaking,
    /// Handshake complete, application data may flow
    Established,
    /// Session closed, transport released
    Closed,
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeState::Uninitialized => write!(f, "Uninitialized"),
            HandshakeState::Handshaking => write!(f, "Handshaking"),
            HandshakeState::Established => write!(f, "Established"),
            HandshakeState::Closed => write!(f, "Closed"),
        }
    }
}

/// Whether `connect`/`close` also drive the wrapped transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportControl {
    /// The caller manages the transport lifecycle
    None,
    /// `connect` also connects the transport
    Connect,
    /// `close` (and drop) also closes the transport
    Close,
    /// Both of the above
    #[default]
    ConnectAndClose,
}

impl TransportControl {
    /// Build from the two independent flags
    pub fn from_flags(connect: bool, close: bool) -> Self {
        match (connect, close) {
            (false, false) => TransportControl::None,
            (true, false) => TransportControl::Connect,
            (false, true) => TransportControl::Close,
            (true, true) => TransportControl::ConnectAndClose,
        }
    }

    /// Whether `connect` connects the transport first
    pub fn connects_transport(&self) -> bool {
        matches!(self, TransportControl::Connect | TransportControl::ConnectAndClose)
    }

    /// Whether `close` closes the transport too
    pub fn closes_transport(&self) -> bool {
        matches!(self, TransportControl::Close | TransportControl::ConnectAndClose)
    }
}

/// Handshake state manager
///
/// Handles state transitions and validation of operations
/// based on the current handshake state.
#[derive(Debug, Clone, Copy)]
pub struct StateManager {
    state: HandshakeState,
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl StateManager {
    /// Create a new state manager
    pub fn new() -> Self {
        Self {
            state: HandshakeState::Uninitialized,
        }
    }

    /// Get the current state
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Whether the engine context has been created
    pub fn is_started(&self) -> bool {
        self.state != HandshakeState::Uninitialized
    }

    /// Whether the handshake has completed
    pub fn is_established(&self) -> bool {
        self.state == HandshakeState::Established
    }

    /// Transition to the handshaking state
    pub fn transition_to_handshaking(&mut self) {
        if self.state == HandshakeState::Uninitialized {
            self.state = HandshakeState::Handshaking;
        }
    }

    /// Transition to the established state
    pub fn transition_to_established(&mut self) {
        if self.state == HandshakeState::Handshaking {
            self.state = HandshakeState::Established;
        }
    }

    /// Transition to the closed state
    pub fn transition_to_closed(&mut self) {
        if self.state != HandshakeState::Uninitialized {
            self.state = HandshakeState::Closed;
        }
    }
}
