//! WebSocket close codes
//!
//! Sent in the close frame when the gateway ends a session's socket.

/// Gateway WebSocket close codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CloseCode {
    /// Unknown error occurred
    UnknownError = 4000,
    /// Client sent an operation or event it may not send
    UnknownOperation = 4001,
    /// Client frame could not be decoded
    InvalidPayload = 4002,
    /// No frame received within the heartbeat timeout
    SessionTimeout = 4003,
    /// The gateway is shutting down
    ServerShutdown = 4004,
    /// The user was banned
    Banned = 4005,
    /// The user's credentials were revoked
    SessionRevoked = 4006,
}

impl CloseCode {
    /// Create a `CloseCode` from a raw u16 value
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            4000 => Some(Self::UnknownError),
            4001 => Some(Self::UnknownOperation),
            4002 => Some(Self::InvalidPayload),
            4003 => Some(Self::SessionTimeout),
            4004 => Some(Self::ServerShutdown),
            4005 => Some(Self::Banned),
            4006 => Some(Self::SessionRevoked),
            _ => None,
        }
    }

    /// Get the raw u16 value
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Whether a session closed with this code may later be resumed
    #[must_use]
    pub const fn is_resumable(self) -> bool {
        !matches!(self, Self::Banned | Self::SessionRevoked)
    }

    /// Get the description for this close code
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::UnknownError => "Unknown error occurred",
            Self::UnknownOperation => "Unknown operation",
            Self::InvalidPayload => "Invalid payload",
            Self::SessionTimeout => "Session timed out",
            Self::ServerShutdown => "Server shutting down",
            Self::Banned => "Banned",
            Self::SessionRevoked => "Session revoked",
        }
    }

    /// Get the name of this close code
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::UnknownError => "UnknownError",
            Self::UnknownOperation => "UnknownOperation",
            Self::InvalidPayload => "InvalidPayload",
            Self::SessionTimeout => "SessionTimeout",
            Self::ServerShutdown => "ServerShutdown",
            Self::Banned => "Banned",
            Self::SessionRevoked => "SessionRevoked",
        }
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.name(), self.as_u16(), self.description())
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code.as_u16()
    }
}
