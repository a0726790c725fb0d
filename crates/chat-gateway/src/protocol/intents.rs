//! Gateway intents
//!
//! A session declares its intents once, in the `Intents` header of the
//! upgrade request. Only dispatches whose category bit is set are delivered.

use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Event categories a session subscribes to
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Intents: u32 {
        /// User updates, room moves and (with extra gating) bans
        const USERS      = 1 << 0;
        /// Room lifecycle and room connection changes
        const ROOMS      = 1 << 1;
        /// Messages and typing indicators
        const MESSAGES   = 1 << 2;
        /// See every ban regardless of permissions
        const MODERATION = 1 << 3;
    }
}

impl Intents {
    /// Parse the decimal bitmask sent by clients, dropping unknown bits
    pub fn parse(raw: &str) -> Option<Self> {
        raw.trim().parse::<u32>().ok().map(Self::from_bits_truncate)
    }
}

impl Default for Intents {
    fn default() -> Self {
        Intents::empty()
    }
}

impl fmt::Display for Intents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}
