//! Permission bitflags for room and moderation access control

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

bitflags! {
    /// User permission flags
    ///
    /// Stored as BIGINT in database, serialized as string in JSON for JavaScript safety.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Permissions: u64 {
        /// See rooms and read their messages
        const VIEW_ROOMS       = 1 << 0;
        /// Post messages in rooms
        const SEND_MESSAGES    = 1 << 1;
        /// Delete other users' messages
        const MANAGE_MESSAGES  = 1 << 2;
        /// Create, edit, delete rooms
        const MANAGE_ROOMS     = 1 << 3;
        /// Create and lift bans
        const BAN_MEMBERS      = 1 << 4;
        /// Bypass all permission checks and observe every room
        const ADMINISTRATOR    = 1 << 5;

        /// Default permissions for a regular user
        const DEFAULT = Self::VIEW_ROOMS.bits() | Self::SEND_MESSAGES.bits();

        /// Permissions that make a user a moderator
        const MODERATION = Self::BAN_MEMBERS.bits() | Self::MANAGE_MESSAGES.bits();
    }
}

impl Permissions {
    /// Check if the permission set contains a required permission
    ///
    /// Administrators bypass all permission checks.
    #[inline]
    pub fn has(&self, permission: Permissions) -> bool {
        if self.contains(Permissions::ADMINISTRATOR) {
            return true;
        }
        self.contains(permission)
    }

    /// Check if the permission set has any of the given permissions
    #[inline]
    pub fn has_any(&self, permissions: Permissions) -> bool {
        if self.contains(Permissions::ADMINISTRATOR) {
            return true;
        }
        self.intersects(permissions)
    }

    /// Whether this user may see ban activity
    #[inline]
    pub fn can_moderate(&self) -> bool {
        self.has(Permissions::BAN_MEMBERS)
    }

    /// Whether this user observes every room regardless of where they are
    #[inline]
    pub fn is_administrator(&self) -> bool {
        self.contains(Permissions::ADMINISTRATOR)
    }

    /// Get the raw bits as i64 (for database storage)
    #[inline]
    pub fn to_i64(self) -> i64 {
        self.bits() as i64
    }

    /// Create from raw i64 bits (from database)
    #[inline]
    pub fn from_i64(bits: i64) -> Self {
        Permissions::from_bits_truncate(bits as u64)
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Permissions::empty()
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}

impl Serialize for Permissions {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.bits().to_string())
    }
}

// Deserialize from string or number
impl<'de> Deserialize<'de> for Permissions {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::{self, Visitor};

        struct PermissionsVisitor;

        impl Visitor<'_> for PermissionsVisitor {
            type Value = Permissions;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a string or integer representing permission bits")
            }

            fn visit_i64<E>(self, value: i64) -> Result<Permissions, E>
            where
                E: de::Error,
            {
                Ok(Permissions::from_i64(value))
            }

            fn visit_u64<E>(self, value: u64) -> Result<Permissions, E>
            where
                E: de::Error,
            {
                Ok(Permissions::from_bits_truncate(value))
            }

            fn visit_str<E>(self, value: &str) -> Result<Permissions, E>
            where
                E: de::Error,
            {
                value
                    .parse::<u64>()
                    .map(Permissions::from_bits_truncate)
                    .map_err(|_| de::Error::custom("invalid permission string"))
            }
        }

        deserializer.deserialize_any(PermissionsVisitor)
    }
}
