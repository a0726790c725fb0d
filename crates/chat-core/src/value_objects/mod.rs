//! Value objects - immutable types that represent domain concepts

mod permissions;
mod presence;
mod snowflake;

pub use permissions::Permissions;
pub use presence::Presence;
pub use snowflake::{Snowflake, SnowflakeParseError};
