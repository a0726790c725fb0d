//! Domain entities carried by gateway events

mod ban;
mod message;
mod room;
mod user;

pub use ban::Ban;
pub use message::Message;
pub use room::Room;
pub use user::{PublicUser, UserSnapshot};
