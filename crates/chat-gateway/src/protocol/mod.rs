//! Gateway protocol definitions
//!
//! Op codes, event numbering, intents, close codes and the frame codec.

mod close_codes;
mod events;
mod intents;
mod messages;
mod opcodes;
mod payloads;

pub use close_codes::CloseCode;
pub use events::EventType;
pub use intents::Intents;
pub use messages::{DecodeError, GatewayPayload};
pub use opcodes::OpCode;
pub use payloads::{ClientPresence, HelloData, UpdatePresenceData};
