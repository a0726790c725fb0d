//! Session management
//!
//! Sessions, the registry that owns them, and the socket run loop.

mod registry;
mod session;
mod socket;

pub use registry::{ResumeError, SessionRegistry};
pub(crate) use session::Outbound;
pub use session::{Attachment, Session, SessionError, SessionState};
pub use socket::SessionObserver;
