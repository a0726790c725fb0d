//! Repository traits

mod repositories;

pub use repositories::{PresenceRepository, RepoResult, UserSnapshotRepository};
