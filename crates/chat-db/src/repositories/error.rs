//! Error handling utilities for repositories

use chat_core::error::DomainError;
use chat_core::value_objects::Snowflake;
use sqlx::Error as SqlxError;

/// Convert SQLx error to DomainError
pub fn map_db_error(e: SqlxError) -> DomainError {
    DomainError::DatabaseError(e.to_string())
}

/// Create a "user not found" error
pub fn user_not_found(id: Snowflake) -> DomainError {
    DomainError::UserNotFound(id)
}

/// The row's version changed between read and write
pub fn version_conflict(id: Snowflake) -> DomainError {
    DomainError::Conflict(format!("user {id} was modified concurrently"))
}
