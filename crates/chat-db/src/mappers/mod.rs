//! Model -> entity conversions

mod user;
