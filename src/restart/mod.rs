//! Restart requests
//!
//! Validation of `POST /restart` bodies. Execution and scheduling belong to
//! the HA loop behind [`crate::ha::HaHandle`].

mod errors;
mod request;

pub use errors::{RestartError, RestartResult};
pub use request::{parse_timeout, postgres_version_to_int, RestartRequest};
