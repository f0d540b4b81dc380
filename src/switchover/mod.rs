//! Switchover and failover orchestration
//!
//! - `request`: body parsing and action normalisation
//! - `validator`: request checks and candidate resolution
//! - `orchestrator`: intent write, result polling and classification
//!
//! An accepted request never promotes anything directly; it records a
//! [`crate::dcs::FailoverIntent`] that the HA loops act on.

mod errors;
mod orchestrator;
mod request;
mod validator;

pub use errors::{SwitchoverError, SwitchoverErrorKind, SwitchoverResult};
pub use orchestrator::{Orchestrator, SwitchoverOutcome, SwitchoverStage, DEFAULT_POLL_INTERVAL};
pub use request::{SwitchoverAction, SwitchoverRequest};
pub use validator::{validate_pause, validate_request, CandidateResolver};
