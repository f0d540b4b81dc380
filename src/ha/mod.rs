//! Interface to the HA decision loop
//!
//! [`HaHandle`] is what the control API needs from the loop that promotes
//! and demotes nodes. [`StandaloneHa`] is a minimal implementation for
//! running the API on its own.

mod handle;
mod standalone;

pub use handle::{HaHandle, MemberStatus, ScheduledRestart};
pub use standalone::{run_refresh_loop, HaAction, StandaloneHa};
