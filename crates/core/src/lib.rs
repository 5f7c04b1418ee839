//! Pure gateway decisions shared by the HTTP surface, the realtime channel and
//! the startup sequence. Nothing in this crate performs I/O.

pub mod origin;
pub mod startup;

pub use origin::{AllowList, AllowReason, DenyReason, OriginDecision, OriginPolicy};
pub use startup::{StageTracker, StageTransitionError, StartupStage};
