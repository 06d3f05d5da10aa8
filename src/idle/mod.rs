//! Inactivity timeout for kiosk screens
//!
//! One configurable controller replaces per-screen timer code: each screen
//! builds an [`IdleController`] from an [`IdlePolicy`] and an [`IdleExit`],
//! and attaches it to the shared [`ActivityHub`] for as long as it is shown.

mod activity;
mod controller;
mod policy;

pub use activity::{ActivityHub, IdleGuard};
pub use controller::{
    ExpireCallback, IdleController, IdleExit, IdlePhase, IdleStatus, Navigator, ROOT_ROUTE,
};
pub use policy::{ActivityKind, IdlePolicy, DEFAULT_GRACE, DEFAULT_WARN};
