//! Client-side reconciliation of observed engine state against settings.

mod driver;
pub mod machine;
pub mod validity;

pub use driver::{KILL_GRACE, Reconciler};
pub use machine::{Action, ClientState, DesiredState, Input};
