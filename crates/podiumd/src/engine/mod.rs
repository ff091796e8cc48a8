//! Supervision of the native engine.
//!
//! The engine is a long-running external player daemon that can be started at
//! most once per process: its native state cannot be torn down and rebuilt
//! in-place, so a stopped or crashed engine requires a fresh `podiumd`
//! process. [`EngineSupervisor`] enforces that single-instance constraint and
//! owns the execution thread running the engine's blocking entry point;
//! [`EngineBackend`] abstracts how the entry point is obtained so tests can
//! substitute a scripted engine.

mod backend;
mod supervisor;

pub use backend::{EngineBackend, EngineLaunchError, LaunchedEngine, ProcessEngine};
pub use supervisor::EngineSupervisor;

pub(crate) const ENGINE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::engine");
