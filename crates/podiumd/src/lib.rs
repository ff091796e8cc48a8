//! Engine supervisor daemon.
//!
//! `podiumd` owns one run of the external audio engine. It serialises start
//! and stop commands through a single lifecycle worker, regenerates the
//! engine's configuration from the durable settings store before every start,
//! and fans lifecycle events out to control-socket subscribers. The engine
//! can be started at most once per daemon process; after a stop or an engine
//! error the process exits and the CLI relaunches it on demand.
//!
//! The control protocol is JSONL over the configured socket; see
//! [`podium_daemon_types`] for the wire types.

pub mod cli;
pub mod controller;
pub mod engine;
pub mod process;
pub mod telemetry;
pub mod transport;

pub use controller::{ControllerDeps, ControllerHandle, LifecycleController, SubscriberRegistry};
pub use engine::{EngineBackend, EngineSupervisor};
pub use process::{LaunchError, LaunchMode, StopKind, run_daemon};
pub use telemetry::{TelemetryError, TelemetryHandle};
