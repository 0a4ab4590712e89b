//! Run lifecycle: the control plane and the worker it spawns.
//!
//! Used by both the HTTP server and the one-shot CLI command.

pub mod control;
mod run;
pub mod worker;

pub use control::{ControlError, ControlPlane, RunState, RunStatus, StartRequest};
pub use run::Run;
pub use worker::WorkerConfig;
