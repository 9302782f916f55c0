//! cvsd daemon: pserver worker launching, the accept-loop controller, the
//! `CvsService` facade and foreground serving.

pub mod controller;
mod error;
mod runtime;
pub mod service;
pub mod worker;

pub use controller::{DaemonController, DaemonSettings, DaemonState, StatusHandle};
pub use error::{ServiceError, SpawnError, StartError, StopError};
pub use runtime::{init_tracing, serve_blocking, LogFormat};
pub use service::{CvsService, ServiceStatus};
pub use worker::{WorkerHandle, WorkerLauncher};
