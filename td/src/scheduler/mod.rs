//! Periodic workers (§4.6): five independent timers driving Wyrm, Wyvern,
//! Drake execution, Drake monitoring, and verification. This module owns
//! the timing/concurrency discipline only - what a cycle actually does is
//! supplied by the state layer's [`Cycle`] implementations.

mod config;
mod cycles;
mod daemon;
mod worker;

pub use config::{SchedulerConfig, ServiceConfig};
pub use cycles::{DrakeExecutionCycle, DrakeMonitoringCycle, KoboldRegistry, VerificationCycle, WyrmCycle, WyvernCycle};
pub use daemon::SchedulerDaemon;
pub use worker::{Cycle, PeriodicWorker};
