//! The generic periodic worker (§4.6): at-most-one active cycle per
//! service, a counting semaphore bounding in-cycle concurrency, and an
//! optional one-time launch stagger.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{Semaphore, watch};
use tracing::{debug, warn};

use crate::pipeline::Service;

use super::config::ServiceConfig;

/// One concurrency-capped sweep over whatever a service considers eligible
/// work. `semaphore` is pre-sized to the service's `project_concurrency()`;
/// implementations acquire a permit per unit of concurrent work so a
/// failure in one project never blocks the others.
#[async_trait]
pub trait Cycle: Send + Sync {
    async fn run_cycle(&self, semaphore: Arc<Semaphore>);
}

/// Clears the running flag on drop, so a panicking cycle doesn't wedge the
/// service into permanently-skipped ticks.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct PeriodicWorker {
    service: Service,
    config: ServiceConfig,
    cycle: Arc<dyn Cycle>,
    running: Arc<AtomicBool>,
    semaphore: Arc<Semaphore>,
}

impl PeriodicWorker {
    pub fn new(service: Service, config: ServiceConfig, cycle: Arc<dyn Cycle>) -> Self {
        Self { service, config, cycle, running: Arc::new(AtomicBool::new(false)), semaphore: Arc::new(Semaphore::new(service.project_concurrency())) }
    }

    /// Runs until `shutdown` reports `true`. The first tick fires after
    /// `config.stagger`; every tick after that is on `config.interval`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        if !self.config.stagger.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(self.config.stagger) => {}
                _ = shutdown.changed() => return,
            }
        }

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // consume the immediate first tick `interval` always produces

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!(service = self.service.name(), "scheduler: worker shutting down");
                        return;
                    }
                }
            }
        }
    }

    /// Fires and forgets one cycle, skipping it entirely if the previous
    /// one is still in flight (§4.6: at-most-one active cycle per service).
    async fn tick(&self) {
        if self.running.swap(true, Ordering::AcqRel) {
            warn!(service = self.service.name(), "scheduler: tick skipped, previous cycle still running");
            return;
        }

        let guard = RunningGuard(self.running.clone());
        let cycle = self.cycle.clone();
        let semaphore = self.semaphore.clone();
        let service = self.service;

        tokio::spawn(async move {
            cycle.run_cycle(semaphore).await;
            debug!(service = service.name(), "scheduler: cycle finished");
            drop(guard);
        });
    }
}
