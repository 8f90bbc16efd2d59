//! Assembles the five periodic workers (§4.6) and runs them to completion
//! of a shared shutdown signal.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::pipeline::Service;

use super::config::SchedulerConfig;
use super::worker::{Cycle, PeriodicWorker};

pub struct SchedulerDaemon {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl SchedulerDaemon {
    /// Spawns one `PeriodicWorker` per entry in `cycles`. Services with no
    /// registered cycle are simply not scheduled - callers wire up only the
    /// services they actually support (useful in tests and for a daemon
    /// running a subset of roles).
    pub fn spawn(config: SchedulerConfig, cycles: HashMap<Service, Arc<dyn Cycle>>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut handles = Vec::with_capacity(cycles.len());

        for service in Service::ALL {
            let Some(cycle) = cycles.get(&service).cloned() else { continue };
            let worker = PeriodicWorker::new(service, config.for_service(service), cycle);
            let rx = shutdown_rx.clone();
            info!(service = service.name(), "scheduler: spawning periodic worker");
            handles.push(tokio::spawn(async move { worker.run(rx).await }));
        }

        Self { shutdown_tx, handles }
    }

    /// Signals every worker to stop after its current cycle and waits for
    /// them to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Semaphore;

    struct CountingCycle(Arc<AtomicUsize>);

    #[async_trait]
    impl Cycle for CountingCycle {
        async fn run_cycle(&self, _semaphore: Arc<Semaphore>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn only_registered_services_are_scheduled() {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut cycles: HashMap<Service, Arc<dyn Cycle>> = HashMap::new();
        cycles.insert(Service::Wyrm, Arc::new(CountingCycle(runs.clone())));

        let daemon = SchedulerDaemon::spawn(SchedulerConfig::new(), cycles);
        assert_eq!(daemon.handles.len(), 1);

        tokio::time::advance(Duration::from_secs(65)).await;
        tokio::task::yield_now().await;

        daemon.shutdown().await;
        assert!(runs.load(Ordering::SeqCst) >= 1);
    }
}
