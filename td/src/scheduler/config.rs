//! Per-service timing overrides layered on top of [`Service`]'s published
//! defaults (§4.6).

use std::collections::HashMap;
use std::time::Duration;

use crate::pipeline::Service;

#[derive(Debug, Clone, Copy)]
pub struct ServiceConfig {
    pub interval: Duration,
    /// Launch offset applied once, before the first tick.
    pub stagger: Duration,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    overrides: HashMap<&'static str, ServiceConfig>,
}

impl SchedulerConfig {
    pub fn new() -> Self {
        Self { overrides: HashMap::new() }
    }

    /// Spreads each service's first tick across the 0/20/40s stagger slots
    /// named in §4.6, cycling through them in `Service::ALL` order.
    pub fn with_default_stagger() -> Self {
        let mut cfg = Self::new();
        for (i, service) in Service::ALL.iter().enumerate() {
            let stagger = Duration::from_secs(20 * (i % 3) as u64);
            cfg.overrides.insert(service.name(), ServiceConfig { interval: service.default_interval(), stagger });
        }
        cfg
    }

    pub fn for_service(&self, service: Service) -> ServiceConfig {
        self.overrides.get(service.name()).copied().unwrap_or(ServiceConfig { interval: service.default_interval(), stagger: Duration::ZERO })
    }

    pub fn set_interval(&mut self, service: Service, interval: Duration) {
        let entry = self.overrides.entry(service.name()).or_insert(ServiceConfig { interval: service.default_interval(), stagger: Duration::ZERO });
        entry.interval = interval;
    }

    pub fn set_stagger(&mut self, service: Service, stagger: Duration) {
        let entry = self.overrides.entry(service.name()).or_insert(ServiceConfig { interval: service.default_interval(), stagger: Duration::ZERO });
        entry.stagger = stagger;
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::with_default_stagger()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_service_falls_back_to_published_defaults() {
        let cfg = SchedulerConfig::new();
        let service_cfg = cfg.for_service(Service::DrakeExecution);
        assert_eq!(service_cfg.interval, Duration::from_secs(30));
        assert_eq!(service_cfg.stagger, Duration::ZERO);
    }

    #[test]
    fn explicit_override_wins() {
        let mut cfg = SchedulerConfig::new();
        cfg.set_interval(Service::Wyrm, Duration::from_secs(5));
        assert_eq!(cfg.for_service(Service::Wyrm).interval, Duration::from_secs(5));
    }

    #[test]
    fn default_stagger_cycles_through_three_slots() {
        let cfg = SchedulerConfig::with_default_stagger();
        let staggers: Vec<Duration> = Service::ALL.iter().map(|s| cfg.for_service(*s).stagger).collect();
        assert_eq!(staggers, vec![Duration::from_secs(0), Duration::from_secs(20), Duration::from_secs(40), Duration::from_secs(0), Duration::from_secs(20)]);
    }
}
