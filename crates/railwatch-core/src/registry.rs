use std::time::Duration;

use chrono::NaiveTime;
use tracing::{info, warn};

use crate::{
    bounded::BoundedQueue,
    clock::{seconds_until, DepartedPolicy},
    domain::MonitoredService,
    store::ServiceStore,
    Result,
};

pub const DEFAULT_CAPACITY: usize = 15;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(30 * 60);

/// The set of monitored services, oldest first.
///
/// Memory is the source of truth for the life of the process. The store is
/// read once at startup and rewritten in full after every mutating call.
/// Callers that share a registry wrap it in a mutex so evict-then-append and
/// the whole-file rewrite never interleave.
#[derive(Debug)]
pub struct ServiceRegistry {
    store: ServiceStore,
    services: BoundedQueue<MonitoredService>,
}

impl ServiceRegistry {
    pub fn new(store: ServiceStore, capacity: usize) -> Self {
        Self {
            store,
            services: BoundedQueue::new(capacity),
        }
    }

    /// Build a registry from whatever the store holds. Records beyond capacity
    /// evict the oldest ones, exactly as live additions would.
    pub fn load(store: ServiceStore, capacity: usize) -> Result<Self> {
        let mut registry = Self::new(store, capacity);
        for svc in registry.store.load()? {
            registry.admit(svc);
        }
        info!(
            count = registry.len(),
            capacity,
            "service registry loaded"
        );
        Ok(registry)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.services.capacity()
    }

    pub fn services(&self) -> impl Iterator<Item = &MonitoredService> {
        self.services.iter()
    }

    /// Parse and append each `HH:MM ORIGIN DEST` command, evicting the oldest
    /// entry whenever the registry is full, then persist.
    ///
    /// Malformed commands are logged and dropped.
    pub fn add_services(&mut self, raw_commands: &[String]) -> Result<()> {
        for raw in raw_commands {
            match MonitoredService::parse(raw) {
                Ok(svc) => {
                    info!(service = %svc, "monitoring service");
                    self.admit(svc);
                }
                Err(e) => warn!(error = %e, "dropping malformed service"),
            }
        }
        self.persist()
    }

    /// Remove the first entry equal to each command, then persist. Commands with
    /// no matching entry are ignored.
    pub fn remove_services(&mut self, raw_commands: &[String]) -> Result<()> {
        for raw in raw_commands {
            self.remove_from_cache_only(raw);
        }
        self.persist()
    }

    /// Same as [`ServiceRegistry::remove_services`] for a single command, but the
    /// store is left alone until the next persisting mutation.
    pub fn remove_from_cache_only(&mut self, raw: &str) -> bool {
        let target = match MonitoredService::parse(raw) {
            Ok(svc) => svc,
            Err(e) => {
                warn!(error = %e, "cannot remove malformed service");
                return false;
            }
        };
        match self.services.remove_first(|s| *s == target) {
            Some(removed) => {
                info!(service = %removed, "stopped monitoring service");
                true
            }
            None => false,
        }
    }

    /// Services departing within `window` of `now`, in registry order.
    ///
    /// A service is due when `0 <= scheduled - now < window`; `policy` decides
    /// what the delta is once the scheduled time-of-day is behind `now`.
    pub fn due(
        &self,
        now: NaiveTime,
        window: Duration,
        policy: DepartedPolicy,
    ) -> Vec<MonitoredService> {
        let window = i64::try_from(window.as_secs()).unwrap_or(i64::MAX);
        self.services
            .iter()
            .filter(|svc| {
                seconds_until(svc.scheduled(), now, policy)
                    .map(|secs| secs < window)
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    fn admit(&mut self, svc: MonitoredService) {
        if self.services.is_full() {
            if let Some(evicted) = self.services.evict_oldest() {
                info!(service = %evicted, "registry full, evicting oldest service");
            }
        }
        self.services.push(svc);
    }

    fn persist(&self) -> Result<()> {
        self.store.save(self.services.iter())
    }
}
