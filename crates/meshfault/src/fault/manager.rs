//! FaultManager - name-keyed registry of faults.
//!
//! The manager owns every registered fault and forwards lifecycle calls to
//! it. It also holds the shared [`ProbabilityGate`] so any feature can ask
//! for a probabilistic decision without owning a generator.

use super::{Fault, FaultError, FaultStatus};
use crate::gate::ProbabilityGate;
use crate::metrics;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct FaultManager {
    faults: RwLock<HashMap<String, Arc<dyn Fault>>>,
    gate: Arc<ProbabilityGate>,
}

impl FaultManager {
    /// Manager with an entropy-seeded gate.
    pub fn new() -> Self {
        Self::with_gate(Arc::new(ProbabilityGate::new()))
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::with_gate(Arc::new(ProbabilityGate::with_seed(seed)))
    }

    pub fn with_gate(gate: Arc<ProbabilityGate>) -> Self {
        Self {
            faults: RwLock::new(HashMap::new()),
            gate,
        }
    }

    /// The shared gate, for handing to other components.
    pub fn gate(&self) -> Arc<ProbabilityGate> {
        Arc::clone(&self.gate)
    }

    /// Register a fault under its own name, replacing any previous entry.
    ///
    /// A replaced fault that is still running is stopped once it is out of
    /// the map. Register before serving concurrent lifecycle traffic.
    pub fn register(&self, fault: Arc<dyn Fault>) {
        let name = fault.name().to_string();
        let previous = self.faults.write().insert(name.clone(), fault);
        let Some(previous) = previous else {
            debug!("Fault {} registered", name);
            return;
        };

        warn!("Fault {} re-registered, previous instance replaced", name);
        if previous.status() == FaultStatus::Running {
            match previous.stop() {
                Ok(()) => {
                    info!("Replaced fault {} stopped", name);
                    metrics::record_transition(&name, "stop");
                }
                Err(e) => debug!("Replaced fault {} was not stopped: {}", name, e),
            }
        }
    }

    /// Look up a registered fault.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Fault>, FaultError> {
        self.faults
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| FaultError::NotFound(name.to_string()))
    }

    pub fn start(&self, name: &str) -> Result<(), FaultError> {
        let fault = self.get(name)?;
        match fault.start() {
            Ok(()) => {
                info!("Fault {} started", name);
                metrics::record_transition(name, "start");
                Ok(())
            }
            Err(e) => {
                debug!("Start of fault {} rejected: {}", name, e);
                metrics::record_transition(name, "rejected");
                Err(e)
            }
        }
    }

    /// Stop a fault. Blocks until its worker has exited.
    pub fn stop(&self, name: &str) -> Result<(), FaultError> {
        let fault = self.get(name)?;
        match fault.stop() {
            Ok(()) => {
                info!("Fault {} stopped", name);
                metrics::record_transition(name, "stop");
                Ok(())
            }
            Err(e) => {
                debug!("Stop of fault {} rejected: {}", name, e);
                metrics::record_transition(name, "rejected");
                Err(e)
            }
        }
    }

    pub fn status(&self, name: &str) -> Result<FaultStatus, FaultError> {
        Ok(self.get(name)?.status())
    }

    /// Registered names, in no particular order.
    pub fn list(&self) -> Vec<String> {
        self.faults.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.faults.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.faults.read().is_empty()
    }

    /// Stop every running fault. Returns the names that were stopped.
    pub fn stop_all(&self) -> Vec<String> {
        let running: Vec<Arc<dyn Fault>> = self
            .faults
            .read()
            .values()
            .filter(|f| f.status() == FaultStatus::Running)
            .cloned()
            .collect();

        running
            .into_iter()
            .filter_map(|fault| {
                let name = fault.name().to_string();
                self.stop(&name).ok().map(|()| name)
            })
            .collect()
    }

    /// Probability gate usable by any feature.
    pub fn should_inject(&self, rate: f64) -> bool {
        self.gate.should_inject(rate)
    }
}

impl Default for FaultManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FaultManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultManager")
            .field("faults", &self.list())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::MemLeakFault;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    /// Minimal fault that counts real starts.
    struct CountingFault {
        name: String,
        running: AtomicBool,
        starts: AtomicUsize,
    }

    impl CountingFault {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                running: AtomicBool::new(false),
                starts: AtomicUsize::new(0),
            }
        }
    }

    impl Fault for CountingFault {
        fn name(&self) -> &str {
            &self.name
        }

        fn start(&self) -> Result<(), FaultError> {
            self.running
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .map_err(|_| FaultError::AlreadyRunning(self.name.clone()))?;
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn stop(&self) -> Result<(), FaultError> {
            self.running
                .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
                .map(|_| ())
                .map_err(|_| FaultError::NotRunning(self.name.clone()))
        }

        fn status(&self) -> FaultStatus {
            if self.running.load(Ordering::Acquire) {
                FaultStatus::Running
            } else {
                FaultStatus::Stopped
            }
        }
    }

    #[test]
    fn test_start_unknown_fault() {
        let manager = FaultManager::with_seed(1);
        assert_eq!(
            manager.start("ghost"),
            Err(FaultError::NotFound("ghost".to_string()))
        );
        assert!(manager.is_empty());
        assert_eq!(
            manager.status("ghost"),
            Err(FaultError::NotFound("ghost".to_string()))
        );
    }

    #[test]
    fn test_register_over_running_fault_stops_it() {
        let manager = FaultManager::with_seed(1);
        let old = Arc::new(MemLeakFault::with_name(
            "replace-me",
            64,
            Duration::from_millis(5),
        ));
        manager.register(old.clone());
        manager.start("replace-me").unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let new = Arc::new(CountingFault::new("replace-me"));
        manager.register(new.clone());

        assert_eq!(old.status(), FaultStatus::Stopped);
        assert_eq!(old.stats().blocks, 0);
        assert_eq!(new.status(), FaultStatus::Stopped);
        assert_eq!(
            manager.status("replace-me").unwrap(),
            FaultStatus::Stopped
        );
        manager.start("replace-me").unwrap();
        assert_eq!(new.starts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_register_twice_lists_once() {
        let manager = FaultManager::with_seed(1);
        manager.register(Arc::new(CountingFault::new("dup")));
        manager.register(Arc::new(CountingFault::new("dup")));
        let names = manager.list();
        assert_eq!(names, vec!["dup".to_string()]);
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_last_register_wins() {
        let manager = FaultManager::with_seed(1);
        let first = Arc::new(CountingFault::new("f"));
        let second = Arc::new(CountingFault::new("f"));
        manager.register(first.clone());
        manager.register(second.clone());

        manager.start("f").unwrap();
        assert_eq!(first.starts.load(Ordering::SeqCst), 0);
        assert_eq!(second.starts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_double_start() {
        let manager = FaultManager::with_seed(1);
        manager.register(Arc::new(CountingFault::new("f")));
        manager.start("f").unwrap();
        assert_eq!(
            manager.start("f"),
            Err(FaultError::AlreadyRunning("f".to_string()))
        );
        assert_eq!(manager.status("f").unwrap(), FaultStatus::Running);
    }

    #[test]
    fn test_stop_never_started() {
        let manager = FaultManager::with_seed(1);
        manager.register(Arc::new(CountingFault::new("f")));
        assert_eq!(
            manager.stop("f"),
            Err(FaultError::NotRunning("f".to_string()))
        );
        assert_eq!(manager.status("f").unwrap(), FaultStatus::Stopped);
    }

    #[test]
    fn test_concurrent_start_single_winner() {
        let manager = Arc::new(FaultManager::with_seed(1));
        let fault = Arc::new(CountingFault::new("race"));
        manager.register(fault.clone());

        let barrier = Arc::new(std::sync::Barrier::new(2));
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let manager = Arc::clone(&manager);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    manager.start("race")
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| *r == Err(FaultError::AlreadyRunning("race".to_string()))));
        assert_eq!(fault.starts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_all() {
        let manager = FaultManager::with_seed(1);
        manager.register(Arc::new(CountingFault::new("a")));
        manager.register(Arc::new(CountingFault::new("b")));
        manager.register(Arc::new(MemLeakFault::new(64, Duration::from_millis(5))));
        manager.start("a").unwrap();
        manager.start(MemLeakFault::NAME).unwrap();

        let mut stopped = manager.stop_all();
        stopped.sort();
        assert_eq!(stopped, vec!["a".to_string(), MemLeakFault::NAME.to_string()]);
        for name in manager.list() {
            assert_eq!(manager.status(&name).unwrap(), FaultStatus::Stopped);
        }
    }

    #[test]
    fn test_should_inject_edges() {
        let manager = FaultManager::with_seed(3);
        for _ in 0..1000 {
            assert!(!manager.should_inject(0.0));
            assert!(!manager.should_inject(-0.5));
            assert!(manager.should_inject(1.0));
            assert!(manager.should_inject(2.0));
        }
    }

    #[test]
    fn test_should_inject_half() {
        let manager = FaultManager::with_seed(2024);
        let trials = 100_000;
        let hits = (0..trials).filter(|_| manager.should_inject(0.5)).count();
        let observed = hits as f64 / trials as f64;
        assert!((observed - 0.5).abs() < 0.02, "observed {observed}");
    }
}
