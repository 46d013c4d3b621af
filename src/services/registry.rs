use super::supervisor::{ServiceState, Supervisor};
use std::collections::HashMap;

/// Holds every running service's supervisor by name. Services run under
/// the SYSTEM principal; the registry itself holds no principal
/// context since supervisors only call `Service::update`, which managers
/// invoke with SYSTEM baked in by the caller.
#[derive(Default)]
pub struct Registry {
    supervisors: HashMap<String, Supervisor>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, supervisor: Supervisor) {
        self.supervisors.insert(supervisor.name().to_string(), supervisor);
    }

    pub fn get(&self, name: &str) -> Option<&Supervisor> {
        self.supervisors.get(name)
    }

    pub fn start_all(&self) {
        for supervisor in self.supervisors.values() {
            supervisor.start();
        }
    }

    pub fn stop_all(&self) {
        for supervisor in self.supervisors.values() {
            supervisor.stop();
        }
    }

    /// Stops every service, which drives each through its exactly-once
    /// cleanup: `cleanup()` runs exactly once per lifecycle, last.
    pub fn cleanup_all(&self) {
        self.stop_all();
    }

    pub async fn states(&self) -> HashMap<String, ServiceState> {
        let mut out = HashMap::new();
        for (name, supervisor) in &self.supervisors {
            out.insert(name.clone(), supervisor.state().await);
        }
        out
    }
}
