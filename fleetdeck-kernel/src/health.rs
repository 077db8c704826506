use serde::Serialize;
use std::time::Instant;

use crate::auth::Caller;
use crate::feedback::FeedbackLog;
use crate::registry::{RegistryError, ServiceRegistry};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub services_tracked: u32,
    pub instances_tracked: u32,
    pub feedback_records: u32,
    pub memory_usage_mb: f32,
    pub store: &'static str,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }

    pub fn get_health(
        &self,
        registry: &ServiceRegistry,
        feedback: &FeedbackLog,
    ) -> Result<KernelHealth, RegistryError> {
        let services = registry.list_services(&Caller::system())?;
        let instances: usize = services.iter().map(|s| s.instances.len()).sum();

        Ok(KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            services_tracked: services.len() as u32,
            instances_tracked: instances as u32,
            feedback_records: feedback.len() as u32,
            memory_usage_mb: get_memory_usage_mb(),
            store: registry.store_kind(),
        })
    }
}

fn get_memory_usage_mb() -> f32 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            let rss_kb = status
                .lines()
                .find(|l| l.starts_with("VmRSS:"))
                .and_then(|l| l.split_whitespace().nth(1))
                .and_then(|kb| kb.parse::<u64>().ok());
            if let Some(kb) = rss_kb {
                return kb as f32 / 1024.0; // KB -> MB
            }
        }
    }

    // non disponible hors Linux
    0.0
}
