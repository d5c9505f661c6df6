use crate::{types::HealthStatus, types::HealthCheck, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::time::Instant;

/// Generic health probe a component registers with its `HealthChecker`.
#[async_trait::async_trait]
pub trait HealthCheckProvider: Send + Sync {
    async fn check(&self) -> Result<HealthCheck>;
    fn name(&self) -> &str;
}

pub struct HealthChecker {
    checks: HashMap<String, Box<dyn HealthCheckProvider>>,
    version: String,
}

impl HealthChecker {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            checks: HashMap::new(),
            version: version.into(),
        }
    }

    pub fn add_check<T: HealthCheckProvider + 'static>(&mut self, check: T) {
        self.checks.insert(check.name().to_string(), Box::new(check));
    }

    pub async fn check_health(&self) -> HealthStatus {
        let mut checks = HashMap::new();
        let mut overall_status = "healthy";

        for (name, checker) in &self.checks {
            let start = Instant::now();
            let result = checker.check().await;
            let duration = start.elapsed();

            let health_check = match result {
                Ok(check) => {
                    if check.status != "healthy" {
                        overall_status = "unhealthy";
                    }
                    check
                }
                Err(e) => {
                    overall_status = "unhealthy";
                    HealthCheck {
                        status: "unhealthy".to_string(),
                        message: Some(e.to_string()),
                        duration_ms: duration.as_millis() as u64,
                    }
                }
            };

            checks.insert(name.clone(), health_check);
        }

        HealthStatus {
            status: overall_status.to_string(),
            timestamp: Utc::now(),
            version: self.version.clone(),
            checks,
        }
    }
}
