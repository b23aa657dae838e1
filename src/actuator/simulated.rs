//! Stand-in actuator for test clusters

use super::{ActuationReport, FenceActuator};
use crate::error::ActuatorError;
use crate::message::{FenceAction, FilesystemSet};

use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

/// Waits for a fixed delay and reports success
#[derive(Debug, Clone)]
pub struct SimulatedActuator {
    delay: Duration,
}

impl SimulatedActuator {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl FenceActuator for SimulatedActuator {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn act(
        &self,
        action: FenceAction,
        target: &str,
        filesystems: &FilesystemSet,
    ) -> Result<ActuationReport, ActuatorError> {
        info!("[SIMULATED] Performing fence action: {} on {}", action, target);
        info!("[SIMULATED] Filesystems affected: {}", filesystems);
        tokio::time::sleep(self.delay).await;
        Ok(ActuationReport::succeeded(format!(
            "Simulated fence {} succeeded for {}",
            action, target
        )))
    }
}
