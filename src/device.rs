//! # Device drivers hosted as jobs.
//!
//! Actuators and sensors are external collaborators. A driver implements
//! [`Device`]; [`DeviceJob`] runs its lifecycle under the scheduler:
//!
//! ```text
//! start() ──► run(ctx) ──► stop()
//!    │           │           ▲
//!    └─ Err ─────┴─ Err / ctx cancelled ─┘   stop() always runs
//! ```
//!
//! Drivers report state with [`publish_update`] on `<kind>/<id>/update`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::{BusError, JobError};
use crate::events::EventBus;
use crate::jobs::Job;

/// A hardware driver (actuator, sensor, kettle, fermenter...).
#[async_trait]
pub trait Device: Send + Sync + 'static {
    /// Resource kind used in topics, e.g. `actor` or `sensor`.
    fn kind(&self) -> &str;

    /// Instance identifier used in topics.
    fn id(&self) -> &str;

    /// Brings the device up.
    async fn start(&self) -> Result<(), JobError> {
        Ok(())
    }

    /// Main loop; should return once `ctx` fires.
    async fn run(&self, ctx: CancellationToken) -> Result<(), JobError>;

    /// Brings the device to a safe state. Called on every exit path.
    async fn stop(&self) {}
}

/// Publishes `<kind>/<id>/update` for `device`.
pub fn publish_update(bus: &EventBus, device: &dyn Device, payload: Value) -> Result<usize, BusError> {
    bus.publish(&format!("{}/{}/update", device.kind(), device.id()), payload)
}

/// Job adapter running a [`Device`] lifecycle.
pub struct DeviceJob {
    name: String,
    device: Arc<dyn Device>,
}

impl DeviceJob {
    /// Wraps `device`; the job is named `<kind>:<id>`.
    pub fn new(device: Arc<dyn Device>) -> Self {
        let name = format!("{}:{}", device.kind(), device.id());
        Self { name, device }
    }

    /// Wraps `device` and returns the job as a shared handle.
    pub fn arc(device: Arc<dyn Device>) -> Arc<Self> {
        Arc::new(Self::new(device))
    }
}

#[async_trait]
impl Job for DeviceJob {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: CancellationToken) -> Result<(), JobError> {
        let res = match self.device.start().await {
            Ok(()) => self.device.run(ctx.clone()).await,
            Err(e) => Err(e),
        };
        self.device.stop().await;
        tracing::debug!(device = %self.name, ok = res.is_ok(), "device stopped");

        match res {
            Ok(()) if ctx.is_cancelled() => Err(JobError::Canceled),
            other => other,
        }
    }
}
