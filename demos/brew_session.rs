//! # Example: brew_session
//!
//! Runs a short simulated brew day on the runtime.
//!
//! Shows how to:
//! - Register bus handlers through a [`HandlerTable`]
//! - Host a simulated kettle as a [`DeviceJob`]
//! - Define step types and drive a [`Process`](brewvisor::Process) to completion
//! - Shut down on Ctrl+C or when the process ends
//!
//! ## Flow
//! ```text
//! main()
//!   ├─► RuntimeBuilder (event log, failure log, kettle watcher, startup)
//!   ├─► submit DeviceJob(kettle)  ─► publishes kettle/main/update
//!   └─► process "pale-ale"
//!         ├─► heat   (kettle target 30°C, waits until reached)
//!         ├─► mash   (timer rest)
//!         └─► boil   (kettle target 40°C, timer)
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=info,brewvisor=debug cargo run --example brew_session
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use brewvisor::{
    Config, Device, DeviceJob, Event, HandlerError, HandlerFn, HandlerTable, JobError,
    ProcessStatus, RuntimeBuilder, StartupSequence, Step, StepContext, StepDefinition, StepError,
    StepResult, StepTypes, publish_update,
};

/// Simulated kettle: moves 2°C per tick towards its target.
struct Kettle {
    bus: brewvisor::EventBus,
    temp: Mutex<f64>,
    target: Arc<Mutex<f64>>,
}

#[async_trait]
impl Device for Kettle {
    fn kind(&self) -> &str {
        "kettle"
    }

    fn id(&self) -> &str {
        "main"
    }

    async fn run(&self, ctx: CancellationToken) -> Result<(), JobError> {
        loop {
            tokio::select! {
                _ = ctx.cancelled() => return Ok(()),
                _ = tokio::time::sleep(Duration::from_millis(100)) => {}
            }
            let target = *self.target.lock();
            let temp = {
                let mut t = self.temp.lock();
                *t += (target - *t).clamp(-2.0, 2.0);
                *t
            };
            publish_update(&self.bus, self, json!({ "temp": temp, "target": target }))
                .map_err(|e| JobError::fatal(e.to_string()))?;
        }
    }

    async fn stop(&self) {
        *self.target.lock() = 20.0;
        tracing::info!("kettle heater off");
    }
}

/// Sets the kettle target and waits until the temperature is reached.
struct Heat {
    target: Arc<Mutex<f64>>,
    temp: Arc<Mutex<f64>>,
}

#[async_trait]
impl Step for Heat {
    async fn on_start(&self, ctx: &StepContext) -> Result<(), StepError> {
        let target: f64 = ctx.prop("temp").ok_or("missing temp")?;
        *self.target.lock() = target;
        Ok(())
    }

    async fn run(&self, ctx: &StepContext) -> Result<StepResult, StepError> {
        let target: f64 = ctx.prop("temp").ok_or("missing temp")?;
        while !ctx.is_cancelled() {
            let temp = *self.temp.lock();
            ctx.set_summary(format!("{temp:.1} / {target:.1} °C"));
            if temp >= target - 0.5 {
                return Ok(StepResult::Next);
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        Ok(StepResult::Stop)
    }
}

/// Holds for `minutes` (scaled to seconds here) with an optional kettle target.
struct Rest {
    target: Arc<Mutex<f64>>,
}

#[async_trait]
impl Step for Rest {
    async fn on_start(&self, ctx: &StepContext) -> Result<(), StepError> {
        if let Some(temp) = ctx.prop::<f64>("temp") {
            *self.target.lock() = temp;
        }
        let secs: u64 = ctx.prop("minutes").unwrap_or(1);
        ctx.timer().start(Duration::from_secs(secs));
        Ok(())
    }

    async fn run(&self, ctx: &StepContext) -> Result<StepResult, StepError> {
        ctx.set_summary("resting");
        if ctx.timer().wait(ctx.token()).await {
            Ok(StepResult::Next)
        } else {
            Ok(StepResult::Stop)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let temp = Arc::new(Mutex::new(20.0));
    let target = Arc::new(Mutex::new(20.0));

    let watcher = HandlerTable::new("watcher").on(
        "kettle/+/update",
        HandlerFn::arc("kettle-temp", {
            let temp = temp.clone();
            move |ev: Event| {
                let temp = temp.clone();
                async move {
                    if let Some(t) = ev.field::<f64>("temp") {
                        *temp.lock() = t;
                    }
                    Ok::<_, HandlerError>(())
                }
            }
        }),
    );
    let startup = StartupSequence::new().add_fn(0, "load-recipes", |_ctx| async {
        tracing::info!("recipes loaded");
        Ok::<_, JobError>(())
    });
    let types = StepTypes::new()
        .with("heat", {
            let (target, temp) = (target.clone(), temp.clone());
            move |_def: &StepDefinition| {
                Ok(Arc::new(Heat {
                    target: target.clone(),
                    temp: temp.clone(),
                }))
            }
        })
        .with("rest", {
            let target = target.clone();
            move |_def: &StepDefinition| {
                Ok(Arc::new(Rest {
                    target: target.clone(),
                }))
            }
        });

    let runtime = RuntimeBuilder::new(Config::default())
        .with_event_log()
        .with_failure_log()
        .with_handlers(watcher)
        .with_startup(startup)
        .with_step_types(types)
        .start()
        .await?;

    let kettle = Arc::new(Kettle {
        bus: runtime.bus().clone(),
        temp: Mutex::new(20.0),
        target: target.clone(),
    });
    runtime.scheduler().submit(DeviceJob::arc(kettle))?;

    let brew = runtime.process(
        "pale-ale",
        "Pale ale",
        vec![
            StepDefinition::new("heat", "Heat strike water", "heat").with_prop("temp", 30.0),
            StepDefinition::new("mash", "Mash rest", "rest").with_prop("minutes", 2),
            StepDefinition::new("boil", "Boil", "rest")
                .with_prop("temp", 40.0)
                .with_prop("minutes", 2),
        ],
    )?;
    brew.start()?;

    tokio::select! {
        status = brew.wait() => {
            tracing::info!(status = status.as_label(), "brew finished");
            println!("{}", serde_json::to_string_pretty(&brew.snapshot())?);
            runtime.shutdown().await;
            if status != ProcessStatus::Completed {
                anyhow::bail!("brew ended as {}", status.as_label());
            }
        }
        signal = runtime.run_until_signal() => {
            let signal = signal?;
            tracing::info!(signal = %signal, status = brew.status().as_label(), "interrupted");
        }
    }
    Ok(())
}
