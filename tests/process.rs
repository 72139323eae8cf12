use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use brewvisor::{
    Config, Event, EventBus, HandlerError, HandlerFn, JobError, JobFn, JobId, Process,
    ProcessStatus, Scheduler, Step, StepContext, StepDefinition, StepError, StepResult, StepState,
    StepTypes,
};

type Log = Arc<Mutex<Vec<String>>>;

/// Step whose behavior comes from its `result` property.
struct Scripted {
    id: String,
    log: Log,
}

#[async_trait]
impl Step for Scripted {
    async fn on_start(&self, _ctx: &StepContext) -> Result<(), StepError> {
        self.log.lock().push(format!("on_start:{}", self.id));
        Ok(())
    }

    async fn run(&self, ctx: &StepContext) -> Result<StepResult, StepError> {
        self.log.lock().push(format!("run:{}", self.id));
        match ctx.prop::<String>("result").as_deref() {
            Some("stop") => Ok(StepResult::Stop),
            Some("error") => Ok(StepResult::Error),
            Some("fail") => Err(StepError::new("sensor lost")),
            Some("hold") => {
                ctx.token().cancelled().await;
                Ok(StepResult::Stop)
            }
            _ => Ok(StepResult::Next),
        }
    }

    async fn on_stop(&self, _ctx: &StepContext) {
        self.log.lock().push(format!("on_stop:{}", self.id));
    }
}

/// Step that cannot start.
struct Broken {
    log: Log,
}

#[async_trait]
impl Step for Broken {
    async fn on_start(&self, _ctx: &StepContext) -> Result<(), StepError> {
        Err(StepError::new("no kettle assigned"))
    }

    async fn run(&self, _ctx: &StepContext) -> Result<StepResult, StepError> {
        self.log.lock().push("run:broken".to_string());
        Ok(StepResult::Done)
    }

    async fn on_stop(&self, _ctx: &StepContext) {
        self.log.lock().push("on_stop:broken".to_string());
    }
}

/// Step keeping a periodic control job alive while it is active.
struct Boil {
    control: Mutex<Option<JobId>>,
}

#[async_trait]
impl Step for Boil {
    async fn on_start(&self, ctx: &StepContext) -> Result<(), StepError> {
        let job = JobFn::arc("heater-control", |_ctx: CancellationToken| async move {
            Ok::<_, JobError>(())
        });
        let id = ctx
            .scheduler()
            .schedule_periodic(job, Duration::from_millis(20))
            .map_err(|e| StepError::new(e.to_string()))?;
        *self.control.lock() = Some(id);
        Ok(())
    }

    async fn run(&self, ctx: &StepContext) -> Result<StepResult, StepError> {
        ctx.token().cancelled().await;
        Ok(StepResult::Stop)
    }

    async fn on_stop(&self, ctx: &StepContext) {
        let id = self.control.lock().take();
        if let Some(id) = id {
            ctx.scheduler().cancel(id).await;
        }
    }
}

/// Step that panics in the hook named by its `panic_in` property.
struct Jammed {
    log: Log,
}

#[async_trait]
impl Step for Jammed {
    async fn on_start(&self, ctx: &StepContext) -> Result<(), StepError> {
        if ctx.prop::<String>("panic_in").as_deref() == Some("on_start") {
            panic!("valve jammed");
        }
        Ok(())
    }

    async fn run(&self, ctx: &StepContext) -> Result<StepResult, StepError> {
        if ctx.prop::<String>("panic_in").as_deref() == Some("run") {
            panic!("valve jammed");
        }
        Ok(StepResult::Next)
    }

    async fn on_stop(&self, ctx: &StepContext) {
        self.log.lock().push(format!("on_stop:{}", ctx.id()));
        if ctx.prop::<String>("panic_in").as_deref() == Some("on_stop") {
            panic!("valve jammed");
        }
    }
}

fn types(log: &Log) -> StepTypes {
    let scripted = log.clone();
    let broken = log.clone();
    StepTypes::new()
        .with("scripted", move |def: &StepDefinition| {
            Ok(Arc::new(Scripted {
                id: def.id.clone(),
                log: scripted.clone(),
            }))
        })
        .with("broken", move |_def: &StepDefinition| {
            Ok(Arc::new(Broken {
                log: broken.clone(),
            }))
        })
        .with("boil", |_def: &StepDefinition| {
            Ok(Arc::new(Boil {
                control: Mutex::new(None),
            }))
        })
        .with("jammed", {
            let log = log.clone();
            move |_def: &StepDefinition| Ok(Arc::new(Jammed { log: log.clone() }))
        })
        .with(
            "jammed-factory",
            |_def: &StepDefinition| -> Result<Arc<Jammed>, StepError> {
                panic!("recipe table corrupt")
            },
        )
}

fn jammed(id: &str, panic_in: &str) -> StepDefinition {
    StepDefinition::new(id, id.to_uppercase(), "jammed").with_prop("panic_in", panic_in)
}

/// Runs `steps` to completion and checks the process failed at step `index`.
async fn assert_panic_fails_step(steps: Vec<StepDefinition>, index: usize) -> Log {
    let (p, _sched, log) = setup(steps);

    p.start().unwrap();
    let status = timeout(Duration::from_secs(5), p.wait())
        .await
        .expect("process stuck after a panic");
    assert_eq!(status, ProcessStatus::Failed);

    let snap = p.snapshot();
    assert_eq!(snap.steps[index].state, StepState::Error);
    assert!(
        snap.steps[index].summary.starts_with("panic: "),
        "summary was {:?}",
        snap.steps[index].summary
    );
    assert!(snap.steps[index + 1..].iter().all(|s| s.state == StepState::Initial));

    // The process is idle again and can be restarted.
    p.start().unwrap();
    assert_eq!(
        timeout(Duration::from_secs(5), p.wait()).await.unwrap(),
        ProcessStatus::Failed
    );
    log
}

fn step(id: &str, result: &str) -> StepDefinition {
    StepDefinition::new(id, id.to_uppercase(), "scripted").with_prop("result", result)
}

fn setup(steps: Vec<StepDefinition>) -> (Process, Arc<Scheduler>, Log) {
    let log: Log = Arc::default();
    let sched = Scheduler::new(Config::default(), EventBus::default());
    let process = Process::new(
        "brew",
        "Pale ale",
        steps,
        Arc::new(types(&log)),
        Arc::clone(&sched),
    )
    .unwrap();
    (process, sched, log)
}

fn states(p: &Process) -> Vec<StepState> {
    p.snapshot().steps.iter().map(|s| s.state).collect()
}

async fn wait_for_state(p: &Process, index: usize, state: StepState) {
    timeout(Duration::from_secs(5), async {
        while p.snapshot().steps[index].state != state {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("step did not reach the expected state");
}

fn count(log: &Log, entry: &str) -> usize {
    log.lock().iter().filter(|e| *e == entry).count()
}

#[tokio::test]
async fn test_stop_result_halts_process() {
    let (p, _sched, log) = setup(vec![step("a", "next"), step("b", "stop"), step("c", "next")]);

    p.start().unwrap();
    assert_eq!(p.wait().await, ProcessStatus::Stopped);
    assert_eq!(
        states(&p),
        vec![StepState::Done, StepState::Stop, StepState::Initial]
    );
    assert_eq!(count(&log, "on_stop:a"), 1);
    assert_eq!(count(&log, "on_stop:b"), 1);
    assert_eq!(count(&log, "on_start:c"), 0);
}

#[tokio::test]
async fn test_step_error_keeps_summary() {
    let (p, _sched, log) = setup(vec![step("a", "next"), step("b", "fail"), step("c", "next")]);

    p.start().unwrap();
    assert_eq!(p.wait().await, ProcessStatus::Failed);

    let snap = p.snapshot();
    assert_eq!(snap.steps[1].state, StepState::Error);
    assert_eq!(snap.steps[1].summary, "sensor lost");
    assert_eq!(snap.steps[2].state, StepState::Initial);
    assert_eq!(count(&log, "on_stop:b"), 1);
    assert_eq!(count(&log, "run:c"), 0);
}

#[tokio::test]
async fn test_error_result_halts_process() {
    let (p, _sched, _log) = setup(vec![step("a", "error"), step("b", "next")]);

    p.start().unwrap();
    assert_eq!(p.wait().await, ProcessStatus::Failed);
    assert_eq!(states(&p), vec![StepState::Error, StepState::Initial]);
}

#[tokio::test]
async fn test_stop_cancels_active_step() {
    let (p, sched, log) = setup(vec![step("a", "hold"), step("b", "next")]);

    p.start().unwrap();
    wait_for_state(&p, 0, StepState::Active).await;

    assert!(p.stop().await);
    assert_eq!(p.status(), ProcessStatus::Stopped);
    assert_eq!(states(&p), vec![StepState::Stop, StepState::Initial]);
    assert_eq!(count(&log, "on_stop:a"), 1);
    assert!(!sched.is_running("step:a"));
}

#[tokio::test]
async fn test_on_stop_runs_after_failed_on_start() {
    let (p, _sched, log) = setup(vec![StepDefinition::new("x", "X", "broken")]);

    p.start().unwrap();
    assert_eq!(p.wait().await, ProcessStatus::Failed);

    let snap = p.snapshot();
    assert_eq!(snap.steps[0].state, StepState::Error);
    assert_eq!(snap.steps[0].summary, "no kettle assigned");
    assert_eq!(count(&log, "on_stop:broken"), 1);
    assert_eq!(count(&log, "run:broken"), 0);
}

#[tokio::test]
async fn test_resume_then_skip() {
    let (p, _sched, log) = setup(vec![step("a", "next"), step("b", "hold"), step("c", "next")]);

    p.start().unwrap();
    wait_for_state(&p, 1, StepState::Active).await;
    assert!(p.stop().await);
    assert_eq!(states(&p)[1], StepState::Stop);

    // Resumes at the first step that is not DONE.
    p.start().unwrap();
    wait_for_state(&p, 1, StepState::Active).await;
    assert_eq!(count(&log, "on_start:a"), 1);
    assert_eq!(count(&log, "on_start:b"), 2);

    assert!(p.next());
    assert_eq!(p.wait().await, ProcessStatus::Completed);
    assert_eq!(states(&p), vec![StepState::Done; 3]);
    assert_eq!(count(&log, "on_stop:b"), 2);
}

#[tokio::test]
async fn test_next_without_active_step() {
    let (p, _sched, _log) = setup(vec![step("a", "next")]);
    assert!(!p.next());
}

#[tokio::test]
async fn test_start_twice_rejected() {
    let (p, _sched, _log) = setup(vec![step("a", "hold")]);

    p.start().unwrap();
    assert_eq!(p.start().unwrap_err().as_label(), "process_already_running");
    assert_eq!(p.reset().unwrap_err().as_label(), "process_already_running");
    assert!(p.stop().await);
}

#[tokio::test]
async fn test_step_controls_periodic_job() {
    let (p, sched, _log) = setup(vec![StepDefinition::new("boil", "Boil", "boil")]);

    p.start().unwrap();
    wait_for_state(&p, 0, StepState::Active).await;
    assert!(sched.is_running("heater-control"));

    assert!(p.stop().await);
    assert!(!sched.is_running("heater-control"));
}

#[tokio::test]
async fn test_step_updates_are_published() {
    let (p, sched, _log) = setup(vec![step("a", "next")]);

    let (tx, mut rx) = mpsc::unbounded_channel();
    sched
        .bus()
        .register(
            "step/+/update",
            HandlerFn::arc("updates", move |ev: Event| {
                let tx = tx.clone();
                async move {
                    let status = ev.get("status").and_then(Value::as_str).map(str::to_string);
                    let _ = tx.send((ev.topic.as_str().to_string(), status));
                    Ok::<_, HandlerError>(())
                }
            }),
        )
        .unwrap();

    p.start().unwrap();
    assert_eq!(p.wait().await, ProcessStatus::Completed);

    let mut seen: Vec<(String, Option<String>)> = Vec::new();
    timeout(Duration::from_secs(5), async {
        while !seen.iter().any(|(_, s)| s.as_deref() == Some("D")) {
            seen.push(rx.recv().await.unwrap());
        }
    })
    .await
    .unwrap();

    assert!(seen.iter().all(|(topic, _)| topic == "step/a/update"));
    assert!(seen.iter().any(|(_, s)| s.as_deref() == Some("A")));
}

#[tokio::test]
async fn test_panic_in_run_marks_error() {
    let steps = vec![step("a", "next"), jammed("b", "run"), step("c", "next")];
    let log = assert_panic_fails_step(steps, 1).await;
    assert_eq!(count(&log, "on_stop:b"), 2);
    assert_eq!(count(&log, "run:c"), 0);
}

#[tokio::test]
async fn test_panic_in_on_start_marks_error() {
    let log = assert_panic_fails_step(vec![jammed("a", "on_start"), step("b", "next")], 0).await;
    assert_eq!(count(&log, "on_stop:a"), 2);
    assert_eq!(count(&log, "on_start:b"), 0);
}

#[tokio::test]
async fn test_panic_in_on_stop_marks_error() {
    let log = assert_panic_fails_step(vec![jammed("a", "on_stop"), step("b", "next")], 0).await;
    assert_eq!(count(&log, "on_stop:a"), 2);
    assert_eq!(count(&log, "on_start:b"), 0);
}

#[tokio::test]
async fn test_panic_in_factory_marks_error() {
    let log = assert_panic_fails_step(
        vec![StepDefinition::new("a", "A", "jammed-factory"), step("b", "next")],
        0,
    )
    .await;
    assert!(log.lock().is_empty());
}
