//! End-to-end tests for the task engine.
//!
//! Each test wires a `TaskContext`, a `Broadcaster` and a
//! `WorkerController` together with an in-process converter and drives
//! tasks from submission to a terminal state.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use partbridge_core::converter::{
    ConversionError, ConversionResult, ConversionStage, Converter, ProgressSink,
};
use partbridge_core::error::CoreError;
use partbridge_core::job::{CreateTaskRequest, JobSpec};
use partbridge_core::task::TaskStatus;
use partbridge_engine::{Broadcaster, TaskContext, WorkerController};
use partbridge_events::EventBus;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Engine {
    ctx: Arc<TaskContext>,
    broadcaster: Broadcaster,
    workers: WorkerController,
    cancel: CancellationToken,
}

fn engine(converter: Arc<dyn Converter>) -> Engine {
    let ctx = Arc::new(TaskContext::new(Arc::new(EventBus::default())));
    let broadcaster = Broadcaster::new(Arc::clone(&ctx));
    let cancel = CancellationToken::new();
    broadcaster.clone().spawn(cancel.clone());
    let workers = WorkerController::new(Arc::clone(&ctx), converter);
    Engine {
        ctx,
        broadcaster,
        workers,
        cancel,
    }
}

fn request(lcsc_id: &str) -> CreateTaskRequest {
    CreateTaskRequest {
        lcsc_id: lcsc_id.to_string(),
        output_path: "/tmp/partbridge/Lib".to_string(),
        symbol: true,
        ..Default::default()
    }
}

fn spec(lcsc_id: &str) -> JobSpec {
    JobSpec::try_from(request(lcsc_id)).unwrap()
}

/// Succeeds with a symbol path derived from the job.
fn symbol_converter(spec: &JobSpec, progress: &ProgressSink) -> Result<ConversionResult, ConversionError> {
    progress.report(ConversionStage::Symbol, 60, "Symbol exported");
    Ok(ConversionResult {
        symbol_path: Some(format!("{}.kicad_sym", spec.output_prefix)),
        ..Default::default()
    })
}

/// Blocks each conversion until the test releases it, recording the
/// order in which jobs arrive.
struct GatedConverter {
    gate: Mutex<mpsc::Receiver<()>>,
    seen: Mutex<Vec<String>>,
}

impl GatedConverter {
    fn new() -> (Arc<Self>, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        let converter = Arc::new(Self {
            gate: Mutex::new(rx),
            seen: Mutex::new(Vec::new()),
        });
        (converter, tx)
    }
}

impl Converter for GatedConverter {
    fn convert(
        &self,
        spec: &JobSpec,
        _progress: &ProgressSink,
    ) -> Result<ConversionResult, ConversionError> {
        self.seen.lock().unwrap().push(spec.lcsc_id.clone());
        self.gate
            .lock()
            .unwrap()
            .recv()
            .map_err(|_| ConversionError::Failed("gate closed".into()))?;
        Ok(ConversionResult::default())
    }
}

// ---------------------------------------------------------------------------
// Test: a submitted task completes with its result
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submitted_task_completes_with_symbol_path() {
    let engine = engine(Arc::new(symbol_converter));
    let task = engine.ctx.submit(spec("C2040")).await;
    assert_eq!(task.status, TaskStatus::Queued);

    engine.workers.start().await;
    engine.workers.stop().await;

    let summary = engine.ctx.summary(&task.id).await.unwrap();
    assert_eq!(summary.status, TaskStatus::Completed);
    assert_eq!(summary.progress, 100);
    assert_eq!(
        summary.result.unwrap().symbol_path.as_deref(),
        Some("/tmp/partbridge/Lib.kicad_sym")
    );
}

// ---------------------------------------------------------------------------
// Test: a converter error keeps the last progress and records the error
// ---------------------------------------------------------------------------

#[tokio::test]
async fn converter_error_after_progress_fails_task() {
    let converter = |_: &JobSpec, progress: &ProgressSink| -> Result<ConversionResult, ConversionError> {
        progress.report(ConversionStage::Fetching, 50, "Fetching");
        Err(ConversionError::Failed("EasyEDA API returned no data".into()))
    };
    let engine = engine(Arc::new(converter));
    let task = engine.ctx.submit(spec("C2040")).await;

    engine.workers.start().await;
    engine.workers.stop().await;

    let summary = engine.ctx.summary(&task.id).await.unwrap();
    assert_eq!(summary.status, TaskStatus::Failed);
    assert_eq!(summary.progress, 50);
    assert!(!summary.error.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Test: the second task waits at position 1 and runs after the first
// ---------------------------------------------------------------------------

#[tokio::test]
async fn second_task_waits_for_the_first() {
    let (converter, release) = GatedConverter::new();
    let engine = engine(Arc::clone(&converter) as Arc<dyn Converter>);
    let first = engine.ctx.submit(spec("C1")).await;
    let second = engine.ctx.submit(spec("C2")).await;

    let mut watch_first = engine.broadcaster.subscribe(first.id).await.unwrap();
    engine.workers.start().await;
    loop {
        let snapshot = watch_first.recv().await.unwrap();
        if snapshot.status == TaskStatus::Running {
            break;
        }
    }

    let waiting = engine.ctx.summary(&second.id).await.unwrap();
    assert_eq!(waiting.status, TaskStatus::Queued);
    assert_eq!(waiting.queue_position, Some(1));

    release.send(()).unwrap();
    release.send(()).unwrap();
    engine.workers.stop().await;

    let first = engine.ctx.summary(&first.id).await.unwrap();
    let second = engine.ctx.summary(&second.id).await.unwrap();
    assert_eq!(first.status, TaskStatus::Completed);
    assert_eq!(second.status, TaskStatus::Completed);
    assert!(second.started_at.unwrap() >= first.finished_at.unwrap());
    assert_eq!(*converter.seen.lock().unwrap(), vec!["C1", "C2"]);
}

// ---------------------------------------------------------------------------
// Test: stop waits for every pending task
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stop_processes_all_pending_tasks() {
    let engine = engine(Arc::new(symbol_converter));
    let mut ids = Vec::new();
    for lcsc_id in ["C1", "C2", "C3"] {
        ids.push(engine.ctx.submit(spec(lcsc_id)).await.id);
    }
    assert_eq!(engine.ctx.running_count().await, 0);

    engine.workers.start().await;
    engine.workers.stop().await;

    for id in &ids {
        assert!(engine.ctx.summary(id).await.unwrap().status.is_terminal());
    }
    assert_eq!(engine.ctx.outstanding(), 0);
}

// ---------------------------------------------------------------------------
// Test: a request without outputs never reaches the registry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn request_without_outputs_is_rejected_before_queueing() {
    let engine = engine(Arc::new(symbol_converter));
    let request = CreateTaskRequest {
        symbol: false,
        ..request("C2040")
    };

    assert_matches!(JobSpec::try_from(request), Err(CoreError::Validation(_)));
    assert_eq!(engine.ctx.task_count().await, 0);
    assert_eq!(engine.ctx.pending_len().await, 0);
}

// ---------------------------------------------------------------------------
// Test: tasks run one at a time in submission order
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn tasks_run_one_at_a_time_in_order() {
    struct Tracking {
        active: AtomicUsize,
        peak: AtomicUsize,
        order: Mutex<Vec<String>>,
    }

    impl Converter for Tracking {
        fn convert(
            &self,
            spec: &JobSpec,
            _progress: &ProgressSink,
        ) -> Result<ConversionResult, ConversionError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.order.lock().unwrap().push(spec.lcsc_id.clone());
            std::thread::sleep(Duration::from_millis(5));
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(ConversionResult::default())
        }
    }

    let tracking = Arc::new(Tracking {
        active: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
        order: Mutex::new(Vec::new()),
    });
    let engine = engine(Arc::clone(&tracking) as Arc<dyn Converter>);
    engine.workers.start().await;

    let expected: Vec<String> = (1..=6).map(|n| format!("C{n}")).collect();
    for lcsc_id in &expected {
        engine.ctx.submit(spec(lcsc_id)).await;
    }
    engine.workers.stop().await;

    assert_eq!(tracking.peak.load(Ordering::SeqCst), 1);
    assert_eq!(*tracking.order.lock().unwrap(), expected);
}

// ---------------------------------------------------------------------------
// Test: one failing task does not affect the next
// ---------------------------------------------------------------------------

#[tokio::test]
async fn panicking_conversion_does_not_stop_the_worker() {
    let converter = |spec: &JobSpec, progress: &ProgressSink| {
        if spec.lcsc_id == "C666" {
            panic!("converter crashed");
        }
        symbol_converter(spec, progress)
    };
    let engine = engine(Arc::new(converter));
    let bad = engine.ctx.submit(spec("C666")).await;
    let good = engine.ctx.submit(spec("C2040")).await;

    engine.workers.start().await;
    engine.workers.stop().await;

    let bad = engine.ctx.summary(&bad.id).await.unwrap();
    assert_eq!(bad.status, TaskStatus::Failed);
    assert!(bad.error.unwrap().contains("converter crashed"));
    assert_eq!(
        engine.ctx.summary(&good.id).await.unwrap().status,
        TaskStatus::Completed
    );
}

// ---------------------------------------------------------------------------
// Test: observers see non-decreasing progress and the terminal snapshot
// ---------------------------------------------------------------------------

#[tokio::test]
async fn observer_sees_monotonic_progress_until_terminal() {
    let converter = |_: &JobSpec, progress: &ProgressSink| {
        progress.report(ConversionStage::Fetching, 10, "Fetching");
        progress.report(ConversionStage::Symbol, 50, "Symbol");
        progress.report(ConversionStage::Footprint, 30, "Footprint");
        progress.report(ConversionStage::Model, 80, "Model");
        Ok::<_, ConversionError>(ConversionResult::default())
    };
    let engine = engine(Arc::new(converter));
    let task = engine.ctx.submit(spec("C2040")).await;
    let mut sub = engine.broadcaster.subscribe(task.id).await.unwrap();

    engine.workers.start().await;

    let mut seen = Vec::new();
    while let Some(snapshot) = sub.recv().await {
        let terminal = snapshot.status.is_terminal();
        seen.push(snapshot);
        if terminal {
            break;
        }
    }
    engine.workers.stop().await;
    engine.cancel.cancel();

    assert_eq!(seen.first().unwrap().status, TaskStatus::Queued);
    let last = seen.last().unwrap();
    assert_eq!(last.status, TaskStatus::Completed);
    assert_eq!(last.progress, 100);
    assert!(seen.windows(2).all(|w| w[0].progress <= w[1].progress));
}
