use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use camrelay::camera::{
    AnalysisResult, AnalyzerTarget, CaptureArbiter, CaptureProvider, CaptureRequest, CaptureRequestState,
    CaptureTarget, ConsumerSlot, DeviceCharacteristics, DeviceInfo, DeviceSelector, FrameAnalyzer, LensFacing,
    PreviewTarget, RecordTarget, RequestSpec, VideoFrame,
};
use camrelay::error::CaptureError;
use camrelay::model::{Framerate, Resolution};
use camrelay::sim::SimProvider;

fn provider() -> Arc<SimProvider> {
    let chars = DeviceCharacteristics {
        sizes: vec![Resolution::new(1280, 720), Resolution::new(320, 240)],
        framerates: vec![Framerate::fixed(30), Framerate::fixed(15)],
        max_record_size: Some(Resolution::new(1280, 720)),
    };
    let device = |id: &str, facing, backward_compatible| DeviceInfo {
        id: id.to_string(),
        facing,
        backward_compatible,
    };

    Arc::new(SimProvider::new(
        vec![
            (device("front", LensFacing::Front, true), chars.clone()),
            (device("back", LensFacing::Back, true), chars.clone()),
            (device("depth", LensFacing::Back, false), chars.clone()),
            (device("usb", LensFacing::External, true), chars),
        ],
        Duration::from_millis(5),
    ))
}

fn request(label: &'static str) -> Arc<CaptureRequest> {
    Arc::new(CaptureRequest::new(
        label,
        RequestSpec {
            resolution: Some(Resolution::new(320, 240)),
            framerate: None,
        },
    ))
}

#[tokio::test]
async fn preempted_preview_comes_back() {
    let provider = provider();
    let arbiter = CaptureArbiter::new(provider.clone()).unwrap();

    arbiter.attach(ConsumerSlot::Preview, request("preview"));
    arbiter.attach(ConsumerSlot::Record, request("record"));
    arbiter.attach(ConsumerSlot::Analyze, request("analyze"));
    arbiter.sync().await;

    assert_eq!(arbiter.active_slots(), vec![ConsumerSlot::Record, ConsumerSlot::Analyze]);
    assert_eq!(provider.bound_labels(), vec!["record", "analyze"]);
    assert!(arbiter.is_attached(ConsumerSlot::Preview));

    arbiter.detach(ConsumerSlot::Analyze);
    arbiter.sync().await;

    assert_eq!(arbiter.active_slots(), vec![ConsumerSlot::Record, ConsumerSlot::Preview]);
    assert_eq!(provider.bound_labels(), vec!["record", "preview"]);
}

#[tokio::test]
async fn reattaching_preempted_slot_only_swaps_its_request() {
    let provider = provider();
    let arbiter = CaptureArbiter::new(provider.clone()).unwrap();

    arbiter.attach(ConsumerSlot::Record, request("record"));
    arbiter.attach(ConsumerSlot::Analyze, request("analyze"));
    arbiter.attach(ConsumerSlot::Preview, request("preview-1"));
    arbiter.attach(ConsumerSlot::Preview, request("preview-2"));
    arbiter.sync().await;
    assert_eq!(provider.bound_labels(), vec!["record", "analyze"]);

    arbiter.detach(ConsumerSlot::Record);
    arbiter.sync().await;
    assert_eq!(provider.bound_labels(), vec!["analyze", "preview-2"]);
}

#[tokio::test]
async fn last_detach_stops_the_device() {
    let provider = provider();
    let arbiter = CaptureArbiter::new(provider.clone()).unwrap();

    arbiter.attach(ConsumerSlot::Record, request("record"));
    arbiter.sync().await;
    assert!(provider.is_running());
    assert!(arbiter.device().is_started());

    arbiter.detach(ConsumerSlot::Record);
    assert!(!arbiter.device().is_started());
    arbiter.sync().await;

    assert!(!provider.is_running());
    assert!(provider.bound_labels().is_empty());
    assert!(arbiter.active_slots().is_empty());
}

#[tokio::test]
async fn failed_bind_keeps_previous_binding() {
    let provider = provider();
    let arbiter = CaptureArbiter::new(provider.clone()).unwrap();

    arbiter.attach(ConsumerSlot::Record, request("record"));
    arbiter.sync().await;

    provider.fail_next_binds(1);
    arbiter.attach(ConsumerSlot::Preview, request("preview"));
    arbiter.sync().await;

    assert_eq!(provider.bound_labels(), vec!["record"]);
    let bound: Vec<_> = arbiter.device().bound_requests().iter().map(|r| r.label()).collect();
    assert_eq!(bound, vec!["record"]);
}

/// Provider whose binds wait for a permit, so commands pile up in the queue
struct GatedProvider {
    permits: Semaphore,
    binds_entered: AtomicUsize,
    running: AtomicBool,
}

impl GatedProvider {
    fn new() -> Self {
        Self {
            permits: Semaphore::new(0),
            binds_entered: AtomicUsize::new(0),
            running: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl CaptureProvider for GatedProvider {
    async fn ready(&self) -> Result<(), CaptureError> {
        Ok(())
    }

    fn devices(&self) -> Vec<DeviceInfo> {
        vec![DeviceInfo {
            id: "back".into(),
            facing: LensFacing::Back,
            backward_compatible: true,
        }]
    }

    fn characteristics(&self, _device_id: &str) -> Option<DeviceCharacteristics> {
        None
    }

    async fn bind(&self, _selector: &DeviceSelector, _requests: &[Arc<CaptureRequest>]) -> Result<String, CaptureError> {
        self.binds_entered.fetch_add(1, Ordering::SeqCst);
        if let Ok(permit) = self.permits.acquire().await {
            permit.forget();
        }
        Ok("back".into())
    }

    async fn unbind_all(&self) {}

    async fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }
}

async fn wait_for_binds(provider: &GatedProvider, count: usize) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while provider.binds_entered.load(Ordering::SeqCst) < count {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("bind never reached the provider");
}

#[tokio::test]
async fn queued_stop_does_not_outlive_later_attach() {
    let provider = Arc::new(GatedProvider::new());
    let arbiter = CaptureArbiter::new(provider.clone()).unwrap();

    arbiter.attach(ConsumerSlot::Preview, request("preview-1"));
    wait_for_binds(&provider, 1).await;
    arbiter.detach(ConsumerSlot::Preview);
    arbiter.attach(ConsumerSlot::Preview, request("preview-2"));
    arbiter.detach(ConsumerSlot::Preview);

    // First stop runs while the second is still queued behind bind #1
    provider.permits.add_permits(1);
    wait_for_binds(&provider, 2).await;
    arbiter.attach(ConsumerSlot::Preview, request("preview-3"));

    provider.permits.add_permits(8);
    arbiter.sync().await;

    assert!(arbiter.is_attached(ConsumerSlot::Preview));
    assert!(arbiter.device().is_started());
    assert!(provider.running.load(Ordering::SeqCst));
}

#[tokio::test]
async fn device_switching_order() {
    let provider = provider();
    let arbiter = CaptureArbiter::new(provider.clone()).unwrap();
    assert_eq!(arbiter.current_device_id().as_deref(), Some("usb"));

    arbiter.attach(ConsumerSlot::Record, request("record"));
    assert_eq!(arbiter.switch_next_device().as_deref(), Some("back"));
    assert_eq!(arbiter.switch_next_device().as_deref(), Some("front"));
    assert_eq!(arbiter.switch_next_device().as_deref(), Some("usb"));
    arbiter.sync().await;

    let devices: Vec<_> = provider.bind_history().into_iter().map(|b| b.device_id).collect();
    assert_eq!(devices, vec!["usb", "back", "front", "usb"]);
}

#[tokio::test]
async fn bound_requests_receive_frames() {
    let provider = provider();
    let arbiter = CaptureArbiter::new(provider.clone()).unwrap();
    let record = request("record");

    arbiter.attach(ConsumerSlot::Record, record.clone());
    let frame = tokio::time::timeout(Duration::from_secs(2), record.frames().recv())
        .await
        .expect("no frame produced");
    assert_eq!(frame.resolution, Resolution::new(320, 240));
    assert_eq!(frame.planes.len(), 2);
}

#[tokio::test]
async fn record_target_uses_default_record_size() {
    let provider = provider();
    let arbiter = Arc::new(CaptureArbiter::new(provider.clone()).unwrap());
    let record = RecordTarget::new(arbiter.clone());

    let mut updates = record.request().subscribe();
    assert!(matches!(updates.recv().await, Some(CaptureRequestState::Stopped)));

    record.start();
    let Some(CaptureRequestState::Available(request)) = updates.recv().await else {
        panic!("record request not published");
    };
    assert_eq!(request.spec().resolution, Some(Resolution::new(1280, 720)));
    assert!(arbiter.is_attached(ConsumerSlot::Record));

    record.set_framerate(Some(15));
    let Some(CaptureRequestState::Available(rebuilt)) = updates.recv().await else {
        panic!("record request not rebuilt");
    };
    assert_ne!(rebuilt.id(), request.id());
    assert_eq!(rebuilt.spec().framerate, Some(Framerate::fixed(15)));

    record.stop();
    assert!(matches!(updates.recv().await, Some(CaptureRequestState::Stopped)));
    assert!(!arbiter.is_attached(ConsumerSlot::Record));
}

#[tokio::test]
async fn preview_is_bounded_by_window() {
    let provider = provider();
    let arbiter = Arc::new(CaptureArbiter::new(provider.clone()).unwrap());
    let preview = PreviewTarget::new(arbiter.clone());

    preview.set_window_size(Some(Resolution::new(400, 400)));
    preview.start();

    let CaptureRequestState::Available(request) = preview.request().get() else {
        panic!("preview not started");
    };
    assert_eq!(request.spec().resolution, Some(Resolution::new(320, 240)));
    preview.stop();
}

struct CountingAnalyzer;

impl FrameAnalyzer for CountingAnalyzer {
    fn analyze(&self, frame: &VideoFrame) -> AnalysisResult {
        AnalysisResult {
            values: vec![frame.byte_len().to_string()],
        }
    }
}

#[tokio::test]
async fn analyzer_publishes_only_while_attached() {
    let provider = provider();
    let arbiter = Arc::new(CaptureArbiter::new(provider.clone()).unwrap());
    let analyzer = AnalyzerTarget::new(arbiter.clone(), Arc::new(CountingAnalyzer));

    let mut results = analyzer.request().subscribe();
    assert!(matches!(results.recv().await, Some(CaptureRequestState::Stopped)));

    analyzer.start();
    let published = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match results.recv().await {
                Some(CaptureRequestState::Available(result)) => break result,
                Some(CaptureRequestState::Stopped) => continue,
                None => panic!("analyzer state closed"),
            }
        }
    })
    .await
    .expect("no analysis published");
    assert_eq!(published.values.len(), 1);

    analyzer.stop();
    assert!(!arbiter.is_attached(ConsumerSlot::Analyze));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(matches!(analyzer.request().get(), CaptureRequestState::Stopped));
}

/// Blocks inside `analyze` until released
struct SlowAnalyzer {
    entered: crossbeam_channel::Sender<()>,
    release: crossbeam_channel::Receiver<()>,
}

impl FrameAnalyzer for SlowAnalyzer {
    fn analyze(&self, _frame: &VideoFrame) -> AnalysisResult {
        let _ = self.entered.try_send(());
        let _ = self.release.recv();
        AnalysisResult {
            values: vec!["late".into()],
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn analysis_finishing_after_stop_is_discarded() {
    let provider = provider();
    let arbiter = Arc::new(CaptureArbiter::new(provider.clone()).unwrap());
    let (entered_tx, entered_rx) = crossbeam_channel::bounded(1);
    let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);
    let analyzer = AnalyzerTarget::new(
        arbiter.clone(),
        Arc::new(SlowAnalyzer {
            entered: entered_tx,
            release: release_rx,
        }),
    );

    let mut states = analyzer.request().subscribe();
    assert!(matches!(states.recv().await, Some(CaptureRequestState::Stopped)));

    analyzer.start();
    tokio::task::spawn_blocking(move || entered_rx.recv_timeout(Duration::from_secs(2)))
        .await
        .unwrap()
        .expect("analyzer never received a frame");

    analyzer.stop();
    drop(release_tx);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(matches!(analyzer.request().get(), CaptureRequestState::Stopped));
    while let Ok(state) = states.try_recv() {
        assert!(matches!(state, CaptureRequestState::Stopped), "result published after stop");
    }
}
