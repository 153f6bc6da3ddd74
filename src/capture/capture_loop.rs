/// 采集线程 (Capture Loop)
/// 职责: 读帧 → (可选)推理 → 投递到UI线程 → 按帧率休眠
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use image::RgbImage;
use tracing::{debug, error, info, warn};

use super::sink::{FramePayload, UiEvent, UiSink};
use crate::detection::{Counts, SharedDetector};
use crate::error::DetectorError;
use crate::input::{frame_interval, CloseHandle, Frame, FrameSource, MediaKind};

/// 停止采集线程的默认等待时间
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_millis(500);

/// 休眠时检查停止标志的间隔
const STOP_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

impl LoopState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => LoopState::Running,
            2 => LoopState::Stopping,
            3 => LoopState::Stopped,
            _ => LoopState::Idle,
        }
    }
}

/// 预测开关: UI线程切换, 采集线程每次迭代开始时读取
#[derive(Clone, Default)]
pub struct PredictionSwitch {
    enabled: Arc<AtomicBool>,
    detector: Arc<Mutex<Option<SharedDetector>>>,
}

impl PredictionSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    /// 装入检测器并打开预测
    pub fn enable(&self, detector: SharedDetector) {
        if let Ok(mut slot) = self.detector.lock() {
            *slot = Some(detector);
        }
        self.enabled.store(true, Ordering::Release);
    }

    /// 关闭预测, 检测器保留到下次 enable
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// 预测开启时返回检测器
    pub fn active(&self) -> Option<SharedDetector> {
        if !self.is_enabled() {
            return None;
        }
        self.detector.lock().ok().and_then(|slot| slot.clone())
    }

    /// 卸载检测器
    pub fn unload(&self) {
        self.disable();
        if let Ok(mut slot) = self.detector.lock() {
            *slot = None;
        }
    }
}

pub struct CaptureLoop {
    generation: u64,
    kind: MediaKind,
    stop: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    close: CloseHandle,
    done_rx: Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl CaptureLoop {
    /// 启动采集线程, 立即进入 Running
    pub fn spawn(
        source: Box<dyn FrameSource>,
        kind: MediaKind,
        generation: u64,
        switch: PredictionSwitch,
        sink: UiSink,
    ) -> Result<Self, DetectorError> {
        let stop = Arc::new(AtomicBool::new(false));
        let state = Arc::new(AtomicU8::new(LoopState::Running as u8));
        let close = source.close_handle();
        // 线程退出时 done_tx 被丢弃, stop() 据此判断线程已结束
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(0);

        let worker = Worker {
            source,
            kind,
            generation,
            switch,
            sink,
            stop: stop.clone(),
            close: close.clone(),
        };
        let thread_state = state.clone();
        let handle = thread::Builder::new()
            .name(format!("capture-{}", generation))
            .spawn(move || {
                let _done = done_tx;
                worker.run();
                thread_state.store(LoopState::Stopped as u8, Ordering::Release);
            })
            .map_err(|e| DetectorError::source_unavailable(kind.label(), e))?;

        info!("📹 采集线程启动: {} (generation {})", kind.label(), generation);
        Ok(Self {
            generation,
            kind,
            stop,
            state,
            close,
            done_rx,
            handle: Some(handle),
        })
    }

    pub fn state(&self) -> LoopState {
        LoopState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// 设置停止标志并等待线程退出; 超时则放弃等待.
    /// 无论线程是否退出, 帧源都会被释放 (只释放一次).
    /// 返回线程是否在超时内退出.
    pub fn stop(&mut self, timeout: Duration) -> bool {
        self.stop.store(true, Ordering::Release);
        let _ = self.state.compare_exchange(
            LoopState::Running as u8,
            LoopState::Stopping as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );

        let joined = match self.handle.take() {
            Some(handle) => match self.done_rx.recv_timeout(timeout) {
                Err(RecvTimeoutError::Disconnected) | Ok(()) => {
                    if handle.join().is_err() {
                        error!("❌ 采集线程异常退出 (generation {})", self.generation);
                    }
                    true
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        "⚠️ 采集线程 {}ms 内未退出, 强制释放输入源 (generation {})",
                        timeout.as_millis(),
                        self.generation
                    );
                    false
                }
            },
            None => self.state() == LoopState::Stopped,
        };

        self.close.close();
        joined
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop(DEFAULT_JOIN_TIMEOUT);
        }
    }
}

/// 采集线程内部状态
struct Worker {
    source: Box<dyn FrameSource>,
    kind: MediaKind,
    generation: u64,
    switch: PredictionSwitch,
    sink: UiSink,
    stop: Arc<AtomicBool>,
    close: CloseHandle,
}

impl Worker {
    fn run(mut self) {
        let interval = frame_interval(self.source.fps());
        let mut seq = 0u64;
        let mut count = 0u64;
        let mut last = Instant::now();

        loop {
            if self.stop_requested() {
                break;
            }
            // 句柄已被关闭 (停止超时), 视为流结束
            if self.close.is_closed() {
                self.end_of_stream();
                break;
            }

            let image = match self.source.read() {
                Ok(Some(image)) => image,
                Ok(None) => {
                    self.end_of_stream();
                    break;
                }
                Err(e) => {
                    if !self.stop_requested() {
                        error!("❌ 读取帧失败: {}", e);
                        self.sink.post_event(UiEvent::SourceError {
                            generation: self.generation,
                            kind: self.kind,
                            reason: e.to_string(),
                        });
                    }
                    break;
                }
            };
            // 阻塞读取期间收到停止请求: 丢弃这一帧
            if self.stop_requested() {
                break;
            }

            seq += 1;
            let (image, counts) = self.process(image);
            if self.stop_requested() {
                break;
            }
            self.sink.post_frame(FramePayload {
                generation: self.generation,
                frame: Frame {
                    seq,
                    image: Arc::new(image),
                },
                counts,
            });

            count += 1;
            if last.elapsed().as_secs_f64() >= 1.0 {
                debug!(
                    "📊 采集统计: {}帧 | {:.1}fps | 预测{}",
                    seq,
                    count as f64 / last.elapsed().as_secs_f64(),
                    if self.switch.is_enabled() { "开" } else { "关" }
                );
                count = 0;
                last = Instant::now();
            }

            self.sleep(interval);
        }

        self.close.close();
        info!(
            "✅ 采集线程退出: {} (generation {}, {}帧)",
            self.kind.label(),
            self.generation,
            seq
        );
    }

    /// 预测开启时推理; 推理失败则关闭预测并通知UI
    fn process(&mut self, image: RgbImage) -> (RgbImage, Option<Counts>) {
        let Some(detector) = self.switch.active() else {
            return (image, None);
        };
        let result = match detector.lock() {
            Ok(mut detector) => detector.infer(&image),
            Err(_) => Err(DetectorError::Inference("detector lock poisoned".into())),
        };
        match result {
            Ok(inference) => (inference.annotated, Some(inference.counts)),
            // 已停止的线程不能改动新线程共用的开关
            Err(_) if self.stop_requested() => (image, None),
            Err(e) => {
                error!("❌ 推理失败, 停止预测: {}", e);
                self.switch.disable();
                self.sink.post_event(UiEvent::InferenceFailed {
                    generation: self.generation,
                    reason: e.to_string(),
                });
                (image, None)
            }
        }
    }

    fn end_of_stream(&self) {
        if self.stop_requested() {
            return;
        }
        info!("📹 流结束: {}", self.kind.label());
        self.sink.post_event(UiEvent::EndOfStream {
            generation: self.generation,
            kind: self.kind,
        });
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// 分段休眠, 停止请求可在一个检查间隔内生效
    fn sleep(&self, interval: Duration) {
        let deadline = Instant::now() + interval;
        loop {
            if self.stop_requested() {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            thread::sleep((deadline - now).min(STOP_POLL));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::sink::{dispatch_channel, UiInbox};
    use crate::detection::{Detector, Inference};
    use std::sync::atomic::AtomicUsize;

    /// 可控帧源: 有限帧数或无限帧, 可模拟阻塞读取
    struct FakeSource {
        remaining: Option<usize>,
        fps: Option<f64>,
        read_delay: Duration,
        close: CloseHandle,
    }

    impl FakeSource {
        fn new(remaining: Option<usize>, released: Arc<AtomicUsize>) -> Self {
            Self {
                remaining,
                fps: Some(500.0),
                read_delay: Duration::ZERO,
                close: CloseHandle::new(move || {
                    released.fetch_add(1, Ordering::SeqCst);
                }),
            }
        }
    }

    impl FrameSource for FakeSource {
        fn read(&mut self) -> Result<Option<RgbImage>, DetectorError> {
            if !self.read_delay.is_zero() {
                thread::sleep(self.read_delay);
            }
            match self.remaining.as_mut() {
                Some(0) => Ok(None),
                Some(n) => {
                    *n -= 1;
                    Ok(Some(RgbImage::new(8, 6)))
                }
                None => Ok(Some(RgbImage::new(8, 6))),
            }
        }

        fn fps(&self) -> Option<f64> {
            self.fps
        }

        fn close_handle(&self) -> CloseHandle {
            self.close.clone()
        }
    }

    /// 每帧报告一个 "obj", 并把左上角像素涂白
    struct MarkingDetector {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl Detector for MarkingDetector {
        fn infer(&mut self, frame: &RgbImage) -> Result<Inference, DetectorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(DetectorError::Inference("boom".into()));
            }
            let mut annotated = frame.clone();
            annotated.put_pixel(0, 0, image::Rgb([255, 255, 255]));
            let mut counts = Counts::new();
            counts.insert("obj".into(), 1);
            Ok(Inference {
                annotated,
                detections: vec![],
                counts,
            })
        }

        fn class_names(&self) -> &[String] {
            &[]
        }
    }

    fn shared(detector: MarkingDetector) -> SharedDetector {
        Arc::new(Mutex::new(Box::new(detector)))
    }

    fn wait_until(timeout: Duration, mut f: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if f() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        f()
    }

    fn wait_frame(inbox: &UiInbox) -> FramePayload {
        let mut out = None;
        assert!(wait_until(Duration::from_secs(2), || {
            out = inbox.latest_frame();
            out.is_some()
        }));
        out.unwrap()
    }

    #[test]
    fn test_end_of_stream_reports_kind() {
        let released = Arc::new(AtomicUsize::new(0));
        let (sink, inbox) = dispatch_channel(16);
        let source = FakeSource::new(Some(3), released.clone());
        let mut capture = CaptureLoop::spawn(
            Box::new(source),
            MediaKind::Video,
            7,
            PredictionSwitch::new(),
            sink,
        )
        .unwrap();

        assert!(wait_until(Duration::from_secs(2), || capture.state()
            == LoopState::Stopped));
        assert_eq!(
            inbox.events(),
            vec![UiEvent::EndOfStream {
                generation: 7,
                kind: MediaKind::Video
            }]
        );
        assert_eq!(inbox.latest_frame().unwrap().frame.seq, 3);
        assert!(capture.stop(DEFAULT_JOIN_TIMEOUT));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_releases_source_once() {
        let released = Arc::new(AtomicUsize::new(0));
        let (sink, inbox) = dispatch_channel(1);
        let source = FakeSource::new(None, released.clone());
        let mut capture = CaptureLoop::spawn(
            Box::new(source),
            MediaKind::Camera,
            1,
            PredictionSwitch::new(),
            sink,
        )
        .unwrap();
        wait_frame(&inbox);

        assert!(capture.stop(DEFAULT_JOIN_TIMEOUT));
        assert!(capture.stop(DEFAULT_JOIN_TIMEOUT));
        drop(capture);
        assert_eq!(released.load(Ordering::SeqCst), 1);
        // 主动停止不上报流结束
        assert!(inbox.events().is_empty());
    }

    #[test]
    fn test_stop_timeout_releases_anyway() {
        let released = Arc::new(AtomicUsize::new(0));
        let (sink, inbox) = dispatch_channel(1);
        let mut source = FakeSource::new(None, released.clone());
        source.read_delay = Duration::from_millis(300);
        let mut capture = CaptureLoop::spawn(
            Box::new(source),
            MediaKind::Video,
            2,
            PredictionSwitch::new(),
            sink,
        )
        .unwrap();

        assert!(!capture.stop(Duration::from_millis(20)));
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(capture.state(), LoopState::Stopping);

        // 阻塞的读取返回后线程自行退出
        assert!(wait_until(Duration::from_secs(2), || capture.state()
            == LoopState::Stopped));
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert!(inbox.events().is_empty());
    }

    #[test]
    fn test_prediction_toggle_applies_to_next_frames() {
        let released = Arc::new(AtomicUsize::new(0));
        let calls = Arc::new(AtomicUsize::new(0));
        let (sink, inbox) = dispatch_channel(1);
        let switch = PredictionSwitch::new();
        let mut capture = CaptureLoop::spawn(
            Box::new(FakeSource::new(None, released)),
            MediaKind::Video,
            3,
            switch.clone(),
            sink,
        )
        .unwrap();

        let raw = wait_frame(&inbox);
        assert!(raw.counts.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        switch.enable(shared(MarkingDetector {
            calls: calls.clone(),
            fail: false,
        }));
        let mut annotated = None;
        assert!(wait_until(Duration::from_secs(2), || {
            if let Some(p) = inbox.latest_frame() {
                if p.counts.is_some() {
                    annotated = Some(p);
                }
            }
            annotated.is_some()
        }));
        let annotated = annotated.unwrap();
        assert_eq!(annotated.counts.unwrap()["obj"], 1);
        assert_eq!(annotated.frame.image.get_pixel(0, 0).0, [255, 255, 255]);

        switch.disable();
        thread::sleep(Duration::from_millis(30));
        let frozen = calls.load(Ordering::SeqCst);
        let _ = inbox.latest_frame();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(calls.load(Ordering::SeqCst), frozen);
        let later = wait_frame(&inbox);
        assert!(later.counts.is_none());
        assert_eq!(later.frame.image.get_pixel(0, 0).0, [0, 0, 0]);

        capture.stop(DEFAULT_JOIN_TIMEOUT);
    }

    #[test]
    fn test_inference_failure_disables_prediction() {
        let released = Arc::new(AtomicUsize::new(0));
        let calls = Arc::new(AtomicUsize::new(0));
        let (sink, inbox) = dispatch_channel(1);
        let switch = PredictionSwitch::new();
        switch.enable(shared(MarkingDetector {
            calls: calls.clone(),
            fail: true,
        }));
        let mut capture = CaptureLoop::spawn(
            Box::new(FakeSource::new(None, released)),
            MediaKind::Camera,
            4,
            switch.clone(),
            sink,
        )
        .unwrap();

        let mut events = Vec::new();
        assert!(wait_until(Duration::from_secs(2), || {
            events.extend(inbox.events());
            !events.is_empty()
        }));
        assert!(matches!(
            events[0],
            UiEvent::InferenceFailed { generation: 4, .. }
        ));
        assert!(!switch.is_enabled());

        // 采集继续, 但不再推理
        wait_frame(&inbox);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        capture.stop(DEFAULT_JOIN_TIMEOUT);
    }

    #[test]
    fn test_frame_read_during_stop_is_not_processed() {
        let released = Arc::new(AtomicUsize::new(0));
        let calls = Arc::new(AtomicUsize::new(0));
        let (sink, inbox) = dispatch_channel(1);
        let switch = PredictionSwitch::new();
        switch.enable(shared(MarkingDetector {
            calls: calls.clone(),
            fail: false,
        }));
        let mut source = FakeSource::new(None, released);
        source.read_delay = Duration::from_millis(200);
        let mut capture = CaptureLoop::spawn(
            Box::new(source),
            MediaKind::Camera,
            5,
            switch.clone(),
            sink,
        )
        .unwrap();

        thread::sleep(Duration::from_millis(50));
        assert!(!capture.stop(Duration::from_millis(10)));
        assert!(wait_until(Duration::from_secs(2), || capture.state()
            == LoopState::Stopped));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(inbox.latest_frame().is_none());
        assert!(switch.is_enabled());
    }

    /// 推理耗时较长且总是失败
    struct SlowFailingDetector {
        calls: Arc<AtomicUsize>,
        delay: Duration,
    }

    impl Detector for SlowFailingDetector {
        fn infer(&mut self, _frame: &RgbImage) -> Result<Inference, DetectorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(self.delay);
            Err(DetectorError::Inference("late".into()))
        }

        fn class_names(&self) -> &[String] {
            &[]
        }
    }

    #[test]
    fn test_failure_after_stop_leaves_switch_alone() {
        let released = Arc::new(AtomicUsize::new(0));
        let calls = Arc::new(AtomicUsize::new(0));
        let (sink, inbox) = dispatch_channel(1);
        let switch = PredictionSwitch::new();
        switch.enable(Arc::new(Mutex::new(Box::new(SlowFailingDetector {
            calls: calls.clone(),
            delay: Duration::from_millis(200),
        }))));
        let mut capture = CaptureLoop::spawn(
            Box::new(FakeSource::new(None, released)),
            MediaKind::Video,
            6,
            switch.clone(),
            sink,
        )
        .unwrap();

        assert!(wait_until(Duration::from_secs(2), || calls.load(Ordering::SeqCst) == 1));
        assert!(!capture.stop(Duration::from_millis(10)));
        assert!(wait_until(Duration::from_secs(2), || capture.state()
            == LoopState::Stopped));
        assert!(switch.is_enabled());
        assert!(inbox.events().is_empty());
        assert!(inbox.latest_frame().is_none());
    }

    #[test]
    fn test_switch_unload() {
        let switch = PredictionSwitch::new();
        assert!(switch.active().is_none());
        switch.enable(shared(MarkingDetector {
            calls: Arc::new(AtomicUsize::new(0)),
            fail: false,
        }));
        assert!(switch.active().is_some());
        switch.disable();
        assert!(switch.active().is_none());
        switch.unload();
        assert!(!switch.is_enabled());
    }
}
