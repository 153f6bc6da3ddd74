//! 会话状态 (Session)
//!
//! 应用根对象持有唯一的 [`Session`], 所有用户操作都在这里完成.
//! 采集线程只通过投递通道与会话通信, 会话在每帧 [`Session::pump`] 时处理.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use image::RgbImage;
use tracing::{error, info, warn};

use crate::activity_log::ActivityLog;
use crate::capture::{
    dispatch_channel, CaptureLoop, LoopState, PredictionSwitch, UiEvent, UiInbox, UiSink,
};
use crate::config::AppConfig;
use crate::detection::{Counts, DetectorOptions, SharedDetector, YoloDetector};
use crate::error::DetectorError;
use crate::export;
use crate::input::{load_still, DecoderOptions, FfmpegSource, FrameSource, MediaKind, MediaSource};
use crate::model_store::{ModelEntry, ModelStore, UploadOutcome};

/// 输入源与模型的创建方式
pub trait MediaBackend {
    fn open_source(&self, source: &MediaSource) -> Result<Box<dyn FrameSource>, DetectorError>;

    fn load_detector(&self, path: &Path) -> Result<SharedDetector, DetectorError>;

    fn load_image(&self, path: &Path) -> Result<RgbImage, DetectorError> {
        load_still(path)
    }
}

/// FFmpeg 解码 + ONNX Runtime 推理
pub struct NativeBackend {
    pub decoder: DecoderOptions,
    pub detector: DetectorOptions,
}

impl NativeBackend {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            decoder: DecoderOptions::default(),
            detector: DetectorOptions::from(config),
        }
    }
}

impl MediaBackend for NativeBackend {
    fn open_source(&self, source: &MediaSource) -> Result<Box<dyn FrameSource>, DetectorError> {
        Ok(Box::new(FfmpegSource::open(source, &self.decoder)?))
    }

    fn load_detector(&self, path: &Path) -> Result<SharedDetector, DetectorError> {
        Ok(YoloDetector::load(path, &self.detector)?.into_shared())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// 需要弹窗提示的消息
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub message: String,
}

/// 按钮可用状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Controls {
    pub clear_media: bool,
    pub open_camera: bool,
    pub close_camera: bool,
    pub start_predict: bool,
    pub stop_predict: bool,
    pub start_label: &'static str,
}

pub struct Session<B: MediaBackend = NativeBackend> {
    backend: B,
    config: AppConfig,
    store: ModelStore,
    log: ActivityLog,

    // === 媒体与预测 ===
    media: MediaKind,
    predicting: bool,
    switch: PredictionSwitch,
    detector: Option<SharedDetector>,
    counts: Counts,
    still: Option<Arc<RgbImage>>,

    // === 显示 ===
    display: Option<Arc<RgbImage>>,
    display_version: u64,

    // === 采集线程 ===
    capture: Option<CaptureLoop>,
    generation: u64,
    sink: UiSink,
    inbox: UiInbox,

    // === 模型列表 ===
    models: Vec<ModelEntry>,
    selected_model: usize,

    notices: Vec<Notice>,
}

impl<B: MediaBackend> Session<B> {
    pub fn new(backend: B, config: AppConfig) -> Result<Self, DetectorError> {
        let store = ModelStore::open(&config.models_dir)?;
        let (sink, inbox) = dispatch_channel(config.frame_queue);
        let models = store.entries();
        info!("✅ 会话初始化完成, 模型 {} 个", models.len());
        Ok(Self {
            backend,
            config,
            store,
            log: ActivityLog::new(),
            media: MediaKind::None,
            predicting: false,
            switch: PredictionSwitch::new(),
            detector: None,
            counts: Counts::new(),
            still: None,
            display: None,
            display_version: 0,
            capture: None,
            generation: 0,
            sink,
            inbox,
            models,
            selected_model: 0,
            notices: Vec::new(),
        })
    }

    // ========== 访问器 ==========

    pub fn media(&self) -> MediaKind {
        self.media
    }

    pub fn is_predicting(&self) -> bool {
        self.predicting
    }

    pub fn counts(&self) -> &Counts {
        &self.counts
    }

    pub fn display(&self) -> Option<&Arc<RgbImage>> {
        self.display.as_ref()
    }

    /// 显示内容每变化一次加一, 界面据此更新纹理
    pub fn display_version(&self) -> u64 {
        self.display_version
    }

    pub fn activity_log(&self) -> &ActivityLog {
        &self.log
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn models(&self) -> &[ModelEntry] {
        &self.models
    }

    pub fn selected_model(&self) -> usize {
        self.selected_model
    }

    pub fn select_model(&mut self, index: usize) {
        if index < self.models.len() {
            self.selected_model = index;
        }
    }

    /// 下次打开摄像头时使用的设备
    pub fn set_camera_index(&mut self, index: usize) {
        self.config.camera_index = index;
    }

    pub fn capture_state(&self) -> LoopState {
        self.capture
            .as_ref()
            .map(|c| c.state())
            .unwrap_or(LoopState::Idle)
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    pub fn log(&mut self, message: impl AsRef<str>) {
        self.log.add(message);
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    pub fn controls(&self) -> Controls {
        Controls {
            clear_media: matches!(self.media, MediaKind::Image | MediaKind::Video),
            open_camera: self.media != MediaKind::Camera,
            close_camera: self.media == MediaKind::Camera,
            start_predict: self.media != MediaKind::None && !self.predicting,
            stop_predict: self.predicting,
            start_label: if self.media == MediaKind::Image {
                "Start Predict"
            } else {
                "Start Continuous Predict"
            },
        }
    }

    // ========== 媒体 ==========

    pub fn open_image(&mut self, path: &Path) {
        self.log(format!("Image selected: {}", file_label(path)));
        self.stop_current_feed();
        match self.backend.load_image(path) {
            Ok(image) => {
                self.media = MediaKind::Image;
                self.reset_ui_state();
                let image = Arc::new(image);
                self.still = Some(image.clone());
                self.set_display(Some(image));
                self.config.push_recent(path);
            }
            Err(e) => {
                self.report(&e, "Failed to open image");
                self.media = MediaKind::None;
                self.set_display(None);
                self.reset_ui_state();
            }
        }
    }

    pub fn open_video(&mut self, path: &Path) {
        self.log(format!("Video selected: {}", file_label(path)));
        self.media = MediaKind::Video;
        self.reset_ui_state();
        if self.start_stream(MediaSource::Video(path.to_path_buf())) {
            self.config.push_recent(path);
        } else {
            self.clear_media();
        }
    }

    pub fn open_camera(&mut self) {
        self.log("Camera opened.");
        self.media = MediaKind::Camera;
        self.reset_ui_state();
        if !self.start_stream(MediaSource::Camera(self.config.camera_index)) {
            self.close_camera();
        }
    }

    /// 总是复位到无媒体状态
    pub fn close_camera(&mut self) {
        self.log("Camera closed.");
        self.stop_current_feed();
        self.media = MediaKind::None;
        self.still = None;
        self.set_display(None);
        self.reset_ui_state();
    }

    /// 只清理图片/视频, 摄像头不受影响
    pub fn clear_media(&mut self) {
        if !matches!(self.media, MediaKind::Image | MediaKind::Video) {
            return;
        }
        self.log(format!("Media '{}' cleared.", self.media.label()));
        self.stop_current_feed();
        self.media = MediaKind::None;
        self.still = None;
        self.set_display(None);
        self.reset_ui_state();
    }

    // ========== 预测 ==========

    pub fn start_prediction(&mut self) {
        if self.media == MediaKind::None {
            return;
        }
        self.log(format!("Starting prediction for '{}'.", self.media.label()));
        let detector = match self.load_selected_model() {
            Ok(detector) => detector,
            Err(e) => {
                self.report(&e, "Failed to load model");
                self.log("Prediction cancelled because the model failed to load.");
                return;
            }
        };
        self.log("Model loaded successfully.");

        self.detector = Some(detector.clone());
        self.predicting = true;
        if self.media == MediaKind::Image {
            self.run_on_image(&detector);
        } else {
            self.switch.enable(detector);
        }
    }

    pub fn stop_prediction(&mut self) {
        if self.predicting {
            self.log("Prediction stopped.");
        }
        self.predicting = false;
        self.switch.disable();
    }

    /// 图片单次推理, 完成后自动停止预测
    fn run_on_image(&mut self, detector: &SharedDetector) {
        let Some(still) = self.still.clone() else {
            self.stop_prediction();
            return;
        };
        let result = match detector.lock() {
            Ok(mut detector) => detector.infer(&still),
            Err(_) => Err(DetectorError::Inference("detector lock poisoned".into())),
        };
        match result {
            Ok(inference) => {
                self.counts = inference.counts;
                self.set_display(Some(Arc::new(inference.annotated)));
            }
            Err(e) => {
                error!("❌ 图片推理失败: {}", e);
                self.log(format!("Prediction failed: {}", e));
            }
        }
        self.stop_prediction();
    }

    fn load_selected_model(&mut self) -> Result<SharedDetector, DetectorError> {
        let name = self
            .models
            .get(self.selected_model)
            .and_then(|entry| entry.model_name())
            .map(String::from)
            .ok_or(DetectorError::NoModelSelected)?;
        let path = self.store.path_of(&name);
        if !path.is_file() {
            return Err(DetectorError::model_load(&path, "model file not found"));
        }
        self.log(format!("Loading model: {}...", name));
        // 先卸载旧模型
        self.switch.unload();
        self.detector = None;
        self.backend.load_detector(&path)
    }

    // ========== 采集线程事件 ==========

    /// 处理采集线程投递的帧与事件; 旧采集线程的数据直接忽略
    pub fn pump(&mut self) {
        if let Some(payload) = self.inbox.latest_frame() {
            if payload.generation == self.generation && self.capture.is_some() {
                if let Some(counts) = payload.counts {
                    self.counts = counts;
                }
                self.set_display(Some(payload.frame.image));
            }
        }

        for event in self.inbox.events() {
            if event.generation() != self.generation || self.capture.is_none() {
                continue;
            }
            match event {
                UiEvent::EndOfStream { kind, .. } => self.end_feed(kind),
                UiEvent::InferenceFailed { reason, .. } => {
                    self.log(format!("Prediction failed: {}", reason));
                    self.predicting = false;
                    self.switch.disable();
                }
                UiEvent::SourceError { kind, reason, .. } => {
                    self.log(format!("Source error: {}", reason));
                    self.end_feed(kind);
                }
            }
        }
    }

    fn end_feed(&mut self, kind: MediaKind) {
        if kind == MediaKind::Camera {
            self.close_camera();
        } else {
            self.clear_media();
        }
    }

    // ========== 导出 ==========

    pub fn can_export(&self) -> bool {
        !self.counts.is_empty()
    }

    /// 打开保存对话框之前调用; 没有数据时提示并返回 false
    pub fn begin_export(&mut self) -> bool {
        if self.can_export() {
            return true;
        }
        self.log("Saving results failed: no data.");
        self.notify(
            NoticeLevel::Warning,
            DetectorError::NoResults.title(),
            "There is no detection data to save.",
        );
        false
    }

    pub fn export_cancelled(&mut self) {
        self.log("Saving results cancelled by user.");
    }

    pub fn export_results(&mut self, path: &Path) -> Result<PathBuf, DetectorError> {
        let path = export::with_default_extension(path);
        match export::export_counts(&self.counts, &path) {
            Ok(_) => {
                self.log(format!("Detection results saved to: {}", file_label(&path)));
                self.notify(
                    NoticeLevel::Info,
                    "Saved",
                    format!("Results saved to:\n{}", path.display()),
                );
                Ok(path)
            }
            Err(e) => {
                self.report(&e, "Failed to save results");
                Err(e)
            }
        }
    }

    // ========== 模型管理 ==========

    pub fn refresh_models(&mut self) {
        let selected = self
            .models
            .get(self.selected_model)
            .and_then(|e| e.model_name())
            .map(String::from);
        self.models = self.store.entries();
        self.selected_model = selected
            .and_then(|name| {
                self.models
                    .iter()
                    .position(|e| e.model_name() == Some(name.as_str()))
            })
            .unwrap_or(0);
    }

    /// 上传模型; 重名且未确认时返回 Conflict, 由界面询问后带 `overwrite` 重试
    pub fn upload_model(&mut self, src: &Path, overwrite: bool) -> Option<UploadOutcome> {
        match self.store.upload(src, overwrite) {
            Ok(UploadOutcome::Conflict(name)) => {
                info!("⚠️ 模型已存在: {}", name);
                Some(UploadOutcome::Conflict(name))
            }
            Ok(outcome) => {
                if let UploadOutcome::Uploaded(name) | UploadOutcome::Replaced(name) = &outcome {
                    self.log(format!("Model '{}' uploaded successfully.", name));
                }
                self.refresh_models();
                Some(outcome)
            }
            Err(e) => {
                self.report(&e, "Failed to upload model");
                None
            }
        }
    }

    pub fn upload_declined(&mut self, name: &str) {
        self.log(format!("Overwrite of model '{}' cancelled.", name));
    }

    pub fn delete_model(&mut self, name: &str) -> bool {
        match self.store.delete(name) {
            Ok(()) => {
                self.log(format!("Model '{}' deleted successfully.", name));
                self.refresh_models();
                self.notify(
                    NoticeLevel::Info,
                    "Deleted",
                    format!("Model '{}' has been deleted.", name),
                );
                true
            }
            Err(e) => {
                self.report(&e, "Failed to delete model");
                false
            }
        }
    }

    // ========== 生命周期 ==========

    /// 关闭窗口时调用
    pub fn shutdown(&mut self) -> &AppConfig {
        self.log("Application closed.");
        self.stop_current_feed();
        self.switch.unload();
        self.detector = None;
        &self.config
    }

    // ========== 内部 ==========

    /// 停止当前采集线程并释放输入源
    fn stop_current_feed(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            let timeout = Duration::from_millis(self.config.join_timeout_ms);
            if !capture.stop(timeout) {
                warn!("⚠️ 采集线程未及时退出 (generation {})", capture.generation());
            }
        }
    }

    fn start_stream(&mut self, source: MediaSource) -> bool {
        self.stop_current_feed();
        self.generation += 1;
        let kind = source.kind();
        let opened = self.backend.open_source(&source).and_then(|frames| {
            CaptureLoop::spawn(
                frames,
                kind,
                self.generation,
                self.switch.clone(),
                self.sink.clone(),
            )
        });
        match opened {
            Ok(capture) => {
                self.capture = Some(capture);
                true
            }
            Err(e) => {
                error!("❌ 无法打开输入源 {}: {}", source, e);
                self.report(&e, "Failed to open source");
                false
            }
        }
    }

    fn reset_ui_state(&mut self) {
        self.predicting = false;
        self.switch.disable();
        self.counts.clear();
    }

    fn set_display(&mut self, image: Option<Arc<RgbImage>>) {
        self.display = image;
        self.display_version += 1;
    }

    fn notify(&mut self, level: NoticeLevel, title: &str, message: impl Into<String>) {
        self.notices.push(Notice {
            level,
            title: title.to_string(),
            message: message.into(),
        });
    }

    /// 错误 → 一条日志 + 一个提示
    fn report(&mut self, err: &DetectorError, context: &str) {
        self.log(format!("{}: {}", context, err));
        let level = match err {
            DetectorError::NoModelSelected | DetectorError::NoResults => NoticeLevel::Warning,
            _ => NoticeLevel::Error,
        };
        self.notify(level, err.title(), err.to_string());
    }
}

impl<B: MediaBackend> Drop for Session<B> {
    fn drop(&mut self) {
        self.stop_current_feed();
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{Detector, Inference};
    use crate::input::CloseHandle;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Instant;

    /// 有限/无限帧源
    struct FakeSource {
        remaining: Option<usize>,
        close: CloseHandle,
    }

    impl FrameSource for FakeSource {
        fn read(&mut self) -> Result<Option<RgbImage>, DetectorError> {
            match self.remaining.as_mut() {
                Some(0) => Ok(None),
                Some(n) => {
                    *n -= 1;
                    Ok(Some(RgbImage::new(16, 12)))
                }
                None => Ok(Some(RgbImage::new(16, 12))),
            }
        }

        fn fps(&self) -> Option<f64> {
            Some(200.0)
        }

        fn close_handle(&self) -> CloseHandle {
            self.close.clone()
        }
    }

    struct CountingDetector {
        fail: bool,
    }

    impl Detector for CountingDetector {
        fn infer(&mut self, frame: &RgbImage) -> Result<Inference, DetectorError> {
            if self.fail {
                return Err(DetectorError::Inference("bad tensor".into()));
            }
            let mut counts = Counts::new();
            counts.insert("person".into(), 2);
            counts.insert("car".into(), 1);
            let mut annotated = frame.clone();
            annotated.put_pixel(0, 0, image::Rgb([255, 0, 0]));
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

    #[derive(Default)]
    struct FakeBackend {
        /// None = 无限帧
        frames: Option<usize>,
        open_fails: bool,
        detector_fails: bool,
        load_fails: bool,
        released: Arc<AtomicUsize>,
    }

    impl MediaBackend for FakeBackend {
        fn open_source(
            &self,
            source: &MediaSource,
        ) -> Result<Box<dyn FrameSource>, DetectorError> {
            if self.open_fails {
                return Err(DetectorError::source_unavailable(
                    source.to_string(),
                    "no device",
                ));
            }
            let released = self.released.clone();
            Ok(Box::new(FakeSource {
                remaining: self.frames,
                close: CloseHandle::new(move || {
                    released.fetch_add(1, Ordering::SeqCst);
                }),
            }))
        }

        fn load_detector(&self, path: &Path) -> Result<SharedDetector, DetectorError> {
            if self.load_fails {
                return Err(DetectorError::model_load(path, "invalid graph"));
            }
            let detector: Box<dyn Detector> = Box::new(CountingDetector {
                fail: self.detector_fails,
            });
            Ok(Arc::new(Mutex::new(detector)))
        }

        fn load_image(&self, path: &Path) -> Result<RgbImage, DetectorError> {
            if path.exists() {
                Ok(RgbImage::new(20, 10))
            } else {
                Err(DetectorError::source_unavailable(
                    path.display().to_string(),
                    "missing",
                ))
            }
        }
    }

    fn session(backend: FakeBackend) -> (tempfile::TempDir, Session<FakeBackend>) {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            models_dir: dir.path().join("models"),
            frame_queue: 4,
            ..AppConfig::default()
        };
        let session = Session::new(backend, config).unwrap();
        (dir, session)
    }

    fn with_model(dir: &tempfile::TempDir, session: &mut Session<FakeBackend>) {
        fs::write(dir.path().join("models").join("yolov8n.onnx"), b"onnx").unwrap();
        session.refresh_models();
    }

    fn pump_until(
        session: &mut Session<FakeBackend>,
        mut f: impl FnMut(&Session<FakeBackend>) -> bool,
    ) -> bool {
        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            session.pump();
            if f(session) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    fn logged(session: &Session<FakeBackend>, text: &str) -> bool {
        session
            .activity_log()
            .entries()
            .iter()
            .any(|e| e.ends_with(text))
    }

    #[test]
    fn test_initial_controls() {
        let (_dir, session) = session(FakeBackend::default());
        let c = session.controls();
        assert!(!c.start_predict && !c.stop_predict && !c.close_camera && !c.clear_media);
        assert!(c.open_camera);
        assert_eq!(session.capture_state(), LoopState::Idle);
        assert_eq!(session.models()[0].label(), "No models found");
    }

    #[test]
    fn test_video_end_of_stream_clears_media() {
        let (dir, mut session) = session(FakeBackend {
            frames: Some(5),
            ..Default::default()
        });
        let video = dir.path().join("clip.mp4");
        session.open_video(&video);
        assert_eq!(session.media(), MediaKind::Video);
        assert_eq!(session.controls().start_label, "Start Continuous Predict");

        assert!(pump_until(&mut session, |s| s.media() == MediaKind::None));
        let c = session.controls();
        assert!(!c.stop_predict && !c.start_predict && c.open_camera);
        assert!(session.display().is_none());
        assert!(logged(&session, "Media 'video' cleared."));
        assert_eq!(session.backend.released.load(Ordering::SeqCst), 1);
        assert_eq!(session.config().recent_files, vec![video]);
    }

    #[test]
    fn test_camera_end_of_stream_closes_camera() {
        let (_dir, mut session) = session(FakeBackend {
            frames: Some(2),
            ..Default::default()
        });
        session.open_camera();
        let c = session.controls();
        assert!(c.close_camera && !c.open_camera);

        assert!(pump_until(&mut session, |s| s.media() == MediaKind::None));
        assert!(logged(&session, "Camera closed."));
        assert!(session.controls().open_camera);
        assert_eq!(session.backend.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_camera_open_failure_resets() {
        let (_dir, mut session) = session(FakeBackend {
            open_fails: true,
            ..Default::default()
        });
        session.open_camera();
        assert_eq!(session.media(), MediaKind::None);
        assert!(logged(&session, "Camera closed."));
        let notices = session.take_notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Error);
        assert_eq!(notices[0].title, "Source Error");
    }

    #[test]
    fn test_repeated_close_releases_once() {
        let (_dir, mut session) = session(FakeBackend::default());
        session.open_camera();
        assert!(pump_until(&mut session, |s| s.display().is_some()));
        session.close_camera();
        session.close_camera();
        session.shutdown();
        assert_eq!(session.backend.released.load(Ordering::SeqCst), 1);
        assert!(logged(&session, "Application closed."));
    }

    #[test]
    fn test_new_source_supersedes_old_loop() {
        let (dir, mut session) = session(FakeBackend::default());
        session.open_video(&dir.path().join("a.mp4"));
        assert!(pump_until(&mut session, |s| s.display().is_some()));
        session.open_camera();
        assert_eq!(session.backend.released.load(Ordering::SeqCst), 1);
        assert_eq!(session.media(), MediaKind::Camera);
        assert_eq!(session.capture_state(), LoopState::Running);
        session.close_camera();
        assert_eq!(session.backend.released.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_clear_media_ignores_camera() {
        let (_dir, mut session) = session(FakeBackend::default());
        session.open_camera();
        session.clear_media();
        assert_eq!(session.media(), MediaKind::Camera);
        session.close_camera();
    }

    #[test]
    fn test_start_without_model_warns() {
        let (dir, mut session) = session(FakeBackend::default());
        let img = dir.path().join("a.png");
        fs::write(&img, b"png").unwrap();
        session.open_image(&img);
        session.start_prediction();
        assert!(!session.is_predicting());
        let notices = session.take_notices();
        assert_eq!(notices[0].level, NoticeLevel::Warning);
        assert_eq!(notices[0].title, "No Model");
        assert!(logged(
            &session,
            "Prediction cancelled because the model failed to load."
        ));
    }

    #[test]
    fn test_model_load_failure_does_not_predict() {
        let (dir, mut session) = session(FakeBackend {
            load_fails: true,
            ..Default::default()
        });
        with_model(&dir, &mut session);
        session.open_camera();
        session.start_prediction();
        assert!(!session.is_predicting());
        assert_eq!(session.take_notices()[0].title, "Model Error");
        assert!(session.controls().start_predict);
        session.close_camera();
    }

    #[test]
    fn test_image_prediction_is_one_shot() {
        let (dir, mut session) = session(FakeBackend::default());
        with_model(&dir, &mut session);
        let img = dir.path().join("street.jpg");
        fs::write(&img, b"jpg").unwrap();
        session.open_image(&img);
        assert_eq!(session.controls().start_label, "Start Predict");
        let before = session.display_version();

        session.start_prediction();
        assert!(!session.is_predicting());
        assert!(session.display_version() > before);
        assert_eq!(session.counts()["person"], 2);
        let keys: Vec<_> = session.counts().keys().cloned().collect();
        assert_eq!(keys, vec!["car", "person"]);
        assert_eq!(
            session.display().unwrap().get_pixel(0, 0).0,
            [255, 0, 0]
        );
        assert!(logged(&session, "Prediction stopped."));
        assert!(session.can_export());
    }

    #[test]
    fn test_image_inference_failure_is_logged_only() {
        let (dir, mut session) = session(FakeBackend {
            detector_fails: true,
            ..Default::default()
        });
        with_model(&dir, &mut session);
        let img = dir.path().join("street.jpg");
        fs::write(&img, b"jpg").unwrap();
        session.open_image(&img);
        session.take_notices();

        session.start_prediction();
        assert!(!session.is_predicting());
        assert!(session.counts().is_empty());
        assert!(logged(
            &session,
            "Prediction failed: inference failed: bad tensor"
        ));
        assert!(session.take_notices().is_empty());
        assert_eq!(session.media(), MediaKind::Image);
    }

    #[test]
    fn test_continuous_prediction_updates_counts() {
        let (dir, mut session) = session(FakeBackend::default());
        with_model(&dir, &mut session);
        session.open_video(&dir.path().join("v.mp4"));
        session.start_prediction();
        assert!(session.is_predicting());
        let c = session.controls();
        assert!(c.stop_predict && !c.start_predict);

        assert!(pump_until(&mut session, |s| !s.counts().is_empty()));
        session.stop_prediction();
        assert!(!session.is_predicting());
        assert!(session.controls().start_predict);
        session.clear_media();
        assert!(session.counts().is_empty());
    }

    #[test]
    fn test_inference_failure_stops_prediction() {
        let (dir, mut session) = session(FakeBackend {
            detector_fails: true,
            ..Default::default()
        });
        with_model(&dir, &mut session);
        session.open_camera();
        session.start_prediction();
        assert!(pump_until(&mut session, |s| !s.is_predicting()));
        assert!(session
            .activity_log()
            .entries()
            .iter()
            .any(|e| e.contains("Prediction failed: inference failed: bad tensor")));
        assert_eq!(session.media(), MediaKind::Camera);
        session.close_camera();
    }

    #[test]
    fn test_export_flow() {
        let (dir, mut session) = session(FakeBackend::default());
        assert!(!session.begin_export());
        assert!(logged(&session, "Saving results failed: no data."));
        assert_eq!(session.take_notices()[0].level, NoticeLevel::Warning);

        with_model(&dir, &mut session);
        let img = dir.path().join("a.png");
        fs::write(&img, b"png").unwrap();
        session.open_image(&img);
        session.start_prediction();
        assert!(session.begin_export());
        let saved = session.export_results(&dir.path().join("results")).unwrap();
        assert_eq!(saved, dir.path().join("results.xlsx"));
        assert!(saved.is_file());
        assert!(logged(&session, "Detection results saved to: results.xlsx"));
        assert_eq!(session.take_notices()[0].level, NoticeLevel::Info);
    }

    #[test]
    fn test_upload_and_delete_models() {
        let (dir, mut session) = session(FakeBackend::default());
        let src = dir.path().join("best.onnx");
        fs::write(&src, b"v1").unwrap();

        assert_eq!(
            session.upload_model(&src, false),
            Some(UploadOutcome::Uploaded("best.onnx".into()))
        );
        assert_eq!(session.models(), &[ModelEntry::Model("best.onnx".into())]);

        fs::write(&src, b"v2").unwrap();
        assert_eq!(
            session.upload_model(&src, false),
            Some(UploadOutcome::Conflict("best.onnx".into()))
        );
        session.upload_declined("best.onnx");
        assert!(logged(&session, "Overwrite of model 'best.onnx' cancelled."));
        let stored = dir.path().join("models").join("best.onnx");
        assert_eq!(fs::read(&stored).unwrap(), b"v1");

        session.upload_model(&src, true);
        assert_eq!(fs::read(&stored).unwrap(), b"v2");

        assert!(session.delete_model("best.onnx"));
        assert_eq!(session.models()[0].label(), "No models found");
        assert_eq!(session.take_notices()[0].title, "Deleted");
        assert!(!session.delete_model("best.onnx"));
        assert_eq!(session.take_notices()[0].level, NoticeLevel::Error);
    }

    #[test]
    fn test_open_missing_image() {
        let (dir, mut session) = session(FakeBackend::default());
        session.open_image(&dir.path().join("nope.png"));
        assert_eq!(session.media(), MediaKind::None);
        assert_eq!(session.take_notices()[0].title, "Source Error");
    }
}
