//! 帧源抽象 (Frame Source)
//!
//! 采集线程只通过 [`FrameSource`] 读取帧; 关闭通过 [`CloseHandle`] 完成,
//! 界面线程和采集线程都可以调用, 但底层句柄只会被释放一次.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image::RgbImage;
use phf::phf_map;

use crate::error::DetectorError;

/// 帧率未知或为0时使用的帧率
pub const DEFAULT_FPS: f64 = 30.0;

/// 当前媒体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MediaKind {
    #[default]
    None,
    Image,
    Video,
    Camera,
}

impl MediaKind {
    pub fn label(&self) -> &'static str {
        match self {
            MediaKind::None => "none",
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Camera => "camera",
        }
    }
}

/// 文件扩展名 → 媒体类型
static MEDIA_EXTENSIONS: phf::Map<&'static str, MediaKind> = phf_map! {
    "jpg" => MediaKind::Image,
    "jpeg" => MediaKind::Image,
    "png" => MediaKind::Image,
    "mp4" => MediaKind::Video,
    "avi" => MediaKind::Video,
    "mov" => MediaKind::Video,
};

pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];
pub const VIDEO_EXTENSIONS: [&str; 3] = ["mp4", "avi", "mov"];

/// 按扩展名识别媒体类型 (不区分大小写)
pub fn media_kind_of(path: &Path) -> MediaKind {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .and_then(|e| MEDIA_EXTENSIONS.get(e.as_str()).copied())
        .unwrap_or(MediaKind::None)
}

/// 输入源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    Image(PathBuf),
    Video(PathBuf),
    Camera(usize),
}

impl MediaSource {
    pub fn kind(&self) -> MediaKind {
        match self {
            MediaSource::Image(_) => MediaKind::Image,
            MediaSource::Video(_) => MediaKind::Video,
            MediaSource::Camera(_) => MediaKind::Camera,
        }
    }
}

impl fmt::Display for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaSource::Image(p) | MediaSource::Video(p) => write!(f, "{}", p.display()),
            MediaSource::Camera(i) => write!(f, "camera {}", i),
        }
    }
}

/// 解码得到的一帧
#[derive(Clone, Debug)]
pub struct Frame {
    /// 同一采集线程内递增
    pub seq: u64,
    pub image: Arc<RgbImage>,
}

/// 视频帧来源; 读取只发生在采集线程
pub trait FrameSource: Send {
    /// 下一帧; `Ok(None)` 表示流结束
    fn read(&mut self) -> Result<Option<RgbImage>, DetectorError>;

    /// 源报告的帧率, 未知时为 None
    fn fps(&self) -> Option<f64>;

    fn close_handle(&self) -> CloseHandle;
}

/// 幂等的关闭句柄
#[derive(Clone)]
pub struct CloseHandle {
    closed: Arc<AtomicBool>,
    on_close: Arc<dyn Fn() + Send + Sync>,
}

impl CloseHandle {
    pub fn new(on_close: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            closed: Arc::new(AtomicBool::new(false)),
            on_close: Arc::new(on_close),
        }
    }

    /// 释放底层句柄; 只有第一次调用返回 true
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        (self.on_close)();
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for CloseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloseHandle")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// 每帧间隔 1/fps, 帧率缺失或非法时按 30fps
pub fn frame_interval(fps: Option<f64>) -> Duration {
    let fps = match fps {
        Some(f) if f.is_finite() && f > 0.0 => f,
        _ => DEFAULT_FPS,
    };
    Duration::from_secs_f64(1.0 / fps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_frame_interval() {
        assert!((frame_interval(Some(25.0)).as_secs_f64() - 0.04).abs() < 1e-9);
        let default = Duration::from_secs_f64(1.0 / 30.0);
        assert_eq!(frame_interval(None), default);
        assert_eq!(frame_interval(Some(0.0)), default);
        assert_eq!(frame_interval(Some(f64::NAN)), default);
    }

    #[test]
    fn test_close_handle_releases_once() {
        let released = Arc::new(AtomicUsize::new(0));
        let r = released.clone();
        let handle = CloseHandle::new(move || {
            r.fetch_add(1, Ordering::SeqCst);
        });
        let other = handle.clone();
        assert!(!handle.is_closed());
        assert!(handle.close());
        assert!(!other.close());
        assert!(!handle.close());
        assert!(other.is_closed());
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_media_kind_of() {
        assert_eq!(media_kind_of(Path::new("a/b.JPG")), MediaKind::Image);
        assert_eq!(media_kind_of(Path::new("clip.mov")), MediaKind::Video);
        assert_eq!(media_kind_of(Path::new("model.onnx")), MediaKind::None);
        assert_eq!(media_kind_of(Path::new("noext")), MediaKind::None);
        assert_eq!(MediaSource::Camera(0).kind(), MediaKind::Camera);
        assert_eq!(MediaSource::Camera(0).to_string(), "camera 0");
    }
}
