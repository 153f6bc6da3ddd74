//! 摄像头输入
//!
//! 处理本地摄像头输入,支持 DirectShow(Windows) / AVFoundation(macOS) / V4L2(Linux)

use ez_ffmpeg::Input;
use tracing::{info, warn};

use crate::error::DetectorError;

#[cfg(target_os = "windows")]
const CAMERA_FORMAT: &str = "dshow"; // DirectShow

#[cfg(target_os = "macos")]
const CAMERA_FORMAT: &str = "avfoundation"; // AVFoundation

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const CAMERA_FORMAT: &str = "v4l2"; // Video4Linux2

/// 获取可用的摄像头设备列表
pub fn get_camera_devices() -> Vec<(usize, String)> {
    match ez_ffmpeg::device::get_input_video_devices() {
        Ok(devices) => devices.into_iter().enumerate().collect(),
        Err(e) => {
            warn!("⚠️ 获取摄像头列表失败: {}", e);
            vec![]
        }
    }
}

/// 按平台格式化摄像头URL
pub fn format_camera_url(index: usize, name: Option<&str>) -> String {
    if cfg!(target_os = "windows") {
        format!("video={}", name.unwrap_or_default())
    } else if cfg!(target_os = "macos") {
        format!("{}", index)
    } else {
        format!("/dev/video{}", index)
    }
}

/// 解析摄像头URL; 设备不存在返回 `SourceUnavailable`
pub(crate) fn camera_url(index: usize) -> Result<String, DetectorError> {
    // dshow 只能按名称打开, 先枚举设备
    let name = if cfg!(target_os = "windows") {
        let devices = get_camera_devices();
        match devices.into_iter().find(|(i, _)| *i == index) {
            Some((_, name)) => Some(name),
            None => {
                return Err(DetectorError::source_unavailable(
                    format!("camera {}", index),
                    "no such camera device",
                ))
            }
        }
    } else {
        None
    };
    Ok(format_camera_url(index, name.as_deref()))
}

/// 构建摄像头输入
pub(crate) fn camera_input(url: &str) -> Input {
    info!("🔍 使用格式: {}, 输入: {}", CAMERA_FORMAT, url);

    // 不强制分辨率, 让驱动协商默认值
    Input::new(url)
        .set_format(CAMERA_FORMAT)
        .set_input_opts([("framerate", "30")].into())
}
