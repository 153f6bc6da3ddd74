/// FFmpeg 帧源: 视频文件 / 本地摄像头
/// FFmpeg frame source with software decoding only
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use ez_ffmpeg::core::context::null_output::create_null_output;
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::stream_info::{find_video_stream_info, StreamInfo};
use ez_ffmpeg::{AVMediaType, FfmpegContext, Input};
use image::RgbImage;
use tracing::{error, info, warn};

use super::camera;
use super::decode_filter::DecodeFilter;
use super::source::{CloseHandle, FrameSource, MediaSource, DEFAULT_FPS};
use crate::error::DetectorError;

/// 解码参数
#[derive(Debug, Clone)]
pub struct DecoderOptions {
    /// 解码线程就绪的等待上限
    pub open_timeout: Duration,
    /// 单次读帧的等待上限, 超时视为流结束
    pub read_timeout: Duration,
    /// 解码线程与采集线程之间的帧缓冲
    pub buffer: usize,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            open_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(5),
            buffer: 2,
        }
    }
}

pub struct FfmpegSource {
    rx: Receiver<RgbImage>,
    fps: Option<f64>,
    close: CloseHandle,
    read_timeout: Duration,
    desc: String,
}

impl FfmpegSource {
    /// 打开视频文件或摄像头; 失败返回 `SourceUnavailable`
    pub fn open(source: &MediaSource, options: &DecoderOptions) -> Result<Self, DetectorError> {
        let desc = source.to_string();
        let (input, fps) = match source {
            MediaSource::Video(path) => {
                if !path.is_file() {
                    return Err(DetectorError::source_unavailable(desc, "file not found"));
                }
                let url = path.to_string_lossy().to_string();
                let fps = probe_fps(&url);
                (InputSpec::File(url), fps)
            }
            MediaSource::Camera(index) => {
                (InputSpec::Camera(camera::camera_url(*index)?), Some(DEFAULT_FPS))
            }
            MediaSource::Image(_) => {
                return Err(DetectorError::source_unavailable(
                    desc,
                    "still images are not decoded by ffmpeg",
                ))
            }
        };

        info!("🎬 打开输入源: {} (fps: {:?})", desc, fps);

        let abort = Arc::new(AtomicBool::new(false));
        let (tx, rx) = crossbeam_channel::bounded(options.buffer.max(1));
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), String>>(1);

        let filter = DecodeFilter::new(tx, abort.clone());
        let thread_desc = desc.clone();
        thread::Builder::new()
            .name("ffmpeg-decode".into())
            .spawn(move || {
                let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
                let pipe = pipe.filter("decode", Box::new(filter));
                let out = create_null_output().add_frame_pipeline(pipe);

                // 构建FFmpeg上下文, 统一输出 yuv420p
                let ctx = match FfmpegContext::builder()
                    .input(input.build())
                    .filter_descs(["format=yuv420p"].into())
                    .output(out)
                    .build()
                {
                    Ok(ctx) => ctx,
                    Err(e) => {
                        let _ = ready_tx.send(Err(format!("构建失败: {}", e)));
                        return;
                    }
                };
                let sch = match ctx.start() {
                    Ok(sch) => sch,
                    Err(e) => {
                        let _ = ready_tx.send(Err(format!("启动失败: {}", e)));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                if let Err(e) = sch.wait() {
                    warn!("⚠️ 解码结束: {} ({})", thread_desc, e);
                } else {
                    info!("📹 解码循环结束: {}", thread_desc);
                }
            })
            .map_err(|e| DetectorError::source_unavailable(desc.clone(), e))?;

        match ready_rx.recv_timeout(options.open_timeout) {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => {
                error!("❌ 无法打开输入源 {}: {}", desc, reason);
                return Err(DetectorError::source_unavailable(desc, reason));
            }
            Err(_) => {
                abort.store(true, Ordering::Release);
                return Err(DetectorError::source_unavailable(desc, "open timed out"));
            }
        }

        let abort_on_close = abort.clone();
        let close_desc = desc.clone();
        let close = CloseHandle::new(move || {
            abort_on_close.store(true, Ordering::Release);
            info!("🛑 输入源已释放: {}", close_desc);
        });

        Ok(Self {
            rx,
            fps,
            close,
            read_timeout: options.read_timeout,
            desc,
        })
    }
}

impl FrameSource for FfmpegSource {
    fn read(&mut self) -> Result<Option<RgbImage>, DetectorError> {
        if self.close.is_closed() {
            return Ok(None);
        }
        match self.rx.recv_timeout(self.read_timeout) {
            Ok(image) => Ok(Some(image)),
            Err(RecvTimeoutError::Disconnected) => Ok(None),
            Err(RecvTimeoutError::Timeout) => {
                warn!("⚠️ 读取超时, 视为流结束: {}", self.desc);
                Ok(None)
            }
        }
    }

    fn fps(&self) -> Option<f64> {
        self.fps
    }

    fn close_handle(&self) -> CloseHandle {
        self.close.clone()
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        self.close.close();
    }
}

/// 输入描述, 在解码线程内构建 `Input`
enum InputSpec {
    File(String),
    Camera(String),
}

impl InputSpec {
    fn build(&self) -> Input {
        match self {
            InputSpec::File(url) => Input::new(url.as_str()),
            InputSpec::Camera(url) => camera::camera_input(url),
        }
    }
}

/// 读取视频文件的平均帧率
fn probe_fps(url: &str) -> Option<f64> {
    match find_video_stream_info(url) {
        Ok(Some(StreamInfo::Video { fps, .. })) if fps.is_finite() && fps > 0.0 => Some(fps),
        Ok(_) => None,
        Err(e) => {
            warn!("⚠️ 获取帧率失败: {}", e);
            None
        }
    }
}
