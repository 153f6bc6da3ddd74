/// FFmpeg解码过滤器: YUV420P 帧 → RgbImage → 采集通道
/// FFmpeg decode filter module
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{SendTimeoutError, Sender};
use ez_ffmpeg::filter::frame_filter::FrameFilter;
use ez_ffmpeg::filter::frame_filter_context::FrameFilterContext;
use ez_ffmpeg::{AVMediaType, Frame};
use image::RgbImage;
use tracing::{debug, info, warn};

/// AV_PIX_FMT_YUV420P
const PIX_FMT_YUV420P: i32 = 0;

/// 分辨率上限
const MAX_DIMENSION: u32 = 8192;

pub struct DecodeFilter {
    tx: Option<Sender<RgbImage>>,
    abort: Arc<AtomicBool>,
    pub count: usize,
    pub last: Instant,
    pub current_fps: f64,
    pub dropped_frames: usize, // 丢弃的帧数
    pub total_frames: usize,   // 总帧数
}

impl DecodeFilter {
    pub fn new(tx: Sender<RgbImage>, abort: Arc<AtomicBool>) -> Self {
        Self {
            tx: Some(tx),
            abort,
            count: 0,
            last: Instant::now(),
            current_fps: 0.0,
            dropped_frames: 0,
            total_frames: 0,
        }
    }

    fn drop_frame(&mut self, reason: &str) -> Result<Option<Frame>, String> {
        self.dropped_frames += 1;
        if self.total_frames <= 10 {
            warn!("⚠️ 丢弃帧 #{}: {}", self.total_frames, reason);
        }
        Ok(None)
    }

    /// 阻塞投递, 期间持续检查关闭标志
    fn deliver(&mut self, image: RgbImage) -> Result<(), String> {
        let Some(tx) = &self.tx else {
            return Err("decoder closed".to_string());
        };
        let mut image = image;
        loop {
            if self.abort.load(Ordering::Acquire) {
                return Err("decoder closed".to_string());
            }
            match tx.send_timeout(image, Duration::from_millis(50)) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(back)) => image = back,
                Err(SendTimeoutError::Disconnected(_)) => {
                    return Err("frame receiver dropped".to_string())
                }
            }
        }
    }
}

impl FrameFilter for DecodeFilter {
    fn media_type(&self) -> AVMediaType {
        AVMediaType::AVMEDIA_TYPE_VIDEO
    }

    fn init(&mut self, _ctx: &FrameFilterContext) -> Result<(), String> {
        info!("✅ 解码线程启动");
        Ok(())
    }

    fn filter_frame(
        &mut self,
        frame: Frame,
        _ctx: &FrameFilterContext,
    ) -> Result<Option<Frame>, String> {
        // 源已关闭, 返回错误让 FFmpeg 停止解码
        if self.abort.load(Ordering::Acquire) {
            return Err("decoder closed".to_string());
        }

        self.total_frames += 1;

        let image = unsafe {
            // 基本检查：空帧或损坏帧
            if frame.as_ptr().is_null() || frame.is_empty() || frame.is_corrupt() {
                return self.drop_frame("空帧/损坏帧");
            }

            let raw = &*frame.as_ptr();
            let w = raw.width as u32;
            let h = raw.height as u32;

            if w == 0 || h == 0 || w > MAX_DIMENSION || h > MAX_DIMENSION {
                return self.drop_frame(&format!("非法分辨率 {}x{}", w, h));
            }
            if raw.format != PIX_FMT_YUV420P {
                return self.drop_frame(&format!("像素格式 {} 不是 yuv420p", raw.format));
            }

            // 只丢弃严重错误的帧 (缺少参考帧、无效比特流)
            if raw.decode_error_flags & 0x03 != 0 {
                return self.drop_frame(&format!("解码错误标志=0x{:02x}", raw.decode_error_flags));
            }

            let y_plane = raw.data[0];
            let u_plane = raw.data[1];
            let v_plane = raw.data[2];
            if y_plane.is_null() || u_plane.is_null() || v_plane.is_null() {
                return self.drop_frame("YUV指针为空");
            }
            if raw.linesize[0] <= 0 || raw.linesize[1] <= 0 || raw.linesize[2] <= 0 {
                return self.drop_frame("步长为负 (倒置帧)");
            }
            let y_stride = raw.linesize[0] as usize;
            let u_stride = raw.linesize[1] as usize;
            let v_stride = raw.linesize[2] as usize;
            let half_w = (w as usize).div_ceil(2);
            if y_stride < w as usize || u_stride < half_w || v_stride < half_w {
                return self.drop_frame(&format!(
                    "步长异常 y_stride={} u_stride={} v_stride={}",
                    y_stride, u_stride, v_stride
                ));
            }

            let mut buffer = vec![0u8; (w * h * 3) as usize];
            yuv420p_to_rgb(
                y_plane,
                u_plane,
                v_plane,
                (y_stride, u_stride, v_stride),
                &mut buffer,
                w as usize,
                h as usize,
            );
            match RgbImage::from_raw(w, h, buffer) {
                Some(image) => image,
                None => return self.drop_frame("RGB缓冲区尺寸不匹配"),
            }
        };

        self.count += 1;
        if self.last.elapsed().as_secs_f64() >= 1.0 {
            let elapsed = self.last.elapsed().as_secs_f64();
            self.current_fps = self.count as f64 / elapsed;
            debug!(
                "📺 解码统计: 解码{}帧 | 实际{:.1}fps | 总帧{} | 丢弃{}",
                self.count, self.current_fps, self.total_frames, self.dropped_frames
            );
            self.last = Instant::now();
            self.count = 0;
        }

        self.deliver(image)?;
        Ok(Some(frame))
    }

    fn uninit(&mut self, _ctx: &FrameFilterContext) {
        // 释放发送端, 接收端据此判断流结束
        self.tx = None;
        info!("✅ 解码线程退出");
    }
}

/// YUV420P → RGB24 (BT.601, 定点运算)
#[inline]
unsafe fn yuv420p_to_rgb(
    y_plane: *const u8,
    u_plane: *const u8,
    v_plane: *const u8,
    (y_stride, u_stride, v_stride): (usize, usize, usize),
    buffer: &mut [u8],
    width: usize,
    height: usize,
) {
    let mut out_idx = 0;
    for y in 0..height {
        let y_row = y * y_stride;
        let u_row = (y >> 1) * u_stride;
        let v_row = (y >> 1) * v_stride;

        for x in 0..width {
            let y_val = *y_plane.add(y_row + x) as i32;
            let u_val = *u_plane.add(u_row + (x >> 1)) as i32 - 128;
            let v_val = *v_plane.add(v_row + (x >> 1)) as i32 - 128;
            let (r, g, b) = yuv_to_rgb(y_val, u_val, v_val);
            buffer[out_idx] = r;
            buffer[out_idx + 1] = g;
            buffer[out_idx + 2] = b;
            out_idx += 3;
        }
    }
}

/// u/v 已减去 128
#[inline]
fn yuv_to_rgb(y: i32, u: i32, v: i32) -> (u8, u8, u8) {
    let r = (y + ((v * 179) >> 7)).clamp(0, 255) as u8;
    let g = (y - ((u * 44) >> 7) - ((v * 91) >> 7)).clamp(0, 255) as u8;
    let b = (y + ((u * 227) >> 7)).clamp(0, 255) as u8;
    (r, g, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuv_to_rgb_gray_and_clamp() {
        assert_eq!(yuv_to_rgb(128, 0, 0), (128, 128, 128));
        assert_eq!(yuv_to_rgb(255, 127, 127).0, 255);
        assert_eq!(yuv_to_rgb(0, -128, -128).0, 0);
    }

    #[test]
    fn test_yuv420p_planes() {
        // 4x2 图像, 左半边偏红 (v 高), 右半边灰
        let y = [100u8; 8];
        let u = [128u8, 128];
        let v = [200u8, 128];
        let mut buf = vec![0u8; 4 * 2 * 3];
        unsafe {
            yuv420p_to_rgb(y.as_ptr(), u.as_ptr(), v.as_ptr(), (4, 2, 2), &mut buf, 4, 2);
        }
        let img = RgbImage::from_raw(4, 2, buf).unwrap();
        assert!(img.get_pixel(0, 1)[0] > 150);
        assert_eq!(*img.get_pixel(3, 0), image::Rgb([100, 100, 100]));
    }
}
