//! 检测结果绘制: 按类别着色的边框 + 标签

use std::path::{Path, PathBuf};

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use tracing::{info, warn};

use super::types::Detection;

/// 高亮调色板, 按类别 id 循环取色
const BRIGHT_COLORS: [(u8, u8, u8); 12] = [
    (255, 0, 0),     // 红色
    (0, 255, 0),     // 绿色
    (0, 0, 255),     // 蓝色
    (255, 255, 0),   // 黄色
    (255, 0, 255),   // 品红
    (0, 255, 255),   // 青色
    (255, 128, 0),   // 橙色
    (255, 0, 128),   // 粉红
    (128, 255, 0),   // 黄绿
    (0, 128, 255),   // 天蓝
    (255, 255, 255), // 白色
    (128, 0, 255),   // 紫色
];

/// 未配置字体时依次尝试的系统字体
const FALLBACK_FONTS: [&str; 6] = [
    "assets/fonts/Arial.ttf",
    "C:/Windows/Fonts/arial.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
];

const BOX_THICKNESS: i32 = 2;

pub fn class_color(id: usize) -> Rgb<u8> {
    let (r, g, b) = BRIGHT_COLORS[id % BRIGHT_COLORS.len()];
    Rgb([r, g, b])
}

/// 读取字体; 失败时返回 None, 只画框不画字
pub fn load_font(path: Option<&Path>) -> Option<FontVec> {
    let candidates: Vec<PathBuf> = path
        .map(Path::to_path_buf)
        .into_iter()
        .chain(FALLBACK_FONTS.iter().map(PathBuf::from))
        .collect();
    for candidate in candidates {
        let Ok(bytes) = std::fs::read(&candidate) else {
            continue;
        };
        match FontVec::try_from_vec(bytes) {
            Ok(font) => {
                info!("✅ 标注字体: {}", candidate.display());
                return Some(font);
            }
            Err(e) => warn!("⚠️ 字体无效 {}: {}", candidate.display(), e),
        }
    }
    warn!("⚠️ 未找到可用字体, 标注只绘制边框");
    None
}

pub struct Annotator {
    font: Option<FontVec>,
    scale: PxScale,
}

impl Annotator {
    pub fn new(font: Option<FontVec>) -> Self {
        Self {
            font,
            scale: PxScale::from(18.0),
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// 在原图副本上绘制所有检测框
    pub fn annotate(&self, image: &RgbImage, detections: &[Detection]) -> RgbImage {
        let mut canvas = image.clone();
        let (w, h) = (canvas.width() as i32, canvas.height() as i32);
        if w == 0 || h == 0 {
            return canvas;
        }

        for det in detections {
            let color = class_color(det.class_id());
            let x = (det.bbox.xmin().round() as i32).clamp(0, w - 1);
            let y = (det.bbox.ymin().round() as i32).clamp(0, h - 1);
            let bw = (det.bbox.width().round() as i32).clamp(1, w - x);
            let bh = (det.bbox.height().round() as i32).clamp(1, h - y);

            for t in 0..BOX_THICKNESS {
                let (iw, ih) = (bw - 2 * t, bh - 2 * t);
                if iw <= 0 || ih <= 0 {
                    break;
                }
                draw_hollow_rect_mut(
                    &mut canvas,
                    Rect::at(x + t, y + t).of_size(iw as u32, ih as u32),
                    color,
                );
            }

            let Some(font) = &self.font else {
                continue;
            };
            let label = format!("{} {:.2}", det.class_name, det.confidence());
            let (tw, th) = text_size(self.scale, font, &label);
            let (tw, th) = (tw as i32 + 4, th as i32 + 4);
            // 标签放在框上方, 顶部放不下时放进框内
            let ly = if y - th >= 0 { y - th } else { y };
            draw_filled_rect_mut(
                &mut canvas,
                Rect::at(x, ly).of_size(tw.max(1) as u32, th.max(1) as u32),
                color,
            );
            draw_text_mut(
                &mut canvas,
                contrast_text(color),
                x + 2,
                ly + 2,
                self.scale,
                font,
                &label,
            );
        }
        canvas
    }
}

/// 浅色背景用黑字, 深色背景用白字
fn contrast_text(bg: Rgb<u8>) -> Rgb<u8> {
    let [r, g, b] = bg.0;
    let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
    if luma > 140.0 {
        Rgb([0, 0, 0])
    } else {
        Rgb([255, 255, 255])
    }
}
