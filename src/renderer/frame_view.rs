//! 中央画面: 等比缩放居中显示当前帧 (letterbox)

use std::sync::Arc;

use egui_macroquad::egui::{self, ColorImage, TextureHandle, TextureOptions};
use fast_image_resize as fr;
use image::RgbImage;
use tracing::warn;

pub const PLACEHOLDER_TEXT: &str = "Select a media source to start analysis";

/// 在 (avail_w, avail_h) 中放下 (img_w, img_h), 保持宽高比并居中.
/// 返回 (x偏移, y偏移, 宽, 高)
pub fn fit_rect(avail_w: f32, avail_h: f32, img_w: u32, img_h: u32) -> (f32, f32, f32, f32) {
    if avail_w <= 1.0 || avail_h <= 1.0 || img_w == 0 || img_h == 0 {
        return (0.0, 0.0, 0.0, 0.0);
    }
    let img_ratio = img_w as f32 / img_h as f32;
    let avail_ratio = avail_w / avail_h;
    let (w, h) = if avail_ratio > img_ratio {
        (avail_h * img_ratio, avail_h)
    } else {
        (avail_w, avail_w / img_ratio)
    };
    ((avail_w - w) / 2.0, (avail_h - h) / 2.0, w, h)
}

/// 缩放到指定像素尺寸
pub fn resize_rgb(src: &RgbImage, width: u32, height: u32) -> Result<RgbImage, String> {
    if src.dimensions() == (width, height) {
        return Ok(src.clone());
    }
    let src_image = fr::images::Image::from_vec_u8(
        src.width(),
        src.height(),
        src.as_raw().clone(),
        fr::PixelType::U8x3,
    )
    .map_err(|e| format!("源图像无效: {}", e))?;
    let mut dst_image = fr::images::Image::new(width, height, fr::PixelType::U8x3);

    let mut resizer = fr::Resizer::new();
    resizer
        .resize(
            &src_image,
            &mut dst_image,
            &fr::ResizeOptions::new()
                .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear)),
        )
        .map_err(|e| format!("缩放失败: {}", e))?;

    RgbImage::from_raw(width, height, dst_image.buffer().to_vec())
        .ok_or_else(|| "缩放结果尺寸不匹配".to_string())
}

#[derive(Default)]
pub struct FrameView {
    texture: Option<TextureHandle>,
    // (显示版本, 宽, 高)
    key: Option<(u64, u32, u32)>,
}

impl FrameView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn show(&mut self, ui: &mut egui::Ui, image: Option<&Arc<RgbImage>>, version: u64) {
        let avail = ui.available_rect_before_wrap();
        let Some(image) = image else {
            self.texture = None;
            self.key = None;
            ui.centered_and_justified(|ui| {
                ui.label(
                    egui::RichText::new(PLACEHOLDER_TEXT)
                        .italics()
                        .size(16.0)
                        .color(egui::Color32::from_gray(110)),
                );
            });
            return;
        };

        let (x, y, w, h) = fit_rect(avail.width(), avail.height(), image.width(), image.height());
        if w < 1.0 || h < 1.0 {
            return;
        }

        // 按显示尺寸缩放后上传, 只在帧或窗口变化时更新纹理
        let ppp = ui.ctx().pixels_per_point();
        let px_w = ((w * ppp).round() as u32).max(1);
        let px_h = ((h * ppp).round() as u32).max(1);
        let key = (version, px_w, px_h);
        if self.key != Some(key) {
            match resize_rgb(image, px_w, px_h) {
                Ok(resized) => {
                    let color_image =
                        ColorImage::from_rgb([px_w as usize, px_h as usize], resized.as_raw());
                    match self.texture.as_mut() {
                        Some(tex) => tex.set(color_image, TextureOptions::LINEAR),
                        None => {
                            self.texture = Some(ui.ctx().load_texture(
                                "frame",
                                color_image,
                                TextureOptions::LINEAR,
                            ))
                        }
                    }
                    self.key = Some(key);
                }
                Err(e) => warn!("⚠️ 画面更新失败: {}", e),
            }
        }

        if let Some(tex) = self.texture.as_ref() {
            let rect = egui::Rect::from_min_size(avail.min + egui::vec2(x, y), egui::vec2(w, h));
            let uv = egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0));
            ui.painter().image(tex.id(), rect, uv, egui::Color32::WHITE);
        }
        ui.allocate_rect(avail, egui::Sense::hover());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_rect_wide_area() {
        // 4:3 图像放进 16:9 区域: 高度填满, 左右留黑边
        let (x, y, w, h) = fit_rect(1600.0, 900.0, 640, 480);
        assert!((w - 1200.0).abs() < 1e-2);
        assert_eq!(h, 900.0);
        assert!((x - 200.0).abs() < 1e-2);
        assert_eq!(y, 0.0);
    }

    #[test]
    fn test_fit_rect_tall_area() {
        let (x, y, w, h) = fit_rect(400.0, 800.0, 1920, 1080);
        assert_eq!(w, 400.0);
        assert!((h - 225.0).abs() < 1e-3);
        assert_eq!(x, 0.0);
        assert!((y - 287.5).abs() < 1e-3);
    }

    #[test]
    fn test_fit_rect_degenerate() {
        assert_eq!(fit_rect(1.0, 500.0, 10, 10), (0.0, 0.0, 0.0, 0.0));
        assert_eq!(fit_rect(500.0, 500.0, 0, 10), (0.0, 0.0, 0.0, 0.0));
    }

    #[test]
    fn test_resize_rgb() {
        let src = RgbImage::from_pixel(40, 20, image::Rgb([200, 100, 50]));
        let out = resize_rgb(&src, 10, 5).unwrap();
        assert_eq!(out.dimensions(), (10, 5));
        let px = out.get_pixel(5, 2).0;
        for (got, want) in px.iter().zip([200u8, 100, 50]) {
            assert!((*got as i32 - want as i32).abs() <= 1);
        }
        assert_eq!(resize_rgb(&src, 40, 20).unwrap(), src);
    }
}
