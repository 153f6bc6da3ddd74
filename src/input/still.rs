//! 静态图片输入

use std::path::Path;

use image::RgbImage;
use tracing::info;

use crate::error::DetectorError;

/// 读取图片并转为 RGB
pub fn load_still(path: &Path) -> Result<RgbImage, DetectorError> {
    let img = image::open(path)
        .map_err(|e| DetectorError::source_unavailable(path.display().to_string(), e))?;
    let rgb = img.to_rgb8();
    info!(
        "🖼️ 图片已加载: {} ({}x{})",
        path.display(),
        rgb.width(),
        rgb.height()
    );
    Ok(rgb)
}
