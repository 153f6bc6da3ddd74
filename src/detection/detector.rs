//! 检测器 (Detector Adapter)
//! 职责: 单帧 → YOLO推理 → (标注图像, 检测框, 类别计数)

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use image::RgbImage;
use tracing::{debug, info};

use super::annotate::{load_font, Annotator};
use super::types::{class_name, count_by_class, Detection, Inference};
use crate::error::DetectorError;
use crate::models::{Model, YOLOv8, YOLOv8Config};
use crate::ort_backend::OrtEP;

/// 采集线程与界面线程共享的检测器
pub type SharedDetector = Arc<Mutex<Box<dyn Detector>>>;

pub trait Detector: Send {
    /// 推理一帧; 计数之和等于检测框数量
    fn infer(&mut self, frame: &RgbImage) -> Result<Inference, DetectorError>;

    fn class_names(&self) -> &[String];
}

/// 模型加载参数
#[derive(Debug, Clone)]
pub struct DetectorOptions {
    pub conf: f32,
    pub iou: f32,
    pub input_size: u32,
    pub cuda: bool,
    pub font_path: Option<PathBuf>,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            conf: 0.25,
            iou: 0.45,
            input_size: 640,
            cuda: false,
            font_path: None,
        }
    }
}

impl From<&crate::AppConfig> for DetectorOptions {
    fn from(config: &crate::AppConfig) -> Self {
        Self {
            conf: config.conf_threshold,
            iou: config.iou_threshold,
            input_size: config.input_size,
            cuda: config.cuda,
            font_path: config.font_path.clone(),
        }
    }
}

pub struct YoloDetector {
    model: Box<dyn Model>,
    annotator: Annotator,
    path: PathBuf,

    // 统计
    count: u64,
    last: Instant,
}

impl YoloDetector {
    pub fn load(path: &Path, options: &DetectorOptions) -> Result<Self, DetectorError> {
        let ep = if options.cuda {
            OrtEP::CUDA(0)
        } else {
            OrtEP::CPU
        };
        let model = YOLOv8::new(YOLOv8Config {
            model: path.to_path_buf(),
            ep,
            conf: options.conf,
            iou: options.iou,
            image_size: options.input_size,
        })
        .map_err(|e| DetectorError::model_load(path, format!("{:#}", e)))?;
        model.summary();

        Ok(Self::with_model(
            Box::new(model),
            Annotator::new(load_font(options.font_path.as_deref())),
            path,
        ))
    }

    pub fn with_model(model: Box<dyn Model>, annotator: Annotator, path: &Path) -> Self {
        Self {
            model,
            annotator,
            path: path.to_path_buf(),
            count: 0,
            last: Instant::now(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 转为共享句柄
    pub fn into_shared(self) -> SharedDetector {
        Arc::new(Mutex::new(Box::new(self)))
    }
}

impl Detector for YoloDetector {
    fn infer(&mut self, frame: &RgbImage) -> Result<Inference, DetectorError> {
        let t = Instant::now();
        let mut ys = self
            .model
            .forward(std::slice::from_ref(frame))
            .map_err(|e| DetectorError::Inference(format!("{:#}", e)))?;
        let boxes = if ys.is_empty() {
            Vec::new()
        } else {
            ys.swap_remove(0)
        };

        let names = self.model.names();
        let detections: Vec<Detection> = boxes
            .into_iter()
            .map(|bbox| Detection {
                class_name: class_name(names, bbox.id()),
                bbox,
            })
            .collect();
        let counts = count_by_class(&detections);
        let annotated = self.annotator.annotate(frame, &detections);

        // 每秒打印一次推理统计
        self.count += 1;
        if self.last.elapsed().as_secs_f64() >= 1.0 {
            let fps = self.count as f64 / self.last.elapsed().as_secs_f64();
            debug!(
                "🎯 检测: {}个目标 | {:.1}ms/帧 | {:.1}fps",
                detections.len(),
                t.elapsed().as_secs_f64() * 1000.0,
                fps
            );
            self.count = 0;
            self.last = Instant::now();
        }

        Ok(Inference {
            annotated,
            detections,
            counts,
        })
    }

    fn class_names(&self) -> &[String] {
        self.model.names()
    }
}

impl Drop for YoloDetector {
    fn drop(&mut self) {
        info!("🗑️ 卸载模型: {}", self.path.display());
    }
}
