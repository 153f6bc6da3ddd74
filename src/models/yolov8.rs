// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// YOLOv8 检测模型
// 包含: 模型加载、预处理、推理、后处理

use anyhow::Result;
use image::{imageops::FilterType, RgbImage};
use ndarray::{s, Array, Axis, IxDyn};
use tracing::info;

use crate::ort_backend::{OrtBackend, OrtConfig, OrtEP};
use crate::{non_max_suppression, Bbox};

/// 边框偏移: cx, cy, w, h
const CXYWH_OFFSET: usize = 4;

/// letterbox 填充色
const PAD_VALUE: f32 = 144.0 / 255.0;

#[derive(Debug, Clone)]
pub struct YOLOv8Config {
    pub model: std::path::PathBuf,
    pub ep: OrtEP,
    pub conf: f32,
    pub iou: f32,
    pub image_size: u32,
}

/// YOLOv8 检测模型
pub struct YOLOv8 {
    engine: OrtBackend,
    post: YOLOv8Postprocessor,
    names: Vec<String>,
}

impl YOLOv8 {
    pub fn new(config: YOLOv8Config) -> Result<Self> {
        let engine = OrtBackend::build(OrtConfig {
            f: config.model,
            ep: config.ep,
            image_size: config.image_size,
        })?;

        // class names, 缺少元数据时按类别数生成 class_<id>
        let names = engine.names().unwrap_or_else(|| {
            (0..engine.nc().unwrap_or(0))
                .map(|i| format!("class_{}", i))
                .collect()
        });

        let post = YOLOv8Postprocessor {
            nc: engine.nc(),
            width: engine.width(),
            height: engine.height(),
            conf: config.conf,
            iou: config.iou,
        };

        Ok(Self {
            engine,
            post,
            names,
        })
    }

    pub fn width(&self) -> u32 {
        self.engine.width()
    }

    pub fn height(&self) -> u32 {
        self.engine.height()
    }
}

impl super::Model for YOLOv8 {
    fn preprocess(&mut self, images: &[RgbImage]) -> Result<Array<f32, IxDyn>> {
        Ok(letterbox(images, self.width(), self.height()))
    }

    fn run(&mut self, xs: Array<f32, IxDyn>) -> Result<Vec<Array<f32, IxDyn>>> {
        self.engine.run(xs)
    }

    fn postprocess(
        &self,
        xs: Vec<Array<f32, IxDyn>>,
        xs0: &[RgbImage],
    ) -> Result<Vec<Vec<Bbox>>> {
        self.post.postprocess(xs, xs0)
    }

    fn names(&self) -> &[String] {
        &self.names
    }

    fn summary(&self) {
        info!(
            "🔍 YOLOv8 | EP: {:?}{} | 输入: {}x{} | nc: {} | conf: {} | iou: {}",
            self.engine.ep(),
            if let OrtEP::CPU = self.engine.ep() {
                ""
            } else {
                " (May still fall back to CPU)"
            },
            self.width(),
            self.height(),
            self.names.len(),
            self.post.conf,
            self.post.iou,
        );
    }
}

fn scale_wh(w0: f32, h0: f32, w1: f32, h1: f32) -> (f32, f32, f32) {
    let r = (w1 / w0).min(h1 / h0);
    (r, (w0 * r).round(), (h0 * r).round())
}

/// 等比缩放到 width x height, 左上角对齐, 其余部分填充, 输出 NCHW [0,1]
pub fn letterbox(xs: &[RgbImage], width: u32, height: u32) -> Array<f32, IxDyn> {
    let mut ys = Array::from_elem((xs.len(), 3, height as usize, width as usize), PAD_VALUE)
        .into_dyn();
    for (idx, x) in xs.iter().enumerate() {
        if x.width() == 0 || x.height() == 0 {
            continue;
        }
        let (_, w_new, h_new) = scale_wh(
            x.width() as f32,
            x.height() as f32,
            width as f32,
            height as f32,
        );
        let (w_new, h_new) = ((w_new as u32).clamp(1, width), (h_new as u32).clamp(1, height));
        let img = image::imageops::resize(x, w_new, h_new, FilterType::Triangle);
        for (x, y, rgb) in img.enumerate_pixels() {
            let x = x as usize;
            let y = y as usize;
            let [r, g, b] = rgb.0;
            ys[[idx, 0, y, x]] = (r as f32) / 255.0;
            ys[[idx, 1, y, x]] = (g as f32) / 255.0;
            ys[[idx, 2, y, x]] = (b as f32) / 255.0;
        }
    }
    ys
}

/// YOLOv8 检测头后处理: [batch, 4 + nc, anchors] → 原图坐标的检测框
#[derive(Debug, Clone)]
pub struct YOLOv8Postprocessor {
    /// None 时由输出形状推断
    pub nc: Option<usize>,
    pub width: u32,
    pub height: u32,
    pub conf: f32,
    pub iou: f32,
}

impl YOLOv8Postprocessor {
    pub fn postprocess(
        &self,
        xs: Vec<Array<f32, IxDyn>>,
        xs0: &[RgbImage],
    ) -> Result<Vec<Vec<Bbox>>> {
        let Some(preds) = xs.first() else {
            anyhow::bail!("model produced no outputs");
        };
        if preds.ndim() != 3 {
            anyhow::bail!("unexpected output shape {:?}", preds.shape());
        }
        let rows = preds.shape()[1];
        let nc = self.nc.unwrap_or(rows.saturating_sub(CXYWH_OFFSET));
        if nc == 0 || rows < CXYWH_OFFSET + nc {
            anyhow::bail!(
                "output has {} rows, expected at least {} (4 + {} classes)",
                rows,
                CXYWH_OFFSET + nc,
                nc
            );
        }

        let mut ys = Vec::new();
        for (idx, anchor) in preds.axis_iter(Axis(0)).enumerate() {
            let Some(x0) = xs0.get(idx) else {
                break;
            };
            let width_original = x0.width() as f32;
            let height_original = x0.height() as f32;
            let ratio =
                (self.width as f32 / width_original).min(self.height as f32 / height_original);

            let mut data: Vec<Bbox> = Vec::new();
            for pred in anchor.axis_iter(Axis(1)) {
                let bbox = pred.slice(s![0..CXYWH_OFFSET]);
                let clss = pred.slice(s![CXYWH_OFFSET..CXYWH_OFFSET + nc]);

                let Some((id, &confidence)) = clss
                    .into_iter()
                    .enumerate()
                    .reduce(|max, x| if x.1 > max.1 { x } else { max })
                else {
                    continue;
                };

                if confidence < self.conf {
                    continue;
                }

                let cx = bbox[0] / ratio;
                let cy = bbox[1] / ratio;
                let w = bbox[2] / ratio;
                let h = bbox[3] / ratio;
                let x1 = (cx - w / 2.).clamp(0.0, width_original);
                let y1 = (cy - h / 2.).clamp(0.0, height_original);
                let x2 = (cx + w / 2.).clamp(0.0, width_original);
                let y2 = (cy + h / 2.).clamp(0.0, height_original);
                if x2 <= x1 || y2 <= y1 {
                    continue;
                }
                data.push(Bbox::new(x1, y1, x2 - x1, y2 - y1, id, confidence));
            }

            non_max_suppression(&mut data, self.iou);
            ys.push(data);
        }

        Ok(ys)
    }
}
