/// 模型统一接口与实现
///
/// ## Model Trait
/// 统一的模型接口,定义标准流程: preprocess → run → postprocess
///
/// ```text
/// 原始图片 → preprocess → ndarray张量
///          ↓
///     推理引擎 run
///          ↓
///     原始输出 → postprocess → 检测框 (原图坐标)
/// ```
use anyhow::Result;
use image::RgbImage;
use ndarray::{Array, IxDyn};

use crate::Bbox;

pub trait Model: Send {
    /// 预处理: 图片 → NCHW 张量
    fn preprocess(&mut self, images: &[RgbImage]) -> Result<Array<f32, IxDyn>>;

    /// 推理: 执行模型前向传播, 返回原始输出
    fn run(&mut self, xs: Array<f32, IxDyn>) -> Result<Vec<Array<f32, IxDyn>>>;

    /// 后处理: 原始输出 → 每张图片的检测框
    fn postprocess(&self, xs: Vec<Array<f32, IxDyn>>, xs0: &[RgbImage])
        -> Result<Vec<Vec<Bbox>>>;

    /// 完整的推理流程: preprocess → run → postprocess
    fn forward(&mut self, images: &[RgbImage]) -> Result<Vec<Vec<Bbox>>> {
        let xs = self.preprocess(images)?;
        let ys = self.run(xs)?;
        self.postprocess(ys, images)
    }

    /// 类别名, 下标即类别 id
    fn names(&self) -> &[String];

    /// 打印模型信息
    fn summary(&self);
}

pub mod yolov8;

pub use yolov8::{YOLOv8, YOLOv8Config, YOLOv8Postprocessor};
