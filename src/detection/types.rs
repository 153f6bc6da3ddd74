/// 检测数据结构定义
/// Data structures for the detector adapter
use std::collections::BTreeMap;

use image::RgbImage;

use crate::Bbox;

/// 类别名 → 数量, 按类别名升序
pub type Counts = BTreeMap<String, usize>;

/// 单个检测目标 (原图坐标)
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub bbox: Bbox,
    pub class_name: String,
}

impl Detection {
    pub fn class_id(&self) -> usize {
        self.bbox.id()
    }

    pub fn confidence(&self) -> f32 {
        self.bbox.confidence()
    }
}

/// 单帧推理结果
#[derive(Clone, Debug)]
pub struct Inference {
    /// 画好检测框的图像, 尺寸与输入一致
    pub annotated: RgbImage,
    pub detections: Vec<Detection>,
    pub counts: Counts,
}

/// 每个检测框计一次, 按类别名分组
pub fn count_by_class(detections: &[Detection]) -> Counts {
    let mut counts = Counts::new();
    for det in detections {
        *counts.entry(det.class_name.clone()).or_insert(0) += 1;
    }
    counts
}

/// 类别 id → 名称, 超出范围时为 class_<id>
pub fn class_name(names: &[String], id: usize) -> String {
    names
        .get(id)
        .cloned()
        .unwrap_or_else(|| format!("class_{}", id))
}
