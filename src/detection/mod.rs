/// 检测系统 (Detection System)
///
/// - Detector:  推理适配器 (模型加载 + 单帧推理)
/// - Annotate:  检测框与标签绘制
/// - Types:     检测结果与类别计数
pub mod annotate;
pub mod detector;
pub mod types;

pub use annotate::{load_font, Annotator};
pub use detector::{Detector, DetectorOptions, SharedDetector, YoloDetector};
pub use types::{count_by_class, Counts, Detection, Inference};
