/// 视频输入系统 (Frame Source)
///
/// - FrameSource: 帧源抽象 + 幂等关闭句柄
/// - FfmpegSource: 视频文件 / 本地摄像头解码 (DirectShow/AVFoundation/V4L2)
/// - DecodeFilter: FFmpeg 帧过滤与 YUV → RGB 转换
/// - Still: 静态图片读取
pub mod camera;
pub mod decode_filter;
pub mod decoder;
pub mod source;
pub mod still;

pub use camera::get_camera_devices;
pub use decode_filter::DecodeFilter;
pub use decoder::{DecoderOptions, FfmpegSource};
pub use source::{
    frame_interval, media_kind_of, CloseHandle, Frame, FrameSource, MediaKind, MediaSource,
    IMAGE_EXTENSIONS, VIDEO_EXTENSIONS,
};
pub use still::load_still;
