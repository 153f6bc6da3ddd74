/// 采集系统 (Capture)
///
/// 两线程架构, 单向通信:
/// - 采集线程: FrameSource 读帧 → (可选)检测 → UiSink
/// - UI线程:   UiInbox 取最新帧与事件 → 渲染
pub mod capture_loop;
pub mod sink;

pub use capture_loop::{CaptureLoop, LoopState, PredictionSwitch, DEFAULT_JOIN_TIMEOUT};
pub use sink::{dispatch_channel, FramePayload, UiEvent, UiInbox, UiSink};
