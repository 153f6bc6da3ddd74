// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 错误分类 (Error taxonomy)
//!
//! 每个用户操作在自己的边界处捕获这些错误, 转成一条日志和一个提示,
//! 不会终止进程.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectorError {
    /// 摄像头或视频/图片文件无法打开
    #[error("source unavailable: {source_desc}: {reason}")]
    SourceUnavailable { source_desc: String, reason: String },

    /// 模型文件缺失、不可读或格式无效
    #[error("failed to load model {path}: {cause}")]
    ModelLoad { path: PathBuf, cause: String },

    /// 单帧推理失败, 当前预测会话结束
    #[error("inference failed: {0}")]
    Inference(String),

    /// 上传/删除/读写文件失败
    #[error("{action} failed for {path}: {source}")]
    FileIo {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 表格写出失败
    #[error("export failed: {0}")]
    Export(String),

    /// 没有可导出的检测结果
    #[error("no detection results to export")]
    NoResults,

    /// 未选择有效模型
    #[error("no model selected")]
    NoModelSelected,

    #[error("configuration error: {0}")]
    Config(String),
}

impl DetectorError {
    pub fn source_unavailable(source_desc: impl Into<String>, reason: impl ToString) -> Self {
        Self::SourceUnavailable {
            source_desc: source_desc.into(),
            reason: reason.to_string(),
        }
    }

    pub fn model_load(path: impl Into<PathBuf>, cause: impl ToString) -> Self {
        Self::ModelLoad {
            path: path.into(),
            cause: cause.to_string(),
        }
    }

    pub fn file_io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileIo {
            action,
            path: path.into(),
            source,
        }
    }

    /// 对话框标题
    pub fn title(&self) -> &'static str {
        match self {
            Self::SourceUnavailable { .. } => "Source Error",
            Self::ModelLoad { .. } => "Model Error",
            Self::Inference(_) => "Prediction Error",
            Self::FileIo { .. } => "File Error",
            Self::Export(_) => "Export Error",
            Self::NoResults => "No Results",
            Self::NoModelSelected => "No Model",
            Self::Config(_) => "Configuration Error",
        }
    }
}

impl From<rust_xlsxwriter::XlsxError> for DetectorError {
    fn from(e: rust_xlsxwriter::XlsxError) -> Self {
        Self::Export(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_wraps_cause() {
        let err = DetectorError::model_load("models/a.onnx", "invalid protobuf");
        let text = err.to_string();
        assert!(text.contains("models/a.onnx"));
        assert!(text.contains("invalid protobuf"));
        assert_eq!(err.title(), "Model Error");
    }

    #[test]
    fn test_file_io_keeps_source() {
        use std::error::Error as _;
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = DetectorError::file_io("delete", "models/b.onnx", io);
        assert!(err.source().is_some());
        assert!(err.to_string().starts_with("delete failed"));
    }
}
