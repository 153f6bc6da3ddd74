//! 模型目录管理: 列出 / 上传 / 删除 `.onnx` 模型

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::DetectorError;
use crate::ort_backend::is_model_file;

/// 目录中没有模型时的占位项
pub const NO_MODELS_PLACEHOLDER: &str = "No models found";
/// 目录读取失败时的占位项
pub const LOAD_ERROR_PLACEHOLDER: &str = "Error loading models";

/// 下拉框 / 管理窗口中的一项
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelEntry {
    Model(String),
    Placeholder(&'static str),
}

impl ModelEntry {
    pub fn label(&self) -> &str {
        match self {
            ModelEntry::Model(name) => name,
            ModelEntry::Placeholder(text) => text,
        }
    }

    /// 占位项不能用于预测或删除
    pub fn model_name(&self) -> Option<&str> {
        match self {
            ModelEntry::Model(name) => Some(name),
            ModelEntry::Placeholder(_) => None,
        }
    }
}

/// 上传结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded(String),
    Replaced(String),
    /// 同名模型已存在且未确认覆盖, 未写入任何文件
    Conflict(String),
}

#[derive(Debug, Clone)]
pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    /// 打开模型目录, 不存在时创建
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, DetectorError> {
        let dir = dir.into();
        if !dir.is_dir() {
            fs::create_dir_all(&dir)
                .map_err(|e| DetectorError::file_io("create models directory", &dir, e))?;
            info!("📁 已创建模型目录: {}", dir.display());
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// 按文件名升序列出模型
    pub fn list(&self) -> Result<Vec<String>, DetectorError> {
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| DetectorError::file_io("list models", &self.dir, e))?;
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && is_model_file(path))
            .filter_map(|path| path.file_name().and_then(|n| n.to_str()).map(String::from))
            .collect();
        names.sort();
        Ok(names)
    }

    /// 下拉框内容; 没有模型或读取失败时返回占位项
    pub fn entries(&self) -> Vec<ModelEntry> {
        match self.list() {
            Ok(names) if names.is_empty() => vec![ModelEntry::Placeholder(NO_MODELS_PLACEHOLDER)],
            Ok(names) => names.into_iter().map(ModelEntry::Model).collect(),
            Err(e) => {
                warn!("⚠️ {}", e);
                vec![ModelEntry::Placeholder(LOAD_ERROR_PLACEHOLDER)]
            }
        }
    }

    /// 复制外部模型到目录; 重名且 `overwrite == false` 时返回 Conflict
    pub fn upload(&self, src: &Path, overwrite: bool) -> Result<UploadOutcome, DetectorError> {
        let name = src
            .file_name()
            .and_then(|n| n.to_str())
            .map(String::from)
            .ok_or_else(|| {
                DetectorError::file_io(
                    "upload",
                    src,
                    std::io::Error::new(std::io::ErrorKind::InvalidInput, "invalid file name"),
                )
            })?;
        if !src.is_file() {
            return Err(DetectorError::file_io(
                "upload",
                src,
                std::io::Error::new(std::io::ErrorKind::NotFound, "source file not found"),
            ));
        }

        let dest = self.path_of(&name);
        let exists = dest.exists();
        if exists && !overwrite {
            return Ok(UploadOutcome::Conflict(name));
        }

        fs::copy(src, &dest).map_err(|e| DetectorError::file_io("upload", &dest, e))?;
        info!("📦 模型已上传: {} → {}", src.display(), dest.display());
        Ok(if exists {
            UploadOutcome::Replaced(name)
        } else {
            UploadOutcome::Uploaded(name)
        })
    }

    pub fn delete(&self, name: &str) -> Result<(), DetectorError> {
        let path = self.path_of(name);
        fs::remove_file(&path).map_err(|e| DetectorError::file_io("delete", &path, e))?;
        info!("🗑️ 模型已删除: {}", path.display());
        Ok(())
    }
}
