// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 应用配置: 命令行参数 + JSON 配置文件
//!
//! 启动时先读取 JSON (不存在则写入默认值), 再用命令行参数覆盖.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::DetectorError;

/// 最近打开文件的保留数量
pub const MAX_RECENT_FILES: usize = 10;

/// 默认配置文件名
pub const DEFAULT_CONFIG_FILE: &str = "gui_detector.json";

#[derive(Parser, Clone, Debug)]
#[command(author, version, about = "YOLO GUI Detector - 图片/视频/摄像头目标检测", long_about = None)]
pub struct Args {
    /// JSON 配置文件路径
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// 模型目录 (默认: 可执行文件旁的 models/)
    #[arg(long)]
    pub models_dir: Option<PathBuf>,

    /// 摄像头设备索引
    #[arg(long)]
    pub camera: Option<usize>,

    /// 置信度阈值
    #[arg(long)]
    pub conf: Option<f32>,

    /// NMS IOU 阈值
    #[arg(long)]
    pub iou: Option<f32>,

    /// 使用 CUDA 执行器
    #[arg(long)]
    pub cuda: bool,

    /// 标注文字使用的字体 (TTF/OTF)
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// 跳过启动画面
    #[arg(long)]
    pub no_splash: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    // === 路径 ===
    pub models_dir: PathBuf,
    pub font_path: Option<PathBuf>,
    pub recent_files: Vec<PathBuf>,

    // === 输入源 ===
    pub camera_index: usize,
    pub join_timeout_ms: u64, // 停止采集线程的等待上限
    pub frame_queue: usize,   // UI 帧队列容量

    // === 检测参数 ===
    pub conf_threshold: f32,
    pub iou_threshold: f32,
    pub input_size: u32, // 模型元数据缺少 imgsz 时使用
    pub cuda: bool,

    // === 界面 ===
    pub splash_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            models_dir: default_models_dir(),
            font_path: None,
            recent_files: Vec::new(),
            camera_index: 0,
            join_timeout_ms: 500,
            frame_queue: 1,
            conf_threshold: 0.25,
            iou_threshold: 0.45,
            input_size: 640,
            cuda: false,
            splash_ms: 1500,
        }
    }
}

/// 可执行文件旁的 models/ 目录
pub fn default_models_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("models")))
        .unwrap_or_else(|| PathBuf::from("models"))
}

impl AppConfig {
    /// 从JSON文件加载配置; 文件不存在时写入默认配置
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(config) => {
                    info!("✅ 配置已从 {} 加载", path.display());
                    config
                }
                Err(e) => {
                    warn!("⚠️ 配置文件解析失败: {}, 使用默认值", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("📝 配置文件不存在,创建默认配置...");
                let config = Self::default();
                if let Err(e) = config.save(path) {
                    warn!("❌ {}", e);
                }
                config
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), DetectorError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| DetectorError::Config(format!("序列化配置失败: {}", e)))?;
        fs::write(path, json).map_err(|e| DetectorError::file_io("save config", path, e))?;
        info!("💾 配置已保存到 {}", path.display());
        Ok(())
    }

    /// 命令行参数覆盖文件配置
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(dir) = &args.models_dir {
            self.models_dir = dir.clone();
        }
        if let Some(index) = args.camera {
            self.camera_index = index;
        }
        if let Some(conf) = args.conf {
            self.conf_threshold = conf;
        }
        if let Some(iou) = args.iou {
            self.iou_threshold = iou;
        }
        if let Some(font) = &args.font {
            self.font_path = Some(font.clone());
        }
        self.cuda |= args.cuda;
        self.validate();
    }

    /// 修正越界参数
    pub fn validate(&mut self) {
        self.conf_threshold = self.conf_threshold.clamp(0.0, 1.0);
        self.iou_threshold = self.iou_threshold.clamp(0.0, 1.0);
        self.frame_queue = self.frame_queue.max(1);
        if self.input_size == 0 {
            self.input_size = 640;
        }
    }

    /// 记录最近打开的文件 (最新的在最前面)
    pub fn push_recent(&mut self, path: &Path) {
        self.recent_files.retain(|p| p != path);
        self.recent_files.insert(0, path.to_path_buf());
        self.recent_files.truncate(MAX_RECENT_FILES);
    }

    pub fn summary(&self) {
        info!("🎛️ 当前配置:");
        info!("  模型目录: {}", self.models_dir.display());
        info!("  摄像头索引: {}", self.camera_index);
        info!(
            "  置信度: {:.2} | IOU: {:.2} | 输入尺寸: {}",
            self.conf_threshold, self.iou_threshold, self.input_size
        );
        info!("  CUDA: {}", if self.cuda { "启用" } else { "禁用" });
    }
}
