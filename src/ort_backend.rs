// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! ONNX Runtime 推理后端
//!
//! 负责加载 .onnx 模型、读取 Ultralytics 导出的元数据 (names / imgsz),
//! 以及执行一次前向推理.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ndarray::{Array, IxDyn};
use once_cell::sync::Lazy;
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, ValueType};
use regex::Regex;
use tracing::{debug, info, warn};

/// `{0: 'person', 1: 'bicycle', ...}` 中的类别名
static NAMES_RE: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r#"(['"])([-()\w '"]+)(['"])"#));

/// `[640, 640]` 中的数字
static DIGITS_RE: Lazy<Result<Regex, regex::Error>> = Lazy::new(|| Regex::new(r"\d+"));

/// 执行器 (Execution Provider)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrtEP {
    CPU,
    CUDA(i32),
}

#[derive(Debug, Clone)]
pub struct OrtConfig {
    pub f: PathBuf,
    pub ep: OrtEP,
    /// 元数据和输入形状都拿不到尺寸时使用
    pub image_size: u32,
}

pub struct OrtBackend {
    session: Session,
    ep: OrtEP,
    height: u32,
    width: u32,
    output_rows: Option<usize>,
    names: Option<Vec<String>>,
}

impl OrtBackend {
    pub fn build(args: OrtConfig) -> Result<Self> {
        if !args.f.is_file() {
            anyhow::bail!("model file not found: {}", args.f.display());
        }

        let builder = Session::builder()
            .context("failed to create ORT session builder")?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .context("failed to set optimization level")?;

        let builder = match args.ep {
            OrtEP::CUDA(device_id) => builder
                .with_execution_providers([
                    CUDAExecutionProvider::default()
                        .with_device_id(device_id)
                        .build(),
                    CPUExecutionProvider::default().build(),
                ])
                .context("failed to register CUDA execution provider")?,
            OrtEP::CPU => builder
                .with_execution_providers([CPUExecutionProvider::default().build()])
                .context("failed to register CPU execution provider")?,
        };

        let session = builder
            .commit_from_file(&args.f)
            .with_context(|| format!("failed to load ONNX model {}", args.f.display()))?;

        // 输入尺寸: 元数据 imgsz → 输入形状 → 配置
        let (mut height, mut width) = (args.image_size, args.image_size);
        let mut names = None;
        if let Ok(meta) = session.metadata() {
            if let Ok(Some(raw)) = meta.custom("names") {
                names = Some(parse_names(&raw));
            }
            if let Ok(Some(raw)) = meta.custom("imgsz") {
                if let Some((h, w)) = parse_imgsz(&raw) {
                    (height, width) = (h, w);
                }
            }
        }
        if names.is_none() {
            warn!("⚠️ 模型缺少 names 元数据, 使用 class_<id> 作为类别名");
        }
        if let Some(input) = session.inputs.first() {
            if let ValueType::Tensor { shape, .. } = &input.input_type {
                if shape.len() == 4 && shape[2] > 0 && shape[3] > 0 {
                    (height, width) = (shape[2] as u32, shape[3] as u32);
                }
            }
        }
        // 输出 [batch, 4 + nc, anchors]
        let output_rows = session.outputs.first().and_then(|output| {
            match &output.output_type {
                ValueType::Tensor { shape, .. } if shape.len() == 3 && shape[1] > 0 => {
                    Some(shape[1] as usize)
                }
                _ => None,
            }
        });

        info!(
            "✅ 模型加载成功: {} ({}x{}, {:?})",
            args.f.display(),
            width,
            height,
            args.ep
        );

        Ok(Self {
            session,
            ep: args.ep,
            height,
            width,
            output_rows,
            names,
        })
    }

    /// 单输入前向推理, 返回全部输出张量
    pub fn run(&mut self, xs: Array<f32, IxDyn>) -> Result<Vec<Array<f32, IxDyn>>> {
        let t = std::time::Instant::now();
        let shape = xs.shape().to_vec();
        let data = xs.as_standard_layout().into_owned().into_raw_vec_and_offset().0;
        let input = Tensor::from_array((shape, data.into_boxed_slice()))
            .context("failed to create input tensor")?;

        let outputs = self
            .session
            .run(ort::inputs![input])
            .context("ONNX Runtime inference failed")?;

        let mut ys = Vec::with_capacity(outputs.len());
        for i in 0..outputs.len() {
            let (shape, data) = outputs[i]
                .try_extract_tensor::<f32>()
                .context("failed to extract output tensor")?;
            let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
            ys.push(Array::from_shape_vec(IxDyn(&dims), data.to_vec())?);
        }
        debug!("[Model Inference]: {:?}", t.elapsed());
        Ok(ys)
    }

    pub fn ep(&self) -> OrtEP {
        self.ep
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    /// 类别数, 优先使用元数据
    pub fn nc(&self) -> Option<usize> {
        match &self.names {
            Some(names) if !names.is_empty() => Some(names.len()),
            _ => self.output_rows.and_then(|rows| rows.checked_sub(4)),
        }
    }

    pub fn names(&self) -> Option<Vec<String>> {
        self.names.clone()
    }
}

/// 解析 Ultralytics `names` 元数据
pub fn parse_names(raw: &str) -> Vec<String> {
    let Ok(re) = NAMES_RE.as_ref() else {
        return Vec::new();
    };
    re.captures_iter(raw)
        .filter_map(|cap| cap.get(2))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// 解析 `imgsz` 元数据, 返回 (height, width)
pub fn parse_imgsz(raw: &str) -> Option<(u32, u32)> {
    let re = DIGITS_RE.as_ref().ok()?;
    let dims: Vec<u32> = re
        .find_iter(raw)
        .filter_map(|m| m.as_str().parse().ok())
        .collect();
    match dims.as_slice() {
        [s] if *s > 0 => Some((*s, *s)),
        [h, w, ..] if *h > 0 && *w > 0 => Some((*h, *w)),
        _ => None,
    }
}

/// 模型路径是否可被后端识别
pub fn is_model_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("onnx"))
        .unwrap_or(false)
}
