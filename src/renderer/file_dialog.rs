//! 界面内文件浏览器 (打开 / 保存)

use std::fs;
use std::path::{Path, PathBuf};

use egui_macroquad::egui;

use crate::export::with_default_extension;
use crate::input::{IMAGE_EXTENSIONS, VIDEO_EXTENSIONS};

/// 对话框用途
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilePurpose {
    OpenImage,
    OpenVideo,
    UploadModel,
    SaveResults,
}

impl FilePurpose {
    pub fn title(&self) -> &'static str {
        match self {
            FilePurpose::OpenImage => "Select Image",
            FilePurpose::OpenVideo => "Select Video",
            FilePurpose::UploadModel => "Select ONNX Model",
            FilePurpose::SaveResults => "Save Detection Results",
        }
    }

    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            FilePurpose::OpenImage => &IMAGE_EXTENSIONS,
            FilePurpose::OpenVideo => &VIDEO_EXTENSIONS,
            FilePurpose::UploadModel => &["onnx"],
            FilePurpose::SaveResults => &["xlsx"],
        }
    }

    pub fn is_save(&self) -> bool {
        matches!(self, FilePurpose::SaveResults)
    }

    /// 取消时写入活动日志的文字
    pub fn cancel_message(&self) -> &'static str {
        match self {
            FilePurpose::OpenImage => "Image selection cancelled.",
            FilePurpose::OpenVideo => "Video selection cancelled.",
            FilePurpose::UploadModel => "Model upload selection cancelled.",
            FilePurpose::SaveResults => "Saving results cancelled by user.",
        }
    }
}

/// 扩展名过滤 (不区分大小写); 空列表表示全部文件
pub fn matches_filter(path: &Path, extensions: &[&str]) -> bool {
    if extensions.is_empty() {
        return true;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// 列出目录: (子目录, 匹配的文件), 均按名称排序, 跳过隐藏项
pub fn list_dir(dir: &Path, extensions: &[&str]) -> std::io::Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    let mut dirs = Vec::new();
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with('.'))
            .unwrap_or(true);
        if hidden {
            continue;
        }
        if path.is_dir() {
            dirs.push(path);
        } else if matches_filter(&path, extensions) {
            files.push(path);
        }
    }
    dirs.sort();
    files.sort();
    Ok((dirs, files))
}

/// 保存目标: 目录 + 文件名, 缺少扩展名时补 `.xlsx`
pub fn save_target(dir: &Path, file_name: &str) -> Option<PathBuf> {
    let name = file_name.trim();
    if name.is_empty() {
        return None;
    }
    Some(with_default_extension(&dir.join(name)))
}

/// 本帧对话框的结果
#[derive(Debug, Clone, PartialEq)]
pub enum BrowserResult {
    Pending,
    Picked(PathBuf),
    Cancelled,
}

pub struct FileBrowser {
    purpose: FilePurpose,
    dir: PathBuf,
    path_text: String,
    file_name: String,
    show_all: bool,
    dirs: Vec<PathBuf>,
    files: Vec<PathBuf>,
    selected: Option<PathBuf>,
    recent: Vec<PathBuf>,
    error: Option<String>,
}

impl FileBrowser {
    pub fn new(purpose: FilePurpose, start_dir: &Path, recent: &[PathBuf]) -> Self {
        let recent = recent
            .iter()
            .filter(|p| p.is_file() && matches_filter(p, purpose.extensions()))
            .cloned()
            .collect();
        let mut browser = Self {
            purpose,
            dir: start_dir.to_path_buf(),
            path_text: String::new(),
            file_name: if purpose.is_save() {
                format!("detection_results_{}.xlsx", crate::gen_time_string(""))
            } else {
                String::new()
            },
            show_all: false,
            dirs: Vec::new(),
            files: Vec::new(),
            selected: None,
            recent,
            error: None,
        };
        browser.change_dir(start_dir.to_path_buf());
        browser
    }

    pub fn purpose(&self) -> FilePurpose {
        self.purpose
    }

    fn filter(&self) -> &'static [&'static str] {
        if self.show_all {
            &[]
        } else {
            self.purpose.extensions()
        }
    }

    fn change_dir(&mut self, dir: PathBuf) {
        match list_dir(&dir, self.filter()) {
            Ok((dirs, files)) => {
                self.dirs = dirs;
                self.files = files;
                self.path_text = dir.display().to_string();
                self.dir = dir;
                self.selected = None;
                self.error = None;
            }
            Err(e) => self.error = Some(format!("{}: {}", dir.display(), e)),
        }
    }

    /// 绘制对话框
    pub fn show(&mut self, ctx: &egui::Context) -> BrowserResult {
        let mut result = BrowserResult::Pending;
        let mut open = true;
        let mut go_to: Option<PathBuf> = None;

        egui::Window::new(self.purpose.title())
            .collapsible(false)
            .resizable(true)
            .default_size(egui::vec2(560.0, 420.0))
            .open(&mut open)
            .show(ctx, |ui| {
                // --- 路径栏 ---
                ui.horizontal(|ui| {
                    if ui.button("⬆").on_hover_text("Parent directory").clicked() {
                        if let Some(parent) = self.dir.parent() {
                            go_to = Some(parent.to_path_buf());
                        }
                    }
                    let response = ui.add(
                        egui::TextEdit::singleline(&mut self.path_text)
                            .desired_width(ui.available_width()),
                    );
                    if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                        let typed = PathBuf::from(self.path_text.trim());
                        if typed.is_dir() {
                            go_to = Some(typed);
                        } else if typed.is_file() && !self.purpose.is_save() {
                            result = BrowserResult::Picked(typed);
                        }
                    }
                });

                if let Some(err) = &self.error {
                    ui.colored_label(egui::Color32::LIGHT_RED, err);
                }

                // --- 最近文件 ---
                if !self.recent.is_empty() && !self.purpose.is_save() {
                    egui::CollapsingHeader::new("🕘 Recent")
                        .default_open(false)
                        .show(ui, |ui| {
                            for path in &self.recent {
                                if ui.selectable_label(false, path.display().to_string()).clicked() {
                                    result = BrowserResult::Picked(path.clone());
                                }
                            }
                        });
                }

                ui.separator();

                let list_height = (ui.available_height() - 70.0).max(120.0);
                egui::ScrollArea::vertical()
                    .max_height(list_height)
                    .auto_shrink([false; 2])
                    .show(ui, |ui| {
                        for dir in &self.dirs {
                            let name = dir
                                .file_name()
                                .map(|n| n.to_string_lossy().to_string())
                                .unwrap_or_default();
                            if ui.selectable_label(false, format!("📁 {}", name)).double_clicked() {
                                go_to = Some(dir.clone());
                            }
                        }
                        for file in &self.files {
                            let name = file
                                .file_name()
                                .map(|n| n.to_string_lossy().to_string())
                                .unwrap_or_default();
                            let selected = self.selected.as_ref() == Some(file);
                            let response = ui.selectable_label(selected, format!("📄 {}", name));
                            if response.clicked() {
                                self.selected = Some(file.clone());
                                if self.purpose.is_save() {
                                    self.file_name = name.clone();
                                }
                            }
                            if response.double_clicked() && !self.purpose.is_save() {
                                result = BrowserResult::Picked(file.clone());
                            }
                        }
                    });

                ui.separator();

                if self.purpose.is_save() {
                    ui.horizontal(|ui| {
                        ui.label("File name:");
                        ui.text_edit_singleline(&mut self.file_name);
                    });
                }

                ui.horizontal(|ui| {
                    let filter_label = format!(
                        "All files (not only *.{})",
                        self.purpose.extensions().join(" *.")
                    );
                    if ui.checkbox(&mut self.show_all, filter_label).changed() {
                        go_to = Some(self.dir.clone());
                    }
                });

                ui.horizontal(|ui| {
                    let confirm = if self.purpose.is_save() { "Save" } else { "Open" };
                    let target = if self.purpose.is_save() {
                        save_target(&self.dir, &self.file_name)
                    } else {
                        self.selected.clone()
                    };
                    if ui
                        .add_enabled(target.is_some(), egui::Button::new(confirm))
                        .clicked()
                    {
                        if let Some(path) = target {
                            result = BrowserResult::Picked(path);
                        }
                    }
                    if ui.button("Cancel").clicked() {
                        result = BrowserResult::Cancelled;
                    }
                });
            });

        if let Some(dir) = go_to {
            self.change_dir(dir);
        }
        if !open && result == BrowserResult::Pending {
            result = BrowserResult::Cancelled;
        }
        result
    }
}
