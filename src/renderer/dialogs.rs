//! 弹窗: 确认框 / 提示框 / 关于 / 日志 / 模型管理

use std::collections::VecDeque;
use std::path::PathBuf;

use egui_macroquad::egui;

use crate::activity_log::ActivityLog;
use crate::model_store::ModelEntry;
use crate::session::{Notice, NoticeLevel};

pub const APP_NAME: &str = "GUI Detector";
pub const APP_DESCRIPTION: &str = "Object detection for images, videos and cameras using YOLO";

/// 需要用户确认的操作
#[derive(Debug, Clone, PartialEq)]
pub enum Confirm {
    OverwriteModel { src: PathBuf, name: String },
    DeleteModel(String),
    ClearLog,
}

impl Confirm {
    fn title(&self) -> &'static str {
        match self {
            Confirm::OverwriteModel { .. } => "Confirm Overwrite",
            Confirm::DeleteModel(_) => "Confirm Delete",
            Confirm::ClearLog => "Confirm",
        }
    }

    fn message(&self) -> String {
        match self {
            Confirm::OverwriteModel { name, .. } => format!(
                "A model named '{}' already exists. Do you want to overwrite it?",
                name
            ),
            Confirm::DeleteModel(name) => format!(
                "Are you sure you want to permanently delete the model '{}'?",
                name
            ),
            Confirm::ClearLog => "Are you sure you want to clear the entire log history?".into(),
        }
    }
}

/// 模态框队列: 同一时刻最多显示一个确认框和一个提示框
#[derive(Default)]
pub struct Modals {
    confirm: Option<Confirm>,
    notices: VecDeque<Notice>,
}

impl Modals {
    pub fn ask(&mut self, confirm: Confirm) {
        self.confirm = Some(confirm);
    }

    pub fn push_notices(&mut self, notices: impl IntoIterator<Item = Notice>) {
        self.notices.extend(notices);
    }

    pub fn is_busy(&self) -> bool {
        self.confirm.is_some() || !self.notices.is_empty()
    }

    /// 返回用户已答复的确认框
    pub fn show_confirm(&mut self, ctx: &egui::Context) -> Option<(Confirm, bool)> {
        let confirm = self.confirm.as_ref()?;
        let mut answer = None;
        egui::Window::new(confirm.title())
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, egui::vec2(0.0, 0.0))
            .show(ctx, |ui| {
                ui.label(confirm.message());
                ui.add_space(8.0);
                ui.horizontal(|ui| {
                    if ui.button("Yes").clicked() {
                        answer = Some(true);
                    }
                    if ui.button("No").clicked() {
                        answer = Some(false);
                    }
                });
            });
        let answer = answer?;
        self.confirm.take().map(|c| (c, answer))
    }

    pub fn show_notice(&mut self, ctx: &egui::Context) {
        let Some(notice) = self.notices.front() else {
            return;
        };
        let (icon, color) = match notice.level {
            NoticeLevel::Info => ("ℹ", egui::Color32::LIGHT_BLUE),
            NoticeLevel::Warning => ("⚠", egui::Color32::YELLOW),
            NoticeLevel::Error => ("❌", egui::Color32::LIGHT_RED),
        };
        let mut dismissed = false;
        egui::Window::new(notice.title.as_str())
            .id(egui::Id::new("notice"))
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, egui::vec2(0.0, 0.0))
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.colored_label(color, icon);
                    ui.label(notice.message.as_str());
                });
                ui.add_space(8.0);
                if ui.button("OK").clicked() {
                    dismissed = true;
                }
            });
        if dismissed {
            self.notices.pop_front();
        }
    }
}

pub fn show_about(ctx: &egui::Context, open: &mut bool) {
    let mut close = false;
    egui::Window::new(format!("About {}", APP_NAME))
        .open(open)
        .collapsible(false)
        .resizable(false)
        .show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.heading(APP_NAME);
                ui.label(format!("Version {}", env!("CARGO_PKG_VERSION")));
                ui.small(APP_DESCRIPTION);
                ui.add_space(12.0);
                if ui.button("Close").clicked() {
                    close = true;
                }
            });
        });
    if close {
        *open = false;
    }
}

/// 日志窗口; 返回是否点击了清空
pub fn show_log(ctx: &egui::Context, open: &mut bool, log: &ActivityLog) -> bool {
    let mut clear = false;
    egui::Window::new("Activity Log")
        .open(open)
        .default_size(egui::vec2(700.0, 500.0))
        .show(ctx, |ui| {
            let height = (ui.available_height() - 36.0).max(100.0);
            egui::ScrollArea::vertical()
                .max_height(height)
                .auto_shrink([false; 2])
                .stick_to_bottom(true)
                .show(ui, |ui| {
                    for entry in log.entries() {
                        ui.monospace(entry);
                    }
                });
            ui.separator();
            if ui.button("🗑 Clear Log").clicked() {
                clear = true;
            }
        });
    clear
}

/// 模型管理窗口状态
#[derive(Default)]
pub struct ManageModels {
    pub open: bool,
    selected: Option<String>,
}

/// 模型管理窗口的操作
#[derive(Debug, PartialEq)]
pub enum ManageAction {
    Delete(String),
    NothingSelected,
}

impl ManageModels {
    pub fn show(&mut self, ctx: &egui::Context, models: &[ModelEntry]) -> Option<ManageAction> {
        let mut action = None;
        let mut open = self.open;
        egui::Window::new("Manage Models")
            .open(&mut open)
            .default_size(egui::vec2(420.0, 320.0))
            .show(ctx, |ui| {
                ui.label("Available models:");
                egui::ScrollArea::vertical()
                    .max_height(220.0)
                    .auto_shrink([false; 2])
                    .show(ui, |ui| {
                        for entry in models {
                            match entry.model_name() {
                                Some(name) => {
                                    let selected = self.selected.as_deref() == Some(name);
                                    if ui.selectable_label(selected, name).clicked() {
                                        self.selected = Some(name.to_string());
                                    }
                                }
                                None => {
                                    ui.weak(format!("({})", entry.label()));
                                }
                            }
                        }
                    });
                ui.separator();
                if ui.button("🗑 Delete selected model").clicked() {
                    action = Some(match self.selected.take() {
                        Some(name) => ManageAction::Delete(name),
                        None => ManageAction::NothingSelected,
                    });
                }
            });
        self.open = open;
        action
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirm_messages() {
        let c = Confirm::OverwriteModel {
            src: PathBuf::from("/tmp/best.onnx"),
            name: "best.onnx".into(),
        };
        assert!(c.message().contains("'best.onnx' already exists"));
        assert_eq!(Confirm::ClearLog.title(), "Confirm");
        assert!(Confirm::DeleteModel("a.onnx".into())
            .message()
            .contains("permanently delete"));
    }

    #[test]
    fn test_modals_queue() {
        let mut modals = Modals::default();
        assert!(!modals.is_busy());
        modals.push_notices(vec![Notice {
            level: NoticeLevel::Info,
            title: "Saved".into(),
            message: "ok".into(),
        }]);
        assert!(modals.is_busy());
        modals.ask(Confirm::ClearLog);
        assert_eq!(modals.confirm, Some(Confirm::ClearLog));
    }
}
