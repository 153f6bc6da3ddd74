//! 右侧结果面板: 类别计数表 + 保存 / 关于 / 日志

use egui_macroquad::egui;

use crate::detection::Counts;
use crate::export::HEADER;
use crate::session::{MediaBackend, Session};

#[derive(Default, Debug, PartialEq)]
pub struct ResultsActions {
    pub save_results: bool,
    pub about: bool,
    pub log: bool,
}

/// 计数表的行, 按类别名排序
pub fn result_rows(counts: &Counts) -> Vec<(String, String)> {
    counts
        .iter()
        .map(|(name, count)| (name.clone(), count.to_string()))
        .collect()
}

pub fn show<B: MediaBackend>(ctx: &egui::Context, session: &Session<B>) -> ResultsActions {
    let mut actions = ResultsActions::default();
    egui::SidePanel::right("results_panel")
        .resizable(true)
        .default_width(260.0)
        .show(ctx, |ui| {
            ui.heading("📊 Detection Results");
            ui.separator();

            let rows = result_rows(session.counts());
            let list_height = (ui.available_height() - 120.0).max(80.0);
            egui::ScrollArea::vertical()
                .max_height(list_height)
                .auto_shrink([false; 2])
                .show(ui, |ui| {
                    egui::Grid::new("results_grid")
                        .num_columns(2)
                        .striped(true)
                        .min_col_width(80.0)
                        .show(ui, |ui| {
                            ui.strong(HEADER[0]);
                            ui.strong(HEADER[1]);
                            ui.end_row();
                            for (name, count) in &rows {
                                ui.label(name);
                                ui.label(count);
                                ui.end_row();
                            }
                        });
                    if rows.is_empty() {
                        ui.weak("No detections yet");
                    }
                });

            ui.separator();
            let full = egui::vec2(ui.available_width(), 28.0);
            if ui.add_sized(full, egui::Button::new("💾 Save Results")).clicked() {
                actions.save_results = true;
            }
            ui.horizontal(|ui| {
                let half = egui::vec2((ui.available_width() - 8.0) / 2.0, 28.0);
                if ui.add_sized(half, egui::Button::new("ℹ About")).clicked() {
                    actions.about = true;
                }
                if ui.add_sized(half, egui::Button::new("📜 Log")).clicked() {
                    actions.log = true;
                }
            });
        });
    actions
}
