use egui_macroquad::egui;

use crate::input::get_camera_devices;
use crate::session::{MediaBackend, Session};

/// 左侧控制面板
#[derive(Default)]
pub struct ControlPanel {
    // 设备列表 (首次展开时枚举)
    camera_devices: Vec<(usize, String)>,
    devices_loaded: bool,
}

/// 本帧控制面板的操作
#[derive(Default, Debug, PartialEq)]
pub struct ControlPanelActions {
    pub select_model: Option<usize>,
    pub upload_model: bool,
    pub manage_models: bool,
    pub select_image: bool,
    pub select_video: bool,
    pub select_camera: Option<usize>,
    pub refresh_cameras: bool,
    pub open_camera: bool,
    pub close_camera: bool,
    pub clear_media: bool,
    pub start_predict: bool,
    pub stop_predict: bool,
}

impl ControlPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn show<B: MediaBackend>(
        &mut self,
        ctx: &egui::Context,
        session: &Session<B>,
    ) -> ControlPanelActions {
        egui::SidePanel::left("control_panel")
            .resizable(false)
            .exact_width(240.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical()
                    .auto_shrink([false; 2])
                    .show(ui, |ui| self.ui(ui, session))
                    .inner
            })
            .inner
    }

    fn load_devices(&mut self) {
        self.camera_devices = get_camera_devices();
        self.devices_loaded = true;
    }

    fn ui<B: MediaBackend>(
        &mut self,
        ui: &mut egui::Ui,
        session: &Session<B>,
    ) -> ControlPanelActions {
        let mut actions = ControlPanelActions::default();
        let controls = session.controls();
        let full = egui::vec2(ui.available_width(), 28.0);

        ui.style_mut().visuals.collapsing_header_frame = false;

        // --- 模型 ---
        egui::CollapsingHeader::new("🧠 Model")
            .default_open(true)
            .show(ui, |ui| {
                let models = session.models();
                let current = session.selected_model();
                let selected_text = models
                    .get(current)
                    .map(|m| m.label().to_string())
                    .unwrap_or_default();
                egui::ComboBox::from_id_salt("model_select")
                    .width(ui.available_width())
                    .selected_text(selected_text)
                    .show_ui(ui, |ui| {
                        for (i, entry) in models.iter().enumerate() {
                            if ui.selectable_label(i == current, entry.label()).clicked()
                                && i != current
                            {
                                actions.select_model = Some(i);
                            }
                        }
                    });
                ui.horizontal(|ui| {
                    if ui.button("⬆ Upload Model").clicked() {
                        actions.upload_model = true;
                    }
                    if ui.button("🗂 Manage Models").clicked() {
                        actions.manage_models = true;
                    }
                });
            });

        ui.separator();

        // --- 输入源 ---
        egui::CollapsingHeader::new("🎥 Media")
            .default_open(true)
            .show(ui, |ui| {
                if ui.add_sized(full, egui::Button::new("🖼 Select Image")).clicked() {
                    actions.select_image = true;
                }
                if ui.add_sized(full, egui::Button::new("🎞 Select Video")).clicked() {
                    actions.select_video = true;
                }

                if !self.devices_loaded {
                    self.load_devices();
                }
                ui.horizontal(|ui| {
                    let current = session.config().camera_index;
                    let label = self
                        .camera_devices
                        .iter()
                        .find(|(i, _)| *i == current)
                        .map(|(i, name)| format!("{}: {}", i, name))
                        .unwrap_or_else(|| format!("Camera {}", current));
                    egui::ComboBox::from_id_salt("camera_select")
                        .width(ui.available_width() - 32.0)
                        .selected_text(label)
                        .show_ui(ui, |ui| {
                            if self.camera_devices.is_empty() {
                                ui.weak("No camera devices found");
                            }
                            for (i, name) in &self.camera_devices {
                                if ui
                                    .selectable_label(*i == current, format!("{}: {}", i, name))
                                    .clicked()
                                    && *i != current
                                {
                                    actions.select_camera = Some(*i);
                                }
                            }
                        });
                    if ui.button("🔄").on_hover_text("Refresh devices").clicked() {
                        actions.refresh_cameras = true;
                    }
                });
                ui.horizontal(|ui| {
                    let half = egui::vec2((ui.available_width() - 8.0) / 2.0, 28.0);
                    if ui
                        .add_enabled_ui(controls.open_camera, |ui| {
                            ui.add_sized(half, egui::Button::new("📷 Open Camera"))
                        })
                        .inner
                        .clicked()
                    {
                        actions.open_camera = true;
                    }
                    if ui
                        .add_enabled_ui(controls.close_camera, |ui| {
                            ui.add_sized(half, egui::Button::new("⏏ Close Camera"))
                        })
                        .inner
                        .clicked()
                    {
                        actions.close_camera = true;
                    }
                });
                if ui
                    .add_enabled_ui(controls.clear_media, |ui| {
                        ui.add_sized(full, egui::Button::new("🧹 Clear Media"))
                    })
                    .inner
                    .clicked()
                {
                    actions.clear_media = true;
                }
            });

        ui.separator();

        // --- 预测 ---
        egui::CollapsingHeader::new("🚀 Prediction")
            .default_open(true)
            .show(ui, |ui| {
                if ui
                    .add_enabled_ui(controls.start_predict, |ui| {
                        ui.add_sized(full, egui::Button::new(controls.start_label))
                    })
                    .inner
                    .clicked()
                {
                    actions.start_predict = true;
                }
                if ui
                    .add_enabled_ui(controls.stop_predict, |ui| {
                        ui.add_sized(full, egui::Button::new("⏹ Stop Predict"))
                    })
                    .inner
                    .clicked()
                {
                    actions.stop_predict = true;
                }

                ui.add_space(6.0);
                let (color, status) = if session.is_predicting() {
                    (egui::Color32::GREEN, "● Predicting")
                } else {
                    (egui::Color32::GRAY, "○ Idle")
                };
                ui.horizontal(|ui| {
                    ui.colored_label(color, status);
                    ui.label(format!("| {}", session.media().label()));
                });
            });

        actions
    }

    /// 面板自身的操作 (设备刷新)
    pub fn apply(&mut self, actions: &ControlPanelActions) {
        if actions.refresh_cameras {
            self.load_devices();
        }
    }
}

/// 全局样式: 深色, 无圆角
pub fn apply_style(ctx: &egui::Context) {
    let mut visuals = egui::Visuals::dark();
    visuals.window_corner_radius = 0.0.into();
    visuals.menu_corner_radius = 0.0.into();
    visuals.widgets.noninteractive.corner_radius = 0.0.into();
    visuals.widgets.inactive.corner_radius = 0.0.into();
    visuals.widgets.hovered.corner_radius = 0.0.into();
    visuals.widgets.active.corner_radius = 0.0.into();
    visuals.widgets.open.corner_radius = 0.0.into();
    visuals.selection.bg_fill = egui::Color32::from_rgb(60, 100, 170);
    visuals.override_text_color = Some(egui::Color32::from_rgb(230, 240, 250));
    ctx.set_visuals(visuals);
}
