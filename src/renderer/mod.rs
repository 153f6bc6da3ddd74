//! egui 界面: 左侧控制面板 + 中央画面 + 右侧结果面板 + 弹窗

pub mod control_panel;
pub mod dialogs;
pub mod file_dialog;
pub mod frame_view;
pub mod results_panel;

use std::path::PathBuf;

use egui_macroquad::egui;

use crate::model_store::UploadOutcome;
use crate::session::{MediaBackend, NativeBackend, Notice, NoticeLevel, Session};

pub use control_panel::{apply_style, ControlPanel, ControlPanelActions};
pub use dialogs::{Confirm, ManageAction, ManageModels, Modals};
pub use file_dialog::{BrowserResult, FileBrowser, FilePurpose};
pub use frame_view::FrameView;
pub use results_panel::ResultsActions;

pub struct DetectorApp<B: MediaBackend = NativeBackend> {
    session: Session<B>,
    control_panel: ControlPanel,
    frame_view: FrameView,
    modals: Modals,
    manage_models: ManageModels,
    browser: Option<FileBrowser>,
    about_open: bool,
    log_open: bool,
    styled: bool,
}

impl<B: MediaBackend> DetectorApp<B> {
    pub fn new(session: Session<B>) -> Self {
        Self {
            session,
            control_panel: ControlPanel::new(),
            frame_view: FrameView::new(),
            modals: Modals::default(),
            manage_models: ManageModels::default(),
            browser: None,
            about_open: false,
            log_open: false,
            styled: false,
        }
    }

    pub fn session(&self) -> &Session<B> {
        &self.session
    }

    /// 每个渲染帧调用一次
    pub fn frame(&mut self) {
        self.session.pump();
        let notices = self.session.take_notices();
        self.modals.push_notices(notices);

        egui_macroquad::ui(|ctx| self.ui(ctx));
        egui_macroquad::draw();
    }

    /// 关闭窗口
    pub fn shutdown(&mut self) -> &crate::AppConfig {
        self.browser = None;
        self.session.shutdown()
    }

    fn ui(&mut self, ctx: &egui::Context) {
        if !self.styled {
            apply_style(ctx);
            self.styled = true;
        }

        // 有弹窗或文件对话框时忽略面板操作
        let blocked = self.browser.is_some() || self.modals.is_busy();

        let controls = self.control_panel.show(ctx, &self.session);
        let results = results_panel::show(ctx, &self.session);
        egui::CentralPanel::default()
            .frame(egui::Frame::NONE.fill(egui::Color32::from_gray(18)))
            .show(ctx, |ui| {
                self.frame_view.show(
                    ui,
                    self.session.display(),
                    self.session.display_version(),
                );
            });

        self.control_panel.apply(&controls);
        if !blocked {
            self.apply_controls(controls);
            self.apply_results(results);
        }

        self.show_windows(ctx);
    }

    fn apply_controls(&mut self, actions: ControlPanelActions) {
        if let Some(index) = actions.select_model {
            self.session.select_model(index);
        }
        if let Some(index) = actions.select_camera {
            self.session.set_camera_index(index);
        }
        if actions.upload_model {
            self.open_browser(FilePurpose::UploadModel);
        }
        if actions.manage_models {
            self.session.refresh_models();
            self.manage_models.open = true;
        }
        if actions.select_image {
            self.open_browser(FilePurpose::OpenImage);
        }
        if actions.select_video {
            self.open_browser(FilePurpose::OpenVideo);
        }
        if actions.open_camera {
            self.session.open_camera();
        }
        if actions.close_camera {
            self.session.close_camera();
        }
        if actions.clear_media {
            self.session.clear_media();
        }
        if actions.start_predict {
            self.session.start_prediction();
        }
        if actions.stop_predict {
            self.session.stop_prediction();
        }
    }

    fn apply_results(&mut self, actions: ResultsActions) {
        if actions.save_results && self.session.begin_export() {
            self.open_browser(FilePurpose::SaveResults);
        }
        if actions.about && !self.about_open {
            self.about_open = true;
            self.session.log("About window opened.");
        }
        if actions.log && !self.log_open {
            self.log_open = true;
            self.session.log("Log window opened.");
        }
    }

    fn open_browser(&mut self, purpose: FilePurpose) {
        let recent = &self.session.config().recent_files;
        let start = start_dir(purpose, recent);
        self.browser = Some(FileBrowser::new(purpose, &start, recent));
    }

    fn show_windows(&mut self, ctx: &egui::Context) {
        dialogs::show_about(ctx, &mut self.about_open);

        if dialogs::show_log(ctx, &mut self.log_open, self.session.activity_log()) {
            self.modals.ask(Confirm::ClearLog);
        }

        match self.manage_models.show(ctx, self.session.models()) {
            Some(ManageAction::Delete(name)) => self.modals.ask(Confirm::DeleteModel(name)),
            Some(ManageAction::NothingSelected) => self.modals.push_notices([Notice {
                level: NoticeLevel::Warning,
                title: "No Selection".into(),
                message: "Please select a model to delete.".into(),
            }]),
            None => {}
        }

        if let Some(browser) = self.browser.as_mut() {
            let purpose = browser.purpose();
            match browser.show(ctx) {
                BrowserResult::Pending => {}
                BrowserResult::Picked(path) => {
                    self.browser = None;
                    self.picked(purpose, path);
                }
                BrowserResult::Cancelled => {
                    self.browser = None;
                    if purpose == FilePurpose::SaveResults {
                        self.session.export_cancelled();
                    } else {
                        self.session.log(purpose.cancel_message());
                    }
                }
            }
        }

        if let Some((confirm, yes)) = self.modals.show_confirm(ctx) {
            self.confirmed(confirm, yes);
        }
        self.modals.show_notice(ctx);
    }

    fn picked(&mut self, purpose: FilePurpose, path: PathBuf) {
        match purpose {
            FilePurpose::OpenImage => self.session.open_image(&path),
            FilePurpose::OpenVideo => self.session.open_video(&path),
            FilePurpose::UploadModel => {
                if let Some(UploadOutcome::Conflict(name)) =
                    self.session.upload_model(&path, false)
                {
                    self.modals.ask(Confirm::OverwriteModel { src: path, name });
                }
            }
            FilePurpose::SaveResults => {
                // 失败已写入日志并提示
                let _ = self.session.export_results(&path);
            }
        }
    }

    fn confirmed(&mut self, confirm: Confirm, yes: bool) {
        match (confirm, yes) {
            (Confirm::OverwriteModel { src, .. }, true) => {
                self.session.upload_model(&src, true);
            }
            (Confirm::OverwriteModel { name, .. }, false) => self.session.upload_declined(&name),
            (Confirm::DeleteModel(name), true) => {
                self.session.delete_model(&name);
            }
            (Confirm::ClearLog, true) => self.session.clear_log(),
            (Confirm::DeleteModel(_), false) | (Confirm::ClearLog, false) => {}
        }
    }
}

/// 对话框起始目录: 最近一个同类文件所在目录, 否则当前目录
fn start_dir(purpose: FilePurpose, recent: &[PathBuf]) -> PathBuf {
    recent
        .iter()
        .filter(|p| file_dialog::matches_filter(p, purpose.extensions()))
        .find_map(|p| p.parent().filter(|d| d.is_dir()).map(|d| d.to_path_buf()))
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}
