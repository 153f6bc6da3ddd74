/// 桌面检测器主程序
///
/// 直接运行: cargo run --bin gui-detector --release
use std::time::{Duration, Instant};

use clap::Parser;
use macroquad::prelude::*;
use mimalloc::MiMalloc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use yolo_gui_detector::renderer::DetectorApp;
use yolo_gui_detector::session::{NativeBackend, Session};
use yolo_gui_detector::{AppConfig, Args};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn window_conf() -> Conf {
    Conf {
        window_title: "GUI Detector".to_owned(),
        window_width: 1400,
        window_height: 820,
        high_dpi: true,
        window_resizable: true,
        ..Default::default()
    }
}

/// 启动画面: 标题 + 进度条
async fn splash(duration: Duration) {
    let start = Instant::now();
    while start.elapsed() < duration {
        let progress = start.elapsed().as_secs_f32() / duration.as_secs_f32();
        clear_background(Color::from_rgba(18, 20, 24, 255));

        let (w, h) = (screen_width(), screen_height());
        let title = "GUI Detector";
        let size = measure_text(title, None, 48, 1.0);
        draw_text(title, (w - size.width) / 2.0, h / 2.0 - 30.0, 48.0, WHITE);
        let hint = "Loading...";
        let size = measure_text(hint, None, 20, 1.0);
        draw_text(hint, (w - size.width) / 2.0, h / 2.0 + 5.0, 20.0, GRAY);

        let bar_w = w * 0.4;
        let bar_x = (w - bar_w) / 2.0;
        let bar_y = h / 2.0 + 25.0;
        draw_rectangle_lines(bar_x, bar_y, bar_w, 12.0, 1.0, GRAY);
        draw_rectangle(bar_x, bar_y, bar_w * progress.min(1.0), 12.0, SKYBLUE);

        next_frame().await;
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    let mut config = AppConfig::load(&args.config);
    config.apply_args(&args);
    config.summary();

    if !args.no_splash && config.splash_ms > 0 {
        splash(Duration::from_millis(config.splash_ms)).await;
    }

    let backend = NativeBackend::from_config(&config);
    let session = match Session::new(backend, config) {
        Ok(session) => session,
        Err(e) => {
            error!("❌ 会话初始化失败: {}", e);
            return;
        }
    };
    let mut app = DetectorApp::new(session);
    info!("🚀 界面已启动");

    prevent_quit();
    loop {
        clear_background(Color::from_rgba(18, 20, 24, 255));
        app.frame();
        if is_quit_requested() {
            break;
        }
        next_frame().await;
    }

    let config = app.shutdown().clone();
    if let Err(e) = config.save(&args.config) {
        error!("❌ {}", e);
    }
    info!("👋 已退出");
}
