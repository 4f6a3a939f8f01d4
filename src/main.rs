mod app;
mod color;
mod state;
mod ui;

use std::path::Path;

use app::RustyImsApp;
use eframe::egui;
use rusty_ims::config::{DashboardConfig, CONFIG_FILE};
use state::AppState;

fn main() -> eframe::Result {
    env_logger::init();

    let config = DashboardConfig::load_or_default(Path::new(CONFIG_FILE)).unwrap_or_else(|e| {
        log::error!("Ignoring settings: {e:#}");
        DashboardConfig::default()
    });

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1400.0, 900.0])
            .with_min_inner_size([800.0, 600.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Rusty IMS – LC-IMS-MS Dashboard",
        options,
        Box::new(|_cc| Ok(Box::new(RustyImsApp::new(AppState::new(config))))),
    )
}
