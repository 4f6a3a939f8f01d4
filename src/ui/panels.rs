use std::path::PathBuf;

use eframe::egui::{self, Color32, DragValue, RichText, ScrollArea, Ui};

use rusty_ims::data::model::Channel;

use crate::state::{Action, AppState, AxisPair, DataTab};

// ---------------------------------------------------------------------------
// Left side panel – pipeline parameters and actions
// ---------------------------------------------------------------------------

fn text_row(ui: &mut Ui, label: &str, value: &mut String) {
    ui.horizontal(|ui: &mut Ui| {
        ui.label(label);
        ui.text_edit_singleline(value);
    });
}

fn path_row(ui: &mut Ui, label: &str, path: &mut PathBuf) {
    let mut text = path.display().to_string();
    ui.label(label);
    if ui.text_edit_singleline(&mut text).changed() {
        *path = PathBuf::from(text);
    }
}

/// Render the left parameter panel.
pub fn side_panel(ui: &mut Ui, state: &mut AppState) {
    ui.heading("Pipeline");
    ui.separator();

    let mut action = None;

    ScrollArea::vertical()
        .auto_shrink([false, false])
        .show(ui, |ui: &mut Ui| {
            egui::CollapsingHeader::new(RichText::new("Input").strong())
                .default_open(true)
                .show(ui, |ui: &mut Ui| {
                    ui.horizontal(|ui: &mut Ui| {
                        ui.label(state.config.input_path.display().to_string());
                        if ui.small_button("Browse…").clicked() {
                            open_file_dialog(state);
                        }
                    });

                    let hint = state
                        .converted_path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default();
                    let mut converted = state
                        .config
                        .converted_path
                        .as_ref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default();
                    ui.label("Converted h5 (mzML only)");
                    let edit = egui::TextEdit::singleline(&mut converted).hint_text(hint);
                    if ui.add(edit).changed() {
                        state.config.converted_path =
                            (!converted.is_empty()).then(|| PathBuf::from(&converted));
                    }

                    ui.horizontal(|ui: &mut Ui| {
                        ui.label("Channel");
                        for channel in Channel::ALL {
                            ui.radio_value(&mut state.channel, channel, channel.key());
                        }
                    });
                    if ui.button("Load").clicked() {
                        action = Some(Action::Load);
                    }
                });

            egui::CollapsingHeader::new(RichText::new("Columns").strong())
                .default_open(false)
                .show(ui, |ui: &mut Ui| {
                    let features = &mut state.config.features;
                    text_row(ui, "mz", &mut features.mz);
                    text_row(ui, "drift time", &mut features.drift_time);
                    text_row(ui, "retention time", &mut features.retention_time);
                    text_row(ui, "intensity", &mut features.intensity);

                    ui.separator();
                    ui.label("mzML accession names");
                    let names = &mut state.config.accession_names;
                    text_row(ui, "rt", &mut names.retention_time);
                    text_row(ui, "dt", &mut names.drift_time);
                });

            egui::CollapsingHeader::new(RichText::new("Smoothing").strong())
                .default_open(true)
                .show(ui, |ui: &mut Ui| {
                    text_row(ui, "radius", &mut state.config.smooth_radius);
                    ui.horizontal(|ui: &mut Ui| {
                        ui.label("iterations");
                        ui.add(DragValue::new(&mut state.config.smooth_iterations).range(1..=100));
                    });
                    path_row(ui, "output", &mut state.config.smooth_output);
                    if ui.button("Smooth").clicked() {
                        action = Some(Action::Smooth);
                    }
                });

            egui::CollapsingHeader::new(RichText::new("Peaks").strong())
                .default_open(true)
                .show(ui, |ui: &mut Ui| {
                    text_row(ui, "radius", &mut state.config.peak_radius);
                    ui.horizontal(|ui: &mut Ui| {
                        ui.label("threshold");
                        ui.add(
                            DragValue::new(&mut state.config.peak_threshold)
                                .range(0.0..=f64::MAX)
                                .speed(10.0),
                        );
                    });
                    path_row(ui, "output", &mut state.config.peak_output);
                    ui.horizontal(|ui: &mut Ui| {
                        if ui.button("Detect peaks").clicked() {
                            action = Some(Action::DetectPeaks);
                        }
                        if ui.button("Alignment reference").clicked() {
                            action = Some(Action::Reference);
                        }
                    });
                });

            egui::CollapsingHeader::new(RichText::new("Drift correction").strong())
                .default_open(false)
                .show(ui, |ui: &mut Ui| {
                    ui.horizontal(|ui: &mut Ui| {
                        ui.label("collision energy");
                        ui.add(
                            DragValue::new(&mut state.config.collision_energy)
                                .range(f64::MIN_POSITIVE..=f64::MAX)
                                .speed(0.5),
                        );
                    });
                    if ui.button("Correct ms2 drift").clicked() {
                        action = Some(Action::CorrectDrift);
                    }
                    if let Some(corrected) = &state.corrected {
                        ui.label(format!("{} ms2 peaks corrected", corrected.len()));
                    }
                });

            egui::CollapsingHeader::new(RichText::new("View").strong())
                .default_open(true)
                .show(ui, |ui: &mut Ui| view_controls(ui, state));
        });

    if let Some(action) = action {
        state.run(action);
    }
}

fn range_row(ui: &mut Ui, label: &str, fixed: &mut bool, range: &mut (f64, f64)) {
    ui.horizontal(|ui: &mut Ui| {
        ui.checkbox(fixed, label);
        ui.add_enabled(*fixed, DragValue::new(&mut range.0).speed(0.1));
        ui.add_enabled(*fixed, DragValue::new(&mut range.1).speed(0.1));
    });
}

fn view_controls(ui: &mut Ui, state: &mut AppState) {
    let view = &mut state.view;
    egui::ComboBox::from_id_salt("axis_pair")
        .selected_text(view.axes.label())
        .show_ui(ui, |ui: &mut Ui| {
            for axes in AxisPair::ALL {
                ui.selectable_value(&mut view.axes, axes, axes.label());
            }
        });
    range_row(ui, "x range", &mut view.fixed_x, &mut view.x_range);
    range_row(ui, "y range", &mut view.fixed_y, &mut view.y_range);
    ui.horizontal(|ui: &mut Ui| {
        ui.label("sampling x / y");
        ui.add(DragValue::new(&mut view.x_sampling).range(0.0..=f64::MAX).speed(0.01));
        ui.add(DragValue::new(&mut view.y_sampling).range(0.0..=f64::MAX).speed(0.01));
    });
}

// ---------------------------------------------------------------------------
// Top bar
// ---------------------------------------------------------------------------

/// Render the top menu / toolbar.
pub fn top_bar(ui: &mut Ui, state: &mut AppState) {
    egui::menu::bar(ui, |ui: &mut Ui| {
        ui.menu_button("File", |ui: &mut Ui| {
            if ui.button("Open…").clicked() {
                open_file_dialog(state);
                ui.close_menu();
            }
            if ui.button("Save settings").clicked() {
                state.run(Action::SaveSettings);
                ui.close_menu();
            }
        });

        ui.separator();

        for tab in DataTab::ALL {
            ui.selectable_value(&mut state.tab, tab, tab.label());
        }

        ui.separator();

        if let Some(ds) = state.current() {
            ui.label(format!("{} rows", ds.len()));
        }

        if let Some(msg) = &state.status_message {
            ui.label(RichText::new(msg).color(Color32::RED));
        }
    });
}

// ---------------------------------------------------------------------------
// Bottom panel – pipeline notifications
// ---------------------------------------------------------------------------

pub fn notification_panel(ui: &mut Ui, state: &AppState) {
    use rusty_ims::notify::NotificationSink;

    let notifier = state.pipeline.notifier();
    ui.horizontal(|ui: &mut Ui| {
        ui.strong("Notifications");
        if ui.small_button("Clear").clicked() {
            notifier.clear();
        }
    });
    ScrollArea::vertical()
        .max_height(100.0)
        .stick_to_bottom(true)
        .show(ui, |ui: &mut Ui| {
            for message in notifier.messages() {
                ui.label(message);
            }
        });
}

// ---------------------------------------------------------------------------
// File dialog
// ---------------------------------------------------------------------------

pub fn open_file_dialog(state: &mut AppState) {
    let file = rfd::FileDialog::new()
        .set_title("Open LC-IMS-MS data")
        .add_filter("Supported files", &["mzML", "gz", "h5", "csv"])
        .add_filter("mzML", &["mzML", "gz"])
        .add_filter("Container", &["h5"])
        .add_filter("CSV", &["csv"])
        .pick_file();

    if let Some(path) = file {
        log::info!("Selected input {}", path.display());
        state.set_input(path);
    }
}
