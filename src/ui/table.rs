use eframe::egui::Ui;
use egui_extras::{Column, TableBuilder};

use rusty_ims::data::model::Dataset;

/// Scrollable read-only table of a peak list, one row per peak.
pub fn peak_table(ui: &mut Ui, dataset: &Dataset) {
    let names = dataset.column_names();
    if names.is_empty() {
        ui.label("No peaks.");
        return;
    }
    let columns: Vec<&[f64]> = dataset.columns().map(|(_, values)| values).collect();

    TableBuilder::new(ui)
        .striped(true)
        .resizable(true)
        .column(Column::auto().at_least(40.0))
        .columns(Column::remainder().at_least(60.0), names.len())
        .header(20.0, |mut header| {
            header.col(|ui| {
                ui.strong("#");
            });
            for name in names {
                header.col(|ui| {
                    ui.strong(name);
                });
            }
        })
        .body(|body| {
            body.rows(18.0, dataset.len(), |mut row| {
                let index = row.index();
                row.col(|ui| {
                    ui.label(index.to_string());
                });
                for values in &columns {
                    row.col(|ui| {
                        ui.label(format!("{:.4}", values[index]));
                    });
                }
            });
        });
}
