use eframe::egui::{self, Align2, ColorImage, FontId, Rect, Sense, TextureOptions, Ui, Vec2};
use egui_plot::{Plot, PlotBounds, PlotImage, PlotPoint};

use rusty_ims::raster::{self, Raster};

use crate::color::{blues, colorize};
use crate::state::{AppState, DataTab, RasterCache, RasterKey};
use crate::ui::table;

const COLORBAR_HEIGHT: f32 = 36.0;

// ---------------------------------------------------------------------------
// Raster cache
// ---------------------------------------------------------------------------

fn to_image(raster: &Raster) -> ColorImage {
    let pixels = colorize(&raster.eq_hist());
    let mut rgba = Vec::with_capacity(pixels.len() * 4);
    // Texture rows run top to bottom, raster rows bottom to top.
    for row in (0..raster.rows).rev() {
        for pixel in &pixels[row * raster.columns..(row + 1) * raster.columns] {
            rgba.extend_from_slice(&pixel.to_array());
        }
    }
    ColorImage::from_rgba_unmultiplied([raster.columns, raster.rows], &rgba)
}

/// Rebuild the cached raster when the data or the view changed.
fn refresh_raster(ctx: &egui::Context, state: &mut AppState) {
    let key = RasterKey {
        generation: state.generation,
        tab: state.tab,
        view: state.view.clone(),
        features: state.config.features.clone(),
    };
    if state.raster_cache.as_ref().is_some_and(|c| c.key == key) {
        return;
    }

    let Some(dataset) = state.current() else {
        state.raster_cache = None;
        return;
    };
    let (x_name, y_name) = state.view.axes.columns(&state.config.features);
    let columns = (
        dataset.column(x_name),
        dataset.column(y_name),
        dataset.column(&state.config.features.intensity),
    );
    let (Some(x), Some(y), Some(weights)) = columns else {
        log::warn!("cannot plot {x_name} x {y_name}: column missing");
        state.raster_cache = None;
        return;
    };

    let raster = raster::rasterize(x, y, weights, &state.view.request());
    log::debug!(
        "rasterized {} points into {}x{} bins ({} filled)",
        x.len(),
        raster.columns,
        raster.rows,
        raster.filled_bins()
    );
    let texture = ctx.load_texture("raster", to_image(&raster), TextureOptions::NEAREST);
    state.raster_cache = Some(RasterCache {
        key,
        raster,
        texture,
    });
}

// ---------------------------------------------------------------------------
// Central panel
// ---------------------------------------------------------------------------

/// Render the heatmap of the active tab, plus the peak table where the tab
/// holds peaks.
pub fn central_view(ui: &mut Ui, state: &mut AppState) {
    if state.current().is_none() {
        ui.centered_and_justified(|ui: &mut Ui| {
            ui.heading(format!(
                "No {} data yet. Pick an input and run the pipeline from the left panel.",
                state.tab.label().to_lowercase()
            ));
        });
        return;
    }

    refresh_raster(ui.ctx(), state);
    let Some(cache) = &state.raster_cache else {
        ui.label("The selected axes are not columns of this dataset.");
        return;
    };

    let shows_table = matches!(state.tab, DataTab::Peaks | DataTab::Reference);
    let plot_height = if shows_table {
        ui.available_height() * 0.6
    } else {
        ui.available_height()
    };

    let (x_name, y_name) = state.view.axes.columns(&state.config.features);
    ui.allocate_ui(Vec2::new(ui.available_width(), plot_height), |ui: &mut Ui| {
        heatmap(ui, cache, x_name, y_name, state.view.request().fixes_plot_limits());
    });

    if shows_table {
        ui.separator();
        if let Some(dataset) = state.current() {
            table::peak_table(ui, dataset);
        }
    }
}

fn heatmap(ui: &mut Ui, cache: &RasterCache, x_name: &str, y_name: &str, fixed_limits: bool) {
    let raster = &cache.raster;
    let (x0, x1) = raster.x_range;
    let (y0, y1) = raster.y_range;
    // Degenerate ranges still get a visible pixel.
    let width = (x1 - x0).max(f64::EPSILON);
    let height = (y1 - y0).max(f64::EPSILON);
    let image = PlotImage::new(
        cache.texture.id(),
        PlotPoint::new(x0 + width / 2.0, y0 + height / 2.0),
        Vec2::new(width as f32, height as f32),
    );

    let plot_height = (ui.available_height() - COLORBAR_HEIGHT).max(100.0);
    Plot::new("heatmap")
        .height(plot_height)
        .x_axis_label(x_name)
        .y_axis_label(y_name)
        .allow_boxed_zoom(true)
        .allow_drag(true)
        .allow_scroll(true)
        .allow_zoom(true)
        .label_formatter(|_, point| match raster.value_at(point.x, point.y) {
            Some(value) => format!("x: {:.4}\ny: {:.4}\nintensity: {value:.0}", point.x, point.y),
            None => format!("x: {:.4}\ny: {:.4}", point.x, point.y),
        })
        .show(ui, |plot_ui| {
            plot_ui.image(image);
            if fixed_limits {
                plot_ui.set_plot_bounds(PlotBounds::from_min_max([x0, y0], [x1, y1]));
            }
        });

    colorbar(ui, raster);
}

/// Horizontal colour bar under the heatmap. Bins are histogram-equalised,
/// so only the end points carry values.
fn colorbar(ui: &mut Ui, raster: &Raster) {
    let (rect, _) = ui.allocate_exact_size(Vec2::new(ui.available_width(), COLORBAR_HEIGHT), Sense::hover());
    let painter = ui.painter_at(rect);
    let bar = Rect::from_min_size(rect.min, Vec2::new(rect.width(), rect.height() * 0.45));

    let steps = 128;
    let step_width = bar.width() / steps as f32;
    for i in 0..steps {
        let x = bar.min.x + i as f32 * step_width;
        let cell = Rect::from_min_max(egui::pos2(x, bar.min.y), egui::pos2(x + step_width + 0.5, bar.max.y));
        painter.rect_filled(cell, 0.0, blues(i as f32 / (steps - 1) as f32));
    }

    let text_color = ui.visuals().text_color();
    let font = FontId::proportional(12.0);
    if let Some(low) = raster.min() {
        painter.text(egui::pos2(bar.min.x, rect.max.y), Align2::LEFT_BOTTOM, format!("{low:.0}"), font.clone(), text_color);
    }
    if let Some(high) = raster.max() {
        painter.text(egui::pos2(bar.max.x, rect.max.y), Align2::RIGHT_BOTTOM, format!("{high:.0}"), font, text_color);
    }
}
