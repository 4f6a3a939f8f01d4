use eframe::egui::Color32;
use palette::{LinSrgb, Mix, Srgb};

// ---------------------------------------------------------------------------
// Sequential "Blues" colour map
// ---------------------------------------------------------------------------

/// Control points from light to dark, evenly spaced over `[0, 1]`.
const BLUES: [(u8, u8, u8); 9] = [
    (0xf7, 0xfb, 0xff),
    (0xde, 0xeb, 0xf7),
    (0xc6, 0xdb, 0xef),
    (0x9e, 0xca, 0xe1),
    (0x6b, 0xae, 0xd6),
    (0x42, 0x92, 0xc6),
    (0x21, 0x71, 0xb5),
    (0x08, 0x51, 0x9c),
    (0x08, 0x30, 0x6b),
];

fn linear(stop: (u8, u8, u8)) -> LinSrgb {
    Srgb::new(stop.0, stop.1, stop.2).into_format::<f32>().into_linear()
}

/// Colour of a normalised level; values outside `[0, 1]` are clamped.
pub fn blues(level: f32) -> Color32 {
    let level = if level.is_nan() { 0.0 } else { level.clamp(0.0, 1.0) };
    let scaled = level * (BLUES.len() - 1) as f32;
    let lower = (scaled.floor() as usize).min(BLUES.len() - 2);
    let t = scaled - lower as f32;

    let mixed = linear(BLUES[lower]).mix(linear(BLUES[lower + 1]), t);
    let rgb: Srgb = Srgb::from_linear(mixed);
    Color32::from_rgb(
        (rgb.red * 255.0).round() as u8,
        (rgb.green * 255.0).round() as u8,
        (rgb.blue * 255.0).round() as u8,
    )
}

/// Map equalised raster levels to pixels; empty bins become transparent.
pub fn colorize(levels: &[Option<f32>]) -> Vec<Color32> {
    levels
        .iter()
        .map(|level| level.map_or(Color32::TRANSPARENT, blues))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_match_control_points() {
        assert_eq!(blues(0.0), Color32::from_rgb(0xf7, 0xfb, 0xff));
        assert_eq!(blues(1.0), Color32::from_rgb(0x08, 0x30, 0x6b));
        assert_eq!(blues(7.5), blues(1.0));
        assert_eq!(blues(f32::NAN), blues(0.0));
    }

    #[test]
    fn darker_with_higher_level() {
        let brightness = |c: Color32| c.r() as u32 + c.g() as u32 + c.b() as u32;
        let steps: Vec<u32> = (0..=10).map(|i| brightness(blues(i as f32 / 10.0))).collect();
        assert!(steps.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn empty_bins_are_transparent() {
        let pixels = colorize(&[None, Some(1.0)]);
        assert_eq!(pixels[0], Color32::TRANSPARENT);
        assert_eq!(pixels[1], blues(1.0));
    }
}
