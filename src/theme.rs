//! Dark map theme and the generated background

use egui::{Color32, ColorImage};

use crate::core::Rgb;

pub mod colors {
    use super::Color32;

    // === Map ===
    pub const OCEAN: Color32 = Color32::from_rgb(10, 14, 22);            // #0A0E16
    pub const GRID: Color32 = Color32::from_rgb(34, 42, 58);             // #222A3A - 15° graticule
    pub const EQUATOR: Color32 = Color32::from_rgb(60, 72, 96);          // #3C4860 - equator and prime meridian

    // === Chrome ===
    pub const BG_PRIMARY: Color32 = Color32::from_rgb(0, 0, 0);
    pub const TEXT_PRIMARY: Color32 = Color32::from_rgb(255, 255, 255);
    pub const TEXT_MUTED: Color32 = Color32::from_rgb(120, 120, 120);

    // === Connection status ===
    pub const LIVE: Color32 = Color32::from_rgb(100, 200, 100);
    pub const CONNECTING: Color32 = Color32::from_rgb(255, 200, 100);
    pub const DISCONNECTED: Color32 = Color32::from_rgb(255, 100, 100);
}

/// Registry color with an opacity in [0, 1]
pub fn with_alpha(color: Rgb, alpha: f32) -> Color32 {
    let a = (alpha.clamp(0.0, 1.0) * 255.0).round() as u8;
    Color32::from_rgba_unmultiplied(color.0, color.1, color.2, a)
}

/// Dark visuals for the header bar
pub fn map_visuals() -> egui::Visuals {
    use colors::*;

    let mut visuals = egui::Visuals::dark();
    visuals.panel_fill = BG_PRIMARY;
    visuals.window_fill = BG_PRIMARY;
    visuals.extreme_bg_color = BG_PRIMARY;
    visuals.override_text_color = Some(TEXT_PRIMARY);
    visuals.window_shadow = egui::Shadow::NONE;
    visuals.popup_shadow = egui::Shadow::NONE;
    visuals
}

/// Equirectangular graticule: a line every 15° over a dark ocean.
///
/// Used when no background image is injected.
pub fn graticule(width: usize, height: usize) -> ColorImage {
    let mut image = ColorImage::new([width, height], colors::OCEAN);
    if width == 0 || height == 0 {
        return image;
    }

    // 360° / 15° = 24 columns, 180° / 15° = 12 rows
    for step in 0..=24 {
        let x = (step * (width - 1)) / 24;
        let color = if step == 12 { colors::EQUATOR } else { colors::GRID };
        for y in 0..height {
            image.pixels[y * width + x] = color;
        }
    }
    for step in 0..=12 {
        let y = (step * (height - 1)) / 12;
        let color = if step == 6 { colors::EQUATOR } else { colors::GRID };
        for x in 0..width {
            image.pixels[y * width + x] = color;
        }
    }
    image
}
