//! Render tick: evict, draw faded markers, draw the ranked legend
//!
//! The loop only talks to a [`Surface`], so the same tick drives the egui
//! painter in the apps and a [`RecordingSurface`] in the CLI and tests.

use tracing::trace;

use crate::core::{CategoryAggregator, CategoryId, MapConfig, MapState, Rgb};

/// Position in surface pixels
pub type Point = [f32; 2];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Center,
}

/// External 2D drawing target
pub trait Surface {
    /// Current width and height in pixels
    fn size(&self) -> [f32; 2];

    /// Clear by redrawing the static background scaled to the surface
    fn draw_background(&mut self);

    fn fill_circle(&mut self, center: Point, radius: f32, color: Rgb, alpha: f32);

    fn fill_rect(&mut self, min: Point, size: [f32; 2], color: Rgb, alpha: f32);

    fn fill_text(&mut self, pos: Point, text: &str, color: Rgb, align: TextAlign);
}

/// Legend panel geometry, as fractions of surface height and fixed pixels
#[derive(Debug, Clone)]
pub struct LegendStyle {
    /// First row, fraction of height
    pub top: f32,
    /// Rows past this fraction of height wrap into a new column
    pub bottom: f32,
    pub row_height: f32,
    pub column_width: f32,
    /// Left edge of the first column of labels
    pub left: f32,
    /// Left edge of the panel
    pub margin: f32,
    /// Space above the first row for the title
    pub header: f32,
    pub title: String,
    pub background: Rgb,
    pub title_color: Rgb,
}

impl Default for LegendStyle {
    fn default() -> Self {
        Self {
            top: 0.44,
            bottom: 0.9,
            row_height: 15.0,
            column_width: 130.0,
            left: 10.0,
            margin: 5.0,
            header: 40.0,
            title: "Legend".to_string(),
            background: Rgb(0x28, 0x28, 0x28),
            title_color: Rgb::WHITE,
        }
    }
}

/// Where the legend pieces go for a given entry count and surface size
#[derive(Debug, Clone, PartialEq)]
pub struct LegendLayout {
    pub panel_min: Point,
    pub panel_size: [f32; 2],
    pub title_pos: Point,
    /// One position per entry, in legend order
    pub rows: Vec<Point>,
}

/// Lay out `entries` labels top-to-bottom, wrapping into columns.
///
/// A column takes rows while their y stays at or above `bottom * height`.
pub fn legend_layout(entries: usize, size: [f32; 2], style: &LegendStyle) -> LegendLayout {
    let height = size[1];
    let start_y = height * style.top;
    let available = (height * style.bottom - start_y).max(0.0);
    let per_column = (available / style.row_height).floor() as usize + 1;
    let columns = entries.div_ceil(per_column).max(1);

    let panel_width = columns as f32 * style.column_width;
    let panel_height = (entries as f32 * style.row_height).min(available);

    let rows = (0..entries)
        .map(|i| {
            let column = (i / per_column) as f32;
            let row = (i % per_column) as f32;
            [
                style.left + column * style.column_width,
                start_y + row * style.row_height,
            ]
        })
        .collect();

    LegendLayout {
        panel_min: [style.margin, start_y - style.header],
        panel_size: [panel_width, panel_height + style.header + style.margin],
        title_pos: [panel_width * 0.5, start_y - style.header * 0.5],
        rows,
    }
}

/// Counts for one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub admitted: usize,
    pub evicted: usize,
    pub markers: usize,
    pub legend_entries: usize,
}

/// Marker opacity: 1 at arrival, 0 at the window edge
#[inline]
pub fn fade(age: f64, window: f64) -> f32 {
    (1.0 - age / window).clamp(0.0, 1.0) as f32
}

pub struct RenderLoop {
    marker_radius: f32,
    legend: LegendStyle,
    ticks: u64,
}

impl RenderLoop {
    pub fn new(config: &MapConfig) -> Self {
        Self {
            marker_radius: config.marker_radius,
            legend: LegendStyle::default(),
            ticks: 0,
        }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Draw one frame at `now`
    pub fn tick<S: Surface + ?Sized>(
        &mut self,
        now: f64,
        map: &mut MapState,
        surface: &mut S,
    ) -> FrameStats {
        let mut stats = FrameStats::default();
        surface.draw_background();

        stats.admitted = map.buffer.admit_due(now);
        stats.evicted = map.buffer.evict(now);

        let [width, height] = surface.size();
        let window = map.buffer.window();
        for event in map.buffer.snapshot() {
            map.aggregator.mark_active(event.category);
            let Some(color) = map.aggregator.category(event.category).map(|c| c.color) else {
                continue;
            };
            surface.fill_circle(
                [event.x * width, event.y * height],
                self.marker_radius,
                color,
                fade(event.age(now), window),
            );
            stats.markers += 1;
        }

        let order = map.aggregator.legend_order();
        stats.legend_entries = order.len();
        if !order.is_empty() {
            self.draw_legend(&order, &map.aggregator, surface);
        }

        self.ticks += 1;
        trace!(
            tick = self.ticks,
            markers = stats.markers,
            legend = stats.legend_entries,
            "Frame drawn"
        );
        stats
    }

    fn draw_legend<S: Surface + ?Sized>(
        &self,
        order: &[CategoryId],
        aggregator: &CategoryAggregator,
        surface: &mut S,
    ) {
        let style = &self.legend;
        let layout = legend_layout(order.len(), surface.size(), style);

        surface.fill_rect(layout.panel_min, layout.panel_size, style.background, 1.0);
        surface.fill_text(layout.title_pos, &style.title, style.title_color, TextAlign::Center);

        for (id, pos) in order.iter().zip(&layout.rows) {
            if let Some(category) = aggregator.category(*id) {
                surface.fill_text(*pos, &category.label, category.color, TextAlign::Left);
            }
        }
    }
}

/// One recorded draw call
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Background {
        size: [f32; 2],
    },
    Circle {
        center: Point,
        radius: f32,
        color: Rgb,
        alpha: f32,
    },
    Rect {
        min: Point,
        size: [f32; 2],
        color: Rgb,
        alpha: f32,
    },
    Text {
        pos: Point,
        text: String,
        color: Rgb,
        align: TextAlign,
    },
}

/// Headless surface keeping the draw calls of the latest frame
#[derive(Debug, Clone)]
pub struct RecordingSurface {
    size: [f32; 2],
    ops: Vec<DrawOp>,
    frames: u64,
}

impl RecordingSurface {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            size: [width, height],
            ops: Vec::new(),
            frames: 0,
        }
    }

    pub fn ops(&self) -> &[DrawOp] {
        &self.ops
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Text of every left-aligned label, in draw order
    pub fn legend_labels(&self) -> Vec<&str> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Text {
                    text,
                    align: TextAlign::Left,
                    ..
                } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl Surface for RecordingSurface {
    fn size(&self) -> [f32; 2] {
        self.size
    }

    fn draw_background(&mut self) {
        self.ops.clear();
        self.frames += 1;
        self.ops.push(DrawOp::Background { size: self.size });
    }

    fn fill_circle(&mut self, center: Point, radius: f32, color: Rgb, alpha: f32) {
        self.ops.push(DrawOp::Circle {
            center,
            radius,
            color,
            alpha,
        });
    }

    fn fill_rect(&mut self, min: Point, size: [f32; 2], color: Rgb, alpha: f32) {
        self.ops.push(DrawOp::Rect {
            min,
            size,
            color,
            alpha,
        });
    }

    fn fill_text(&mut self, pos: Point, text: &str, color: Rgb, align: TextAlign) {
        self.ops.push(DrawOp::Text {
            pos,
            text: text.to_string(),
            color,
            align,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map() -> MapState {
        let config = MapConfig::from_json(
            r##"{"window": "30s", "categories": [
                {"label": "debian", "color": "#d70a53"},
                {"label": "alpine", "color": "#0d597f"},
                {"label": "ubuntu", "color": "#e95420"}
            ]}"##,
        )
        .unwrap();
        MapState::new(&config)
    }

    fn circles(surface: &RecordingSurface) -> Vec<(Point, f32)> {
        surface
            .ops()
            .iter()
            .filter_map(|op| match op {
                DrawOp::Circle { center, alpha, .. } => Some((*center, *alpha)),
                _ => None,
            })
            .collect()
    }

    fn has_panel(surface: &RecordingSurface) -> bool {
        surface.ops().iter().any(|op| matches!(op, DrawOp::Rect { .. }))
    }

    #[test]
    fn test_empty_buffer_draws_no_legend() {
        let mut map = map();
        let mut render = RenderLoop::new(&MapConfig::default());
        let mut surface = RecordingSurface::new(800.0, 600.0);

        let stats = render.tick(0.0, &mut map, &mut surface);
        assert_eq!(stats, FrameStats::default());
        assert_eq!(surface.ops(), &[DrawOp::Background { size: [800.0, 600.0] }]);
    }

    #[test]
    fn test_marker_position_and_fade() {
        let mut map = map();
        let mut render = RenderLoop::new(&MapConfig::default());
        let mut surface = RecordingSurface::new(800.0, 600.0);

        map.ingest(&[0, 0x08, 0x00, 0x04, 0x00], 10.0);
        render.tick(25.0, &mut map, &mut surface);

        let drawn = circles(&surface);
        assert_eq!(drawn.len(), 1);
        assert_eq!(drawn[0].0, [200.0, 300.0]);
        assert!((drawn[0].1 - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_stale_markers_evicted_before_drawing() {
        let mut map = map();
        let mut render = RenderLoop::new(&MapConfig::default());
        let mut surface = RecordingSurface::new(100.0, 100.0);

        map.ingest(&[0, 0, 0, 0, 0], 0.0);
        map.ingest(&[1, 0, 0, 0, 0], 20.0);
        let stats = render.tick(40.0, &mut map, &mut surface);

        assert_eq!(stats.evicted, 1);
        assert_eq!(stats.markers, 1);
        assert_eq!(surface.legend_labels(), vec!["alpine"]);
    }

    #[test]
    fn test_edge_event_drawn_nearly_transparent() {
        let mut map = map();
        let mut render = RenderLoop::new(&MapConfig::default());
        let mut surface = RecordingSurface::new(100.0, 100.0);

        map.ingest(&[0, 0, 0, 0, 0], 0.0);
        render.tick(30.0, &mut map, &mut surface);

        let drawn = circles(&surface);
        assert_eq!(drawn.len(), 1);
        assert_eq!(drawn[0].1, 0.0);
    }

    #[test]
    fn test_legend_ranked_and_refreshed_each_tick() {
        let mut map = map();
        let mut render = RenderLoop::new(&MapConfig::default());
        let mut surface = RecordingSurface::new(800.0, 600.0);

        map.ingest(&[2, 0, 0, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0], 0.0);
        render.tick(1.0, &mut map, &mut surface);
        assert_eq!(surface.legend_labels(), vec!["ubuntu", "debian"]);
        assert!(has_panel(&surface));

        // Once the events expire the legend disappears, totals remain
        let stats = render.tick(100.0, &mut map, &mut surface);
        assert_eq!(stats.legend_entries, 0);
        assert!(!has_panel(&surface));
        assert_eq!(map.aggregator.total_hits(), 3);
        assert_eq!(render.ticks(), 2);
    }

    #[test]
    fn test_legend_layout_single_column() {
        let style = LegendStyle::default();
        let layout = legend_layout(3, [800.0, 1000.0], &style);

        assert_eq!(layout.rows, vec![[10.0, 440.0], [10.0, 455.0], [10.0, 470.0]]);
        assert_eq!(layout.panel_min, [5.0, 400.0]);
        assert_eq!(layout.panel_size, [130.0, 45.0 + 45.0]);
        assert_eq!(layout.title_pos, [65.0, 420.0]);
    }

    #[test]
    fn test_legend_layout_wraps_columns() {
        let style = LegendStyle::default();
        // 100px tall: rows at 44, 59, 74, 89 stay above the 90px limit
        let layout = legend_layout(7, [400.0, 100.0], &style);

        assert_eq!(layout.rows.len(), 7);
        assert_eq!(layout.rows[3], [10.0, 89.0]);
        assert_eq!(layout.rows[4], [140.0, 44.0]);
        assert_eq!(layout.rows[6], [140.0, 74.0]);
        assert_eq!(layout.panel_size[0], 260.0);
        assert!(layout.rows.iter().all(|p| p[1] <= 90.0));
    }

    #[test]
    fn test_legend_row_on_bottom_limit_stays_in_column() {
        let style = LegendStyle {
            top: 0.25,
            bottom: 0.75,
            ..LegendStyle::default()
        };
        // Rows at 30, 45, 60, 75, 90; the last one lands exactly on the limit
        let layout = legend_layout(6, [400.0, 120.0], &style);

        assert_eq!(layout.rows[4], [10.0, 90.0]);
        assert_eq!(layout.rows[5], [140.0, 30.0]);
        // Panel height capped to the legend band
        assert_eq!(layout.panel_size[1], 60.0 + 45.0);
    }

    #[test]
    fn test_legend_layout_tiny_surface() {
        let layout = legend_layout(2, [10.0, 0.0], &LegendStyle::default());
        assert_eq!(layout.rows.len(), 2);
        assert_eq!(layout.rows[1][0], 140.0);
    }

    #[test]
    fn test_fade() {
        assert_eq!(fade(0.0, 30.0), 1.0);
        assert_eq!(fade(15.0, 30.0), 0.5);
        assert_eq!(fade(30.0, 30.0), 0.0);
        assert_eq!(fade(45.0, 30.0), 0.0);
        assert_eq!(fade(-1.0, 30.0), 1.0);
    }
}
