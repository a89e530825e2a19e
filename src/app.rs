//! Mirror map egui app
//!
//! Runs on both native and WASM. The central panel's painter is the drawing
//! surface; its rect follows the viewport, so resizes need no extra handling.

use std::time::Duration;

use eframe::egui;
use thiserror::Error;

#[cfg(target_arch = "wasm32")]
use std::cell::RefCell;
#[cfg(target_arch = "wasm32")]
use std::rc::Rc;

use crate::connection::ConnectionManager;
use crate::core::{MapConfig, MapState, Rgb};
use crate::render::{Point, RenderLoop, Surface, TextAlign};
use crate::theme::{colors, graticule, map_visuals, with_alpha};
use crate::time::now_seconds;
use crate::ws_state::ConnectionState;

#[cfg(target_arch = "wasm32")]
use crate::websocket_wasm::{FrameBuffer, WsClient};

#[cfg(not(target_arch = "wasm32"))]
use crate::websocket_native::NativeWsClient;

/// Time budget for ingesting frames per update
const INGEST_BUDGET_MS: f64 = 12.0;

/// Size of the generated background texture
const BACKGROUND_SIZE: [usize; 2] = [1440, 720];

const LEGEND_FONT_SIZE: f32 = 15.0;

/// Why a configured background image could not be used
#[derive(Debug, Error)]
pub enum BackgroundError {
    #[error("failed to read {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode image: {0}")]
    Decode(String),
    #[error("no usable <img id={id:?}>: {reason}")]
    Element { id: String, reason: String },
}

/// Decode an encoded image (png, jpeg) into egui pixels
#[cfg(not(target_arch = "wasm32"))]
pub fn decode_background(bytes: &[u8]) -> Result<egui::ColorImage, BackgroundError> {
    let rgba = image::load_from_memory(bytes)
        .map_err(|err| BackgroundError::Decode(err.to_string()))?
        .to_rgba8();
    let size = [rgba.width() as usize, rgba.height() as usize];
    Ok(egui::ColorImage::from_rgba_unmultiplied(size, rgba.as_raw()))
}

#[cfg(not(target_arch = "wasm32"))]
fn read_background(path: &str) -> Result<egui::ColorImage, BackgroundError> {
    let bytes = std::fs::read(path).map_err(|source| BackgroundError::Io {
        path: path.to_string(),
        source,
    })?;
    decode_background(&bytes)
}

/// Copy the pixels of a loaded `<img>` through an offscreen canvas
#[cfg(target_arch = "wasm32")]
fn read_background(id: &str) -> Result<egui::ColorImage, BackgroundError> {
    use wasm_bindgen::JsCast;

    let fail = |reason: &str| BackgroundError::Element {
        id: id.to_string(),
        reason: reason.to_string(),
    };
    let document = web_sys::window()
        .and_then(|w| w.document())
        .ok_or_else(|| fail("no document"))?;
    let img = document
        .get_element_by_id(id)
        .ok_or_else(|| fail("not found"))?
        .dyn_into::<web_sys::HtmlImageElement>()
        .map_err(|_| fail("not an image"))?;
    let (width, height) = (img.natural_width(), img.natural_height());
    if width == 0 || height == 0 {
        return Err(fail("not loaded"));
    }

    let canvas = document
        .create_element("canvas")
        .map_err(|_| fail("cannot create canvas"))?
        .dyn_into::<web_sys::HtmlCanvasElement>()
        .map_err(|_| fail("cannot create canvas"))?;
    canvas.set_width(width);
    canvas.set_height(height);
    let ctx = canvas
        .get_context("2d")
        .ok()
        .flatten()
        .and_then(|c| c.dyn_into::<web_sys::CanvasRenderingContext2d>().ok())
        .ok_or_else(|| fail("no 2d context"))?;
    ctx.draw_image_with_html_image_element(&img, 0.0, 0.0)
        .map_err(|_| fail("draw failed"))?;
    let data = ctx
        .get_image_data(0.0, 0.0, width as f64, height as f64)
        .map_err(|_| fail("pixels not readable"))?;

    Ok(egui::ColorImage::from_rgba_unmultiplied(
        [width as usize, height as usize],
        &data.data(),
    ))
}

/// The configured map image, or the graticule when none is configured or it fails to load
pub fn background_image(config: &MapConfig) -> egui::ColorImage {
    let fallback = || {
        let [w, h] = BACKGROUND_SIZE;
        graticule(w, h)
    };
    let Some(source) = config.background.as_deref() else {
        return fallback();
    };
    match read_background(source) {
        Ok(image) => {
            tracing::info!(source, size = ?image.size, "Background image loaded");
            image
        }
        Err(e) => {
            tracing::warn!(error = %e, "Background image unavailable, using graticule");
            fallback()
        }
    }
}

fn load_background(ctx: &egui::Context, config: &MapConfig) -> egui::TextureHandle {
    ctx.load_texture(
        "map_background",
        background_image(config),
        egui::TextureOptions::LINEAR,
    )
}

/// egui painter restricted to the map rect
struct PainterSurface<'a> {
    painter: &'a egui::Painter,
    rect: egui::Rect,
    background: egui::TextureId,
}

impl PainterSurface<'_> {
    fn to_screen(&self, p: Point) -> egui::Pos2 {
        self.rect.min + egui::vec2(p[0], p[1])
    }
}

impl Surface for PainterSurface<'_> {
    fn size(&self) -> [f32; 2] {
        [self.rect.width(), self.rect.height()]
    }

    fn draw_background(&mut self) {
        let uv = egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0));
        self.painter
            .image(self.background, self.rect, uv, egui::Color32::WHITE);
    }

    fn fill_circle(&mut self, center: Point, radius: f32, color: Rgb, alpha: f32) {
        self.painter
            .circle_filled(self.to_screen(center), radius, with_alpha(color, alpha));
    }

    fn fill_rect(&mut self, min: Point, size: [f32; 2], color: Rgb, alpha: f32) {
        let rect = egui::Rect::from_min_size(self.to_screen(min), egui::vec2(size[0], size[1]));
        self.painter.rect_filled(rect, 0.0, with_alpha(color, alpha));
    }

    fn fill_text(&mut self, pos: Point, text: &str, color: Rgb, align: TextAlign) {
        let anchor = match align {
            TextAlign::Left => egui::Align2::LEFT_CENTER,
            TextAlign::Center => egui::Align2::CENTER_CENTER,
        };
        self.painter.text(
            self.to_screen(pos),
            anchor,
            text,
            egui::FontId::proportional(LEGEND_FONT_SIZE),
            with_alpha(color, 1.0),
        );
    }
}

/// Mirror map app - runs on both native and WASM
pub struct MapApp {
    map: MapState,
    render: RenderLoop,
    tick_interval: Duration,
    background: egui::TextureHandle,

    #[cfg(target_arch = "wasm32")]
    manager: Rc<RefCell<ConnectionManager>>,
    #[cfg(target_arch = "wasm32")]
    frames: FrameBuffer,
    /// WebSocket client (kept alive)
    #[cfg(target_arch = "wasm32")]
    #[allow(dead_code)]
    ws_client: Option<WsClient>,

    #[cfg(not(target_arch = "wasm32"))]
    ws_client: NativeWsClient,
}

impl MapApp {
    /// Create new app for WASM platform
    #[cfg(target_arch = "wasm32")]
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        config: &MapConfig,
        manager: ConnectionManager,
    ) -> Self {
        cc.egui_ctx.set_visuals(map_visuals());

        let manager = Rc::new(RefCell::new(manager));
        let frames: FrameBuffer = Rc::new(RefCell::new(Default::default()));
        let ws_client = match WsClient::connect(manager.clone(), frames.clone()) {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::error!(?e, "Failed to open WebSocket");
                None
            }
        };

        Self {
            map: MapState::new(config),
            render: RenderLoop::new(config),
            tick_interval: config.tick_interval,
            background: load_background(&cc.egui_ctx, config),
            manager,
            frames,
            ws_client,
        }
    }

    /// Create new app for native platform
    #[cfg(not(target_arch = "wasm32"))]
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        config: &MapConfig,
        manager: ConnectionManager,
    ) -> Self {
        cc.egui_ctx.set_visuals(map_visuals());
        tracing::info!(endpoint = manager.endpoint(), "Starting map");

        Self {
            map: MapState::new(config),
            render: RenderLoop::new(config),
            tick_interval: config.tick_interval,
            background: load_background(&cc.egui_ctx, config),
            ws_client: NativeWsClient::connect(manager),
        }
    }

    /// Connection state, reconnect count
    fn connection_status(&self) -> (ConnectionState, u64) {
        #[cfg(target_arch = "wasm32")]
        {
            let manager = self.manager.borrow();
            (manager.state(), manager.reconnects())
        }
        #[cfg(not(target_arch = "wasm32"))]
        {
            let manager = self.ws_client.manager.lock();
            (manager.state(), manager.reconnects())
        }
    }

    /// Ingest buffered frames (native)
    #[cfg(not(target_arch = "wasm32"))]
    fn process_frames(&mut self) {
        use std::time::Instant;
        let deadline = Instant::now() + Duration::from_secs_f64(INGEST_BUDGET_MS / 1000.0);
        while let Ok(frame) = self.ws_client.rx.try_recv() {
            let now = now_seconds();
            self.ws_client.manager.lock().on_frame(&frame, now, &mut self.map);
            if Instant::now() >= deadline {
                break;
            }
        }
    }

    /// Ingest buffered frames (WASM)
    #[cfg(target_arch = "wasm32")]
    fn process_frames(&mut self) {
        let deadline = js_sys::Date::now() + INGEST_BUDGET_MS;
        loop {
            let Some(frame) = self.frames.borrow_mut().pop_front() else {
                break;
            };
            let now = now_seconds();
            self.manager.borrow_mut().on_frame(&frame, now, &mut self.map);
            if js_sys::Date::now() >= deadline {
                break;
            }
        }
    }

    fn render_header(&self, ui: &mut egui::Ui) {
        let (state, reconnects) = self.connection_status();
        let state_color = match state {
            ConnectionState::Open => colors::LIVE,
            ConnectionState::Connecting => colors::CONNECTING,
            ConnectionState::Closed => colors::DISCONNECTED,
        };

        ui.horizontal(|ui| {
            ui.label(egui::RichText::new("Mirror map").strong());
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.label(egui::RichText::new(state.to_string()).color(state_color));
                ui.label(egui::RichText::new("/").color(colors::TEXT_MUTED));
                if reconnects > 0 {
                    ui.label(
                        egui::RichText::new(format!("{} reconnects", reconnects))
                            .color(colors::TEXT_MUTED),
                    );
                    ui.label(egui::RichText::new("/").color(colors::TEXT_MUTED));
                }
                ui.label(
                    egui::RichText::new(format!("{} total hits", self.map.aggregator.total_hits()))
                        .color(colors::TEXT_MUTED),
                );
                ui.label(egui::RichText::new("/").color(colors::TEXT_MUTED));
                ui.label(
                    egui::RichText::new(format!("{} on map", self.map.buffer.len()))
                        .color(colors::TEXT_MUTED),
                );
            });
        });
    }
}

impl eframe::App for MapApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.process_frames();

        egui::TopBottomPanel::top("header")
            .frame(egui::Frame::new().fill(colors::BG_PRIMARY).inner_margin(4.0))
            .show(ctx, |ui| {
                self.render_header(ui);
            });

        let now = now_seconds();
        let background = self.background.id();
        egui::CentralPanel::default()
            .frame(egui::Frame::new().fill(colors::OCEAN))
            .show(ctx, |ui| {
                let rect = ui.max_rect();
                let painter = ui.painter_at(rect);
                let mut surface = PainterSurface {
                    painter: &painter,
                    rect,
                    background,
                };
                self.render.tick(now, &mut self.map, &mut surface);
            });

        // Sleep until the next tick unless input wakes us earlier
        ctx.request_repaint_after(self.tick_interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_png(name: &str, width: u32, height: u32) -> String {
        let path = std::env::temp_dir().join(format!("mirror-map-{}-{name}.png", std::process::id()));
        let mut img = image::RgbaImage::new(width, height);
        img.put_pixel(0, 0, image::Rgba([200, 10, 20, 255]));
        img.save(&path).unwrap();
        path.display().to_string()
    }

    fn config_with_background(background: &str) -> MapConfig {
        MapConfig::from_json(&format!(r#"{{"background": {background:?}}}"#)).unwrap()
    }

    #[test]
    fn test_configured_background_loaded() {
        let path = write_png("configured", 3, 2);
        let image = background_image(&config_with_background(&path));
        std::fs::remove_file(&path).ok();

        assert_eq!(image.size, [3, 2]);
        assert_eq!(image.pixels[0], egui::Color32::from_rgb(200, 10, 20));
    }

    #[test]
    fn test_background_texture_uses_configured_image() {
        let path = write_png("texture", 4, 2);
        let ctx = egui::Context::default();
        let texture = load_background(&ctx, &config_with_background(&path));
        std::fs::remove_file(&path).ok();

        assert_eq!(texture.size(), [4, 2]);
    }

    #[test]
    fn test_graticule_without_configured_image() {
        let image = background_image(&MapConfig::default());
        assert_eq!(image.size, BACKGROUND_SIZE);
    }

    #[test]
    fn test_unreadable_background_falls_back() {
        let image = background_image(&config_with_background("/nonexistent/world.png"));
        assert_eq!(image.size, BACKGROUND_SIZE);

        assert!(matches!(
            decode_background(b"not an image"),
            Err(BackgroundError::Decode(_))
        ));
    }
}
