//! Mirror map - live map of download hits
//!
//! Decodes a binary stream of geotagged hits, keeps them for a fixed
//! window and draws them as fading markers with a ranked legend of the
//! projects currently being downloaded.
//!
//! - `core`: wire decoding, time-windowed buffer, per-category totals
//! - `connection`: connection lifecycle and reconnect policy
//! - `render`: the per-tick draw routine over an abstract surface
//! - `app`: egui front end (browser with `wasm`, desktop with `gui`)

pub mod connection;
pub mod core;
pub mod render;
pub mod time;
pub mod ws_state;

#[cfg(feature = "cli")]
pub mod scheduler;
#[cfg(feature = "cli")]
pub mod websocket_native;
#[cfg(all(target_arch = "wasm32", feature = "wasm"))]
pub mod websocket_wasm;

#[cfg(any(all(target_arch = "wasm32", feature = "wasm"), feature = "gui"))]
pub mod app;
#[cfg(any(all(target_arch = "wasm32", feature = "wasm"), feature = "gui"))]
pub mod theme;

#[cfg(all(target_arch = "wasm32", feature = "wasm"))]
mod web {
    use wasm_bindgen::prelude::*;
    use wasm_bindgen::JsCast;

    use crate::app::MapApp;
    use crate::connection::ConnectionManager;
    use crate::core::MapConfig;

    /// Read `window.__mirror_map_config` (JSON string), falling back to defaults
    fn page_config(window: &web_sys::Window) -> MapConfig {
        let json = js_sys::Reflect::get(window, &JsValue::from_str("__mirror_map_config"))
            .ok()
            .and_then(|v| v.as_string());
        match json.as_deref().map(MapConfig::from_json) {
            Some(Ok(config)) => config,
            Some(Err(e)) => {
                tracing::error!(error = %e, "Invalid page config, using defaults");
                MapConfig::default()
            }
            None => MapConfig::default(),
        }
    }

    #[wasm_bindgen(start)]
    pub fn main() {
        console_error_panic_hook::set_once();

        // Initialize tracing for browser console
        tracing_wasm::set_as_global_default();

        let window = web_sys::window().expect("no window");
        let config = page_config(&window);
        let origin = window.location().origin().expect("no page origin");
        let manager = match ConnectionManager::from_config(&config, &origin) {
            Ok(manager) => manager,
            Err(e) => {
                tracing::error!(error = %e, origin, "Cannot derive stream endpoint");
                return;
            }
        };

        let web_options = eframe::WebOptions::default();

        wasm_bindgen_futures::spawn_local(async move {
            let canvas = window
                .document()
                .expect("no document")
                .get_element_by_id("canvas")
                .expect("no canvas element")
                .dyn_into::<web_sys::HtmlCanvasElement>()
                .expect("not a canvas element");

            eframe::WebRunner::new()
                .start(
                    canvas,
                    web_options,
                    Box::new(move |cc| Ok(Box::new(MapApp::new(cc, &config, manager)))),
                )
                .await
                .expect("Failed to start eframe");
        });
    }
}
