//! WASM WebSocket client for the hit stream
//!
//! Binary frames are buffered for the app to drain in `update()`. Error and
//! close callbacks go through the [`ConnectionManager`], which hands out at
//! most one reconnect timer per failure.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use tracing::{error, info};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{BinaryType, CloseEvent, ErrorEvent, MessageEvent, WebSocket};

use crate::connection::ConnectionManager;
use crate::ws_state::ConnectionState;

/// Shared frame buffer: the socket callback pushes, the app drains it in update()
pub type FrameBuffer = Rc<RefCell<VecDeque<Vec<u8>>>>;

/// Shared handle on the connection manager
pub type SharedManager = Rc<RefCell<ConnectionManager>>;

struct Inner {
    manager: SharedManager,
    frames: FrameBuffer,
    socket: RefCell<Option<WebSocket>>,
}

/// WASM WebSocket client
pub struct WsClient {
    inner: Rc<Inner>,
}

impl WsClient {
    /// Connect to the manager's endpoint
    pub fn connect(manager: SharedManager, frames: FrameBuffer) -> Result<Self, JsValue> {
        let inner = Rc::new(Inner {
            manager,
            frames,
            socket: RefCell::new(None),
        });
        open(&inner)?;
        Ok(Self { inner })
    }

    /// Get the current connection state
    pub fn state(&self) -> ConnectionState {
        self.inner.manager.borrow().state()
    }
}

fn open(inner: &Rc<Inner>) -> Result<(), JsValue> {
    // Detach the previous socket so its late callbacks cannot schedule reconnects
    if let Some(old) = inner.socket.borrow_mut().take() {
        old.set_onopen(None);
        old.set_onmessage(None);
        old.set_onerror(None);
        old.set_onclose(None);
    }

    let url = inner.manager.borrow().endpoint().to_string();
    info!(url, "Connecting to WebSocket");

    let ws = WebSocket::new(&url)?;
    ws.set_binary_type(BinaryType::Arraybuffer);

    // On open - update state
    let inner_clone = inner.clone();
    let on_open = Closure::wrap(Box::new(move |_| {
        inner_clone.manager.borrow_mut().on_open();
    }) as Box<dyn Fn(JsValue)>);
    ws.set_onopen(Some(on_open.as_ref().unchecked_ref()));
    on_open.forget();

    // On message - push to buffer (ingested in app update())
    let frames = inner.frames.clone();
    let on_msg = Closure::wrap(Box::new(move |e: MessageEvent| {
        if let Ok(buf) = e.data().dyn_into::<js_sys::ArrayBuffer>() {
            let frame = js_sys::Uint8Array::new(&buf).to_vec();
            frames.borrow_mut().push_back(frame);
        }
    }) as Box<dyn Fn(MessageEvent)>);
    ws.set_onmessage(Some(on_msg.as_ref().unchecked_ref()));
    on_msg.forget();

    // On error
    let inner_clone = inner.clone();
    let on_err = Closure::wrap(Box::new(move |e: ErrorEvent| {
        let msg = e.message();
        error!(error = %msg, "WebSocket error");
        handle_close(&inner_clone, &msg);
    }) as Box<dyn Fn(ErrorEvent)>);
    ws.set_onerror(Some(on_err.as_ref().unchecked_ref()));
    on_err.forget();

    // On close
    let inner_clone = inner.clone();
    let on_close = Closure::wrap(Box::new(move |e: CloseEvent| {
        let reason = format!("code {} {}", e.code(), e.reason());
        handle_close(&inner_clone, &reason);
    }) as Box<dyn Fn(CloseEvent)>);
    ws.set_onclose(Some(on_close.as_ref().unchecked_ref()));
    on_close.forget();

    *inner.socket.borrow_mut() = Some(ws);
    Ok(())
}

fn handle_close(inner: &Rc<Inner>, reason: &str) {
    let Some(delay) = inner.manager.borrow_mut().on_close(reason) else {
        return;
    };

    let inner_clone = inner.clone();
    let reconnect = Closure::once_into_js(move || {
        inner_clone.manager.borrow_mut().begin_reconnect();
        if let Err(e) = open(&inner_clone) {
            error!(?e, "Failed to reopen WebSocket");
            handle_close(&inner_clone, "reopen failed");
        }
    });

    let scheduled = web_sys::window().ok_or_else(|| JsValue::from_str("no window")).and_then(|w| {
        w.set_timeout_with_callback_and_timeout_and_arguments_0(
            reconnect.unchecked_ref(),
            delay.as_millis() as i32,
        )
    });
    if let Err(e) = scheduled {
        error!(?e, "Failed to schedule reconnect");
    }
}
