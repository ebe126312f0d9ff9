//! Adapter for the host-provided rasterizer and the visible page canvas.
//!
//! The host object must expose `open(bytes) -> Promise<number>` and
//! `renderPage(page, scale, canvas) -> Promise<void>`.

use async_trait::async_trait;
use js_sys::{Function, Promise, Reflect, Uint8Array};
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{CanvasRenderingContext2d, Document, HtmlCanvasElement};

use crate::cancel::CancellationToken;
use crate::dom::context_2d;
use crate::loader::DocumentEngine;
use crate::page_renderer::{Presenter, Rasterizer};

fn describe(value: &JsValue) -> String {
    value
        .as_string()
        .or_else(|| {
            Reflect::get(value, &JsValue::from_str("message"))
                .ok()
                .and_then(|message| message.as_string())
        })
        .unwrap_or_else(|| format!("{value:?}"))
}

pub struct JsRasterizer {
    host: JsValue,
    document: Document,
}

impl JsRasterizer {
    pub fn new(host: JsValue, document: Document) -> Self {
        Self { host, document }
    }

    fn method(&self, name: &str) -> Result<Function, String> {
        Reflect::get(&self.host, &JsValue::from_str(name))
            .ok()
            .and_then(|value| value.dyn_into::<Function>().ok())
            .ok_or_else(|| format!("rasterizer has no {name}()"))
    }

    async fn settle(value: JsValue) -> Result<JsValue, String> {
        match value.dyn_into::<Promise>() {
            Ok(promise) => JsFuture::from(promise).await.map_err(|error| describe(&error)),
            Err(value) => Ok(value),
        }
    }
}

#[async_trait(?Send)]
impl DocumentEngine for JsRasterizer {
    async fn open(&self, bytes: Vec<u8>) -> Result<u32, String> {
        let open = self.method("open")?;
        let array = Uint8Array::from(bytes.as_slice());
        let pending = open
            .call1(&self.host, &array)
            .map_err(|error| describe(&error))?;
        let count = Self::settle(pending)
            .await?
            .as_f64()
            .ok_or_else(|| "open() did not resolve to a page count".to_string())?;
        if !count.is_finite() || count < 0.0 {
            return Err(format!("invalid page count {count}"));
        }
        Ok(count as u32)
    }
}

#[async_trait(?Send)]
impl Rasterizer for JsRasterizer {
    type Bitmap = HtmlCanvasElement;

    async fn rasterize(
        &self,
        page: u32,
        scale: f64,
        cancel: &CancellationToken,
    ) -> Result<HtmlCanvasElement, String> {
        if cancel.is_cancelled() {
            return Err("cancelled".into());
        }
        let render = self.method("renderPage")?;
        let buffer: HtmlCanvasElement = self
            .document
            .create_element("canvas")
            .map_err(|error| describe(&error))?
            .dyn_into()
            .map_err(|_| "could not create an off-screen canvas".to_string())?;
        let pending = render
            .call3(
                &self.host,
                &JsValue::from(page),
                &JsValue::from_f64(scale),
                &buffer,
            )
            .map_err(|error| describe(&error))?;
        Self::settle(pending).await?;
        if buffer.width() == 0 || buffer.height() == 0 {
            return Err(format!("page {page} rendered empty"));
        }
        Ok(buffer)
    }
}

/// Copies a finished off-screen page onto the visible canvas.
pub struct CanvasPresenter {
    canvas: HtmlCanvasElement,
    context: CanvasRenderingContext2d,
}

impl CanvasPresenter {
    pub fn new(canvas: HtmlCanvasElement) -> Result<Self, JsValue> {
        let context = context_2d(&canvas)?;
        Ok(Self { canvas, context })
    }
}

impl Presenter<HtmlCanvasElement> for CanvasPresenter {
    fn present(&self, page: u32, bitmap: HtmlCanvasElement) {
        self.canvas.set_width(bitmap.width());
        self.canvas.set_height(bitmap.height());
        if let Err(error) = self
            .context
            .draw_image_with_html_canvas_element(&bitmap, 0.0, 0.0)
        {
            log::error!("presenting page {page} failed: {}", describe(&error));
            return;
        }
        log::debug!("page {page} on screen");
    }
}
