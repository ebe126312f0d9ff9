use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{
    CanvasRenderingContext2d, Document, Element, Event, HtmlCanvasElement, HtmlElement,
    PointerEvent,
};

use crate::geometry::{Rect, Size};

pub fn get_element<T: JsCast>(document: &Document, id: &str) -> Result<T, JsValue> {
    let element = document
        .get_element_by_id(id)
        .ok_or_else(|| JsValue::from_str(&format!("Missing element: {id}")))?;
    element
        .dyn_into::<T>()
        .map_err(|_| JsValue::from_str(&format!("Invalid element type: {id}")))
}

pub fn create<T: JsCast>(document: &Document, tag: &str, class: &str) -> Result<T, JsValue> {
    let element = document.create_element(tag)?;
    if !class.is_empty() {
        element.set_class_name(class);
    }
    element
        .dyn_into::<T>()
        .map_err(|_| JsValue::from_str(&format!("Invalid element type: {tag}")))
}

pub fn context_2d(canvas: &HtmlCanvasElement) -> Result<CanvasRenderingContext2d, JsValue> {
    canvas
        .get_context("2d")?
        .ok_or_else(|| JsValue::from_str("Missing 2d context"))?
        .dyn_into::<CanvasRenderingContext2d>()
        .map_err(|_| JsValue::from_str("Invalid 2d context"))
}

pub fn set_styles(element: &HtmlElement, styles: &[(&str, &str)]) {
    let style = element.style();
    for (name, value) in styles {
        let _ = style.set_property(name, value);
    }
}

/// Positions `element` absolutely over `rect`, in CSS pixels.
pub fn place(element: &HtmlElement, rect: Rect) {
    let left = format!("{}px", rect.x);
    let top = format!("{}px", rect.y);
    let width = format!("{}px", rect.width);
    let height = format!("{}px", rect.height);
    set_styles(
        element,
        &[
            ("left", left.as_str()),
            ("top", top.as_str()),
            ("width", width.as_str()),
            ("height", height.as_str()),
        ],
    );
}

pub fn client_size(element: &HtmlElement) -> Size {
    Size::new(element.client_width() as f64, element.client_height() as f64)
}

pub fn offset_size(element: &HtmlElement) -> Size {
    Size::new(element.offset_width() as f64, element.offset_height() as f64)
}

/// Pointer position relative to the element's top-left corner.
pub fn local_point(element: &Element, event: &PointerEvent) -> (f64, f64) {
    let rect = element.get_bounding_client_rect();
    (
        event.client_x() as f64 - rect.left(),
        event.client_y() as f64 - rect.top(),
    )
}

pub fn client_point(event: &PointerEvent) -> (f64, f64) {
    (event.client_x() as f64, event.client_y() as f64)
}

/// Nearest ancestor of the event target (inclusive) carrying `attribute`.
pub fn closest_with(event: &Event, attribute: &str) -> Option<HtmlElement> {
    let target: Element = event.target()?.dyn_into().ok()?;
    target
        .closest(&format!("[{attribute}]"))
        .ok()
        .flatten()?
        .dyn_into()
        .ok()
}
