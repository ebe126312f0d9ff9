use uuid::Uuid;

pub fn make_id() -> String {
    Uuid::new_v4().to_string()
}

/// Wall-clock milliseconds from the browser. Only call from the web layer.
pub fn now_ms() -> u64 {
    js_sys::Date::now().max(0.0) as u64
}
