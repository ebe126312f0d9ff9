use log::Level;
use web_sys::Window;

pub fn debug_enabled(window: &Window) -> bool {
    let search = window.location().search().ok().unwrap_or_default();
    search.contains("debug=1") || search.contains("debug=true")
}

/// Routes `log` records to the browser console. Later calls are no-ops.
pub fn init(window: &Window) {
    let level = if debug_enabled(window) {
        Level::Debug
    } else {
        Level::Info
    };
    let _ = console_log::init_with_level(level);
}
