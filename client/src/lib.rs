mod app;
mod bridge;
pub mod cancel;
pub mod config;
mod dom;
pub mod error;
pub mod geometry;
pub mod loader;
mod local;
mod logging;
mod net;
pub mod notes;
pub mod page_renderer;
pub mod persistence;
pub mod progress;
pub mod render;
pub mod runtime;
pub mod session;
pub mod state;
pub mod stroke_store;
pub mod surface;
mod util;

pub use app::{mount, ViewerHandle};
pub use config::{MountOptions, ViewerConfig};
pub use error::{Result, ViewerError};
pub use session::{Effect, HostEvent, ViewerSession};
