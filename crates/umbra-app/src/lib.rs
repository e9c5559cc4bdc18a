//! Umbra application: window, frame loop and the demo scenes.

pub mod clock;
pub mod demo;
pub mod engine;
pub mod error;
pub mod headless;
pub mod live_config;
pub mod platform;
pub mod window;

pub use engine::Engine;
pub use error::AppError;
