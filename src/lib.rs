#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod config;
pub mod data;
pub mod engagement;
pub mod feed;
pub mod logging;
pub mod media;
pub mod navigation;
pub mod nhost;
pub mod player;
pub mod reel;
pub mod session;
pub mod ui;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
