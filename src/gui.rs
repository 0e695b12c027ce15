pub const APP_TITLE: &str = "phgrid";

mod app;
mod image;

pub use app::GalleryApp;
