mod app;
mod effects;
mod input;
mod queries;
mod render;
mod token;

pub use app::run_app;
